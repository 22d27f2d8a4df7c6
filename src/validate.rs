//! # Validation
//!
//! Declarative rules attached to components, checked against the live
//! state tree before an action's core callback runs. Hidden components
//! are skipped; a hidden field's state is never the user's fault.
//!
//! Failures are values, not exceptions; the action lifecycle decides what
//! a non-empty failure list does to the open transaction.

use regex::Regex;
use serde_json::Value;

use crate::authorize::Gate;
use crate::eval::EvalSession;
use crate::schema::{SchemaId, SchemaTree};
use crate::visibility::is_hidden;

/// A validation rule attached to a component.
#[derive(Debug, Clone)]
pub enum Rule {
    /// The path must hold a non-null, non-blank value.
    Required,
    /// The value must be a string.
    String,
    /// The value must be numeric.
    Numeric,
    /// The value must be a boolean.
    Boolean,
    /// The value must be an array.
    Array,
    /// The value must equal one of the listed values.
    OneOf(Vec<Value>),
    /// The string value must match the regular expression.
    Pattern(Regex),
    /// Strings must be at least this long; arrays at least this large.
    MinLength(usize),
    /// Strings must be at most this long; arrays at most this large.
    MaxLength(usize),
    /// Numeric values must be at least this.
    Min(f64),
    /// Numeric values must be at most this.
    Max(f64),
}

/// A single validation failure: the offending path plus a user-facing
/// message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// The absolute state path that failed.
    pub path: String,
    /// A user-facing description of the failure.
    pub message: String,
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn check(rule: &Rule, path: &str, value: &Value) -> Option<ValidationFailure> {
    let fail = |message: String| {
        Some(ValidationFailure {
            path: path.to_string(),
            message,
        })
    };
    match rule {
        Rule::Required => {
            if is_blank(value) {
                return fail(format!("The {} field is required.", path));
            }
        }
        Rule::String => {
            if !value.is_null() && !value.is_string() {
                return fail(format!("The {} field must be a string.", path));
            }
        }
        Rule::Numeric => {
            if !value.is_null() && !value.is_number() {
                return fail(format!("The {} field must be a number.", path));
            }
        }
        Rule::Boolean => {
            if !value.is_null() && !value.is_boolean() {
                return fail(format!("The {} field must be true or false.", path));
            }
        }
        Rule::Array => {
            if !value.is_null() && !value.is_array() {
                return fail(format!("The {} field must be a list.", path));
            }
        }
        Rule::OneOf(allowed) => {
            if !value.is_null() && !allowed.contains(value) {
                return fail(format!("The selected {} is invalid.", path));
            }
        }
        Rule::Pattern(pattern) => {
            if let Value::String(s) = value {
                if !pattern.is_match(s) {
                    return fail(format!("The {} field format is invalid.", path));
                }
            }
        }
        Rule::MinLength(min) => {
            let length = match value {
                Value::String(s) => Some(s.chars().count()),
                Value::Array(items) => Some(items.len()),
                _ => None,
            };
            if let Some(length) = length {
                if length < *min {
                    return fail(format!(
                        "The {} field must be at least {} characters.",
                        path, min
                    ));
                }
            }
        }
        Rule::MaxLength(max) => {
            let length = match value {
                Value::String(s) => Some(s.chars().count()),
                Value::Array(items) => Some(items.len()),
                _ => None,
            };
            if let Some(length) = length {
                if length > *max {
                    return fail(format!(
                        "The {} field must not exceed {} characters.",
                        path, max
                    ));
                }
            }
        }
        Rule::Min(min) => {
            if let Some(n) = value.as_f64() {
                if n < *min {
                    return fail(format!("The {} field must be at least {}.", path, min));
                }
            }
        }
        Rule::Max(max) => {
            if let Some(n) = value.as_f64() {
                if n > *max {
                    return fail(format!("The {} field must not exceed {}.", path, max));
                }
            }
        }
    }
    None
}

/// Checks one component's rules against the current state, ignoring
/// visibility.
pub(crate) fn component_failures(
    tree: &SchemaTree,
    session: &EvalSession,
    id: crate::schema::ComponentId,
) -> Vec<ValidationFailure> {
    let component = tree.component(id);
    if component.rules.is_empty() {
        return Vec::new();
    }
    let path = tree.absolute_state_path(id);
    let value = session.state.get(&path).unwrap_or(Value::Null);
    component
        .rules
        .iter()
        .filter_map(|rule| check(rule, &path, &value))
        .collect()
}

/// Validates every visible component under a container against its rules.
///
/// Returns all failures in tree order; an empty list means the state
/// passed.
pub fn validate(
    tree: &SchemaTree,
    session: &EvalSession,
    gate: &dyn Gate,
    schema: SchemaId,
) -> Vec<ValidationFailure> {
    let mut failures = Vec::new();
    tree.walk(schema, &mut |id| {
        if tree.component(id).rules.is_empty() {
            return;
        }
        if is_hidden(tree, session, gate, id) {
            return;
        }
        failures.extend(component_failures(tree, session, id));
    });
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorize::AllowAllGate;
    use crate::eval::Operation;
    use crate::schema::Component;
    use crate::state::StateTree;
    use serde_json::json;

    fn session() -> EvalSession {
        EvalSession::new(StateTree::new(), None, Operation::Create)
    }

    #[test]
    fn required_rejects_blank_values() {
        let mut tree = SchemaTree::new();
        let root = tree.root();
        tree.attach(root, Component::new("title").rule(Rule::Required));

        let session = session();
        let failures = validate(&tree, &session, &AllowAllGate, root);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].path, "title");

        session.state.set("title", json!("  "));
        assert_eq!(validate(&tree, &session, &AllowAllGate, root).len(), 1);

        session.state.set("title", json!("Hello"));
        assert!(validate(&tree, &session, &AllowAllGate, root).is_empty());
    }

    #[test]
    fn hidden_components_are_not_validated() {
        let mut tree = SchemaTree::new();
        let root = tree.root();
        tree.attach(root, Component::new("secret").hidden(true).rule(Rule::Required));

        let session = session();
        assert!(validate(&tree, &session, &AllowAllGate, root).is_empty());
    }

    #[test]
    fn type_and_range_rules_compose() {
        let mut tree = SchemaTree::new();
        let root = tree.root();
        tree.attach(
            root,
            Component::new("age")
                .rule(Rule::Numeric)
                .rule(Rule::Min(0.0))
                .rule(Rule::Max(150.0)),
        );

        let session = session();
        session.state.set("age", json!("not a number"));
        assert_eq!(validate(&tree, &session, &AllowAllGate, root).len(), 1);

        session.state.set("age", json!(200));
        let failures = validate(&tree, &session, &AllowAllGate, root);
        assert_eq!(failures.len(), 1);
        assert!(failures[0].message.contains("not exceed"));

        session.state.set("age", json!(30));
        assert!(validate(&tree, &session, &AllowAllGate, root).is_empty());
    }

    #[test]
    fn pattern_and_one_of_rules() {
        let mut tree = SchemaTree::new();
        let root = tree.root();
        tree.attach(
            root,
            Component::new("slug").rule(Rule::Pattern(Regex::new("^[a-z-]+$").unwrap())),
        );
        tree.attach(
            root,
            Component::new("status").rule(Rule::OneOf(vec![json!("draft"), json!("published")])),
        );

        let session = session();
        session.state.set("slug", json!("Hello World"));
        session.state.set("status", json!("archived"));
        assert_eq!(validate(&tree, &session, &AllowAllGate, root).len(), 2);

        session.state.set("slug", json!("hello-world"));
        session.state.set("status", json!("draft"));
        assert!(validate(&tree, &session, &AllowAllGate, root).is_empty());
    }

    #[test]
    fn length_rules_cover_strings_and_arrays() {
        let mut tree = SchemaTree::new();
        let root = tree.root();
        tree.attach(
            root,
            Component::new("tags")
                .rule(Rule::MinLength(1))
                .rule(Rule::MaxLength(3)),
        );

        let session = session();
        session.state.set("tags", json!([]));
        assert_eq!(validate(&tree, &session, &AllowAllGate, root).len(), 1);

        session.state.set("tags", json!(["a", "b", "c", "d"]));
        assert_eq!(validate(&tree, &session, &AllowAllGate, root).len(), 1);

        session.state.set("tags", json!(["a"]));
        assert!(validate(&tree, &session, &AllowAllGate, root).is_empty());
    }
}
