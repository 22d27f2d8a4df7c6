//! # Mounted Actions and Resolution
//!
//! The mounted-action stack is the wire-visible contract between a
//! front-end interaction layer and the engine: an ordered list of
//! `{name, arguments, context}` descriptors, serialized into the
//! interaction's persisted state between round-trips. A modal open on
//! screen is nothing more than a descriptor waiting on this stack.
//!
//! Resolution turns a descriptor back into a concrete [`Action`] using
//! one of three strategies chosen by the descriptor's context flags:
//! schema-component-scoped, table-scoped, or generic (session cache,
//! then parent modal registry, then the tree's registered actions).
//! There is no runtime discovery beyond these explicit registries.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::action::Action;
use crate::record::{Record, RecordStore};
use crate::schema::{ComponentId, SchemaTree};
use crate::table::Table;

/// Context flags steering a descriptor's resolution strategy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MountContext {
    /// Dotted schema-component path: the before-dot prefix names a
    /// component key, the optional after-dot suffix narrows into one of
    /// the resolved action's modal actions.
    #[serde(
        rename = "schemaComponent",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub schema_component: Option<String>,
    /// Resolve against the bound table's registries.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub table: bool,
    /// With `table`, look in the bulk registry instead of row actions.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bulk: bool,
    /// With `table`, re-attach this row's record to the resolved action.
    #[serde(rename = "recordKey", default, skip_serializing_if = "Option::is_none")]
    pub record_key: Option<String>,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// One entry of the mounted-action stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountedAction {
    /// The action name.
    pub name: String,
    /// Arguments submitted at mount, merged over the action's defaults.
    #[serde(default = "empty_object")]
    pub arguments: Value,
    /// Resolution context.
    #[serde(default)]
    pub context: MountContext,
    /// Working data (modal form state). Excluded from the rate-limit key.
    #[serde(default = "empty_object")]
    pub data: Value,
}

impl MountedAction {
    /// Creates a descriptor with empty arguments and context.
    pub fn new(name: impl Into<String>) -> Self {
        MountedAction {
            name: name.into(),
            arguments: empty_object(),
            context: MountContext::default(),
            data: empty_object(),
        }
    }

    /// Sets the submitted arguments.
    pub fn arguments(mut self, arguments: Value) -> Self {
        self.arguments = arguments;
        self
    }

    /// Sets the resolution context.
    pub fn context(mut self, context: MountContext) -> Self {
        self.context = context;
        self
    }
}

/// The rate-limiter key for a stack: a JSON encoding of every descriptor
/// minus its `data`. Mutating arguments between attempts changes the key
/// and therefore the limiter bucket; mutating form data does not.
pub fn rate_limit_key(stack: &[MountedAction]) -> String {
    let projected: Vec<Value> = stack
        .iter()
        .map(|mounted| {
            json!({
                "name": mounted.name,
                "arguments": mounted.arguments,
                "context": mounted.context,
            })
        })
        .collect();
    serde_json::to_string(&projected).unwrap_or_default()
}

/// A descriptor that could not be resolved to an action.
///
/// Mount attempts treat this as a signal to abandon silently; only a
/// caller that explicitly required resolution surfaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveError {
    /// The name that failed to resolve.
    pub name: String,
    /// A short description of the context searched.
    pub context: String,
}

impl ResolveError {
    fn new(name: &str, context: impl Into<String>) -> Self {
        ResolveError {
            name: name.to_string(),
            context: context.into(),
        }
    }
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Action {:?} is not resolvable ({})",
            self.name, self.context
        )
    }
}

impl std::error::Error for ResolveError {}

/// A successfully resolved descriptor: the action plus any record the
/// context re-attached.
#[derive(Clone)]
pub struct ResolvedAction {
    /// The concrete action.
    pub action: Action,
    /// The record a table row context attached, if any.
    pub record: Option<Record>,
}

fn find_component_by_key(tree: &SchemaTree, key: &str) -> Option<ComponentId> {
    let mut found = None;
    tree.walk(tree.root(), &mut |id| {
        if found.is_none() && tree.component_key(id) == key {
            found = Some(id);
        }
    });
    found
}

fn resolve_schema_component(
    tree: &SchemaTree,
    name: &str,
    path: &str,
) -> Result<ResolvedAction, ResolveError> {
    let (component_key, suffix) = match path.split_once('.') {
        Some((prefix, suffix)) => (prefix, Some(suffix)),
        None => (path, None),
    };
    let id = find_component_by_key(tree, component_key)
        .ok_or_else(|| ResolveError::new(name, format!("no schema component {:?}", component_key)))?;
    let action = tree
        .component(id)
        .registered_actions()
        .get(name)
        .ok_or_else(|| {
            ResolveError::new(name, format!("not registered on component {:?}", component_key))
        })?;
    let action = match suffix {
        Some(suffix) => action.modal_actions().get(suffix).ok_or_else(|| {
            ResolveError::new(name, format!("no modal action {:?} on {:?}", suffix, name))
        })?,
        None => action,
    };
    Ok(ResolvedAction {
        action: action.clone(),
        record: None,
    })
}

fn resolve_table(
    table: Option<&Table>,
    store: &dyn RecordStore,
    mounted: &MountedAction,
) -> Result<ResolvedAction, ResolveError> {
    let table = table.ok_or_else(|| ResolveError::new(&mounted.name, "no table bound"))?;
    let action = if mounted.context.bulk {
        table.get_bulk_action(&mounted.name)
    } else {
        table.row_action(&mounted.name)
    }
    .ok_or_else(|| ResolveError::new(&mounted.name, "not registered on table"))?;

    let record = match &mounted.context.record_key {
        Some(key) => table
            .record(store, key)
            .map_err(|e| ResolveError::new(&mounted.name, format!("record lookup failed: {}", e)))?,
        None => None,
    };
    Ok(ResolvedAction {
        action: action.clone(),
        record,
    })
}

fn resolve_generic(
    tree: &SchemaTree,
    parent: Option<&Action>,
    cache: &mut HashMap<String, Action>,
    name: &str,
) -> Result<ResolvedAction, ResolveError> {
    if let Some(action) = cache.get(name) {
        return Ok(ResolvedAction {
            action: action.clone(),
            record: None,
        });
    }
    if let Some(parent) = parent {
        if let Some(action) = parent.modal_actions().get(name) {
            cache.insert(name.to_string(), action.clone());
            return Ok(ResolvedAction {
                action: action.clone(),
                record: None,
            });
        }
    }
    let mut found = None;
    tree.walk(tree.root(), &mut |id| {
        if found.is_none() {
            if let Some(action) = tree.component(id).registered_actions().get(name) {
                found = Some(action.clone());
            }
        }
    });
    match found {
        Some(action) => {
            cache.insert(name.to_string(), action.clone());
            Ok(ResolvedAction {
                action,
                record: None,
            })
        }
        None => Err(ResolveError::new(name, "no registry matched")),
    }
}

/// Resolves one descriptor.
///
/// A non-empty `schemaComponent` context key selects the schema-component
/// strategy exclusively; the generic cache is never consulted for it.
pub fn resolve_mounted_action(
    tree: &SchemaTree,
    table: Option<&Table>,
    store: &dyn RecordStore,
    parent: Option<&Action>,
    cache: &mut HashMap<String, Action>,
    mounted: &MountedAction,
) -> Result<ResolvedAction, ResolveError> {
    if let Some(path) = mounted
        .context
        .schema_component
        .as_deref()
        .filter(|p| !p.is_empty())
    {
        return resolve_schema_component(tree, &mounted.name, path);
    }
    if mounted.context.table {
        return resolve_table(table, store, mounted);
    }
    resolve_generic(tree, parent, cache, &mounted.name)
}

/// Resolves a whole stack in order, each entry nested under its
/// predecessor.
pub fn resolve_stack(
    tree: &SchemaTree,
    table: Option<&Table>,
    store: &dyn RecordStore,
    cache: &mut HashMap<String, Action>,
    stack: &[MountedAction],
) -> Result<Vec<ResolvedAction>, ResolveError> {
    let mut resolved: Vec<ResolvedAction> = Vec::with_capacity(stack.len());
    for mounted in stack {
        let parent = resolved.last().map(|r| &r.action);
        let entry = resolve_mounted_action(tree, table, store, parent, cache, mounted)?;
        resolved.push(entry);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::InMemoryRecordStore;
    use crate::schema::Component;
    use serde_json::json;

    fn named(name: &str) -> Action {
        Action::new(name).unwrap()
    }

    #[test]
    fn descriptors_round_trip_the_wire_shape() {
        let mounted = MountedAction::new("delete")
            .arguments(json!({"force": true}))
            .context(MountContext {
                table: true,
                record_key: Some("7".to_string()),
                ..MountContext::default()
            });
        let wire = serde_json::to_value(&mounted).unwrap();
        assert_eq!(
            wire,
            json!({
                "name": "delete",
                "arguments": {"force": true},
                "context": {"table": true, "recordKey": "7"},
                "data": {},
            })
        );
        let back: MountedAction = serde_json::from_value(wire).unwrap();
        assert_eq!(back, mounted);
    }

    #[test]
    fn rate_limit_key_ignores_data_only() {
        let mut a = MountedAction::new("publish").arguments(json!({"id": 1}));
        let mut b = a.clone();
        a.data = json!({"draft": "one"});
        b.data = json!({"draft": "two"});
        assert_eq!(rate_limit_key(&[a.clone()]), rate_limit_key(&[b]));

        let c = MountedAction::new("publish").arguments(json!({"id": 2}));
        assert_ne!(rate_limit_key(&[a]), rate_limit_key(&[c]));
    }

    #[test]
    fn generic_resolution_uses_registry_and_cache() {
        let mut tree = SchemaTree::new();
        let root = tree.root();
        tree.attach(root, Component::new("post").register_action(named("publish")));

        let store = InMemoryRecordStore::new();
        let mut cache = HashMap::new();
        let mounted = MountedAction::new("publish");
        let resolved =
            resolve_mounted_action(&tree, None, &store, None, &mut cache, &mounted).unwrap();
        assert_eq!(resolved.action.name(), "publish");
        assert!(cache.contains_key("publish"));

        let missing = MountedAction::new("ghost");
        assert!(resolve_mounted_action(&tree, None, &store, None, &mut cache, &missing).is_err());
    }

    #[test]
    fn schema_component_context_wins_over_generic_cache() {
        let mut tree = SchemaTree::new();
        let root = tree.root();
        tree.attach(
            root,
            Component::new("other").register_action(named("x").success_notification("generic")),
        );
        tree.attach(
            root,
            Component::new("target")
                .key("target")
                .register_action(named("x").success_notification("scoped")),
        );

        let store = InMemoryRecordStore::new();
        let mut cache = HashMap::new();
        // Warm the generic cache with the other component's action.
        resolve_mounted_action(&tree, None, &store, None, &mut cache, &MountedAction::new("x"))
            .unwrap();

        let scoped = MountedAction::new("x").context(MountContext {
            schema_component: Some("target".to_string()),
            ..MountContext::default()
        });
        let resolved =
            resolve_mounted_action(&tree, None, &store, None, &mut cache, &scoped).unwrap();
        assert_eq!(
            resolved.action.notifications.success_title.as_deref(),
            Some("scoped")
        );
    }

    #[test]
    fn schema_component_suffix_narrows_into_modal_actions() {
        let mut tree = SchemaTree::new();
        let root = tree.root();
        tree.attach(
            root,
            Component::new("target").key("target").register_action(
                named("open").modal_action(named("confirm").success_notification("nested")),
            ),
        );

        let store = InMemoryRecordStore::new();
        let mut cache = HashMap::new();
        let mounted = MountedAction::new("open").context(MountContext {
            schema_component: Some("target.confirm".to_string()),
            ..MountContext::default()
        });
        let resolved =
            resolve_mounted_action(&tree, None, &store, None, &mut cache, &mounted).unwrap();
        assert_eq!(
            resolved.action.notifications.success_title.as_deref(),
            Some("nested")
        );
    }

    #[test]
    fn table_resolution_attaches_the_record() {
        let store = InMemoryRecordStore::new();
        let mut post = Record::new("post");
        post.fill(&json!({"title": "Hello"}));
        store.save(&mut post).unwrap();

        let table = Table::new("post")
            .action(named("edit"))
            .bulk_action(named("delete"));
        let tree = SchemaTree::new();
        let mut cache = HashMap::new();

        let row = MountedAction::new("edit").context(MountContext {
            table: true,
            record_key: post.key.clone(),
            ..MountContext::default()
        });
        let resolved =
            resolve_mounted_action(&tree, Some(&table), &store, None, &mut cache, &row).unwrap();
        assert_eq!(
            resolved.record.unwrap().attribute("title"),
            Some(json!("Hello"))
        );

        let bulk = MountedAction::new("delete").context(MountContext {
            table: true,
            bulk: true,
            ..MountContext::default()
        });
        let resolved =
            resolve_mounted_action(&tree, Some(&table), &store, None, &mut cache, &bulk).unwrap();
        assert_eq!(resolved.action.name(), "delete");

        // Row actions do not resolve from the bulk registry.
        let wrong = MountedAction::new("delete").context(MountContext {
            table: true,
            ..MountContext::default()
        });
        assert!(
            resolve_mounted_action(&tree, Some(&table), &store, None, &mut cache, &wrong).is_err()
        );
    }

    #[test]
    fn nested_descriptors_resolve_through_the_parent_modal() {
        let mut tree = SchemaTree::new();
        let root = tree.root();
        tree.attach(
            root,
            Component::new("post")
                .register_action(named("open").modal_action(named("confirm"))),
        );

        let store = InMemoryRecordStore::new();
        let mut cache = HashMap::new();
        let stack = vec![MountedAction::new("open"), MountedAction::new("confirm")];
        let resolved = resolve_stack(&tree, None, &store, &mut cache, &stack).unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[1].action.name(), "confirm");
    }
}
