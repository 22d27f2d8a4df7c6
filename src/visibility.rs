//! # Visibility and Concealment
//!
//! A component is hidden when a concealing ancestor hides all of its
//! children at once, when its own `hidden` condition holds, when its
//! `visible` condition fails, or when it is unauthorized with no tooltip
//! or notification fallback to show instead. Action groups are exempt
//! from the authorization rule; their member actions gate themselves.
//!
//! During a render pass the same visibility closure may be consulted many
//! times (one table column's rule, once per row). The [`VisibilityCache`]
//! memoizes closure results per (component key, closure identity) pair
//! for the duration of one explicit enable/disable bracket; the bracket is
//! managed by [`with_visibility_cache`], which guarantees the disable on
//! every exit path and is idempotent under nesting.

use std::collections::HashMap;

use crate::authorize::{AuthorizationResponse, Gate, authorize};
use crate::eval::{Dynamic, EvalCx, EvalSession};
use crate::schema::{ComponentId, SchemaTree};

/// Render-pass memoization of visibility closure results.
///
/// Entries are only consulted while the cache is enabled; disabling clears
/// them. The cache is request-scoped state owned by the session's
/// `RefCell`, never shared across requests.
pub struct VisibilityCache {
    enabled: bool,
    entries: HashMap<(String, usize), bool>,
}

impl VisibilityCache {
    /// Creates a disabled, empty cache.
    pub fn new() -> Self {
        VisibilityCache {
            enabled: false,
            entries: HashMap::new(),
        }
    }

    /// Whether memoization is currently active.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enables memoization. Returns true if this call turned it on;
    /// re-enabling while already enabled preserves the existing entries.
    pub fn enable(&mut self) -> bool {
        if self.enabled {
            return false;
        }
        self.enabled = true;
        true
    }

    /// Disables memoization and drops all entries.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.entries.clear();
    }

    fn get(&self, key: &(String, usize)) -> Option<bool> {
        self.entries.get(key).copied()
    }

    fn insert(&mut self, key: (String, usize), value: bool) {
        self.entries.insert(key, value);
    }
}

impl Default for VisibilityCache {
    fn default() -> Self {
        Self::new()
    }
}

struct CacheBracket<'a> {
    session: &'a EvalSession,
    owns: bool,
}

impl Drop for CacheBracket<'_> {
    fn drop(&mut self) {
        if self.owns {
            self.session.visibility_cache.borrow_mut().disable();
        }
    }
}

/// Runs `f` with the session's visibility cache enabled, disabling it on
/// exit (including unwinds). Nested calls are no-ops that preserve the
/// outer bracket's entries; only the outermost call disables.
pub fn with_visibility_cache<R>(session: &EvalSession, f: impl FnOnce() -> R) -> R {
    let owns = session.visibility_cache.borrow_mut().enable();
    let _bracket = CacheBracket { session, owns };
    f()
}

/// Evaluates a boolean condition through the visibility cache.
///
/// Literals bypass the cache entirely; only closures have an identity to
/// memoize under.
fn evaluate_cached(
    session: &EvalSession,
    component_key: &str,
    condition: &Dynamic<bool>,
    cx: &EvalCx<'_>,
) -> bool {
    let Some(closure) = condition.closure_id() else {
        return condition.evaluate(cx);
    };
    let key = (component_key.to_string(), closure);
    {
        let cache = session.visibility_cache.borrow();
        if cache.is_enabled() {
            if let Some(value) = cache.get(&key) {
                return value;
            }
        }
    }
    let value = condition.evaluate(cx);
    let mut cache = session.visibility_cache.borrow_mut();
    if cache.is_enabled() {
        cache.insert(key, value);
    }
    value
}

/// Evaluates a component's authorization rule against the gate, using the
/// session's bound record as the subject argument. Components without a
/// rule are authorized.
pub fn component_authorization(
    tree: &SchemaTree,
    session: &EvalSession,
    gate: &dyn Gate,
    id: ComponentId,
) -> AuthorizationResponse {
    match &tree.component(id).authorization {
        Some(rule) => authorize(gate, rule, session.record.as_ref(), &[]),
        None => AuthorizationResponse::allow(),
    }
}

/// Returns true if the component (or a concealing ancestor) reports it
/// concealed. Checked before the component's own conditions so that a
/// concealed subtree never evaluates its members' closures.
pub fn is_concealed(tree: &SchemaTree, session: &EvalSession, id: ComponentId) -> bool {
    let mut current = id;
    while let Some(ancestor) = tree.concealing_ancestor(current) {
        let component = tree.component(ancestor);
        if let Some(condition) = &component.conceals {
            let scope = tree.schema_state_path(component.parent);
            let cx = EvalCx::new(session, &scope);
            if evaluate_cached(session, &tree.component_key(ancestor), condition, &cx) {
                return true;
            }
        }
        current = ancestor;
    }
    false
}

/// Computes whether a component is hidden.
pub fn is_hidden(
    tree: &SchemaTree,
    session: &EvalSession,
    gate: &dyn Gate,
    id: ComponentId,
) -> bool {
    if is_concealed(tree, session, id) {
        return true;
    }

    let component = tree.component(id);
    let scope = tree.schema_state_path(component.parent);
    let cx = EvalCx::new(session, &scope);
    let key = tree.component_key(id);

    if evaluate_cached(session, &key, &component.hidden, &cx) {
        return true;
    }
    if !evaluate_cached(session, &key, &component.visible, &cx) {
        return true;
    }

    // Unauthorized components hide unless a tooltip or notification can
    // stand in for the control. Action groups never hide this way.
    if !component.is_action_group {
        let response = component_authorization(tree, session, gate, id);
        if !response.is_allowed()
            && component.unauthorized_tooltip.is_none()
            && !component.notifies_unauthorized
        {
            return true;
        }
    }

    false
}

/// Computes whether a component is visible (the negation of hidden).
pub fn is_visible(
    tree: &SchemaTree,
    session: &EvalSession,
    gate: &dyn Gate,
    id: ComponentId,
) -> bool {
    !is_hidden(tree, session, gate, id)
}

/// Evaluates a component's disabled condition.
pub fn is_disabled(tree: &SchemaTree, session: &EvalSession, id: ComponentId) -> bool {
    let component = tree.component(id);
    let scope = tree.schema_state_path(component.parent);
    let cx = EvalCx::new(session, &scope);
    component.disabled.evaluate(&cx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorize::{AllowAllGate, AuthorizationRule, MapGate};
    use crate::eval::Operation;
    use crate::schema::Component;
    use crate::state::StateTree;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn session() -> EvalSession {
        EvalSession::new(StateTree::new(), None, Operation::Edit)
    }

    #[test]
    fn concealed_subtree_never_evaluates_member_closures() {
        let mut tree = SchemaTree::new();
        let root = tree.root();
        let wizard = tree.attach(root, Component::container().conceals(true));
        let step = tree.add_child_schema(wizard, "step", None);
        let field = tree.attach(
            step,
            Component::new("email").hidden(Dynamic::computed(|_: &EvalCx<'_>| {
                panic!("hidden closure must not run for concealed components")
            })),
        );

        let session = session();
        assert!(is_hidden(&tree, &session, &AllowAllGate, field));
    }

    #[test]
    fn own_conditions_apply_when_not_concealed() {
        let mut tree = SchemaTree::new();
        let root = tree.root();
        let hidden = tree.attach(root, Component::new("a").hidden(true));
        let invisible = tree.attach(root, Component::new("b").visible(false));
        let shown = tree.attach(root, Component::new("c"));

        let session = session();
        assert!(is_hidden(&tree, &session, &AllowAllGate, hidden));
        assert!(is_hidden(&tree, &session, &AllowAllGate, invisible));
        assert!(is_visible(&tree, &session, &AllowAllGate, shown));
    }

    #[test]
    fn unauthorized_components_hide_without_fallback() {
        let mut tree = SchemaTree::new();
        let root = tree.root();
        let rule = AuthorizationRule::Single("edit".to_string());
        let bare = tree.attach(root, Component::new("a").authorize(rule.clone()));
        let tooltipped = tree.attach(
            root,
            Component::new("b")
                .authorize(rule.clone())
                .unauthorized_tooltip("ask an admin"),
        );
        let group = tree.attach(root, Component::container().action_group().authorize(rule));

        let session = session();
        let gate = MapGate::denying_by_default();
        assert!(is_hidden(&tree, &session, &gate, bare));
        assert!(is_visible(&tree, &session, &gate, tooltipped));
        assert!(is_visible(&tree, &session, &gate, group));
    }

    #[test]
    fn cache_memoizes_closure_results_within_bracket() {
        let mut tree = SchemaTree::new();
        let root = tree.root();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = {
            let calls = calls.clone();
            Dynamic::computed(move |_: &EvalCx<'_>| {
                calls.fetch_add(1, Ordering::SeqCst);
                false
            })
        };
        let field = tree.attach(root, Component::new("a").hidden(counted));

        let session = session();
        with_visibility_cache(&session, || {
            assert!(!is_hidden(&tree, &session, &AllowAllGate, field));
            assert!(!is_hidden(&tree, &session, &AllowAllGate, field));
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Outside the bracket the cache is gone.
        assert!(!is_hidden(&tree, &session, &AllowAllGate, field));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn nested_brackets_are_idempotent_and_outermost_disables() {
        let session = session();
        with_visibility_cache(&session, || {
            assert!(session.visibility_cache.borrow().is_enabled());
            with_visibility_cache(&session, || {
                assert!(session.visibility_cache.borrow().is_enabled());
            });
            // The inner bracket must not have disabled the cache.
            assert!(session.visibility_cache.borrow().is_enabled());
        });
        assert!(!session.visibility_cache.borrow().is_enabled());
    }

    #[test]
    fn literals_bypass_the_cache() {
        let mut tree = SchemaTree::new();
        let root = tree.root();
        let field = tree.attach(root, Component::new("a").hidden(true));
        let session = session();
        with_visibility_cache(&session, || {
            assert!(is_hidden(&tree, &session, &AllowAllGate, field));
        });
    }

    #[test]
    fn disabled_condition_reads_state() {
        let mut tree = SchemaTree::new();
        let root = tree.root();
        let field = tree.attach(
            root,
            Component::new("a").disabled(Dynamic::computed(|cx: &EvalCx<'_>| {
                cx.get("locked") == serde_json::json!(true)
            })),
        );

        let state = StateTree::new();
        state.set("locked", serde_json::json!(true));
        let session = EvalSession::new(state, None, Operation::Edit);
        assert!(is_disabled(&tree, &session, field));
    }
}
