//! # Hydration and Dehydration
//!
//! Hydration pulls state into the tree: defaults first, then relationship
//! fills, recursing into every child schema (hidden ones included) before
//! the component's after-hydrated hook fires. Dehydration flattens the
//! tree's state back into a plain JSON object, dropping paths whose
//! components opted out and applying each component's state-cast chain.
//!
//! Partial hydration re-hydrates only the branches touching a requested
//! path set, so a single field update does not pay for the whole tree.

use serde_json::Value;

use crate::eval::{EvalCx, EvalSession};
use crate::record::RecordStore;
use crate::relationship::{BridgeError, fill_from_relationship};
use crate::schema::{ComponentId, SchemaId, SchemaTree};
use crate::state::{data_forget, data_set, is_path_or_ancestor};

/// A reversible transform applied to a component's state at the hydration
/// boundary.
///
/// `dehydrate` runs in registration order when state leaves the tree;
/// `hydrate` runs in reverse order when it comes back. Casts must satisfy
/// `hydrate(dehydrate(x)) == x` for values `dehydrate` can produce.
pub trait StateCast: Send + Sync {
    /// Transforms a value on its way out of the tree.
    fn dehydrate(&self, value: Value) -> Value;

    /// Transforms a value on its way back into the tree.
    fn hydrate(&self, value: Value) -> Value;
}

/// Hydrates every component under a container.
///
/// Per component: apply the declared default if the path is unpopulated,
/// otherwise fill from the declared relationship; apply state casts (in
/// reverse registration order) to state that was already populated;
/// recurse into all child schemas; then fire the after-hydrated hook.
pub fn hydrate(
    tree: &SchemaTree,
    session: &EvalSession,
    store: &dyn RecordStore,
    schema: SchemaId,
    call_hooks: bool,
) -> Result<(), BridgeError> {
    for id in tree.components_of(schema) {
        hydrate_component(tree, session, store, id, call_hooks)?;
    }
    Ok(())
}

fn hydrate_component(
    tree: &SchemaTree,
    session: &EvalSession,
    store: &dyn RecordStore,
    id: ComponentId,
    call_hooks: bool,
) -> Result<(), BridgeError> {
    let component = tree.component(id);
    let path = tree.absolute_state_path(id);
    let scope = tree.schema_state_path(component.parent);
    let cx = EvalCx::new(session, &scope);

    let populated = !path.is_empty() && session.state.has(&path);
    if populated {
        // Pre-seeded state came through dehydration; undo the casts.
        if !component.state_casts.is_empty() {
            if let Some(mut value) = session.state.get(&path) {
                for cast in component.state_casts.iter().rev() {
                    value = cast.hydrate(value);
                }
                session.state.set(&path, value);
            }
        }
    } else if !path.is_empty() {
        match &component.default_state {
            Some(default) => {
                session.state.set(&path, default.evaluate(&cx));
            }
            None => {
                fill_from_relationship(tree, session, store, id)?;
            }
        }
    }

    for (_, child) in &component.child_schemas {
        hydrate(tree, session, store, *child, call_hooks)?;
    }

    if call_hooks {
        if let Some(hook) = &component.after_hydrated {
            hook(&cx);
        }
    }
    Ok(())
}

/// Returns true if the requested path set covers the component itself (it
/// should hydrate) as opposed to merely pointing below it (descend only).
fn covers(paths: &[String], component_path: &str) -> bool {
    paths
        .iter()
        .any(|p| is_path_or_ancestor(p, component_path))
}

fn reaches_below(paths: &[String], component_path: &str) -> bool {
    paths
        .iter()
        .any(|p| is_path_or_ancestor(component_path, p))
}

/// Hydrates only the components whose paths are covered by `paths`.
///
/// A subtree is skipped entirely unless its own path, an ancestor of it,
/// or a descendant of it appears in the requested set; ancestors of a
/// requested path descend without hydrating their own state.
pub fn hydrate_partially(
    tree: &SchemaTree,
    session: &EvalSession,
    store: &dyn RecordStore,
    schema: SchemaId,
    paths: &[String],
    call_hooks: bool,
) -> Result<(), BridgeError> {
    for id in tree.components_of(schema) {
        let component_path = tree.absolute_state_path(id);
        if covers(paths, &component_path) {
            hydrate_component(tree, session, store, id, call_hooks)?;
        } else if component_path.is_empty() || reaches_below(paths, &component_path) {
            for (_, child) in &tree.component(id).child_schemas {
                hydrate_partially(tree, session, store, *child, paths, call_hooks)?;
            }
        }
    }
    Ok(())
}

/// Flattens the tree's state into a plain JSON object.
///
/// Each component with a state path writes its value (through its cast
/// chain, in registration order); components whose dehydrated condition
/// evaluates false then have their paths removed, unless the root
/// container force-dehydrated that path.
pub fn dehydrate(tree: &SchemaTree, session: &EvalSession, schema: SchemaId) -> Value {
    let mut output = Value::Object(serde_json::Map::new());
    write_state(tree, session, schema, &mut output);

    let forced = tree.schema(tree.root()).force_dehydrated.clone();
    let mut prune = Vec::new();
    tree.walk(schema, &mut |id| {
        let component = tree.component(id);
        let path = tree.absolute_state_path(id);
        if path.is_empty() {
            return;
        }
        let scope = tree.schema_state_path(component.parent);
        let cx = EvalCx::new(session, &scope);
        if !component.dehydrated.evaluate(&cx) && !forced.contains(&path) {
            prune.push(path);
        }
    });
    for path in prune {
        data_forget(&mut output, &path);
    }
    output
}

fn write_state(tree: &SchemaTree, session: &EvalSession, schema: SchemaId, output: &mut Value) {
    for id in tree.components_of(schema) {
        let component = tree.component(id);
        let path = tree.absolute_state_path(id);
        if !path.is_empty() {
            if let Some(mut value) = session.state.get(&path) {
                for cast in &component.state_casts {
                    value = cast.dehydrate(value);
                }
                data_set(output, &path, value);
            }
        }
        for (_, child) in &component.child_schemas {
            write_state(tree, session, *child, output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{Dynamic, Operation};
    use crate::record::InMemoryRecordStore;
    use crate::schema::Component;
    use crate::state::StateTree;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn session() -> EvalSession {
        EvalSession::new(StateTree::new(), None, Operation::Create)
    }

    #[test]
    fn defaults_apply_only_to_unpopulated_paths() {
        let mut tree = SchemaTree::new();
        let root = tree.root();
        tree.attach(root, Component::new("title").default_value(json!("untitled")));
        tree.attach(root, Component::new("status").default_value(json!("draft")));

        let session = session();
        session.state.set("status", json!("published"));
        let store = InMemoryRecordStore::new();
        hydrate(&tree, &session, &store, root, true).unwrap();

        assert_eq!(session.state.get("title"), Some(json!("untitled")));
        assert_eq!(session.state.get("status"), Some(json!("published")));
    }

    #[test]
    fn computed_defaults_see_the_evaluation_context() {
        let mut tree = SchemaTree::new();
        let root = tree.root();
        tree.attach(
            root,
            Component::new("op").default_value(Dynamic::computed(|cx: &EvalCx<'_>| {
                json!(matches!(cx.operation(), Operation::Create))
            })),
        );

        let session = session();
        let store = InMemoryRecordStore::new();
        hydrate(&tree, &session, &store, root, true).unwrap();
        assert_eq!(session.state.get("op"), Some(json!(true)));
    }

    #[test]
    fn after_hydrated_fires_children_before_parent() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut tree = SchemaTree::new();
        let root = tree.root();
        let parent = {
            let order = order.clone();
            tree.attach(
                root,
                Component::new("post").after_hydrated(move |_| order.lock().unwrap().push("parent")),
            )
        };
        let body = tree.add_child_schema(parent, "body", None);
        {
            let order = order.clone();
            tree.attach(
                body,
                Component::new("title").after_hydrated(move |_| order.lock().unwrap().push("child")),
            );
        }

        let session = session();
        let store = InMemoryRecordStore::new();
        hydrate(&tree, &session, &store, root, true).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["child", "parent"]);
    }

    #[test]
    fn hooks_are_suppressed_when_not_requested() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut tree = SchemaTree::new();
        let root = tree.root();
        {
            let order = order.clone();
            tree.attach(
                root,
                Component::new("title").after_hydrated(move |_| order.lock().unwrap().push("hook")),
            );
        }

        let session = session();
        let store = InMemoryRecordStore::new();
        hydrate(&tree, &session, &store, root, false).unwrap();
        assert!(order.lock().unwrap().is_empty());
    }

    #[test]
    fn partial_hydration_skips_uncovered_branches() {
        let mut tree = SchemaTree::new();
        let root = tree.root();
        let post = tree.attach(root, Component::container().state_path("post"));
        let body = tree.add_child_schema(post, "body", None);
        tree.attach(body, Component::new("title").default_value(json!("t")));
        tree.attach(body, Component::new("slug").default_value(json!("s")));
        tree.attach(root, Component::new("other").default_value(json!("o")));

        let session = session();
        let store = InMemoryRecordStore::new();
        hydrate_partially(
            &tree,
            &session,
            &store,
            root,
            &["post.title".to_string()],
            true,
        )
        .unwrap();

        assert_eq!(session.state.get("post.title"), Some(json!("t")));
        assert_eq!(session.state.get("post.slug"), None);
        assert_eq!(session.state.get("other"), None);
    }

    #[test]
    fn partial_hydration_with_ancestor_path_covers_the_subtree() {
        let mut tree = SchemaTree::new();
        let root = tree.root();
        let post = tree.attach(root, Component::container().state_path("post"));
        let body = tree.add_child_schema(post, "body", None);
        tree.attach(body, Component::new("title").default_value(json!("t")));

        let session = session();
        let store = InMemoryRecordStore::new();
        hydrate_partially(&tree, &session, &store, root, &["post".to_string()], true).unwrap();
        assert_eq!(session.state.get("post.title"), Some(json!("t")));
    }

    #[test]
    fn dehydration_drops_opted_out_paths_unless_forced() {
        let mut tree = SchemaTree::new();
        let root = tree.root();
        tree.attach(root, Component::new("kept"));
        tree.attach(root, Component::new("dropped").dehydrated(false));
        tree.attach(root, Component::new("forced").dehydrated(false));
        tree.force_dehydrated("forced");

        let session = session();
        session.state.set("kept", json!(1));
        session.state.set("dropped", json!(2));
        session.state.set("forced", json!(3));

        let output = dehydrate(&tree, &session, root);
        assert_eq!(output, json!({"kept": 1, "forced": 3}));
    }

    struct CsvCast;

    impl StateCast for CsvCast {
        fn dehydrate(&self, value: Value) -> Value {
            match value {
                Value::Array(items) => Value::String(
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(","),
                ),
                other => other,
            }
        }

        fn hydrate(&self, value: Value) -> Value {
            match value {
                Value::String(s) if !s.is_empty() => {
                    Value::Array(s.split(',').map(|p| json!(p)).collect())
                }
                Value::String(_) => json!([]),
                other => other,
            }
        }
    }

    #[test]
    fn casts_apply_on_dehydration_and_reverse_on_hydration() {
        let mut tree = SchemaTree::new();
        let root = tree.root();
        tree.attach(root, Component::new("tags").state_cast(Arc::new(CsvCast)));

        let session = session();
        session.state.set("tags", json!(["a", "b"]));
        let output = dehydrate(&tree, &session, root);
        assert_eq!(output, json!({"tags": "a,b"}));

        let fresh = EvalSession::new(
            StateTree::from_value(output),
            None,
            Operation::Edit,
        );
        let store = InMemoryRecordStore::new();
        hydrate(&tree, &fresh, &store, root, true).unwrap();
        assert_eq!(fresh.state.get("tags"), Some(json!(["a", "b"])));
    }

    #[test]
    fn dehydrate_then_hydrate_restores_leaves() {
        let mut tree = SchemaTree::new();
        let root = tree.root();
        let post = tree.attach(root, Component::container().state_path("post"));
        let body = tree.add_child_schema(post, "body", None);
        tree.attach(body, Component::new("title"));
        tree.attach(body, Component::new("views"));

        let session = session();
        session.state.set("post.title", json!("Hello"));
        session.state.set("post.views", json!(42));

        let output = dehydrate(&tree, &session, root);
        let fresh = EvalSession::new(StateTree::from_value(output), None, Operation::Edit);
        let store = InMemoryRecordStore::new();
        hydrate(&tree, &fresh, &store, root, true).unwrap();

        assert_eq!(fresh.state.get("post.title"), Some(json!("Hello")));
        assert_eq!(fresh.state.get("post.views"), Some(json!(42)));
    }
}
