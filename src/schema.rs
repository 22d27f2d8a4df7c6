//! # Schema Trees
//!
//! A schema is an ordered container of components; a component owns a
//! relative state-path segment and may carry named child schemas of its
//! own (slots such as "above label" or a modal form). The whole structure
//! is a strict tree held in a [`SchemaTree`] arena, with parent
//! back-references stored as ids rather than owning pointers, walked
//! upward only for read-only lookups.
//!
//! Absolute state paths and keys are computed lazily and memoized per
//! node; duplicating a component (for example, once per table row) resets
//! the duplicate's caches while sharing its closures.
//!
//! ## Usage Examples
//!
//! ```rust
//! use formwork::{Component, SchemaTree};
//!
//! let mut tree = SchemaTree::new();
//! let root = tree.root();
//! let group = tree.attach(root, Component::container().state_path("post"));
//! let body = tree.add_child_schema(group, "body", None);
//! let title = tree.attach(body, Component::new("title"));
//!
//! assert_eq!(tree.absolute_state_path(title), "post.title");
//! ```

use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::action::Action;
use crate::authorize::AuthorizationRule;
use crate::eval::{Dynamic, EvalCx};
use crate::hydrate::StateCast;
use crate::record::Record;
use crate::relationship::RelationshipConfig;
use crate::state::path_join;
use crate::validate::Rule;

/// Identifies a schema container within its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemaId(pub(crate) usize);

/// Identifies a component within its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(pub(crate) usize);

/// An entry in a schema container's ordered child list.
#[derive(Debug, Clone)]
pub enum SchemaEntry {
    /// A schema component.
    Component(ComponentId),
    /// A named action rendered inline in the container.
    Action(String),
    /// Static content with no state of its own.
    Static(String),
}

/// Hook invoked after a component and all of its children have hydrated.
pub type AfterHydrated = Arc<dyn Fn(&EvalCx<'_>) + Send + Sync>;

////////////////////////////////////////////// Schema //////////////////////////////////////////////////

/// A schema container: an ordered collection of entries with a state-path
/// prefix and an optional parent component back-reference.
pub struct Schema {
    pub(crate) state_path: Option<String>,
    pub(crate) parent: Option<ComponentId>,
    pub(crate) entries: Vec<SchemaEntry>,
    /// Paths the root container forces into dehydrated output even when
    /// their owning component is not flagged dehydrated.
    pub(crate) force_dehydrated: Vec<String>,
}

impl Schema {
    fn new(state_path: Option<String>, parent: Option<ComponentId>) -> Self {
        Schema {
            state_path,
            parent,
            entries: Vec::new(),
            force_dehydrated: Vec::new(),
        }
    }

    /// The container's ordered entries.
    pub fn entries(&self) -> &[SchemaEntry] {
        &self.entries
    }

    /// The parent component, if this is not the root container.
    pub fn parent(&self) -> Option<ComponentId> {
        self.parent
    }
}

///////////////////////////////////////////// Component ////////////////////////////////////////////////

#[derive(Default)]
struct ComponentCaches {
    absolute_state_path: OnceCell<String>,
    key: OnceCell<String>,
    concealing_ancestor: OnceCell<Option<ComponentId>>,
}

/// A schema component: a state-path segment plus visibility, authorization,
/// hydration, and action configuration.
///
/// Components are built fluently and then attached to a container with
/// [`SchemaTree::attach`], which fixes their parent back-reference.
pub struct Component {
    pub(crate) state_path: Option<String>,
    pub(crate) explicit_key: Option<String>,
    pub(crate) parent: SchemaId,
    pub(crate) child_schemas: Vec<(String, SchemaId)>,
    pub(crate) hidden: Dynamic<bool>,
    pub(crate) visible: Dynamic<bool>,
    pub(crate) disabled: Dynamic<bool>,
    /// When set, this component can hide all of its children atomically.
    pub(crate) conceals: Option<Dynamic<bool>>,
    pub(crate) is_action_group: bool,
    pub(crate) authorization: Option<AuthorizationRule>,
    pub(crate) authorization_message: Option<String>,
    pub(crate) unauthorized_tooltip: Option<String>,
    pub(crate) notifies_unauthorized: bool,
    pub(crate) default_state: Option<Dynamic<Value>>,
    pub(crate) dehydrated: Dynamic<bool>,
    pub(crate) state_casts: Vec<Arc<dyn StateCast>>,
    pub(crate) after_hydrated: Option<AfterHydrated>,
    pub(crate) relationship: Option<RelationshipConfig>,
    /// Lazily loaded related record; outer None means not yet resolved.
    /// Drives create-vs-update when the relationship is saved.
    pub(crate) cached_related: RefCell<Option<Option<Record>>>,
    pub(crate) rules: Vec<Rule>,
    pub(crate) actions: HashMap<String, Action>,
    pub(crate) exposes_state_to_actions: bool,
    caches: ComponentCaches,
}

/// Sentinel parent for components not yet attached to a tree.
const UNATTACHED: SchemaId = SchemaId(usize::MAX);

impl Component {
    /// Creates a component owning a relative state-path segment.
    pub fn new(state_path: impl Into<String>) -> Self {
        let mut component = Self::container();
        component.state_path = Some(state_path.into());
        component
    }

    /// Creates a pathless component (a layout or grouping node).
    pub fn container() -> Self {
        Component {
            state_path: None,
            explicit_key: None,
            parent: UNATTACHED,
            child_schemas: Vec::new(),
            hidden: Dynamic::literal(false),
            visible: Dynamic::literal(true),
            disabled: Dynamic::literal(false),
            conceals: None,
            is_action_group: false,
            authorization: None,
            authorization_message: None,
            unauthorized_tooltip: None,
            notifies_unauthorized: false,
            default_state: None,
            dehydrated: Dynamic::literal(true),
            state_casts: Vec::new(),
            after_hydrated: None,
            relationship: None,
            cached_related: RefCell::new(None),
            rules: Vec::new(),
            actions: HashMap::new(),
            exposes_state_to_actions: false,
            caches: ComponentCaches::default(),
        }
    }

    /// Sets the relative state-path segment.
    pub fn state_path(mut self, path: impl Into<String>) -> Self {
        self.state_path = Some(path.into());
        self
    }

    /// Sets an explicit key, overriding the path-derived one.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.explicit_key = Some(key.into());
        self
    }

    /// Sets the hidden condition.
    pub fn hidden(mut self, hidden: impl Into<Dynamic<bool>>) -> Self {
        self.hidden = hidden.into();
        self
    }

    /// Sets the visible condition.
    pub fn visible(mut self, visible: impl Into<Dynamic<bool>>) -> Self {
        self.visible = visible.into();
        self
    }

    /// Sets the disabled condition.
    pub fn disabled(mut self, disabled: impl Into<Dynamic<bool>>) -> Self {
        self.disabled = disabled.into();
        self
    }

    /// Marks this component as able to conceal all of its children when
    /// the condition evaluates true.
    pub fn conceals(mut self, condition: impl Into<Dynamic<bool>>) -> Self {
        self.conceals = Some(condition.into());
        self
    }

    /// Marks this component as an action group, which stays visible even
    /// when unauthorized (its member actions gate themselves).
    pub fn action_group(mut self) -> Self {
        self.is_action_group = true;
        self
    }

    /// Attaches an authorization rule.
    pub fn authorize(mut self, rule: AuthorizationRule) -> Self {
        self.authorization = Some(rule);
        self
    }

    /// Sets a fallback message for denials that carry none.
    pub fn authorization_message(mut self, message: impl Into<String>) -> Self {
        self.authorization_message = Some(message.into());
        self
    }

    /// Shows a tooltip instead of hiding when unauthorized.
    pub fn unauthorized_tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.unauthorized_tooltip = Some(tooltip.into());
        self
    }

    /// Sends a notification instead of hiding when unauthorized.
    pub fn notify_unauthorized(mut self) -> Self {
        self.notifies_unauthorized = true;
        self
    }

    /// Declares a default value hydrated when the path is unpopulated.
    pub fn default_value(mut self, default: impl Into<Dynamic<Value>>) -> Self {
        self.default_state = Some(default.into());
        self
    }

    /// Controls whether this component's state survives dehydration.
    pub fn dehydrated(mut self, dehydrated: impl Into<Dynamic<bool>>) -> Self {
        self.dehydrated = dehydrated.into();
        self
    }

    /// Appends a state cast. Casts apply in registration order on
    /// dehydration and in reverse order on hydration.
    pub fn state_cast(mut self, cast: Arc<dyn StateCast>) -> Self {
        self.state_casts.push(cast);
        self
    }

    /// Registers the after-hydrated hook, which runs only after all child
    /// schemas have hydrated.
    pub fn after_hydrated(mut self, hook: impl Fn(&EvalCx<'_>) + Send + Sync + 'static) -> Self {
        self.after_hydrated = Some(Arc::new(hook));
        self
    }

    /// Binds this component's state to an ORM relationship.
    pub fn relationship(mut self, config: RelationshipConfig) -> Self {
        self.relationship = Some(config);
        self
    }

    /// Appends a validation rule.
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Registers a named action on this component. Registration replaces
    /// any runtime discovery: the resolver only consults this map.
    pub fn register_action(mut self, action: Action) -> Self {
        self.actions.insert(action.name().to_string(), action);
        self
    }

    /// Includes this component's state in gathered action data.
    pub fn expose_state_to_actions(mut self) -> Self {
        self.exposes_state_to_actions = true;
        self
    }

    /// The named child schemas (slot name, schema id).
    pub fn child_schemas(&self) -> &[(String, SchemaId)] {
        &self.child_schemas
    }

    /// The component's registered actions by name.
    pub fn registered_actions(&self) -> &HashMap<String, Action> {
        &self.actions
    }

    /// The component's validation rules.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Copies this component's configuration with fresh, unlinked caches.
    fn duplicate_config(&self) -> Component {
        Component {
            state_path: self.state_path.clone(),
            explicit_key: self.explicit_key.clone(),
            parent: UNATTACHED,
            child_schemas: Vec::new(),
            hidden: self.hidden.clone(),
            visible: self.visible.clone(),
            disabled: self.disabled.clone(),
            conceals: self.conceals.clone(),
            is_action_group: self.is_action_group,
            authorization: self.authorization.clone(),
            authorization_message: self.authorization_message.clone(),
            unauthorized_tooltip: self.unauthorized_tooltip.clone(),
            notifies_unauthorized: self.notifies_unauthorized,
            default_state: self.default_state.clone(),
            dehydrated: self.dehydrated.clone(),
            state_casts: self.state_casts.clone(),
            after_hydrated: self.after_hydrated.clone(),
            relationship: self.relationship.clone(),
            cached_related: RefCell::new(None),
            rules: self.rules.clone(),
            actions: self.actions.clone(),
            exposes_state_to_actions: self.exposes_state_to_actions,
            caches: ComponentCaches::default(),
        }
    }
}

///////////////////////////////////////////// SchemaTree ///////////////////////////////////////////////

/// The arena owning one interaction's schema containers and components.
///
/// Created per render or call round-trip and rebuilt from declared
/// children; never persisted. Cycles are structurally impossible: children
/// are created through the tree and parents are fixed at attach time.
pub struct SchemaTree {
    schemas: Vec<Schema>,
    components: Vec<Component>,
    root: SchemaId,
}

impl SchemaTree {
    /// Creates a tree with an empty root container.
    pub fn new() -> Self {
        SchemaTree {
            schemas: vec![Schema::new(None, None)],
            components: Vec::new(),
            root: SchemaId(0),
        }
    }

    /// The root container.
    pub fn root(&self) -> SchemaId {
        self.root
    }

    /// Borrows a container.
    pub fn schema(&self, id: SchemaId) -> &Schema {
        &self.schemas[id.0]
    }

    /// Mutably borrows a container.
    pub fn schema_mut(&mut self, id: SchemaId) -> &mut Schema {
        &mut self.schemas[id.0]
    }

    /// Borrows a component.
    pub fn component(&self, id: ComponentId) -> &Component {
        &self.components[id.0]
    }

    /// Mutably borrows a component.
    pub fn component_mut(&mut self, id: ComponentId) -> &mut Component {
        &mut self.components[id.0]
    }

    /// Attaches a component to a container, fixing its parent.
    pub fn attach(&mut self, schema: SchemaId, mut component: Component) -> ComponentId {
        component.parent = schema;
        let id = ComponentId(self.components.len());
        self.components.push(component);
        self.schemas[schema.0].entries.push(SchemaEntry::Component(id));
        id
    }

    /// Appends an inline action entry to a container.
    pub fn attach_action_entry(&mut self, schema: SchemaId, name: impl Into<String>) {
        self.schemas[schema.0]
            .entries
            .push(SchemaEntry::Action(name.into()));
    }

    /// Appends static content to a container.
    pub fn attach_static(&mut self, schema: SchemaId, content: impl Into<String>) {
        self.schemas[schema.0]
            .entries
            .push(SchemaEntry::Static(content.into()));
    }

    /// Creates a named child schema under a component.
    pub fn add_child_schema(
        &mut self,
        component: ComponentId,
        slot: impl Into<String>,
        state_path: Option<&str>,
    ) -> SchemaId {
        let id = SchemaId(self.schemas.len());
        self.schemas.push(Schema::new(
            state_path.map(String::from),
            Some(component),
        ));
        self.components[component.0]
            .child_schemas
            .push((slot.into(), id));
        id
    }

    /// Forces a path into dehydrated output regardless of component flags.
    pub fn force_dehydrated(&mut self, path: impl Into<String>) {
        let root = self.root;
        self.schemas[root.0].force_dehydrated.push(path.into());
    }

    /// The component ids directly inside a container, in order.
    pub fn components_of(&self, schema: SchemaId) -> Vec<ComponentId> {
        self.schemas[schema.0]
            .entries
            .iter()
            .filter_map(|entry| match entry {
                SchemaEntry::Component(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Walks every component at or below a container, depth first.
    pub fn walk(&self, schema: SchemaId, visit: &mut impl FnMut(ComponentId)) {
        for id in self.components_of(schema) {
            visit(id);
            for (_, child) in &self.components[id.0].child_schemas {
                self.walk(*child, visit);
            }
        }
    }

    /// Computes a container's absolute state path by walking its parent
    /// chain.
    pub fn schema_state_path(&self, id: SchemaId) -> String {
        let schema = &self.schemas[id.0];
        let parent_path = match schema.parent {
            Some(parent) => self.absolute_state_path(parent),
            None => String::new(),
        };
        path_join(&parent_path, schema.state_path.as_deref().unwrap_or(""))
    }

    /// Computes a component's absolute state path, memoized per node.
    ///
    /// The memo lives on the component instance; duplicating a component
    /// produces a fresh, unlinked cache.
    pub fn absolute_state_path(&self, id: ComponentId) -> String {
        let component = &self.components[id.0];
        component
            .caches
            .absolute_state_path
            .get_or_init(|| {
                let parent_path = self.schema_state_path(component.parent);
                path_join(&parent_path, component.state_path.as_deref().unwrap_or(""))
            })
            .clone()
    }

    /// Computes a component's cache-identity key: the explicit key if one
    /// was set, otherwise the absolute state path, otherwise a positional
    /// fallback. Memoized per node.
    pub fn component_key(&self, id: ComponentId) -> String {
        let component = &self.components[id.0];
        component
            .caches
            .key
            .get_or_init(|| {
                if let Some(key) = &component.explicit_key {
                    return key.clone();
                }
                let path = self.absolute_state_path(id);
                if path.is_empty() {
                    format!("component.{}", id.0)
                } else {
                    path
                }
            })
            .clone()
    }

    /// Finds the nearest ancestor component that can conceal its children,
    /// memoized per node.
    pub fn concealing_ancestor(&self, id: ComponentId) -> Option<ComponentId> {
        let component = &self.components[id.0];
        *component.caches.concealing_ancestor.get_or_init(|| {
            let mut schema = component.parent;
            loop {
                let parent = self.schemas[schema.0].parent?;
                if self.components[parent.0].conceals.is_some() {
                    return Some(parent);
                }
                schema = self.components[parent.0].parent;
            }
        })
    }

    /// Deep-copies a component (and its child schemas) into a container.
    ///
    /// The duplicate shares the original's closures but starts with fresh
    /// path/key/ancestor caches, so memoized values never leak between
    /// copies.
    pub fn duplicate(&mut self, id: ComponentId, into: SchemaId) -> ComponentId {
        let config = self.components[id.0].duplicate_config();
        let child_schemas = self.components[id.0].child_schemas.clone();
        let new_id = self.attach(into, config);
        for (slot, child) in child_schemas {
            let state_path = self.schemas[child.0].state_path.clone();
            let new_child = self.add_child_schema(new_id, slot, state_path.as_deref());
            for entry in self.schemas[child.0].entries.clone() {
                match entry {
                    SchemaEntry::Component(grandchild) => {
                        self.duplicate(grandchild, new_child);
                    }
                    other => self.schemas[new_child.0].entries.push(other),
                }
            }
        }
        new_id
    }
}

impl Default for SchemaTree {
    fn default() -> Self {
        Self::new()
    }
}
