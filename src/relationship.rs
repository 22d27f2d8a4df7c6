//! # Relationship State Bridge
//!
//! Components may bind their state subtree to an ORM relationship of the
//! record bound to the session. On hydration the bridge loads the related
//! record's attributes into the component's state path; on save it pushes
//! the state back, creating or updating the related record as needed.
//!
//! Several sibling components may declare the same relationship (for
//! example, two fieldsets editing different columns of one profile row).
//! Only the first such component in tree order performs the save; the
//! others detect this by identity against the computed sibling list.

use std::sync::Arc;

use serde_json::Value;

use crate::errors::{ConfigError, StoreError};
use crate::eval::{Dynamic, EvalCx, EvalSession};
use crate::record::{Record, RecordStore, RelationshipKind};
use crate::schema::{ComponentId, SchemaId, SchemaTree};

/// A callback mutating relationship data before it is written.
pub type MutateData = Arc<dyn Fn(&Value, &EvalCx<'_>) -> Value + Send + Sync>;

/// Binds a component's state subtree to a named relationship.
#[derive(Clone)]
pub struct RelationshipConfig {
    pub(crate) name: String,
    /// When this evaluates false on save, an existing related record is
    /// deleted instead of updated.
    pub(crate) condition: Option<Dynamic<bool>>,
    pub(crate) mutate_before_create: Option<MutateData>,
    pub(crate) mutate_before_save: Option<MutateData>,
    pub(crate) requires_create_mutation: bool,
}

impl RelationshipConfig {
    /// Binds to a relationship by name.
    pub fn new(name: impl Into<String>) -> Self {
        RelationshipConfig {
            name: name.into(),
            condition: None,
            mutate_before_create: None,
            mutate_before_save: None,
            requires_create_mutation: false,
        }
    }

    /// The relationship name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Guards the relationship: when the condition evaluates false on
    /// save, the existing related record is deleted.
    pub fn condition(mut self, condition: impl Into<Dynamic<bool>>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Mutates data before a related record is created.
    pub fn mutate_before_create(
        mut self,
        f: impl Fn(&Value, &EvalCx<'_>) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.mutate_before_create = Some(Arc::new(f));
        self
    }

    /// Mutates data before an existing related record is updated.
    pub fn mutate_before_save(
        mut self,
        f: impl Fn(&Value, &EvalCx<'_>) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.mutate_before_save = Some(Arc::new(f));
        self
    }

    /// Requires a create mutation callback; saving without one becomes a
    /// configuration error.
    pub fn require_create_mutation(mut self) -> Self {
        self.requires_create_mutation = true;
        self
    }

    fn create_data(&self, data: &Value, cx: &EvalCx<'_>) -> Result<Value, ConfigError> {
        match &self.mutate_before_create {
            Some(f) => Ok(f(data, cx)),
            None if self.requires_create_mutation => {
                Err(ConfigError::MissingMutationCallback(self.name.clone()))
            }
            None => Ok(data.clone()),
        }
    }

    fn save_data(&self, data: &Value, cx: &EvalCx<'_>) -> Value {
        match &self.mutate_before_save {
            Some(f) => f(data, cx),
            None => data.clone(),
        }
    }
}

impl std::fmt::Debug for RelationshipConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationshipConfig")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Errors that can occur while round-tripping relationship state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The backing store failed.
    Store(StoreError),
    /// The bridge was misconfigured.
    Config(ConfigError),
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(e) => write!(f, "Relationship store error: {}", e),
            Self::Config(e) => write!(f, "Relationship configuration error: {}", e),
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<StoreError> for BridgeError {
    fn from(e: StoreError) -> Self {
        BridgeError::Store(e)
    }
}

impl From<ConfigError> for BridgeError {
    fn from(e: ConfigError) -> Self {
        BridgeError::Config(e)
    }
}

/// Loads the cached related record for a component, resolving and caching
/// it on first use. The cache is what later decides create-vs-update.
fn cached_related(
    tree: &SchemaTree,
    session: &EvalSession,
    store: &dyn RecordStore,
    id: ComponentId,
    name: &str,
) -> Result<Option<Record>, StoreError> {
    let component = tree.component(id);
    if let Some(cached) = component.cached_related.borrow().as_ref() {
        return Ok(cached.clone());
    }
    let Some(record) = session.record.as_ref() else {
        return Ok(None);
    };
    let related = match store.relationship(&record.model, name) {
        Some(def) if def.kind.is_singular() => store.related_one(record, name)?,
        _ => None,
    };
    *component.cached_related.borrow_mut() = Some(related.clone());
    Ok(related)
}

/// Fills a component's state from its declared relationship.
///
/// Returns true if state was written. Called during hydration, before the
/// component's after-hydrated hook runs. A missing record or undeclared
/// relationship is a silent no-op.
pub fn fill_from_relationship(
    tree: &SchemaTree,
    session: &EvalSession,
    store: &dyn RecordStore,
    id: ComponentId,
) -> Result<bool, StoreError> {
    let component = tree.component(id);
    let Some(config) = component.relationship.clone() else {
        return Ok(false);
    };
    let Some(record) = session.record.clone() else {
        return Ok(false);
    };
    let Some(def) = store.relationship(&record.model, &config.name) else {
        return Ok(false);
    };
    let path = tree.absolute_state_path(id);

    if def.kind.is_singular() {
        match cached_related(tree, session, store, id, &config.name)? {
            Some(related) => {
                session.state.set(&path, related.attributes.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    } else {
        let related = store.related_many(&record, &config.name)?;
        let rows: Vec<Value> = related
            .into_iter()
            .map(|mut row| {
                if let Some(key) = row.key.take() {
                    crate::state::data_set(&mut row.attributes, "_key", Value::String(key));
                }
                row.attributes
            })
            .collect();
        session.state.set(&path, Value::Array(rows));
        Ok(true)
    }
}

/// Collects, in tree order, the components under `root` that declare the
/// given relationship name. The first entry is the designated saver.
pub fn components_sharing_relationship(
    tree: &SchemaTree,
    root: SchemaId,
    name: &str,
) -> Vec<ComponentId> {
    let mut sharing = Vec::new();
    tree.walk(root, &mut |id| {
        if let Some(config) = &tree.component(id).relationship {
            if config.name == name {
                sharing.push(id);
            }
        }
    });
    sharing
}

/// Persists a component's state back into its declared relationship.
///
/// Only the first of the components sharing the relationship performs the
/// save; calls on the others are no-ops. A missing parent record or
/// missing configuration is also a silent no-op.
pub fn save_relationship(
    tree: &SchemaTree,
    session: &EvalSession,
    store: &dyn RecordStore,
    root: SchemaId,
    id: ComponentId,
) -> Result<(), BridgeError> {
    let component = tree.component(id);
    let Some(config) = component.relationship.clone() else {
        return Ok(());
    };
    let Some(record) = session.record.clone() else {
        return Ok(());
    };
    if !record.exists {
        return Ok(());
    }

    let sharing = components_sharing_relationship(tree, root, &config.name);
    if sharing.first() != Some(&id) {
        return Ok(());
    }

    let scope = tree.schema_state_path(component.parent);
    let cx = EvalCx::new(session, &scope);
    let path = tree.absolute_state_path(id);
    let data = session.state.get(&path).unwrap_or(Value::Null);

    let has_relationship = config
        .condition
        .as_ref()
        .map(|condition| condition.evaluate(&cx))
        .unwrap_or(true);

    let Some(def) = store.relationship(&record.model, &config.name) else {
        return Ok(());
    };

    if !def.kind.is_singular() {
        return save_plural(store, &config, &record, &data, &cx, has_relationship);
    }

    let existing = cached_related(tree, session, store, id, &config.name)?;

    match existing {
        Some(related) => {
            if !has_relationship {
                // The schema no longer wants the relationship; the
                // orphaned related record is removed.
                if let Some(key) = &related.key {
                    store.delete(&related.model, key)?;
                }
                return Ok(());
            }
            let mut related = related;
            related.fill(&config.save_data(&data, &cx));
            let mut owner = record;
            match def.kind {
                RelationshipKind::BelongsTo => {
                    store.save(&mut related)?;
                    store.associate(&mut owner, &config.name, &related)?;
                    store.save(&mut owner)?;
                }
                _ => {
                    store.save_through(&owner, &config.name, &mut related)?;
                }
            }
            *tree.component(id).cached_related.borrow_mut() = Some(Some(related));
            Ok(())
        }
        None => {
            if !has_relationship {
                return Ok(());
            }
            let mut related = Record::new(def.target_model.clone());
            related.fill(&config.create_data(&data, &cx)?);
            let mut owner = record;
            match def.kind {
                RelationshipKind::BelongsTo => {
                    // Child first, then associate and save the owner.
                    store.save(&mut related)?;
                    store.associate(&mut owner, &config.name, &related)?;
                    store.save(&mut owner)?;
                }
                _ => {
                    store.save_through(&owner, &config.name, &mut related)?;
                }
            }
            *tree.component(id).cached_related.borrow_mut() = Some(Some(related));
            Ok(())
        }
    }
}

/// Reconciles a plural relationship against an array of row objects.
///
/// Rows carrying a `_key` update the matching related record; rows without
/// one create new records. Related records absent from the array (or all
/// of them, when the condition is false) are deleted.
fn save_plural(
    store: &dyn RecordStore,
    config: &RelationshipConfig,
    owner: &Record,
    data: &Value,
    cx: &EvalCx<'_>,
    has_relationship: bool,
) -> Result<(), BridgeError> {
    let existing = store.related_many(owner, &config.name)?;
    if !has_relationship {
        for related in &existing {
            if let Some(key) = &related.key {
                store.delete(&related.model, key)?;
            }
        }
        return Ok(());
    }

    let rows = match data {
        Value::Array(rows) => rows.clone(),
        _ => Vec::new(),
    };
    let mut kept = Vec::new();
    for row in rows {
        let keyed = crate::state::data_get(&row, "_key")
            .and_then(Value::as_str)
            .map(String::from);
        let mut row = row;
        crate::state::data_forget(&mut row, "_key");
        match keyed {
            Some(key) => {
                if let Some(mut related) = existing.iter().find(|r| r.key.as_deref() == Some(&key)).cloned() {
                    related.fill(&config.save_data(&row, cx));
                    store.save_through(owner, &config.name, &mut related)?;
                    kept.push(key);
                }
            }
            None => {
                let mut related = Record::new(
                    store
                        .relationship(&owner.model, &config.name)
                        .map(|def| def.target_model)
                        .unwrap_or_default(),
                );
                related.fill(&config.create_data(&row, cx)?);
                store.save_through(owner, &config.name, &mut related)?;
                if let Some(key) = &related.key {
                    kept.push(key.clone());
                }
            }
        }
    }
    for related in existing {
        if let Some(key) = related.key {
            if !kept.contains(&key) {
                store.delete(&related.model, &key)?;
            }
        }
    }
    Ok(())
}

/// Saves every relationship declared under `root`, honoring first-sibling
/// coordination.
pub fn save_relationships(
    tree: &SchemaTree,
    session: &EvalSession,
    store: &dyn RecordStore,
    root: SchemaId,
) -> Result<(), BridgeError> {
    let mut ids = Vec::new();
    tree.walk(root, &mut |id| {
        if tree.component(id).relationship.is_some() {
            ids.push(id);
        }
    });
    for id in ids {
        save_relationship(tree, session, store, root, id)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::Operation;
    use crate::record::{InMemoryRecordStore, RelationshipDef};
    use crate::schema::Component;
    use crate::state::StateTree;
    use serde_json::json;

    fn profile_store() -> InMemoryRecordStore {
        let store = InMemoryRecordStore::new();
        store.declare_relationship(
            "user",
            "profile",
            RelationshipDef::of(RelationshipKind::HasOne, "profile", "user_id"),
        );
        store
    }

    fn user_session(store: &InMemoryRecordStore) -> EvalSession {
        let mut user = Record::new("user");
        store.save(&mut user).unwrap();
        EvalSession::new(StateTree::new(), Some(user), Operation::Edit)
    }

    #[test]
    fn fill_loads_singular_relationship_attributes() {
        let store = profile_store();
        let session = user_session(&store);
        let user = session.record.clone().unwrap();
        let mut profile = Record::new("profile");
        profile.fill(&json!({"bio": "hello"}));
        store.save_through(&user, "profile", &mut profile).unwrap();

        let mut tree = SchemaTree::new();
        let root = tree.root();
        let component = tree.attach(
            root,
            Component::new("profile").relationship(RelationshipConfig::new("profile")),
        );

        assert!(fill_from_relationship(&tree, &session, &store, component).unwrap());
        assert_eq!(session.state.get("profile.bio"), Some(json!("hello")));
    }

    #[test]
    fn fill_without_record_or_relationship_is_silent() {
        let store = InMemoryRecordStore::new();
        let session = EvalSession::new(StateTree::new(), None, Operation::Create);

        let mut tree = SchemaTree::new();
        let root = tree.root();
        let component = tree.attach(
            root,
            Component::new("profile").relationship(RelationshipConfig::new("profile")),
        );

        assert!(!fill_from_relationship(&tree, &session, &store, component).unwrap());
    }

    #[test]
    fn save_creates_related_record_when_none_exists() {
        let store = profile_store();
        let session = user_session(&store);
        session.state.set("profile", json!({"bio": "fresh"}));

        let mut tree = SchemaTree::new();
        let root = tree.root();
        let component = tree.attach(
            root,
            Component::new("profile").relationship(RelationshipConfig::new("profile")),
        );

        save_relationship(&tree, &session, &store, root, component).unwrap();

        let user = session.record.clone().unwrap();
        let related = store.related_one(&user, "profile").unwrap().unwrap();
        assert_eq!(related.attribute("bio"), Some(json!("fresh")));
    }

    #[test]
    fn save_updates_existing_related_record() {
        let store = profile_store();
        let session = user_session(&store);
        let user = session.record.clone().unwrap();
        let mut profile = Record::new("profile");
        profile.fill(&json!({"bio": "old", "age": 30}));
        store.save_through(&user, "profile", &mut profile).unwrap();

        session.state.set("profile", json!({"bio": "new"}));

        let mut tree = SchemaTree::new();
        let root = tree.root();
        let component = tree.attach(
            root,
            Component::new("profile").relationship(RelationshipConfig::new("profile")),
        );

        save_relationship(&tree, &session, &store, root, component).unwrap();

        let related = store.related_one(&user, "profile").unwrap().unwrap();
        assert_eq!(related.attribute("bio"), Some(json!("new")));
        assert_eq!(related.attribute("age"), Some(json!(30)));
    }

    #[test]
    fn only_first_sibling_performs_the_save() {
        let store = profile_store();
        let session = user_session(&store);
        session.state.set("profile", json!({"bio": "from-first"}));
        session.state.set("extra", json!({"bio": "from-second"}));

        let mut tree = SchemaTree::new();
        let root = tree.root();
        let first = tree.attach(
            root,
            Component::new("profile").relationship(RelationshipConfig::new("profile")),
        );
        let second = tree.attach(
            root,
            Component::new("extra").relationship(RelationshipConfig::new("profile")),
        );

        assert_eq!(
            components_sharing_relationship(&tree, root, "profile"),
            vec![first, second]
        );

        // Saving via the second component must be a no-op.
        save_relationship(&tree, &session, &store, root, second).unwrap();
        let user = session.record.clone().unwrap();
        assert!(store.related_one(&user, "profile").unwrap().is_none());

        save_relationship(&tree, &session, &store, root, first).unwrap();
        let related = store.related_one(&user, "profile").unwrap().unwrap();
        assert_eq!(related.attribute("bio"), Some(json!("from-first")));
    }

    #[test]
    fn false_condition_deletes_existing_related_record() {
        let store = profile_store();
        let session = user_session(&store);
        let user = session.record.clone().unwrap();
        let mut profile = Record::new("profile");
        store.save_through(&user, "profile", &mut profile).unwrap();

        let mut tree = SchemaTree::new();
        let root = tree.root();
        let component = tree.attach(
            root,
            Component::new("profile")
                .relationship(RelationshipConfig::new("profile").condition(false)),
        );

        save_relationship(&tree, &session, &store, root, component).unwrap();
        assert!(store.related_one(&user, "profile").unwrap().is_none());
    }

    #[test]
    fn belongs_to_saves_child_first_then_owner() {
        let store = InMemoryRecordStore::new();
        store.declare_relationship(
            "post",
            "author",
            RelationshipDef::of(RelationshipKind::BelongsTo, "user", "author_id"),
        );
        let mut post = Record::new("post");
        store.save(&mut post).unwrap();
        let session = EvalSession::new(StateTree::new(), Some(post.clone()), Operation::Edit);
        session.state.set("author", json!({"name": "alex"}));

        let mut tree = SchemaTree::new();
        let root = tree.root();
        let component = tree.attach(
            root,
            Component::new("author").relationship(RelationshipConfig::new("author")),
        );

        save_relationship(&tree, &session, &store, root, component).unwrap();

        let saved_post = store
            .find("post", post.key.as_deref().unwrap())
            .unwrap()
            .unwrap();
        let author_key = saved_post.attribute("author_id").unwrap();
        let author = store
            .find("user", author_key.as_str().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(author.attribute("name"), Some(json!("alex")));
    }

    #[test]
    fn plural_save_creates_updates_and_prunes() {
        let store = InMemoryRecordStore::new();
        store.declare_relationship(
            "post",
            "comments",
            RelationshipDef::of(RelationshipKind::HasMany, "comment", "post_id"),
        );
        let mut post = Record::new("post");
        store.save(&mut post).unwrap();
        let mut stale = Record::new("comment");
        stale.fill(&json!({"body": "stale"}));
        store.save_through(&post, "comments", &mut stale).unwrap();
        let mut kept = Record::new("comment");
        kept.fill(&json!({"body": "old"}));
        store.save_through(&post, "comments", &mut kept).unwrap();
        let kept_key = kept.key.clone().unwrap();

        let session = EvalSession::new(StateTree::new(), Some(post.clone()), Operation::Edit);
        session.state.set(
            "comments",
            json!([
                {"_key": kept_key, "body": "updated"},
                {"body": "brand-new"},
            ]),
        );

        let mut tree = SchemaTree::new();
        let root = tree.root();
        let component = tree.attach(
            root,
            Component::new("comments").relationship(RelationshipConfig::new("comments")),
        );

        save_relationship(&tree, &session, &store, root, component).unwrap();

        let comments = store.related_many(&post, "comments").unwrap();
        assert_eq!(comments.len(), 2);
        let bodies: Vec<_> = comments
            .iter()
            .map(|c| c.attribute("body").unwrap())
            .collect();
        assert!(bodies.contains(&json!("updated")));
        assert!(bodies.contains(&json!("brand-new")));
        assert!(!bodies.contains(&json!("stale")));
    }

    #[test]
    fn missing_create_mutation_is_a_config_error() {
        let store = profile_store();
        let session = user_session(&store);
        session.state.set("profile", json!({"bio": "x"}));

        let mut tree = SchemaTree::new();
        let root = tree.root();
        let component = tree.attach(
            root,
            Component::new("profile")
                .relationship(RelationshipConfig::new("profile").require_create_mutation()),
        );

        assert_eq!(
            save_relationship(&tree, &session, &store, root, component),
            Err(BridgeError::Config(ConfigError::MissingMutationCallback(
                "profile".to_string()
            )))
        );
    }
}
