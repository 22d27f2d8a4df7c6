//! # Record Storage Abstraction
//!
//! This module provides the record storage boundary for the formwork engine.
//! The engine treats the backing ORM as an opaque data source: records expose
//! attribute get/set, an `exists` flag, and named relationships, and the
//! store exposes save/delete plus transaction control. Everything else about
//! persistence is an implementation detail behind the `RecordStore` trait.
//!
//! ## Storage Model
//!
//! ```text
//! Record (model + key) ──── attributes (JSON object)
//!        │
//!        └── relationships (declared per model)
//!            ├── belongs-to: owner holds the foreign key
//!            └── has-one / morph-one / has-many: related row holds it
//! ```
//!
//! ## Implementations
//!
//! - **InMemoryRecordStore**: thread-safe in-memory storage using
//!   `Mutex<HashMap>`, with snapshot-based transactions
//!
//! ## Usage Examples
//!
//! ```rust
//! use formwork::{InMemoryRecordStore, Record, RecordStore};
//! use serde_json::json;
//!
//! let store = InMemoryRecordStore::new();
//! let mut post = Record::new("post");
//! post.fill(&json!({"title": "Hello"}));
//! store.save(&mut post).unwrap();
//!
//! let key = post.key.clone().unwrap();
//! let found = store.find("post", &key).unwrap().unwrap();
//! assert_eq!(found.attribute("title"), Some(json!("Hello")));
//! ```

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::StoreError;
use crate::state::{data_get, data_set};

/////////////////////////////////////////////// Record /////////////////////////////////////////////////

/// A model record: a JSON attribute bag with a model name, an optional key,
/// and an `exists` flag distinguishing persisted records from new instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// The model this record belongs to (e.g. "post").
    pub model: String,
    /// The primary key, once persisted.
    pub key: Option<String>,
    /// The record's attributes as a JSON object.
    pub attributes: Value,
    /// Whether the record has been persisted.
    pub exists: bool,
}

impl Record {
    /// Creates a new, unpersisted record with empty attributes.
    pub fn new(model: impl Into<String>) -> Self {
        Record {
            model: model.into(),
            key: None,
            attributes: Value::Object(Map::new()),
            exists: false,
        }
    }

    /// Creates a persisted record with a known key and attributes.
    pub fn with_key(model: impl Into<String>, key: impl Into<String>, attributes: Value) -> Self {
        Record {
            model: model.into(),
            key: Some(key.into()),
            attributes,
            exists: true,
        }
    }

    /// Reads an attribute by (possibly dotted) name.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        data_get(&self.attributes, name).cloned()
    }

    /// Writes an attribute by (possibly dotted) name.
    pub fn set_attribute(&mut self, name: &str, value: Value) {
        data_set(&mut self.attributes, name, value);
    }

    /// Merges the keys of a JSON object into this record's attributes.
    /// Non-object values are ignored.
    pub fn fill(&mut self, data: &Value) {
        if let Value::Object(incoming) = data {
            for (k, v) in incoming {
                data_set(&mut self.attributes, k, v.clone());
            }
        }
    }
}

/////////////////////////////////////////// Relationships //////////////////////////////////////////////

/// The shapes of relationship the engine distinguishes when round-tripping
/// schema state through related records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipKind {
    /// The owner holds the foreign key; saving associates child-first.
    BelongsTo,
    /// The related row holds the foreign key; saved through the owner.
    HasOne,
    /// Like `HasOne` but polymorphic on the owner side.
    MorphOne,
    /// A plural relationship; related rows hold the foreign key.
    HasMany,
}

impl RelationshipKind {
    /// Returns true for relationships that resolve to at most one record.
    pub fn is_singular(&self) -> bool {
        !matches!(self, RelationshipKind::HasMany)
    }
}

/// A declared relationship between two models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDef {
    /// The relationship shape.
    pub kind: RelationshipKind,
    /// The model on the other side of the relationship.
    pub target_model: String,
    /// The attribute holding the linking key. For belongs-to this lives on
    /// the owner; for the other kinds it lives on the related row.
    pub foreign_key: String,
}

impl RelationshipDef {
    /// Builds a relationship definition.
    pub fn of(
        kind: RelationshipKind,
        target_model: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        RelationshipDef {
            kind,
            target_model: target_model.into(),
            foreign_key: foreign_key.into(),
        }
    }
}

///////////////////////////////////////////// RecordStore //////////////////////////////////////////////

/// Trait defining the record storage interface consumed by the engine.
///
/// All methods are thread-safe; the trait requires `Send + Sync` so a store
/// can be shared across daemon request handlers. The transaction methods
/// model the single database transaction the action lifecycle opens per
/// call: every exit path must leave `transaction_depth()` at zero.
pub trait RecordStore: Send + Sync {
    /// Fetches a record by model and key.
    fn find(&self, model: &str, key: &str) -> Result<Option<Record>, StoreError>;

    /// Persists a record, assigning a key (and setting `exists`) if new.
    fn save(&self, record: &mut Record) -> Result<(), StoreError>;

    /// Deletes a record. Returns whether it existed.
    fn delete(&self, model: &str, key: &str) -> Result<bool, StoreError>;

    /// Lists all records of a model, ordered by key.
    fn list(&self, model: &str) -> Result<Vec<Record>, StoreError>;

    /// Looks up a declared relationship for a model.
    fn relationship(&self, model: &str, name: &str) -> Option<RelationshipDef>;

    /// Resolves a singular relationship to its related record, if any.
    fn related_one(&self, record: &Record, name: &str) -> Result<Option<Record>, StoreError>;

    /// Resolves a plural relationship to its related records.
    fn related_many(&self, record: &Record, name: &str) -> Result<Vec<Record>, StoreError>;

    /// For a belongs-to relationship, points the owner's foreign key at the
    /// related record. The owner is not saved.
    fn associate(&self, owner: &mut Record, name: &str, related: &Record)
    -> Result<(), StoreError>;

    /// For has-one / morph-one / has-many, stamps the related record with
    /// the owner's key and saves it.
    fn save_through(
        &self,
        owner: &Record,
        name: &str,
        related: &mut Record,
    ) -> Result<(), StoreError>;

    /// Opens a transaction. Transactions nest by stacking snapshots.
    fn begin_transaction(&self) -> Result<(), StoreError>;

    /// Commits the innermost open transaction.
    fn commit(&self) -> Result<(), StoreError>;

    /// Rolls back the innermost open transaction, restoring its snapshot.
    fn rollback(&self) -> Result<(), StoreError>;

    /// Number of currently open transactions.
    fn transaction_depth(&self) -> usize;
}

////////////////////////////////////////// InMemoryRecordStore /////////////////////////////////////////

#[derive(Clone, Default)]
struct Rows {
    by_key: HashMap<(String, String), Value>,
    next_key: u64,
}

/// Thread-safe in-memory record store with snapshot transactions.
///
/// Rows live in a `Mutex<HashMap>` keyed by (model, key). `begin_transaction`
/// pushes a deep copy of the rows; `rollback` restores it and `commit`
/// discards it. Keys are assigned from a monotonically increasing counter.
pub struct InMemoryRecordStore {
    rows: Mutex<Rows>,
    relationships: Mutex<HashMap<(String, String), RelationshipDef>>,
    snapshots: Mutex<Vec<Rows>>,
}

impl InMemoryRecordStore {
    /// Creates an empty store with no declared relationships.
    pub fn new() -> Self {
        InMemoryRecordStore {
            rows: Mutex::new(Rows::default()),
            relationships: Mutex::new(HashMap::new()),
            snapshots: Mutex::new(Vec::new()),
        }
    }

    /// Declares a relationship on a model.
    pub fn declare_relationship(
        &self,
        model: impl Into<String>,
        name: impl Into<String>,
        def: RelationshipDef,
    ) {
        let mut relationships = self.relationships.lock().unwrap();
        relationships.insert((model.into(), name.into()), def);
    }

    fn require_relationship(&self, model: &str, name: &str) -> Result<RelationshipDef, StoreError> {
        self.relationship(model, name)
            .ok_or_else(|| StoreError::UnknownRelationship(name.to_string()))
    }

    fn rows_matching(&self, model: &str, foreign_key: &str, key: &str) -> Vec<Record> {
        let rows = self.rows.lock().unwrap();
        let mut matches: Vec<Record> = rows
            .by_key
            .iter()
            .filter(|((m, _), attributes)| {
                m == model
                    && data_get(attributes, foreign_key)
                        .is_some_and(|v| v.as_str() == Some(key))
            })
            .map(|((m, k), attributes)| Record::with_key(m.clone(), k.clone(), attributes.clone()))
            .collect();
        matches.sort_by(|a, b| a.key.cmp(&b.key));
        matches
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn find(&self, model: &str, key: &str) -> Result<Option<Record>, StoreError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .by_key
            .get(&(model.to_string(), key.to_string()))
            .map(|attributes| Record::with_key(model, key, attributes.clone())))
    }

    fn save(&self, record: &mut Record) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let key = match &record.key {
            Some(key) => key.clone(),
            None => {
                rows.next_key += 1;
                let key = rows.next_key.to_string();
                record.key = Some(key.clone());
                key
            }
        };
        rows.by_key
            .insert((record.model.clone(), key), record.attributes.clone());
        record.exists = true;
        Ok(())
    }

    fn delete(&self, model: &str, key: &str) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        Ok(rows
            .by_key
            .remove(&(model.to_string(), key.to_string()))
            .is_some())
    }

    fn list(&self, model: &str) -> Result<Vec<Record>, StoreError> {
        let rows = self.rows.lock().unwrap();
        let mut records: Vec<Record> = rows
            .by_key
            .iter()
            .filter(|((m, _), _)| m == model)
            .map(|((m, k), attributes)| Record::with_key(m.clone(), k.clone(), attributes.clone()))
            .collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }

    fn relationship(&self, model: &str, name: &str) -> Option<RelationshipDef> {
        let relationships = self.relationships.lock().unwrap();
        relationships
            .get(&(model.to_string(), name.to_string()))
            .cloned()
    }

    fn related_one(&self, record: &Record, name: &str) -> Result<Option<Record>, StoreError> {
        let def = self.require_relationship(&record.model, name)?;
        match def.kind {
            RelationshipKind::BelongsTo => {
                let Some(fk) = record.attribute(&def.foreign_key) else {
                    return Ok(None);
                };
                let Some(fk) = fk.as_str().map(String::from) else {
                    return Ok(None);
                };
                self.find(&def.target_model, &fk)
            }
            RelationshipKind::HasOne | RelationshipKind::MorphOne => {
                let Some(key) = record.key.as_deref() else {
                    return Ok(None);
                };
                Ok(self
                    .rows_matching(&def.target_model, &def.foreign_key, key)
                    .into_iter()
                    .next())
            }
            RelationshipKind::HasMany => Err(StoreError::Internal(format!(
                "relationship {:?} is plural; use related_many",
                name
            ))),
        }
    }

    fn related_many(&self, record: &Record, name: &str) -> Result<Vec<Record>, StoreError> {
        let def = self.require_relationship(&record.model, name)?;
        let Some(key) = record.key.as_deref() else {
            return Ok(Vec::new());
        };
        Ok(self.rows_matching(&def.target_model, &def.foreign_key, key))
    }

    fn associate(
        &self,
        owner: &mut Record,
        name: &str,
        related: &Record,
    ) -> Result<(), StoreError> {
        let def = self.require_relationship(&owner.model, name)?;
        let Some(key) = related.key.clone() else {
            return Err(StoreError::Internal(
                "cannot associate an unsaved record".to_string(),
            ));
        };
        owner.set_attribute(&def.foreign_key, Value::String(key));
        Ok(())
    }

    fn save_through(
        &self,
        owner: &Record,
        name: &str,
        related: &mut Record,
    ) -> Result<(), StoreError> {
        let def = self.require_relationship(&owner.model, name)?;
        let Some(key) = owner.key.clone() else {
            return Err(StoreError::Internal(
                "cannot save through an unsaved owner".to_string(),
            ));
        };
        related.set_attribute(&def.foreign_key, Value::String(key));
        self.save(related)
    }

    fn begin_transaction(&self) -> Result<(), StoreError> {
        let rows = self.rows.lock().unwrap();
        let mut snapshots = self.snapshots.lock().unwrap();
        snapshots.push(rows.clone());
        Ok(())
    }

    fn commit(&self) -> Result<(), StoreError> {
        let mut snapshots = self.snapshots.lock().unwrap();
        snapshots.pop().map(|_| ()).ok_or(StoreError::NoTransaction)
    }

    fn rollback(&self) -> Result<(), StoreError> {
        let mut snapshots = self.snapshots.lock().unwrap();
        let snapshot = snapshots.pop().ok_or(StoreError::NoTransaction)?;
        let mut rows = self.rows.lock().unwrap();
        *rows = snapshot;
        Ok(())
    }

    fn transaction_depth(&self) -> usize {
        self.snapshots.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_with_author_relationship() -> InMemoryRecordStore {
        let store = InMemoryRecordStore::new();
        store.declare_relationship(
            "post",
            "author",
            RelationshipDef::of(RelationshipKind::BelongsTo, "user", "author_id"),
        );
        store
    }

    #[test]
    fn save_assigns_keys_and_marks_existing() {
        let store = InMemoryRecordStore::new();
        let mut record = Record::new("post");
        record.fill(&json!({"title": "One"}));
        assert!(!record.exists);

        store.save(&mut record).unwrap();
        assert!(record.exists);
        assert!(record.key.is_some());

        let mut second = Record::new("post");
        store.save(&mut second).unwrap();
        assert_ne!(record.key, second.key);
    }

    #[test]
    fn find_and_delete_round_trip() {
        let store = InMemoryRecordStore::new();
        let mut record = Record::new("post");
        record.fill(&json!({"title": "One"}));
        store.save(&mut record).unwrap();
        let key = record.key.clone().unwrap();

        let found = store.find("post", &key).unwrap().unwrap();
        assert_eq!(found.attribute("title"), Some(json!("One")));

        assert!(store.delete("post", &key).unwrap());
        assert!(store.find("post", &key).unwrap().is_none());
        assert!(!store.delete("post", &key).unwrap());
    }

    #[test]
    fn belongs_to_resolution() {
        let store = store_with_author_relationship();
        let mut author = Record::new("user");
        author.fill(&json!({"name": "alex"}));
        store.save(&mut author).unwrap();

        let mut post = Record::new("post");
        store.associate(&mut post, "author", &author).unwrap();
        store.save(&mut post).unwrap();

        let related = store.related_one(&post, "author").unwrap().unwrap();
        assert_eq!(related.attribute("name"), Some(json!("alex")));
    }

    #[test]
    fn has_one_resolution_through_foreign_key() {
        let store = InMemoryRecordStore::new();
        store.declare_relationship(
            "user",
            "profile",
            RelationshipDef::of(RelationshipKind::HasOne, "profile", "user_id"),
        );

        let mut user = Record::new("user");
        store.save(&mut user).unwrap();

        let mut profile = Record::new("profile");
        profile.fill(&json!({"bio": "hello"}));
        store.save_through(&user, "profile", &mut profile).unwrap();

        let related = store.related_one(&user, "profile").unwrap().unwrap();
        assert_eq!(related.attribute("bio"), Some(json!("hello")));
        assert_eq!(
            related.attribute("user_id"),
            user.key.clone().map(Value::String)
        );
    }

    #[test]
    fn has_many_resolution_orders_by_key() {
        let store = InMemoryRecordStore::new();
        store.declare_relationship(
            "post",
            "comments",
            RelationshipDef::of(RelationshipKind::HasMany, "comment", "post_id"),
        );

        let mut post = Record::new("post");
        store.save(&mut post).unwrap();
        for body in ["first", "second"] {
            let mut comment = Record::new("comment");
            comment.fill(&json!({"body": body}));
            store.save_through(&post, "comments", &mut comment).unwrap();
        }

        let comments = store.related_many(&post, "comments").unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].attribute("body"), Some(json!("first")));
    }

    #[test]
    fn unknown_relationship_is_an_error() {
        let store = InMemoryRecordStore::new();
        let record = Record::with_key("post", "1", json!({}));
        assert!(matches!(
            store.related_one(&record, "nope"),
            Err(StoreError::UnknownRelationship(_))
        ));
    }

    #[test]
    fn rollback_restores_snapshot() {
        let store = InMemoryRecordStore::new();
        let mut record = Record::new("post");
        store.save(&mut record).unwrap();
        let key = record.key.clone().unwrap();

        store.begin_transaction().unwrap();
        let mut inside = Record::new("post");
        store.save(&mut inside).unwrap();
        store.delete("post", &key).unwrap();
        store.rollback().unwrap();

        assert!(store.find("post", &key).unwrap().is_some());
        assert_eq!(store.list("post").unwrap().len(), 1);
        assert_eq!(store.transaction_depth(), 0);
    }

    #[test]
    fn commit_keeps_changes() {
        let store = InMemoryRecordStore::new();
        store.begin_transaction().unwrap();
        let mut record = Record::new("post");
        store.save(&mut record).unwrap();
        store.commit().unwrap();

        assert_eq!(store.list("post").unwrap().len(), 1);
        assert_eq!(store.transaction_depth(), 0);
    }

    #[test]
    fn commit_without_transaction_is_an_error() {
        let store = InMemoryRecordStore::new();
        assert_eq!(store.commit(), Err(StoreError::NoTransaction));
        assert_eq!(store.rollback(), Err(StoreError::NoTransaction));
    }
}
