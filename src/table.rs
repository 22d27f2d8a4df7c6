//! # Tables
//!
//! A table binds a model to row-level and bulk actions. The engine only
//! cares about the table as an action registry and a source of selected
//! records; columns, sorting, and pagination are presentation concerns
//! that never reach this core.

use std::collections::HashMap;

use crate::action::Action;
use crate::errors::StoreError;
use crate::record::{Record, RecordStore};

/// A model-bound registry of row and bulk actions.
#[derive(Clone)]
pub struct Table {
    model: String,
    actions: HashMap<String, Action>,
    bulk_actions: HashMap<String, Action>,
}

impl Table {
    /// Creates a table over a model.
    pub fn new(model: impl Into<String>) -> Self {
        Table {
            model: model.into(),
            actions: HashMap::new(),
            bulk_actions: HashMap::new(),
        }
    }

    /// The bound model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Registers a row action.
    pub fn action(mut self, action: Action) -> Self {
        self.actions.insert(action.name().to_string(), action);
        self
    }

    /// Registers a bulk action.
    pub fn bulk_action(mut self, action: Action) -> Self {
        self.bulk_actions.insert(action.name().to_string(), action);
        self
    }

    /// Looks up a row action by name.
    pub fn row_action(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }

    /// Looks up a bulk action by name.
    pub fn get_bulk_action(&self, name: &str) -> Option<&Action> {
        self.bulk_actions.get(name)
    }

    /// Fetches a row of this table's model by key.
    pub fn record(&self, store: &dyn RecordStore, key: &str) -> Result<Option<Record>, StoreError> {
        store.find(&self.model, key)
    }

    /// Fetches the selected rows for a bulk call, skipping keys that no
    /// longer exist.
    pub fn selected_records(
        &self,
        store: &dyn RecordStore,
        keys: &[String],
    ) -> Result<Vec<Record>, StoreError> {
        let mut records = Vec::new();
        for key in keys {
            if let Some(record) = store.find(&self.model, key)? {
                records.push(record);
            }
        }
        Ok(records)
    }
}
