//! # Dotted-Path State Access
//!
//! This module provides the shared state store that backs every schema tree,
//! plus the dotted-path helpers used to read and write individual leaves.
//! State is plain JSON (`serde_json::Value`); paths are `.`-separated
//! segments, with numeric segments indexing into arrays.
//!
//! ## Usage Examples
//!
//! ```rust
//! use formwork::StateTree;
//! use serde_json::json;
//!
//! let state = StateTree::new();
//! state.set("post.title", json!("Hello"));
//! state.set("post.tags.0", json!("rust"));
//!
//! assert_eq!(state.get("post.title"), Some(json!("Hello")));
//! assert_eq!(state.get("post.tags"), Some(json!(["rust"])));
//! assert_eq!(state.get("post.missing"), None);
//! ```

use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

/// Joins a path prefix and a relative segment with a `.` separator.
///
/// Either side may be empty, in which case the other side is returned
/// unchanged. This is the single place path concatenation happens so that
/// absolute paths never grow leading or trailing dots.
pub fn path_join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else if segment.is_empty() {
        prefix.to_string()
    } else {
        format!("{}.{}", prefix, segment)
    }
}

/// Returns true if `ancestor` is `path` itself or a dotted prefix of it.
pub fn is_path_or_ancestor(ancestor: &str, path: &str) -> bool {
    if ancestor.is_empty() {
        return true;
    }
    path == ancestor || path.starts_with(&format!("{}.", ancestor))
}

/// Reads the value at a dotted path, if present.
///
/// An empty path refers to the root. Numeric segments index into arrays;
/// all other segments index into objects.
pub fn data_get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                items.get(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Writes a value at a dotted path, creating intermediate objects (or
/// extending arrays for numeric segments) as needed.
pub fn data_set(root: &mut Value, path: &str, value: Value) {
    if path.is_empty() {
        *root = value;
        return;
    }
    let mut current = root;
    let segments: Vec<&str> = path.split('.').collect();
    for (i, segment) in segments.iter().enumerate() {
        let last = i == segments.len() - 1;
        if let Ok(index) = segment.parse::<usize>() {
            if !current.is_array() && !current.is_object() {
                *current = Value::Array(Vec::new());
            }
            if let Value::Array(items) = current {
                while items.len() <= index {
                    items.push(Value::Null);
                }
                if last {
                    items[index] = value;
                    return;
                }
                current = &mut items[index];
                continue;
            }
        }
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        if let Value::Object(map) = current {
            if last {
                map.insert(segment.to_string(), value);
                return;
            }
            current = map
                .entry(segment.to_string())
                .or_insert(Value::Object(Map::new()));
        }
    }
}

/// Removes the value at a dotted path, returning it if it was present.
///
/// Intermediate containers are left in place even when they become empty.
pub fn data_forget(root: &mut Value, path: &str) -> Option<Value> {
    if path.is_empty() {
        return Some(std::mem::replace(root, Value::Object(Map::new())));
    }
    let (parent_path, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (parent, leaf),
        None => ("", path),
    };
    let parent = if parent_path.is_empty() {
        root
    } else {
        data_get_mut(root, parent_path)?
    };
    match parent {
        Value::Object(map) => map.remove(leaf),
        Value::Array(items) => {
            let index: usize = leaf.parse().ok()?;
            if index < items.len() {
                Some(items.remove(index))
            } else {
                None
            }
        }
        _ => None,
    }
}

fn data_get_mut<'a>(root: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                items.get_mut(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}

////////////////////////////////////////////// StateTree ///////////////////////////////////////////////

/// The shared mutable state store for one interactive component.
///
/// This is the key-value store keyed by dotted paths that survives between
/// mount and call round-trips. Clones share the same underlying state.
/// The mutex exists only because the daemon shares interactions across
/// request handlers; within one request access is strictly sequential.
#[derive(Clone, Debug)]
pub struct StateTree {
    inner: Arc<Mutex<Value>>,
}

impl StateTree {
    /// Creates an empty state tree (a JSON object root).
    pub fn new() -> Self {
        StateTree {
            inner: Arc::new(Mutex::new(Value::Object(Map::new()))),
        }
    }

    /// Creates a state tree seeded from an existing JSON value.
    pub fn from_value(value: Value) -> Self {
        StateTree {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    /// Reads and clones the value at a dotted path.
    pub fn get(&self, path: &str) -> Option<Value> {
        let root = self.inner.lock().unwrap();
        data_get(&root, path).cloned()
    }

    /// Returns true if a value exists at the path.
    pub fn has(&self, path: &str) -> bool {
        let root = self.inner.lock().unwrap();
        data_get(&root, path).is_some()
    }

    /// Writes a value at a dotted path.
    pub fn set(&self, path: &str, value: Value) {
        let mut root = self.inner.lock().unwrap();
        data_set(&mut root, path, value);
    }

    /// Removes the value at a dotted path.
    pub fn forget(&self, path: &str) -> Option<Value> {
        let mut root = self.inner.lock().unwrap();
        data_forget(&mut root, path)
    }

    /// Returns a deep copy of the entire state.
    pub fn snapshot(&self) -> Value {
        self.inner.lock().unwrap().clone()
    }

    /// Replaces the entire state.
    pub fn replace(&self, value: Value) {
        *self.inner.lock().unwrap() = value;
    }
}

impl Default for StateTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn path_join_handles_empty_sides() {
        assert_eq!(path_join("", "title"), "title");
        assert_eq!(path_join("post", ""), "post");
        assert_eq!(path_join("post", "title"), "post.title");
    }

    #[test]
    fn ancestor_matching() {
        assert!(is_path_or_ancestor("post", "post"));
        assert!(is_path_or_ancestor("post", "post.title"));
        assert!(is_path_or_ancestor("", "anything"));
        assert!(!is_path_or_ancestor("post", "poster.title"));
        assert!(!is_path_or_ancestor("post.title", "post"));
    }

    #[test]
    fn get_and_set_nested() {
        let mut root = json!({});
        data_set(&mut root, "a.b.c", json!(1));
        assert_eq!(data_get(&root, "a.b.c"), Some(&json!(1)));
        assert_eq!(data_get(&root, "a.b"), Some(&json!({"c": 1})));
        assert_eq!(data_get(&root, "a.x"), None);
    }

    #[test]
    fn set_through_array_index() {
        let mut root = json!({});
        data_set(&mut root, "items.0.name", json!("first"));
        data_set(&mut root, "items.1.name", json!("second"));
        assert_eq!(
            data_get(&root, "items"),
            Some(&json!([{"name": "first"}, {"name": "second"}]))
        );
    }

    #[test]
    fn forget_removes_leaf_only() {
        let mut root = json!({"a": {"b": 1, "c": 2}});
        assert_eq!(data_forget(&mut root, "a.b"), Some(json!(1)));
        assert_eq!(data_get(&root, "a"), Some(&json!({"c": 2})));
        assert_eq!(data_forget(&mut root, "a.missing"), None);
    }

    #[test]
    fn overwriting_scalar_with_subtree() {
        let mut root = json!({"a": 1});
        data_set(&mut root, "a.b", json!(2));
        assert_eq!(data_get(&root, "a.b"), Some(&json!(2)));
    }

    #[test]
    fn state_tree_clones_share_state() {
        let state = StateTree::new();
        let other = state.clone();
        state.set("shared", json!(true));
        assert_eq!(other.get("shared"), Some(json!(true)));
    }

    #[test]
    fn state_tree_root_access() {
        let state = StateTree::from_value(json!({"x": 1}));
        assert_eq!(state.get(""), Some(json!({"x": 1})));
        state.forget("x");
        assert_eq!(state.snapshot(), json!({}));
    }
}
