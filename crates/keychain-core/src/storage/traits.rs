//! Store trait definitions

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::Result;

/// A value as held by the durable store
///
/// Mirrors the native kinds of a preferences-style store. Keychain backends
/// only write `Text` (sealed or Base64 data) plus the native kinds used by
/// the plain backend and the version marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum StoredValue {
    Text(String),
    Boolean(bool),
    Long(i64),
    Float(f32),
    Int(i32),
    StringSet(BTreeSet<String>),
}

impl StoredValue {
    /// Short name of the stored kind, used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            StoredValue::Text(_) => "Text",
            StoredValue::Boolean(_) => "Boolean",
            StoredValue::Long(_) => "Long",
            StoredValue::Float(_) => "Float",
            StoredValue::Int(_) => "Int",
            StoredValue::StringSet(_) => "StringSet",
        }
    }
}

/// One staged change in a [`StoreBatch`]
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    Put(String, StoredValue),
    Remove(String),
}

/// An ordered set of changes applied atomically by [`DurableStore::apply`]
///
/// When `clear` is set, the store is emptied first and the operations are
/// applied afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreBatch {
    clear: bool,
    ops: Vec<BatchOp>,
}

impl StoreBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<String>, value: StoredValue) -> &mut Self {
        self.ops.push(BatchOp::Put(key.into(), value));
        self
    }

    pub fn remove(&mut self, key: impl Into<String>) -> &mut Self {
        self.ops.push(BatchOp::Remove(key.into()));
        self
    }

    pub fn clear(&mut self) -> &mut Self {
        self.clear = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        !self.clear && self.ops.is_empty()
    }

    /// Apply the batch to an in-memory map
    pub fn apply_to(&self, entries: &mut BTreeMap<String, StoredValue>) {
        if self.clear {
            entries.clear();
        }
        for op in &self.ops {
            match op {
                BatchOp::Put(key, value) => {
                    entries.insert(key.clone(), value.clone());
                }
                BatchOp::Remove(key) => {
                    entries.remove(key);
                }
            }
        }
    }
}

/// Durable key-value store with per-key and per-batch atomicity
pub trait DurableStore: Send + Sync {
    /// Read a single entry
    fn get(&self, key: &str) -> Result<Option<StoredValue>>;

    /// Snapshot of every entry
    fn get_all(&self) -> Result<BTreeMap<String, StoredValue>>;

    /// Apply all changes in the batch, or none of them
    fn apply(&self, batch: StoreBatch) -> Result<()>;

    /// Check if an entry exists
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Write a single entry
    fn put(&self, key: &str, value: StoredValue) -> Result<()> {
        let mut batch = StoreBatch::new();
        batch.put(key, value);
        self.apply(batch)
    }

    /// Delete a single entry
    fn remove(&self, key: &str) -> Result<()> {
        let mut batch = StoreBatch::new();
        batch.remove(key);
        self.apply(batch)
    }

    /// Delete every entry
    fn clear(&self) -> Result<()> {
        let mut batch = StoreBatch::new();
        batch.clear();
        self.apply(batch)
    }
}

/// Opens the durable store that backs a keychain namespace
pub trait StoreProvider: Send + Sync {
    fn open(&self, identifier: &str) -> Result<Arc<dyn DurableStore>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_clears_before_ops() {
        let mut entries = BTreeMap::new();
        entries.insert("old".to_string(), StoredValue::Long(1));

        let mut batch = StoreBatch::new();
        batch
            .put("new", StoredValue::Boolean(true))
            .clear()
            .remove("missing");
        batch.apply_to(&mut entries);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries.get("new"), Some(&StoredValue::Boolean(true)));
    }

    #[test]
    fn test_batch_ops_apply_in_order() {
        let mut entries = BTreeMap::new();

        let mut batch = StoreBatch::new();
        batch
            .put("k", StoredValue::Text("first".to_string()))
            .remove("k")
            .put("k", StoredValue::Text("second".to_string()));
        batch.apply_to(&mut entries);

        assert_eq!(entries.get("k"), Some(&StoredValue::Text("second".to_string())));
    }

    #[test]
    fn test_stored_value_json_shape() {
        let json = serde_json::to_string(&StoredValue::Long(7)).unwrap();
        assert_eq!(json, r#"{"type":"long","value":7}"#);

        let parsed: StoredValue = serde_json::from_str(r#"{"type":"stringSet","value":["a"]}"#).unwrap();
        assert_eq!(parsed, StoredValue::StringSet(["a".to_string()].into_iter().collect()));
    }
}
