//! Secondary indices for indexed buckets
//!
//! An index maps the values stored under one label to the ids of the records
//! holding them, persisted as a JSON file under the bucket's `INDICES`
//! subdirectory. Only scalar-valued fields are indexable; list- and
//! reference-valued fields are skipped during index maintenance.

use serde::{Deserialize, Serialize};
use shelf_core::{RecordId, Value};
use std::collections::BTreeMap;

/// Persisted label -> value -> [record ids] mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    label: String,
    entries: BTreeMap<String, Vec<i64>>,
}

impl Index {
    pub(crate) fn new(label: impl Into<String>) -> Self {
        Index {
            label: label.into(),
            entries: BTreeMap::new(),
        }
    }

    /// The indexed label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Index keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no keys
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids of all records whose indexed field equals `value`
    ///
    /// Non-scalar values are never indexed, so they resolve to no ids.
    pub fn ids_for(&self, value: &Value) -> Vec<RecordId> {
        index_key(value)
            .and_then(|key| self.entries.get(&key))
            .map(|ids| {
                ids.iter()
                    .filter_map(|raw| RecordId::from_i64(*raw).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ids stored under a raw index key
    pub fn ids_for_key(&self, key: &str) -> Vec<RecordId> {
        self.entries
            .get(key)
            .map(|ids| {
                ids.iter()
                    .filter_map(|raw| RecordId::from_i64(*raw).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Record `id` under the key for `value`, if the value is indexable
    pub(crate) fn insert(&mut self, value: &Value, id: RecordId) {
        if let Some(key) = index_key(value) {
            let ids = self.entries.entry(key).or_default();
            if !ids.contains(&id.get()) {
                ids.push(id.get());
            }
        }
    }

    /// Drop `id` from every key, pruning keys left without ids
    pub(crate) fn remove_id(&mut self, id: RecordId) {
        let raw = id.get();
        for ids in self.entries.values_mut() {
            ids.retain(|existing| *existing != raw);
        }
        self.entries.retain(|_, ids| !ids.is_empty());
    }
}

/// Canonical index key of a scalar value; None for lists and references
pub(crate) fn index_key(value: &Value) -> Option<String> {
    match value {
        Value::Bool(b) => Some(b.to_string()),
        Value::Int(i) => Some(i.to_string()),
        Value::Long(l) => Some(l.to_string()),
        Value::Double(d) => Some(format!("{d:?}")),
        Value::Str(s) => Some(s.clone()),
        Value::Scalars(_) | Value::References(_) | Value::Reference(_) => None,
    }
}
