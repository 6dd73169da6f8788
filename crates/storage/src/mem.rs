//! In-memory storage backend
//!
//! Drop-in substitute for [`crate::FsBackend`] in tests: same key/prefix
//! semantics over a pair of concurrent maps, with a monotonically bumped
//! stamp per write instead of file mtimes.

use dashmap::DashMap;
use shelf_core::{Result, StorageBackend};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone)]
struct MemEntry {
    bytes: Vec<u8>,
    stamp: u64,
}

/// Concurrent-map storage with directory-like prefixes
#[derive(Debug, Default)]
pub struct MemBackend {
    entries: DashMap<String, MemEntry>,
    prefixes: DashMap<String, ()>,
    clock: AtomicU64,
}

impl MemBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        MemBackend::default()
    }

    fn child_of<'a>(full: &'a str, prefix: &str) -> Option<&'a str> {
        let rest = if prefix.is_empty() {
            full
        } else {
            full.strip_prefix(prefix)?.strip_prefix('/')?
        };
        (!rest.is_empty() && !rest.contains('/')).then_some(rest)
    }

    fn is_under(full: &str, prefix: &str) -> bool {
        full == prefix || full.starts_with(&format!("{prefix}/"))
    }
}

impl StorageBackend for MemBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|e| e.bytes.clone()))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let stamp = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        self.entries.insert(
            key.to_string(),
            MemEntry {
                bytes: bytes.to_vec(),
                stamp,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.entries.contains_key(key))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .iter()
            .filter_map(|e| Self::child_of(e.key(), prefix).map(str::to_string))
            .collect())
    }

    fn stamp(&self, key: &str) -> Result<Option<u64>> {
        Ok(self.entries.get(key).map(|e| e.stamp))
    }

    fn make_prefix(&self, prefix: &str) -> Result<()> {
        let mut path = String::new();
        for part in prefix.split('/').filter(|p| !p.is_empty()) {
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(part);
            self.prefixes.insert(path.clone(), ());
        }
        Ok(())
    }

    fn prefix_exists(&self, prefix: &str) -> Result<bool> {
        Ok(self.prefixes.contains_key(prefix))
    }

    fn drop_prefix(&self, prefix: &str) -> Result<()> {
        self.prefixes.retain(|p, _| !Self::is_under(p, prefix));
        self.entries.retain(|k, _| !Self::is_under(k, prefix));
        Ok(())
    }

    fn list_prefixes(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .prefixes
            .iter()
            .filter_map(|e| Self::child_of(e.key(), prefix).map(str::to_string))
            .collect())
    }
}
