//! Object cache: live record id -> owning location
//!
//! Process-wide shortcut map populated when records are persisted.
//! Reference validation consults it to skip backend existence checks for
//! targets known to be live. The backing storage is always authoritative; a
//! missing or evicted entry only costs a lookup. The directory watcher
//! evicts entries whose backing file changed or disappeared out-of-band.

use dashmap::DashMap;
use shelf_core::RecordId;

#[derive(Debug, Clone)]
struct CacheEntry {
    repository: String,
    bucket: String,
    stamp: u64,
}

/// Concurrent map from record id to (repository, bucket)
#[derive(Debug, Default)]
pub struct ObjectCache {
    entries: DashMap<RecordId, CacheEntry>,
}

impl ObjectCache {
    /// Create an empty cache
    pub fn new() -> Self {
        ObjectCache::default()
    }

    /// Register a freshly persisted record
    ///
    /// `stamp` is the backend's change stamp of the record file at
    /// registration time; the watcher compares against it.
    pub fn register(
        &self,
        id: RecordId,
        repository: impl Into<String>,
        bucket: impl Into<String>,
        stamp: u64,
    ) {
        self.entries.insert(
            id,
            CacheEntry {
                repository: repository.into(),
                bucket: bucket.into(),
                stamp,
            },
        );
    }

    /// Owning (repository, bucket) of a cached record id
    pub fn locate(&self, id: RecordId) -> Option<(String, String)> {
        self.entries
            .get(&id)
            .map(|e| (e.repository.clone(), e.bucket.clone()))
    }

    /// Whether an id is currently cached
    pub fn contains(&self, id: RecordId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Drop one entry; returns true if it was present
    pub fn evict(&self, id: RecordId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Drop every entry pointing into a bucket
    pub fn evict_bucket(&self, repository: &str, bucket: &str) {
        self.entries
            .retain(|_, e| !(e.repository == repository && e.bucket == bucket));
    }

    /// Drop every entry pointing into a repository
    pub fn evict_repository(&self, repository: &str) {
        self.entries.retain(|_, e| e.repository != repository);
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (id, storage key, registration stamp) for every entry
    ///
    /// The watcher iterates this snapshot; entries registered mid-poll are
    /// picked up on the next cycle.
    pub(crate) fn snapshot(&self) -> Vec<(RecordId, String, u64)> {
        self.entries
            .iter()
            .map(|e| {
                (
                    *e.key(),
                    format!("{}/{}/{}", e.repository, e.bucket, e.key()),
                    e.stamp,
                )
            })
            .collect()
    }
}
