//! Core traits for storage and identity abstraction
//!
//! The backend trait keeps bucket/repository logic independent of the
//! filesystem so an in-memory implementation can be substituted in tests;
//! the id-generator trait makes the store's identifier source injectable so
//! a deterministic generator can replace the random default.

use crate::error::Result;
use crate::types::RecordId;

/// Narrow storage abstraction for the file-backed store
///
/// Keys are relative, `/`-separated paths (`repository/bucket/record-id`);
/// prefixes name the directory-like levels above them (`repository` or
/// `repository/bucket`). The backing medium is the authoritative state of
/// every record; in-memory caches above this trait are shortcuts only.
///
/// Thread safety: all methods must be safe to call concurrently from
/// multiple threads (requires Send + Sync).
pub trait StorageBackend: Send + Sync {
    /// Read the full contents stored under `key`
    ///
    /// Returns None if the key does not exist.
    ///
    /// # Errors
    /// Returns an error if the underlying read fails.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write `bytes` under `key`, replacing any previous contents
    ///
    /// The write must be atomic per key: a concurrent reader sees either the
    /// old contents or the new, never a torn mix.
    ///
    /// # Errors
    /// Returns an error if the underlying write fails.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Remove `key`; returns true if it existed
    ///
    /// # Errors
    /// Returns an error if the underlying delete fails.
    fn delete(&self, key: &str) -> Result<bool>;

    /// Whether `key` currently exists
    ///
    /// # Errors
    /// Returns an error if the underlying check fails.
    fn exists(&self, key: &str) -> Result<bool>;

    /// Leaf key names stored directly under `prefix`, unordered
    ///
    /// Child prefixes are not included.
    ///
    /// # Errors
    /// Returns an error if `prefix` does not exist or listing fails.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Cheap change stamp for `key`
    ///
    /// Returns None if the key does not exist. Two reads of an unchanged key
    /// return the same stamp; an external rewrite changes it. Used by the
    /// watcher to detect out-of-band modifications without reading contents.
    ///
    /// # Errors
    /// Returns an error if the underlying check fails.
    fn stamp(&self, key: &str) -> Result<Option<u64>>;

    /// Create `prefix` (and any missing parents); idempotent
    ///
    /// # Errors
    /// Returns an error if creation fails.
    fn make_prefix(&self, prefix: &str) -> Result<()>;

    /// Whether `prefix` currently exists
    ///
    /// # Errors
    /// Returns an error if the underlying check fails.
    fn prefix_exists(&self, prefix: &str) -> Result<bool>;

    /// Remove `prefix` with every key and child prefix under it
    ///
    /// # Errors
    /// Returns an error if removal fails.
    fn drop_prefix(&self, prefix: &str) -> Result<()>;

    /// Immediate child prefixes of `prefix`, unordered
    ///
    /// Pass the empty string for the top level.
    ///
    /// # Errors
    /// Returns an error if listing fails.
    fn list_prefixes(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Source of fresh record identities
///
/// The default implementation draws pseudo-random positive 63-bit integers,
/// relying on the astronomically low collision probability instead of
/// coordination; persistence still refuses an id whose file already exists.
pub trait IdGenerator: Send + Sync {
    /// Produce a fresh positive 63-bit identifier
    fn next_id(&self) -> RecordId;
}
