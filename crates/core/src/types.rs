//! Identity types for the shelf object store
//!
//! This module defines:
//! - RecordId: 63-bit positive record identity
//! - TypeLabelId: integer id naming a registered reference type
//! - StoreReference: lazily resolved pointer to a record

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer id naming a registered reference type
pub type TypeLabelId = i64;

/// Unique identity of a persistent record
///
/// A RecordId is a positive 63-bit integer, generated (not sequential) and
/// unique for the lifetime of a store. A record has no id until it is first
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(i64);

impl RecordId {
    /// Create a RecordId from a raw integer
    ///
    /// # Errors
    /// Fails with `Error::Store` if the value is not positive.
    pub fn from_i64(value: i64) -> Result<Self> {
        if value > 0 {
            Ok(RecordId(value))
        } else {
            Err(Error::store(format!(
                "record id must be a positive 63-bit integer, got {value}"
            )))
        }
    }

    /// Get the raw integer value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lazily resolved pointer to a record: (repository, bucket, id)
///
/// References are stored as plain coordinates; the target record is only
/// loaded when a caller explicitly resolves the reference through the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreReference {
    /// Name of the repository containing the target
    pub repository: String,
    /// Name of the bucket containing the target
    pub bucket: String,
    /// Identity of the target record
    pub id: RecordId,
}

impl StoreReference {
    /// Create a new reference
    pub fn new(repository: impl Into<String>, bucket: impl Into<String>, id: RecordId) -> Self {
        StoreReference {
            repository: repository.into(),
            bucket: bucket.into(),
            id,
        }
    }

    /// Backend key of the target record file: `repository/bucket/id`
    pub fn storage_key(&self) -> String {
        format!("{}/{}/{}", self.repository, self.bucket, self.id)
    }
}

impl fmt::Display for StoreReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.repository, self.bucket, self.id)
    }
}
