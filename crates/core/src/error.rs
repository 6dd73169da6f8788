//! Error types for the shelf object store
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use std::io;
use thiserror::Error;

/// Result type alias for shelf operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the shelf object store
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Null or empty label used as a field key
    #[error("illegal key: {0}")]
    IllegalKey(String),

    /// Read of an absent label
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Accessor kind does not match the stored value kind
    #[error("type mismatch for label {label}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Label that was accessed
        label: String,
        /// Kind the accessor asked for
        expected: &'static str,
        /// Kind actually stored under the label
        found: &'static str,
    },

    /// Persistence or structural-validation failure at the bucket level
    #[error("bucket error: {0}")]
    Bucket(String),

    /// Bucket/repository name collision, missing repository or bucket,
    /// or filesystem creation failure
    #[error("repository error: {0}")]
    Repository(String),

    /// Store root creation or initialization failure
    #[error("store error: {0}")]
    Store(String),

    /// Optimistic-concurrency conflict detected at commit time
    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    /// Malformed wire-format input
    #[error("parse error at offset {offset}: expected {expected}, found {found}")]
    Parse {
        /// Symbol the parser expected next
        expected: String,
        /// Symbol actually found
        found: String,
        /// Byte offset of the failure in the input
        offset: usize,
    },
}

impl Error {
    /// Bucket-level failure with a formatted message
    pub fn bucket(msg: impl Into<String>) -> Self {
        Error::Bucket(msg.into())
    }

    /// Repository-level failure with a formatted message
    pub fn repository(msg: impl Into<String>) -> Self {
        Error::Repository(msg.into())
    }

    /// Store-level failure with a formatted message
    pub fn store(msg: impl Into<String>) -> Self {
        Error::Store(msg.into())
    }

    /// Commit conflict with a formatted message
    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::TransactionFailed(msg.into())
    }
}
