//! Storage layer for the shelf object store
//!
//! This crate implements:
//! - the wire-format codec (streaming tokenizer, record reader/writer)
//! - FsBackend: the directory-backed production backend
//! - MemBackend: an in-memory backend for tests
//!
//! Both backends implement `shelf_core::StorageBackend`, so bucket and
//! repository logic above this crate never touches the filesystem directly.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod fs;
pub mod mem;

pub use codec::{read_record, write_record, Token, Tokenizer};
pub use fs::FsBackend;
pub use mem::MemBackend;
