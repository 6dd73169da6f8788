//! Store engine: repositories, buckets, types, caching, and watching
//!
//! This crate ties the value model, wire codec, and transaction machinery
//! together into the user-facing store:
//! - [`Store`]: root object owning all shared services
//! - [`Repository`] / [`Bucket`]: the two directory levels records live in
//! - [`TypeFactory`]: structural reference-type registry
//! - [`ObjectCache`] + [`Watcher`]: id location shortcuts kept honest
//!   against out-of-band filesystem changes
//! - [`Index`]: persisted secondary indices for indexed buckets

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bucket;
pub mod cache;
pub mod index;
pub mod repository;
pub mod store;
pub mod typefactory;
pub mod watcher;

pub use bucket::{Bucket, BucketKind, RecordIter, Sink};
pub use cache::ObjectCache;
pub use index::Index;
pub use repository::Repository;
pub use store::{ResolveReference, Store, WATCH_INTERVAL};
pub use typefactory::TypeFactory;
pub use watcher::Watcher;
