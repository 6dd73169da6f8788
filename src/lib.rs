//! Shelf - a lightweight file-backed object store
//!
//! Shelf persists schema-flexible records into named buckets grouped into
//! repositories, one wire-format file per record. It provides structural
//! type checking, lazy cross-record references, secondary indices, and
//! multi-bucket transactions with optimistic conflict detection.
//!
//! # Quick Start
//!
//! ```no_run
//! use shelfdb::{BucketKind, Record, Store};
//!
//! # fn main() -> shelfdb::Result<()> {
//! let store = Store::open("/var/lib/myapp/store")?;
//! let people = store.make_repository("people")?;
//! let births = people.make_bucket("births", BucketKind::Plain)?;
//!
//! let mut record = Record::new();
//! record.put("name", "ada")?;
//! record.put("year", 1815i32)?;
//! let id = births.make_persistent(&mut record)?;
//!
//! let loaded = births.get(id)?;
//! assert_eq!(loaded.get_str("name")?, "ada");
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! The workspace splits into four layers: `shelf-core` (values, records,
//! structural types, error taxonomy), `shelf-storage` (wire codec and
//! storage backends), `shelf-concurrency` (optimistic transactions), and
//! `shelf-engine` (store, repositories, buckets, indices, type factory,
//! object cache, watcher). This crate re-exports the public surface.

pub use shelf_concurrency::{Transaction, TransactionManager, TransactionStatus};
pub use shelf_core::{
    Error, FieldKind, FieldShape, IdGenerator, RandomIds, Record, RecordId, Result, Scalar,
    SequentialIds, StorageBackend, StoreReference, TypeDescriptor, TypeLabelId, Value,
};
pub use shelf_engine::{
    Bucket, BucketKind, Index, ObjectCache, Repository, ResolveReference, Sink, Store, TypeFactory,
};
pub use shelf_storage::{read_record, write_record, FsBackend, MemBackend};
