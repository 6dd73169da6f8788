//! Core types and traits for the shelf object store
//!
//! This crate defines the foundational types used throughout the system:
//! - RecordId / StoreReference: record identity and lazy cross-record pointers
//! - Value / Scalar: the closed tagged union a record field can hold
//! - Record: a labeled, schema-flexible tuple
//! - FieldKind / TypeDescriptor: structural type descriptors
//! - Error: the error taxonomy
//! - Traits: StorageBackend and IdGenerator abstraction seams

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod ident;
pub mod record;
pub mod schema;
pub mod traits;
pub mod types;
pub mod value;

pub use error::{Error, Result};
pub use ident::{RandomIds, SequentialIds};
pub use record::Record;
pub use schema::{FieldKind, FieldShape, TypeDescriptor};
pub use traits::{IdGenerator, StorageBackend};
pub use types::{RecordId, StoreReference, TypeLabelId};
pub use value::{Scalar, Value};
