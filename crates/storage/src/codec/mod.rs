//! Wire format codec
//!
//! Records persist as a JSON-like text form, one object per record. The
//! tokenizer, reader and writer live here; buckets use them for every disk
//! read and write.

pub mod reader;
pub mod token;
pub mod writer;

pub use reader::{read_record, ID_KEY, TYPE_KEY};
pub use token::{Token, Tokenizer};
pub use writer::write_record;
