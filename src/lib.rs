//! In-memory multi-index tables.
//!
//! A [Table] owns records of one type and keeps one ordered index per field,
//! so records can be looked up, iterated, updated and erased through any of
//! them. Range queries over those indices combine with `&` and `|` and are
//! evaluated lazily. The [codec] module provides the binary format tables and
//! their records are persisted with.

pub mod codec;
pub mod entry;
pub mod error;
pub mod index;
pub mod query;
mod records;
pub mod shape;
pub mod table;

pub use codec::{Decode, DecodeLimits, Decoder, Encode, deserialize, from_bytes, serialize, to_bytes};
pub use entry::{Entry, Field, Uniqueness};
pub use error::{CodecError, TableError};
pub use index::{FieldIndex, IndexGroup, IndexSet, Key};
pub use query::Query;
pub use records::RecordId;
pub use shape::{Shape, is_container, is_contiguous, is_tuploid};
pub use table::{Cursor, Table};
