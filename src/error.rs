use std::io;

use thiserror::Error;

use crate::records::RecordId;

/// Misuse of the table mutation API.
///
/// Uniqueness collisions and lookup misses are not errors: they are reported
/// through `Option`/`bool` results. A `TableError` always points at a bug in
/// the caller.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum TableError {
    /// The handle does not resolve to a live record of this table.
    #[error("record {0:?} is not held by this table")]
    UnknownRecord(RecordId),

    /// The field being mutated is the one the cursor walks.
    #[error("field {field} cannot be mutated through a cursor walking that same field")]
    IteratedField { field: usize },

    /// The cursor already walked past the last record.
    #[error("cursor does not point at a record")]
    ExhaustedCursor,
}

/// Failure while encoding or decoding the binary wire format.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("input ended before the value was complete")]
    Truncated,

    #[error("i/o error: {0}")]
    Io(io::Error),

    #[error("declared length {len} exceeds the limit of {max}")]
    LengthLimit { len: u64, max: u64 },

    #[error("string bytes are not valid utf-8")]
    InvalidUtf8,

    #[error("invalid bool byte {0:#04x}")]
    InvalidBool(u8),

    #[error("invalid char scalar {0:#x}")]
    InvalidChar(u32),

    #[error("ordered collection repeats a key")]
    DuplicateKey,

    #[error("record collides on unique field {index}")]
    UniqueViolation { index: usize },

    #[error("{0} bytes left over after the value")]
    TrailingBytes(usize),
}

impl From<io::Error> for CodecError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => Self::Truncated,
            _ => Self::Io(err),
        }
    }
}
