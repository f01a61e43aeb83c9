//! Arena-specific error types.

use std::error::Error;
use std::fmt;

use mmarena_core::{CodecError, ShapeError, SizeError};

use crate::provider::ProviderError;

/// Errors that can occur during arena operations.
#[derive(Debug)]
pub enum ArenaError {
    /// An arena must hold at least one record.
    InvalidCount,
    /// The element type cannot be stored in raw memory.
    Shape(ShapeError),
    /// The element type could not be sized.
    Size(SizeError),
    /// Marshalling into the arena buffer failed.
    Codec(CodecError),
    /// The arena would exceed the configured byte limit.
    CapacityExceeded {
        /// Bytes per record slot.
        record_size: usize,
        /// Number of records requested.
        count: usize,
        /// Configured maximum in bytes.
        limit: usize,
    },
    /// The memory provider could not reserve the buffer. No arena was
    /// constructed.
    Allocation(ProviderError),
    /// The memory provider failed to release the buffer.
    Release(ProviderError),
    /// A checked access named a slot past the end.
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// Number of records in the arena.
        count: usize,
    },
    /// A type-erased write carried a value of another type.
    TypeMismatch {
        /// The arena's element type.
        expected: &'static str,
    },
    /// The arena was sealed read-only.
    ReadOnly,
    /// The handle refers to an arena that has already been freed.
    Freed,
    /// An [`ArenaTable`](crate::ArenaTable) has used up every slot index.
    TableFull,
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCount => write!(f, "record count must be > 0"),
            Self::Shape(e) => write!(f, "unsupported element type: {e}"),
            Self::Size(e) => write!(f, "cannot size element type: {e}"),
            Self::Codec(e) => write!(f, "cannot write record: {e}"),
            Self::CapacityExceeded {
                record_size,
                count,
                limit,
            } => write!(
                f,
                "arena capacity exceeded: {count} records of {record_size} bytes, limit {limit} bytes"
            ),
            Self::Allocation(e) => write!(f, "arena allocation failed: {e}"),
            Self::Release(e) => write!(f, "arena release failed: {e}"),
            Self::IndexOutOfBounds { index, count } => {
                write!(f, "index {index} out of bounds for {count} records")
            }
            Self::TypeMismatch { expected } => {
                write!(f, "type mismatch: arena holds {expected}")
            }
            Self::ReadOnly => write!(f, "arena is read-only"),
            Self::Freed => write!(f, "arena has been freed"),
            Self::TableFull => write!(f, "arena table has no slot index left"),
        }
    }
}

impl Error for ArenaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Shape(e) => Some(e),
            Self::Size(e) => Some(e),
            Self::Codec(e) => Some(e),
            Self::Allocation(e) | Self::Release(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for ArenaError {
    fn from(e: ShapeError) -> Self {
        Self::Shape(e)
    }
}

impl From<SizeError> for ArenaError {
    fn from(e: SizeError) -> Self {
        match e {
            SizeError::Shape(e) => Self::Shape(e),
            other => Self::Size(other),
        }
    }
}

impl From<CodecError> for ArenaError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Shape(e) => Self::Shape(e),
            CodecError::Size(e) => e.into(),
            other => Self::Codec(other),
        }
    }
}
