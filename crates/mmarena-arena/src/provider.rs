//! The raw memory provider contract.
//!
//! An arena depends only on two operations: reserve a buffer of a given
//! length and access, and release it. [`AnonMmap`](crate::AnonMmap) and
//! [`HeapProvider`](crate::HeapProvider) implement them.

#![allow(unsafe_code)]

use std::error::Error;
use std::fmt;
use std::io;

/// Access rights of a reserved buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Access {
    /// Readable, not writable.
    ReadOnly,
    /// Readable and writable.
    #[default]
    ReadWrite,
}

impl Access {
    /// Whether the buffer may be written.
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::ReadWrite)
    }
}

/// A block of raw memory owned by a provider.
///
/// # Safety
///
/// Implementations promise that:
///
/// - `as_ptr()` is non-null and valid for reads of `len()` bytes for as
///   long as the buffer exists;
/// - the address does not change when the buffer value is moved;
/// - `as_mut_ptr()`, when it returns `Some`, points to the same memory and
///   is valid for writes of `len()` bytes;
/// - every byte is initialized (providers hand out zeroed memory).
pub unsafe trait RawBuffer {
    /// Start of the buffer.
    fn as_ptr(&self) -> *const u8;

    /// Start of the buffer for writing, or `None` when it is read-only.
    fn as_mut_ptr(&mut self) -> Option<*mut u8>;

    /// Length in bytes.
    fn len(&self) -> usize;

    /// Whether the buffer has no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A source of raw memory buffers.
pub trait MemoryProvider {
    /// The buffer type handed out by [`MemoryProvider::reserve`].
    type Buffer: RawBuffer;

    /// Reserve a zeroed buffer of exactly `len` bytes.
    fn reserve(&self, len: usize, access: Access) -> Result<Self::Buffer, ProviderError>;

    /// Return a buffer. Takes it by value, so one buffer is released at
    /// most once.
    fn release(&self, buffer: Self::Buffer) -> Result<(), ProviderError>;

    /// Drop write access to a buffer.
    ///
    /// The default keeps the buffer as is; the arena then enforces
    /// read-only access itself.
    ///
    /// On failure the buffer is not handed back, so the provider must
    /// release it before returning the error.
    fn seal(&self, buffer: Self::Buffer) -> Result<Self::Buffer, ProviderError> {
        Ok(buffer)
    }
}

/// Errors reported by a [`MemoryProvider`].
#[derive(Debug)]
pub enum ProviderError {
    /// A zero-length buffer was requested.
    ZeroLength,
    /// The operating system refused the request.
    Os(io::Error),
    /// No buffer of this length and alignment can be produced.
    Layout {
        /// Requested length in bytes.
        len: usize,
        /// Required alignment in bytes.
        align: usize,
    },
    /// A writable buffer was required but the provider returned a
    /// read-only one.
    NotWritable,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroLength => write!(f, "zero-length reservation"),
            Self::Os(e) => write!(f, "os error: {e}"),
            Self::Layout { len, align } => {
                write!(f, "cannot provide {len} bytes aligned to {align}")
            }
            Self::NotWritable => write!(f, "buffer is not writable"),
        }
    }
}

impl Error for ProviderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Os(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ProviderError {
    fn from(e: io::Error) -> Self {
        Self::Os(e)
    }
}
