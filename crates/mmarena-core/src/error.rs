//! Error types for classification, sizing and marshalling.
//!
//! One [`ShapeError`] is shared by all three stages so that an unsupported
//! input is reported as the same kind whether it is caught by
//! [`classify`](crate::classify::classify), the [`sizer`](crate::sizer) or
//! the [`codec`](crate::codec).

use std::error::Error;
use std::fmt;

use crate::shape::ShapeKind;

/// A value's structure cannot be represented in raw memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShapeError {
    /// A node of the shape tree is not storable under the active policy.
    Unsupported {
        /// The offending kind.
        kind: ShapeKind,
        /// Path from the root type to the offending node,
        /// e.g. `Inventory.tags` or `Node.next*`.
        path: String,
    },
}

impl ShapeError {
    /// The offending kind.
    pub fn kind(&self) -> ShapeKind {
        match self {
            Self::Unsupported { kind, .. } => *kind,
        }
    }
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported { kind, path } => {
                write!(f, "unsupported {kind} at `{path}`")
            }
        }
    }
}

impl Error for ShapeError {}

/// Errors from the [`sizer`](crate::sizer).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SizeError {
    /// A nested shape is unsupported.
    Shape(ShapeError),
    /// The structural size disagrees with the compiler's `size_of`.
    ///
    /// Only reachable through a hand-written [`Describe`](crate::Describe)
    /// impl that misreports its fields.
    LayoutMismatch {
        /// The type whose layout disagrees.
        type_name: &'static str,
        /// Size reported by the type.
        declared: usize,
        /// Size computed from its fields.
        computed: usize,
    },
    /// Flattened sizing reached a pointee already on the current path.
    ReferenceCycle {
        /// Type of the pointee that closed the cycle.
        type_name: &'static str,
    },
    /// The size does not fit in `usize`.
    Overflow,
}

impl SizeError {
    /// The offending kind, if this is a shape error.
    pub fn shape_kind(&self) -> Option<ShapeKind> {
        match self {
            Self::Shape(e) => Some(e.kind()),
            _ => None,
        }
    }
}

impl fmt::Display for SizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shape(e) => write!(f, "cannot size value: {e}"),
            Self::LayoutMismatch {
                type_name,
                declared,
                computed,
            } => write!(
                f,
                "layout mismatch for {type_name}: declared {declared} bytes, fields imply {computed} bytes"
            ),
            Self::ReferenceCycle { type_name } => {
                write!(f, "reference cycle through a {type_name}")
            }
            Self::Overflow => write!(f, "size overflows usize"),
        }
    }
}

impl Error for SizeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Shape(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for SizeError {
    fn from(e: ShapeError) -> Self {
        Self::Shape(e)
    }
}

/// Errors from the [`codec`](crate::codec).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodecError {
    /// The value's shape is unsupported.
    Shape(ShapeError),
    /// The value could not be sized.
    Size(SizeError),
    /// The destination cannot hold the marshalled bytes.
    BufferTooSmall {
        /// Bytes needed.
        required: usize,
        /// Bytes available.
        available: usize,
    },
    /// A view window falls outside the buffer.
    OutOfBounds {
        /// Start of the window.
        offset: usize,
        /// Width of the window.
        len: usize,
        /// Length of the buffer.
        buffer: usize,
    },
    /// A view window is not aligned for its type.
    Misaligned {
        /// Start of the window.
        offset: usize,
        /// Required alignment.
        align: usize,
    },
}

impl CodecError {
    /// The offending kind, if this error comes from an unsupported shape.
    pub fn shape_kind(&self) -> Option<ShapeKind> {
        match self {
            Self::Shape(e) => Some(e.kind()),
            Self::Size(e) => e.shape_kind(),
            _ => None,
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shape(e) => write!(f, "cannot marshal value: {e}"),
            Self::Size(e) => write!(f, "cannot marshal value: {e}"),
            Self::BufferTooSmall {
                required,
                available,
            } => write!(
                f,
                "buffer too small: need {required} bytes, have {available}"
            ),
            Self::OutOfBounds {
                offset,
                len,
                buffer,
            } => write!(
                f,
                "window {offset}..{} out of bounds for a {buffer}-byte buffer",
                offset.saturating_add(*len)
            ),
            Self::Misaligned { offset, align } => {
                write!(f, "offset {offset} is not aligned to {align} bytes")
            }
        }
    }
}

impl Error for CodecError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Shape(e) => Some(e),
            Self::Size(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for CodecError {
    fn from(e: ShapeError) -> Self {
        Self::Shape(e)
    }
}

impl From<SizeError> for CodecError {
    fn from(e: SizeError) -> Self {
        match e {
            SizeError::Shape(e) => Self::Shape(e),
            other => Self::Size(other),
        }
    }
}
