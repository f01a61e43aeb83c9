//! Shape classification, sizing and byte-level marshalling for off-heap
//! records.
//!
//! This is the leaf crate of the mmarena workspace. It decides which Rust
//! types can live in raw memory, how many bytes they occupy and how their
//! bytes are copied into and viewed out of a flat buffer:
//!
//! - [`Describe`]: per-type structural description, implemented for scalars,
//!   arrays, raw pointers and derived structs (and, with an `Invalid` shape,
//!   for the std containers that can never be stored).
//! - [`classify`]: recursive structural validation of a [`Shape`].
//! - [`sizer`]: layout size computation, including flattened sizing that
//!   follows non-null references.
//! - [`codec`]: marshal a value into a buffer and view it back in place.
//! - [`RecordLayout`]: a shape validated and sized once per element type.
//!
//! # Safety boundary
//!
//! `unsafe` is denied crate-wide and re-allowed only in `describe`, `sizer`,
//! `codec` and `layout`, where raw pointers are followed and bytes are
//! reinterpreted.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

// Lets `#[derive(Describe)]` expand to `::mmarena_core::...` inside this crate's tests.
extern crate self as mmarena_core;

pub mod classify;
pub mod codec;
pub mod describe;
pub mod endian;
pub mod error;
pub mod layout;
pub mod shape;
pub mod sizer;

pub use classify::{classify, classify_value, classify_with, validate, ShapePolicy};
pub use codec::{marshal, marshal_flat, view, FlatView};
pub use describe::{Describe, Flattener};
pub use endian::{ByteOrder, NATIVE_BYTE_ORDER};
pub use error::{CodecError, ShapeError, SizeError};
pub use layout::RecordLayout;
pub use shape::{FieldShape, InvalidKind, NumericKind, ReferenceShape, Shape, ShapeKind, StructShape};
