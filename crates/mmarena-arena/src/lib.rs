//! Manually owned arenas of fixed-size records.
//!
//! A [`MemoryArena`] owns one contiguous buffer reserved from a
//! [`MemoryProvider`] outside the global allocator, lays out `N` records of
//! one element type in it and gives indexed, in-place access:
//!
//! ```text
//! MemoryArena<T, P>
//! ├── RecordLayout<T>   (shape + size, resolved once by mmarena-core)
//! ├── RawRegion         (base pointer, total bytes, access)
//! └── P::Buffer         (AnonMmap mapping or HeapProvider allocation)
//! ```
//!
//! ```
//! use mmarena_arena::{Describe, MemoryArena};
//!
//! #[derive(Clone, Copy, Debug, PartialEq, Describe)]
//! #[describe(crate = "mmarena_arena::mmarena_core")]
//! struct Coordinate {
//!     x: i64,
//!     y: i64,
//! }
//!
//! let mut arena = MemoryArena::allocate(&Coordinate { x: 0, y: 0 }, 3)?;
//! arena.write(1, &Coordinate { x: 17, y: 2 });
//! assert_eq!(*arena.read(1), Coordinate { x: 17, y: 2 });
//! arena.free()?;
//! # Ok::<(), mmarena_arena::ArenaError>(())
//! ```
//!
//! # Lifecycle
//!
//! `free` consumes the arena; `Drop` releases on every other path. For
//! callers that need copyable handles, [`ArenaTable`] checks every
//! [`ArenaId`] at runtime instead.
//!
//! # Safety boundary
//!
//! `unsafe` is confined to `arena`, `raw`, `provider` and the two provider
//! modules.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod arena;
pub mod config;
pub mod error;
pub mod heap;
pub mod mmap;
pub mod provider;
mod raw;
pub mod registry;

pub use arena::MemoryArena;
pub use config::ArenaConfig;
pub use error::ArenaError;
pub use heap::{HeapBuffer, HeapProvider, PAGE_ALIGNMENT};
pub use mmap::{AnonBuffer, AnonMmap};
pub use provider::{Access, MemoryProvider, ProviderError, RawBuffer};
pub use registry::{ArenaId, ArenaTable};

/// The shape and codec layer, re-exported for `#[describe(crate = ...)]`.
pub use mmarena_core;
pub use mmarena_core::{Describe, RecordLayout, Shape, ShapeKind};
pub use mmarena_derive::Describe;
