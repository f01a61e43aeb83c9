//! Test utilities and mock providers for mmarena development.
//!
//! - [`fixtures`]: record types used across the workspace's tests and
//!   benches, plus one struct per unsupported field kind.
//! - [`providers`]: [`MemoryProvider`](mmarena_arena::MemoryProvider)
//!   mocks that fail on demand or count reservations and releases.

#![deny(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;
pub mod providers;

pub use fixtures::{Coordinate, Link, Mixed, Particle};
pub use providers::{FailingProvider, ShortProvider, TrackingProvider};
