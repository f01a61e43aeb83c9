//! Benchmark profiles for mmarena.
//!
//! - [`REFERENCE_COUNT`] / [`STRESS_COUNT`]: record counts for arena benches
//! - [`reference_arena`]: a particle arena of [`REFERENCE_COUNT`] records
//! - [`particles`]: deterministic particle values to write
//! - [`linked_chain`]: a self-contained linked list for flattening benches

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use mmarena_arena::{ArenaConfig, ArenaError, HeapProvider, MemoryArena};
use mmarena_test_utils::{Link, Particle};

/// Records in the reference profile (10K).
pub const REFERENCE_COUNT: usize = 10_000;

/// Records in the stress profile (1M).
pub const STRESS_COUNT: usize = 1_000_000;

/// Allocate a heap-backed particle arena of [`REFERENCE_COUNT`] records.
pub fn reference_arena() -> Result<MemoryArena<Particle, HeapProvider>, ArenaError> {
    MemoryArena::allocate_in(
        HeapProvider::new(),
        ArenaConfig::default(),
        &Particle::default(),
        REFERENCE_COUNT,
    )
}

/// `count` distinct particles, the same for every `seed`.
pub fn particles(count: usize, seed: u64) -> Vec<Particle> {
    (0..count as u64)
        .map(|i| Particle::at(i.wrapping_mul(0x9e37_79b9).wrapping_add(seed)))
        .collect()
}

/// A chain of `len` links, each pointing at the next; the last is null.
///
/// The links live in one boxed slice, so the pointers stay valid as long as
/// the box does.
pub fn linked_chain(len: usize) -> Box<[Link]> {
    let mut links: Box<[Link]> = (0..len as u64)
        .map(|value| Link::new(value, std::ptr::null()))
        .collect();
    for i in 1..len {
        let next: *const Link = &links[i];
        links[i - 1].next = next;
    }
    links
}
