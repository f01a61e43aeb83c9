//! Integration test: allocation failures and buffer release.
//!
//! Every reserved buffer must be returned to its provider exactly once,
//! whether the arena is freed explicitly, dropped, or never finished
//! allocating.

use mmarena_arena::{Access, ArenaConfig, ArenaError, ArenaTable, MemoryArena, ProviderError};
use mmarena_test_utils::fixtures::WithText;
use mmarena_test_utils::{Coordinate, FailingProvider, ShortProvider, TrackingProvider};

fn tracked(count: usize) -> (MemoryArena<Coordinate, TrackingProvider>, TrackingProvider) {
    let provider = TrackingProvider::new();
    let arena = MemoryArena::allocate_in(
        provider.clone(),
        ArenaConfig::default(),
        &Coordinate::new(1, 1),
        count,
    )
    .unwrap();
    (arena, provider)
}

// ── Release exactly once ───────────────────────────────────────────

#[test]
fn free_releases_once() {
    let (arena, provider) = tracked(16);
    assert_eq!(provider.counts().reserved(), 1);
    assert_eq!(provider.counts().live_bytes(), 16 * 16);
    arena.free().unwrap();
    assert_eq!(provider.counts().released(), 1);
    assert_eq!(provider.counts().live_bytes(), 0);
}

#[test]
fn drop_releases_once() {
    let (arena, provider) = tracked(4);
    drop(arena);
    assert_eq!(provider.counts().released(), 1);
}

#[test]
fn unwinding_releases_once() {
    let provider = TrackingProvider::new();
    let inner = provider.clone();
    let result = std::panic::catch_unwind(move || {
        let arena =
            MemoryArena::allocate_in(inner, ArenaConfig::default(), &Coordinate::new(0, 0), 2)
                .unwrap();
        let _ = arena.read(2);
    });
    assert!(result.is_err());
    assert_eq!(provider.counts().reserved(), 1);
    assert_eq!(provider.counts().released(), 1);
}

#[test]
fn table_free_releases_once() {
    let (arena, provider) = tracked(2);
    let mut table = ArenaTable::new();
    let id = table.insert(arena).unwrap();
    table.free(id).unwrap();
    assert!(table.free(id).is_err());
    drop(table);
    assert_eq!(provider.counts().released(), 1);
}

#[test]
fn dropping_a_table_releases_its_arenas() {
    let (first, provider) = tracked(2);
    let second = MemoryArena::allocate_in(
        provider.clone(),
        ArenaConfig::default(),
        &Coordinate::new(0, 0),
        2,
    )
    .unwrap();
    let mut table = ArenaTable::new();
    table.insert(first).unwrap();
    table.insert(second).unwrap();
    assert_eq!(table.len(), 2);
    drop(table);
    assert_eq!(provider.counts().reserved(), 2);
    assert_eq!(provider.counts().released(), 2);
}

// ── Failed allocations ─────────────────────────────────────────────

#[test]
fn provider_failure_is_an_allocation_error() {
    let err = MemoryArena::allocate_in(
        FailingProvider::on_reserve(),
        ArenaConfig::default(),
        &Coordinate::new(0, 0),
        4,
    )
    .unwrap_err();
    assert!(matches!(err, ArenaError::Allocation(ProviderError::Os(_))));
}

#[test]
fn unsuitable_buffer_is_released_again() {
    let provider = ShortProvider::new();
    let err = MemoryArena::allocate_in(
        provider.clone(),
        ArenaConfig::default(),
        &Coordinate::new(0, 0),
        4,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ArenaError::Allocation(ProviderError::Layout { len: 64, .. })
    ));
    assert_eq!(provider.counts().reserved(), 1);
    assert_eq!(provider.counts().released(), 1);
}

#[test]
fn failed_seal_leaves_nothing_reserved() {
    let provider = FailingProvider::on_seal();
    let err = MemoryArena::allocate_in(
        provider.clone(),
        ArenaConfig::new().with_access(Access::ReadOnly),
        &Coordinate::new(1, 2),
        4,
    )
    .unwrap_err();
    assert!(matches!(err, ArenaError::Allocation(ProviderError::Os(_))));
    assert_eq!(provider.counts().reserved(), 1);
    assert_eq!(provider.counts().released(), 1);
    assert_eq!(provider.counts().live_bytes(), 0);
    assert_eq!(provider.release_attempts(), 1);
}

#[test]
fn rejected_shapes_never_reach_the_provider() {
    let provider = TrackingProvider::new();
    let err = MemoryArena::allocate_in(
        provider.clone(),
        ArenaConfig::default(),
        &WithText::sample(),
        4,
    )
    .unwrap_err();
    assert!(matches!(err, ArenaError::Shape(_)));
    assert_eq!(provider.counts().reserved(), 0);
}

#[test]
fn capacity_limit_never_reaches_the_provider() {
    let provider = TrackingProvider::new();
    let config = ArenaConfig::new().with_max_total_bytes(1024);
    let err = MemoryArena::allocate_in(provider.clone(), config, &Coordinate::new(0, 0), 65)
        .unwrap_err();
    assert!(matches!(err, ArenaError::CapacityExceeded { limit: 1024, .. }));
    assert_eq!(provider.counts().reserved(), 0);
}

// ── Failed releases ────────────────────────────────────────────────

#[test]
fn release_failure_surfaces_from_free() {
    let provider = FailingProvider::on_release();
    let arena = MemoryArena::allocate_in(
        provider.clone(),
        ArenaConfig::default(),
        &Coordinate::new(0, 0),
        1,
    )
    .unwrap();
    let err = arena.free().unwrap_err();
    assert!(matches!(err, ArenaError::Release(ProviderError::Os(_))));
    assert_eq!(provider.release_attempts(), 1);
}

#[test]
fn release_failure_on_drop_is_not_retried() {
    let provider = FailingProvider::on_release();
    let arena = MemoryArena::allocate_in(
        provider.clone(),
        ArenaConfig::default(),
        &Coordinate::new(0, 0),
        1,
    )
    .unwrap();
    drop(arena);
    assert_eq!(provider.release_attempts(), 1);
}
