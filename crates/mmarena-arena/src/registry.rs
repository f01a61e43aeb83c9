//! Slot+generation table of live arenas.
//!
//! For callers that cannot hold a [`MemoryArena`] by value (an FFI boundary,
//! a scripting host, a long-lived registry) the table hands out copyable
//! [`ArenaId`]s instead. A freed id has a stale generation: every operation
//! on it, including a second free, fails with [`ArenaError::Freed`] rather
//! than touching released memory.

use std::fmt;

use mmarena_core::Describe;

use crate::arena::MemoryArena;
use crate::error::ArenaError;
use crate::mmap::AnonMmap;
use crate::provider::MemoryProvider;

/// Handle to an arena in an [`ArenaTable`].
///
/// Upper 32 bits: slot index. Lower 32 bits: generation.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaId(u64);

impl ArenaId {
    fn new(slot: u32, generation: u32) -> Self {
        Self(((slot as u64) << 32) | (generation as u64))
    }

    fn slot(self) -> u32 {
        (self.0 >> 32) as u32
    }

    fn generation(self) -> u32 {
        self.0 as u32
    }

    /// The raw encoding, for passing across a boundary.
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Rebuild an id from [`ArenaId::to_raw`].
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for ArenaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArenaId({}v{})", self.slot(), self.generation())
    }
}

struct Slot<A> {
    generation: u32,
    arena: Option<A>,
}

/// Owns arenas and maps [`ArenaId`]s to them.
///
/// Reuses slots through a free list. A slot whose generation would wrap is
/// retired instead, so an old id can never resolve to a newer arena.
pub struct ArenaTable<T, P: MemoryProvider = AnonMmap> {
    slots: Vec<Slot<MemoryArena<T, P>>>,
    free_list: Vec<u32>,
    live: usize,
}

impl<T: Describe, P: MemoryProvider> ArenaTable<T, P> {
    /// An empty table.
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            live: 0,
        }
    }

    /// Number of live arenas.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether no arena is live.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Take ownership of `arena` and return its id.
    ///
    /// Fails with [`ArenaError::TableFull`] once every `u32` slot index is
    /// taken or retired; the arena is then dropped, releasing its buffer.
    pub fn insert(&mut self, arena: MemoryArena<T, P>) -> Result<ArenaId, ArenaError> {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.arena = Some(arena);
            self.live += 1;
            return Ok(ArenaId::new(index, slot.generation));
        }
        let index = slot_index(self.slots.len())?;
        self.slots.push(Slot {
            generation: 0,
            arena: Some(arena),
        });
        self.live += 1;
        Ok(ArenaId::new(index, 0))
    }

    /// The arena behind `id`.
    pub fn get(&self, id: ArenaId) -> Result<&MemoryArena<T, P>, ArenaError> {
        self.slots
            .get(id.slot() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.arena.as_ref())
            .ok_or(ArenaError::Freed)
    }

    /// The arena behind `id`, mutably.
    pub fn get_mut(&mut self, id: ArenaId) -> Result<&mut MemoryArena<T, P>, ArenaError> {
        self.slots
            .get_mut(id.slot() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.arena.as_mut())
            .ok_or(ArenaError::Freed)
    }

    /// Checked read of record `index` of arena `id`.
    pub fn read(&self, id: ArenaId, index: usize) -> Result<&T, ArenaError> {
        let arena = self.get(id)?;
        arena.get(index).ok_or(ArenaError::IndexOutOfBounds {
            index,
            count: arena.record_count(),
        })
    }

    /// Checked write of record `index` of arena `id`.
    pub fn write(&mut self, id: ArenaId, index: usize, value: &T) -> Result<(), ArenaError> {
        self.get_mut(id)?.try_write(index, value)
    }

    /// Free arena `id`.
    ///
    /// The id is stale afterwards, even if the provider fails to release
    /// the buffer. Freeing a stale id fails with [`ArenaError::Freed`].
    pub fn free(&mut self, id: ArenaId) -> Result<(), ArenaError> {
        let index = id.slot();
        let slot = self
            .slots
            .get_mut(index as usize)
            .filter(|slot| slot.generation == id.generation())
            .ok_or(ArenaError::Freed)?;
        let arena = slot.arena.take().ok_or(ArenaError::Freed)?;
        slot.generation = slot.generation.wrapping_add(1);
        // A wrapped generation would match ids from the slot's first epoch.
        if slot.generation != 0 {
            self.free_list.push(index);
        }
        self.live -= 1;
        arena.free()
    }
}

fn slot_index(len: usize) -> Result<u32, ArenaError> {
    u32::try_from(len).map_err(|_| ArenaError::TableFull)
}

impl<T: Describe, P: MemoryProvider> Default for ArenaTable<T, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, P: MemoryProvider> fmt::Debug for ArenaTable<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaTable")
            .field("slots", &self.slots.len())
            .field("live", &self.live)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ArenaConfig, HeapProvider};

    type Table = ArenaTable<u32, HeapProvider>;

    fn arena(template: u32) -> MemoryArena<u32, HeapProvider> {
        MemoryArena::allocate_in(HeapProvider::new(), ArenaConfig::default(), &template, 4)
            .unwrap()
    }

    #[test]
    fn insert_read_write_round_trip() {
        let mut table = Table::new();
        let id = table.insert(arena(5)).unwrap();
        assert_eq!(*table.read(id, 3).unwrap(), 5);
        table.write(id, 3, &6).unwrap();
        assert_eq!(*table.read(id, 3).unwrap(), 6);
        assert_eq!(table.get(id).unwrap().record_count(), 4);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn out_of_range_reads_are_reported() {
        let mut table = Table::new();
        let id = table.insert(arena(0)).unwrap();
        assert!(matches!(
            table.read(id, 4),
            Err(ArenaError::IndexOutOfBounds { index: 4, count: 4 })
        ));
    }

    #[test]
    fn freed_ids_fail() {
        let mut table = Table::new();
        let id = table.insert(arena(1)).unwrap();
        table.free(id).unwrap();
        assert!(table.is_empty());
        assert!(matches!(table.read(id, 0), Err(ArenaError::Freed)));
        assert!(matches!(table.write(id, 0, &2), Err(ArenaError::Freed)));
        assert!(matches!(table.get_mut(id), Err(ArenaError::Freed)));
    }

    #[test]
    fn double_free_is_an_error() {
        let mut table = Table::new();
        let id = table.insert(arena(1)).unwrap();
        table.free(id).unwrap();
        assert!(matches!(table.free(id), Err(ArenaError::Freed)));
    }

    #[test]
    fn reused_slot_does_not_revive_old_ids() {
        let mut table = Table::new();
        let old = table.insert(arena(1)).unwrap();
        table.free(old).unwrap();
        let new = table.insert(arena(2)).unwrap();
        assert_eq!(old.slot(), new.slot());
        assert_ne!(old.generation(), new.generation());
        assert!(matches!(table.read(old, 0), Err(ArenaError::Freed)));
        assert_eq!(*table.read(new, 0).unwrap(), 2);
    }

    #[test]
    fn never_issued_ids_fail() {
        let table = Table::new();
        assert!(matches!(
            table.get(ArenaId::new(999, 0)),
            Err(ArenaError::Freed)
        ));
    }

    #[test]
    fn slot_indices_stop_at_u32_max() {
        assert_eq!(slot_index(0).unwrap(), 0);
        assert_eq!(slot_index(u32::MAX as usize).unwrap(), u32::MAX);
        assert!(matches!(
            slot_index(u32::MAX as usize + 1),
            Err(ArenaError::TableFull)
        ));
    }

    #[test]
    fn raw_encoding_round_trips() {
        let id = ArenaId::new(7, 3);
        assert_eq!(ArenaId::from_raw(id.to_raw()), id);
        assert_eq!(format!("{id:?}"), "ArenaId(7v3)");
    }

    #[test]
    fn generation_exhaustion_retires_slot() {
        let mut table = Table::new();
        let first = table.insert(arena(1)).unwrap();
        table.free(first).unwrap();

        table.slots[0].generation = u32::MAX;
        let last = table.insert(arena(2)).unwrap();
        assert_eq!(last.generation(), u32::MAX);

        // Freeing wraps the generation to 0: the slot must not be recycled.
        table.free(last).unwrap();
        assert_eq!(table.slots[0].generation, 0);
        assert!(!table.free_list.contains(&0));
        assert!(matches!(table.get(first), Err(ArenaError::Freed)));

        let fresh = table.insert(arena(3)).unwrap();
        assert_ne!(fresh.slot(), 0);
    }
}
