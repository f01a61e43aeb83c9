//! Fixed-size record arenas over raw memory.

#![allow(unsafe_code)]

use std::any::{type_name, Any};
use std::fmt;

use mmarena_core::{Describe, RecordLayout, Shape};

use crate::config::ArenaConfig;
use crate::error::ArenaError;
use crate::mmap::AnonMmap;
use crate::provider::{Access, MemoryProvider, ProviderError, RawBuffer as _};
use crate::raw::{base_of, fill_slots, RawRegion};

/// One contiguous raw allocation holding `record_count` records of `T`.
///
/// Every slot starts as a bitwise copy of the template the arena was
/// allocated from. Accessors do no shape dispatch: the element layout is
/// resolved once, at allocation.
///
/// The arena owns its buffer. [`MemoryArena::free`] consumes the arena and
/// returns the buffer to its provider; dropping the arena does the same, so
/// the buffer is released exactly once on every path. Use after free does
/// not compile:
///
/// ```compile_fail
/// use mmarena_arena::MemoryArena;
///
/// let arena = MemoryArena::allocate(&7u64, 4).unwrap();
/// arena.free().unwrap();
/// let _ = arena.read(0);
/// ```
///
/// Neither does a second free:
///
/// ```compile_fail
/// use mmarena_arena::MemoryArena;
///
/// let arena = MemoryArena::allocate(&7u64, 4).unwrap();
/// arena.free().unwrap();
/// arena.free().unwrap();
/// ```
///
/// Safe writes take `&mut self`. Pointers from
/// [`MemoryArena::address_of_mut`] bypass that, and synchronizing them is up
/// to the caller.
pub struct MemoryArena<T, P: MemoryProvider = AnonMmap> {
    region: RawRegion,
    buffer: Option<P::Buffer>,
    provider: P,
    layout: RecordLayout<T>,
    count: usize,
    config: ArenaConfig,
}

// SAFETY: the arena exclusively owns its buffer and the records in it.
unsafe impl<T: Send, P: MemoryProvider + Send> Send for MemoryArena<T, P> where P::Buffer: Send {}
// SAFETY: `&MemoryArena` only hands out `&T` and const pointers.
unsafe impl<T: Sync, P: MemoryProvider + Sync> Sync for MemoryArena<T, P> where P::Buffer: Sync {}

impl<T: Describe> MemoryArena<T> {
    /// Allocate `count` copies of `template` in an anonymous mapping with
    /// the default configuration.
    pub fn allocate(template: &T, count: usize) -> Result<Self, ArenaError> {
        Self::allocate_in(AnonMmap::new(), ArenaConfig::default(), template, count)
    }
}

impl<T: Describe, P: MemoryProvider> MemoryArena<T, P> {
    /// Allocate `count` copies of `template` from `provider`.
    ///
    /// # Errors
    ///
    /// - [`ArenaError::InvalidCount`] if `count` is 0.
    /// - [`ArenaError::Shape`] or [`ArenaError::Size`] if `T` is not
    ///   storable.
    /// - [`ArenaError::CapacityExceeded`] if the arena would exceed
    ///   `config.max_total_bytes`.
    /// - [`ArenaError::Allocation`] if the provider fails or hands out an
    ///   unsuitable buffer. Any buffer already reserved is released again.
    pub fn allocate_in(
        provider: P,
        config: ArenaConfig,
        template: &T,
        count: usize,
    ) -> Result<Self, ArenaError> {
        if count == 0 {
            return Err(ArenaError::InvalidCount);
        }
        let layout = RecordLayout::<T>::resolve()?;
        let stride = layout.stride();
        let total_bytes = config
            .total_bytes(stride, count)
            .ok_or(ArenaError::CapacityExceeded {
                record_size: stride,
                count,
                limit: config.max_total_bytes,
            })?;

        let mut buffer = provider
            .reserve(total_bytes, Access::ReadWrite)
            .map_err(ArenaError::Allocation)?;
        if let Err(e) = fill_slots(&mut buffer, &layout, template, total_bytes) {
            if let Err(release) = provider.release(buffer) {
                tracing::warn!(error = %release, "failed to release buffer of a failed allocation");
            }
            return Err(e);
        }
        if !config.access.is_writable() {
            // A failed seal has already released the buffer.
            buffer = provider.seal(buffer).map_err(ArenaError::Allocation)?;
        }

        let writable = config.access.is_writable() && buffer.as_mut_ptr().is_some();
        let Some(base) = base_of(&mut buffer) else {
            // Only reachable when `seal` hands back a null buffer.
            if let Err(release) = provider.release(buffer) {
                tracing::warn!(error = %release, "failed to release buffer of a failed allocation");
            }
            return Err(ArenaError::Allocation(ProviderError::Layout {
                len: total_bytes,
                align: layout.align(),
            }));
        };
        // SAFETY: the buffer holds `total_bytes` initialized bytes at `base`
        // (checked by fill_slots), writable unless sealed, and lives in
        // `self.buffer` until the region is last used.
        let region = unsafe { RawRegion::new(base, total_bytes, writable) };

        tracing::debug!(
            element = type_name::<T>(),
            record_size = stride,
            count,
            total_bytes,
            writable,
            "allocated arena"
        );
        Ok(Self {
            region,
            buffer: Some(buffer),
            provider,
            layout,
            count,
            config,
        })
    }

    /// Number of records.
    pub fn record_count(&self) -> usize {
        self.count
    }

    /// Width of one record slot: the element size, or its alignment for
    /// zero-sized elements.
    pub fn record_size(&self) -> usize {
        self.layout.stride()
    }

    /// Total bytes owned, always `record_size() * record_count()`.
    pub fn total_bytes(&self) -> usize {
        self.region.len()
    }

    /// The element shape.
    pub fn shape(&self) -> &Shape {
        self.layout.shape()
    }

    /// The resolved element layout.
    pub fn layout(&self) -> &RecordLayout<T> {
        &self.layout
    }

    /// The configuration the arena was allocated with.
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// The provider owning the buffer.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Whether the arena accepts writes.
    pub fn is_writable(&self) -> bool {
        self.region.is_writable()
    }

    /// Address of record `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= record_count()`.
    #[track_caller]
    pub fn address_of(&self, index: usize) -> *const T {
        self.assert_in_bounds(index);
        self.region.at(index * self.record_size()).cast_const().cast()
    }

    /// Mutable address of record `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= record_count()` or the arena is read-only.
    #[track_caller]
    pub fn address_of_mut(&mut self, index: usize) -> *mut T {
        self.assert_in_bounds(index);
        self.assert_writable();
        self.region.at(index * self.record_size()).cast()
    }

    /// View record `index` in place.
    ///
    /// # Panics
    ///
    /// Panics if `index >= record_count()`.
    #[track_caller]
    pub fn read(&self, index: usize) -> &T {
        match self.get(index) {
            Some(record) => record,
            None => index_out_of_bounds(index, self.count),
        }
    }

    /// View record `index` in place, or `None` past the end.
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.count {
            return None;
        }
        let offset = index * self.record_size();
        // SAFETY: every slot holds a valid T: it was filled from the template
        // and is only ever overwritten by marshalling a T.
        unsafe { self.layout.view(self.region.bytes(), offset) }.ok()
    }

    /// Mutable view of record `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= record_count()` or the arena is read-only.
    #[track_caller]
    pub fn read_mut(&mut self, index: usize) -> &mut T {
        self.assert_in_bounds(index);
        self.assert_writable();
        match self.get_mut(index) {
            Some(record) => record,
            None => unreachable!("index and access were checked"),
        }
    }

    /// Mutable view of record `index`, or `None` past the end or when the
    /// arena is read-only.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index >= self.count {
            return None;
        }
        let offset = index * self.record_size();
        let bytes = self.region.bytes_mut()?;
        // SAFETY: as in `get`; the region is borrowed exclusively.
        unsafe { self.layout.view_mut(bytes, offset) }.ok()
    }

    /// Iterate over all records in index order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &T> + '_ {
        (0..self.count).map(move |index| self.read(index))
    }

    /// Overwrite record `index` with the bytes of `value`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= record_count()` or the arena is read-only.
    #[track_caller]
    pub fn write(&mut self, index: usize, value: &T) {
        if let Err(e) = self.try_write(index, value) {
            panic!("{e}");
        }
    }

    /// Overwrite record `index`, reporting a bad index or a read-only arena.
    pub fn try_write(&mut self, index: usize, value: &T) -> Result<(), ArenaError> {
        if index >= self.count {
            return Err(ArenaError::IndexOutOfBounds {
                index,
                count: self.count,
            });
        }
        let offset = index * self.record_size();
        let bytes = self.region.bytes_mut().ok_or(ArenaError::ReadOnly)?;
        self.layout.marshal(value, &mut bytes[offset..])?;
        Ok(())
    }

    /// Type-erased write: fails with [`ArenaError::TypeMismatch`] unless
    /// `value` is a `T`.
    pub fn write_any(&mut self, index: usize, value: &dyn Any) -> Result<(), ArenaError> {
        let value = value
            .downcast_ref::<T>()
            .ok_or(ArenaError::TypeMismatch {
                expected: type_name::<T>(),
            })?;
        self.try_write(index, value)
    }

    /// Return the buffer to the provider.
    ///
    /// Consumes the arena, so nothing can touch its records afterwards.
    pub fn free(mut self) -> Result<(), ArenaError> {
        self.release()
    }

    #[track_caller]
    fn assert_in_bounds(&self, index: usize) {
        if index >= self.count {
            index_out_of_bounds(index, self.count);
        }
    }

    #[track_caller]
    fn assert_writable(&self) {
        assert!(self.region.is_writable(), "{}", ArenaError::ReadOnly);
    }
}

impl<T, P: MemoryProvider> MemoryArena<T, P> {
    fn release(&mut self) -> Result<(), ArenaError> {
        let Some(buffer) = self.buffer.take() else {
            return Ok(());
        };
        let total_bytes = self.region.len();
        self.provider.release(buffer).map_err(ArenaError::Release)?;
        tracing::debug!(total_bytes, "freed arena");
        Ok(())
    }
}

impl<T, P: MemoryProvider> Drop for MemoryArena<T, P> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "failed to release arena buffer on drop");
        }
    }
}

impl<T, P: MemoryProvider> fmt::Debug for MemoryArena<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryArena")
            .field("element", &type_name::<T>())
            .field("record_count", &self.count)
            .field("total_bytes", &self.region.len())
            .field("writable", &self.region.is_writable())
            .finish()
    }
}

#[cold]
#[track_caller]
fn index_out_of_bounds(index: usize, count: usize) -> ! {
    panic!("{}", ArenaError::IndexOutOfBounds { index, count })
}
