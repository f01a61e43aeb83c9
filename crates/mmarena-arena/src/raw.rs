//! Low-level primitives over an arena's backing bytes.
//!
//! Everything here works on raw pointers handed out by a
//! [`RawBuffer`](crate::RawBuffer); each `unsafe` block carries its
//! `// SAFETY:` argument.

#![allow(unsafe_code)]

use std::mem::MaybeUninit;
use std::ptr::NonNull;
use std::slice;

use mmarena_core::{Describe, RecordLayout};

use crate::error::ArenaError;
use crate::provider::{ProviderError, RawBuffer};

/// The initialized bytes of a live arena.
pub(crate) struct RawRegion {
    base: NonNull<u8>,
    len: usize,
    writable: bool,
}

impl RawRegion {
    /// # Safety
    ///
    /// `base` must be valid for reads of `len` initialized bytes, and for
    /// writes when `writable`, for as long as the region is used.
    pub(crate) unsafe fn new(base: NonNull<u8>, len: usize, writable: bool) -> Self {
        Self {
            base,
            len,
            writable,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_writable(&self) -> bool {
        self.writable
    }

    pub(crate) fn bytes(&self) -> &[MaybeUninit<u8>] {
        // SAFETY: valid for `len` bytes per the constructor contract.
        unsafe { slice::from_raw_parts(self.base.as_ptr().cast(), self.len) }
    }

    pub(crate) fn bytes_mut(&mut self) -> Option<&mut [MaybeUninit<u8>]> {
        if !self.writable {
            return None;
        }
        // SAFETY: writable for `len` bytes per the constructor contract, and
        // borrowed exclusively through `&mut self`.
        Some(unsafe { slice::from_raw_parts_mut(self.base.as_ptr().cast(), self.len) })
    }

    /// Address `offset` bytes into the region. Not dereferenced here.
    pub(crate) fn at(&self, offset: usize) -> *mut u8 {
        self.base.as_ptr().wrapping_add(offset)
    }
}

/// Start of `buffer`, preferring the write pointer.
pub(crate) fn base_of<B: RawBuffer>(buffer: &mut B) -> Option<NonNull<u8>> {
    match buffer.as_mut_ptr() {
        Some(ptr) => NonNull::new(ptr),
        None => NonNull::new(buffer.as_ptr().cast_mut()),
    }
}

/// Marshal `template` into each of the `count` slots at the start of a
/// freshly reserved buffer.
pub(crate) fn fill_slots<T: Describe, B: RawBuffer>(
    buffer: &mut B,
    layout: &RecordLayout<T>,
    template: &T,
    total_bytes: usize,
) -> Result<(), ArenaError> {
    let unsuitable = || {
        ArenaError::Allocation(ProviderError::Layout {
            len: total_bytes,
            align: layout.align(),
        })
    };
    if buffer.len() < total_bytes {
        return Err(unsuitable());
    }
    let base = buffer
        .as_mut_ptr()
        .ok_or(ArenaError::Allocation(ProviderError::NotWritable))?;
    if base.is_null() || base as usize % layout.align() != 0 {
        return Err(unsuitable());
    }
    // SAFETY: the buffer is writable for at least `total_bytes` initialized
    // bytes starting at `base`, and nothing else refers to it yet.
    let bytes = unsafe { slice::from_raw_parts_mut(base.cast::<MaybeUninit<u8>>(), total_bytes) };
    for slot in bytes.chunks_exact_mut(layout.stride()) {
        layout.marshal(template, slot)?;
    }
    Ok(())
}
