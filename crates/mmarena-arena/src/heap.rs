//! Page-aligned buffers from the global allocator.
//!
//! Useful where mappings are unavailable or unwanted, such as under Miri or
//! in tests that count allocations.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::provider::{Access, MemoryProvider, ProviderError, RawBuffer};

/// Default alignment of heap buffers (one 4 KiB page).
pub const PAGE_ALIGNMENT: usize = 4096;

/// Reserves zeroed, aligned buffers with `std::alloc`.
#[derive(Clone, Copy, Debug)]
pub struct HeapProvider {
    alignment: usize,
}

impl HeapProvider {
    /// A provider aligning buffers to [`PAGE_ALIGNMENT`].
    pub const fn new() -> Self {
        Self {
            alignment: PAGE_ALIGNMENT,
        }
    }

    /// A provider aligning buffers to `alignment`, which must be a power of
    /// two. Other values are reported by `reserve` as a layout error.
    pub const fn with_alignment(alignment: usize) -> Self {
        Self { alignment }
    }

    /// Alignment of reserved buffers.
    pub const fn alignment(&self) -> usize {
        self.alignment
    }
}

impl Default for HeapProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// A buffer reserved by [`HeapProvider`]. Deallocated on drop.
#[derive(Debug)]
pub struct HeapBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
    access: Access,
}

// SAFETY: HeapBuffer owns its allocation exclusively.
unsafe impl Send for HeapBuffer {}
// SAFETY: shared access only hands out a const pointer.
unsafe impl Sync for HeapBuffer {}

// SAFETY: the allocation is zeroed, lives until drop and never moves.
unsafe impl RawBuffer for HeapBuffer {
    fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    fn as_mut_ptr(&mut self) -> Option<*mut u8> {
        self.access.is_writable().then(|| self.ptr.as_ptr())
    }

    fn len(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for HeapBuffer {
    fn drop(&mut self) {
        // SAFETY: allocated in `reserve` with this exact layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

impl MemoryProvider for HeapProvider {
    type Buffer = HeapBuffer;

    fn reserve(&self, len: usize, access: Access) -> Result<HeapBuffer, ProviderError> {
        if len == 0 {
            return Err(ProviderError::ZeroLength);
        }
        let layout = Layout::from_size_align(len, self.alignment).map_err(|_| {
            ProviderError::Layout {
                len,
                align: self.alignment,
            }
        })?;
        // SAFETY: the layout has a non-zero size.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or_else(|| {
            ProviderError::Os(std::io::Error::from(std::io::ErrorKind::OutOfMemory))
        })?;
        tracing::trace!(len, align = self.alignment, ?access, "allocated heap region");
        Ok(HeapBuffer {
            ptr,
            layout,
            access,
        })
    }

    fn release(&self, buffer: HeapBuffer) -> Result<(), ProviderError> {
        tracing::trace!(len = buffer.len(), "freeing heap region");
        drop(buffer);
        Ok(())
    }

    fn seal(&self, mut buffer: HeapBuffer) -> Result<HeapBuffer, ProviderError> {
        buffer.access = Access::ReadOnly;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_are_aligned_and_zeroed() {
        let provider = HeapProvider::new();
        let buffer = provider.reserve(10_000, Access::ReadWrite).unwrap();
        assert_eq!(buffer.as_ptr() as usize % PAGE_ALIGNMENT, 0);
        assert_eq!(buffer.len(), 10_000);
        // SAFETY: the buffer is 10_000 initialized bytes.
        let bytes = unsafe { std::slice::from_raw_parts(buffer.as_ptr(), buffer.len()) };
        assert!(bytes.iter().all(|&b| b == 0));
        provider.release(buffer).unwrap();
    }

    #[test]
    fn invalid_alignment_is_a_layout_error() {
        let provider = HeapProvider::with_alignment(3);
        assert!(matches!(
            provider.reserve(64, Access::ReadWrite),
            Err(ProviderError::Layout { len: 64, align: 3 })
        ));
    }

    #[test]
    fn zero_length_is_rejected() {
        assert!(matches!(
            HeapProvider::default().reserve(0, Access::ReadWrite),
            Err(ProviderError::ZeroLength)
        ));
    }

    #[test]
    fn sealing_removes_write_access() {
        let provider = HeapProvider::with_alignment(64);
        assert_eq!(provider.alignment(), 64);
        let mut buffer = provider.reserve(64, Access::ReadWrite).unwrap();
        assert!(buffer.as_mut_ptr().is_some());
        let mut buffer = provider.seal(buffer).unwrap();
        assert!(buffer.as_mut_ptr().is_none());
        provider.release(buffer).unwrap();
    }
}
