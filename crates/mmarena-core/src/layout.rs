//! Per-type record layout, resolved once and reused for every access.

#![allow(unsafe_code)]

use std::fmt;
use std::marker::PhantomData;
use std::mem::{self, MaybeUninit};

use crate::classify::classify;
use crate::codec::{copy_bytes, window, window_mut};
use crate::describe::Describe;
use crate::error::{CodecError, SizeError};
use crate::shape::Shape;
use crate::sizer::{checked_against, shape_size};

/// The validated shape and size of `T` under the strict policy.
///
/// Resolving a layout classifies and sizes `T` once; marshalling and
/// viewing through it then do no shape dispatch.
pub struct RecordLayout<T> {
    shape: Shape,
    size: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Describe> RecordLayout<T> {
    /// Classify and size `T`.
    ///
    /// Fails with [`SizeError::Shape`] when `T` is not storable, including
    /// when it holds raw references.
    pub fn resolve() -> Result<Self, SizeError> {
        let shape = classify::<T>()?;
        let size = checked_against::<T>(shape_size(&shape)?)?;
        Ok(Self {
            shape,
            size,
            _marker: PhantomData,
        })
    }

    /// The validated shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Bytes occupied by one `T`.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Alignment of `T`.
    pub fn align(&self) -> usize {
        mem::align_of::<T>()
    }

    /// Distance between consecutive records: the size, or the alignment for
    /// zero-sized types, so a record is never narrower than one byte.
    pub fn stride(&self) -> usize {
        self.size.max(self.align())
    }

    /// Copy the bytes of `value` into `dest[..size]` as one block.
    ///
    /// Returns the number of bytes written. Padding bytes in `dest` are left
    /// unspecified.
    pub fn marshal(&self, value: &T, dest: &mut [MaybeUninit<u8>]) -> Result<usize, CodecError> {
        if dest.len() < self.size {
            return Err(CodecError::BufferTooSmall {
                required: self.size,
                available: dest.len(),
            });
        }
        // SAFETY: dest holds at least size_of::<T>() bytes and does not
        // overlap `value` (it is borrowed mutably while `value` is shared).
        unsafe { copy_bytes(value, dest.as_mut_ptr().cast::<u8>()) };
        Ok(self.size)
    }

    /// Reinterpret `buffer[offset..offset + size]` as a `T`, without copying.
    ///
    /// # Safety
    ///
    /// The window must hold a valid `T`, typically written by
    /// [`RecordLayout::marshal`].
    pub unsafe fn view<'a>(
        &self,
        buffer: &'a [MaybeUninit<u8>],
        offset: usize,
    ) -> Result<&'a T, CodecError> {
        let ptr = window::<T>(buffer, offset)?;
        // SAFETY: the window is in bounds and aligned; validity is the
        // caller's contract.
        Ok(unsafe { &*ptr })
    }

    /// Mutable counterpart of [`RecordLayout::view`].
    ///
    /// # Safety
    ///
    /// As for [`RecordLayout::view`].
    pub unsafe fn view_mut<'a>(
        &self,
        buffer: &'a mut [MaybeUninit<u8>],
        offset: usize,
    ) -> Result<&'a mut T, CodecError> {
        let ptr = window_mut::<T>(buffer, offset)?;
        // SAFETY: as in `view`, and the buffer is borrowed exclusively.
        Ok(unsafe { &mut *ptr })
    }
}

impl<T> Clone for RecordLayout<T> {
    fn clone(&self) -> Self {
        Self {
            shape: self.shape.clone(),
            size: self.size,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for RecordLayout<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordLayout")
            .field("shape", &self.shape)
            .field("size", &self.size)
            .finish()
    }
}
