//! Marshal values into byte buffers and view them back in place.
//!
//! Strict marshalling is a single block copy of a validated record. The
//! flattening variant also copies every non-null pointee into the tail of
//! the buffer, in the order the [`sizer`](crate::sizer) measures them, and
//! rewrites each pointer slot as the pointee's byte offset from the start of
//! the buffer (native byte order, `0` for null). [`FlatView`] resolves those
//! offsets again.

#![allow(unsafe_code)]

use std::marker::PhantomData;
use std::mem::{self, MaybeUninit};
use std::ptr;

use crate::describe::Describe;
use crate::endian::NATIVE_BYTE_ORDER;
use crate::error::CodecError;
use crate::layout::RecordLayout;
use crate::sizer::{self, Walk};

/// Copy the bytes of `value` into `dest` as one block.
///
/// Returns the number of bytes written, always the size of `T`. Fails with
/// [`CodecError::Shape`] for any `T` not storable under the strict policy,
/// and with [`CodecError::BufferTooSmall`] when `dest` is shorter than `T`.
///
/// Callers marshalling many values of one type should resolve a
/// [`RecordLayout`] once instead.
pub fn marshal<T: Describe>(value: &T, dest: &mut [MaybeUninit<u8>]) -> Result<usize, CodecError> {
    RecordLayout::<T>::resolve()?.marshal(value, dest)
}

/// Reinterpret `buffer[offset..]` as a `T` without copying.
///
/// # Safety
///
/// The window must hold a valid `T`, for instance bytes previously written
/// by [`marshal`] for the same type.
pub unsafe fn view<T: Describe>(
    buffer: &[MaybeUninit<u8>],
    offset: usize,
) -> Result<&T, CodecError> {
    let layout = RecordLayout::<T>::resolve()?;
    // SAFETY: forwarded caller contract.
    unsafe { layout.view(buffer, offset) }
}

/// Marshal `value` and everything reachable through its raw pointers.
///
/// The value is copied at offset 0; each non-null pointee follows at the
/// next offset aligned for its type, depth first. Pointer slots in the
/// output hold byte offsets from the start of `dest` rather than addresses.
/// The required size is measured first, so a short buffer fails with
/// [`CodecError::BufferTooSmall`] before anything is written. Returns the
/// number of bytes written, equal to
/// [`flat_size_of`](crate::sizer::flat_size_of) for the same value.
///
/// Pointee alignment is relative to `dest`; read the output through
/// [`FlatView`] from a buffer aligned for the widest pointee.
///
/// # Safety
///
/// Every non-null pointer reachable from `value` must point to a live,
/// aligned value of its pointee type, and must not be mutated for the
/// duration of the call.
pub unsafe fn marshal_flat<T: Describe>(
    value: &T,
    dest: &mut [MaybeUninit<u8>],
) -> Result<usize, CodecError> {
    // SAFETY: forwarded caller contract.
    let required = unsafe { sizer::flat_size_of(value)? };
    if dest.len() < required {
        return Err(CodecError::BufferTooSmall {
            required,
            available: dest.len(),
        });
    }
    let len = dest.len();
    let root = dest.as_mut_ptr().cast::<u8>();
    // SAFETY: dest holds at least `required >= size_of::<T>()` bytes.
    unsafe { copy_bytes(value, root) };

    // SAFETY: forwarded caller contract.
    let mut walk = unsafe { Walk::new(value, mem::size_of::<T>()) };
    while let Some(placed) = walk.place_next()? {
        let end = walk.cursor();
        if end > len {
            // The pointees changed since the size was measured.
            return Err(CodecError::BufferTooSmall {
                required: end,
                available: len,
            });
        }
        // SAFETY: start..end lies inside dest, and the pointee is live per
        // the caller contract. Its nested slots are rewritten by later steps.
        unsafe {
            ptr::copy_nonoverlapping(
                placed.address as *const u8,
                root.add(placed.start),
                placed.size,
            )
        };
        let encoded = NATIVE_BYTE_ORDER.encode_usize(placed.start);
        debug_assert!(placed.slot + encoded.len() <= placed.start);
        // SAFETY: `slot` is the offset of a pointer field inside a record
        // already copied into dest, ahead of this pointee.
        unsafe { ptr::copy_nonoverlapping(encoded.as_ptr(), root.add(placed.slot), encoded.len()) };
    }
    Ok(walk.cursor())
}

/// A read-only view over the output of [`marshal_flat`].
///
/// Pointer fields read from the view hold offsets, not addresses; pass them
/// to [`FlatView::follow`] to reach the pointee.
pub struct FlatView<'a, T> {
    bytes: &'a [MaybeUninit<u8>],
    _marker: PhantomData<&'a T>,
}

impl<'a, T: Describe> FlatView<'a, T> {
    /// Wrap marshalled bytes.
    ///
    /// Checks that a `T` fits at offset 0 and that the buffer is aligned
    /// for it.
    ///
    /// # Safety
    ///
    /// `bytes` must start with the output of [`marshal_flat`] for a `T`.
    pub unsafe fn new(bytes: &'a [MaybeUninit<u8>]) -> Result<Self, CodecError> {
        window::<T>(bytes, 0)?;
        Ok(Self {
            bytes,
            _marker: PhantomData,
        })
    }

    /// The root record.
    pub fn root(&self) -> &'a T {
        // SAFETY: checked in `new`, validity per its contract.
        unsafe { &*self.bytes.as_ptr().cast::<T>() }
    }

    /// Length of the underlying buffer.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the underlying buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Resolve a pointer field read from a record in this view.
    ///
    /// Returns `None` for null. The offset is bounds- and alignment-checked.
    ///
    /// # Safety
    ///
    /// `slot` must be the value of a pointer field of a record inside this
    /// view, so that it encodes an offset written by [`marshal_flat`].
    pub unsafe fn follow<P: Describe>(&self, slot: *const P) -> Result<Option<&'a P>, CodecError> {
        let offset = slot as usize;
        if offset == 0 {
            return Ok(None);
        }
        let ptr = window::<P>(self.bytes, offset)?;
        // SAFETY: in bounds and aligned; validity per the caller contract.
        Ok(Some(unsafe { &*ptr }))
    }
}

/// Copy `size_of::<T>()` bytes from `value` to `dest`.
///
/// # Safety
///
/// `dest` must be valid for that many byte writes and must not overlap
/// `value`.
pub(crate) unsafe fn copy_bytes<T>(value: &T, dest: *mut u8) {
    // SAFETY: forwarded caller contract.
    unsafe {
        ptr::copy_nonoverlapping((value as *const T).cast::<u8>(), dest, mem::size_of::<T>());
    }
}

/// Bounds- and alignment-checked pointer to a `T` at `offset`.
pub(crate) fn window<T>(buffer: &[MaybeUninit<u8>], offset: usize) -> Result<*const T, CodecError> {
    check_window::<T>(buffer.as_ptr() as usize, buffer.len(), offset)?;
    Ok(buffer.as_ptr().wrapping_add(offset).cast::<T>())
}

/// Mutable counterpart of [`window`].
pub(crate) fn window_mut<T>(
    buffer: &mut [MaybeUninit<u8>],
    offset: usize,
) -> Result<*mut T, CodecError> {
    check_window::<T>(buffer.as_ptr() as usize, buffer.len(), offset)?;
    Ok(buffer.as_mut_ptr().wrapping_add(offset).cast::<T>())
}

fn check_window<T>(base: usize, len: usize, offset: usize) -> Result<(), CodecError> {
    let size = mem::size_of::<T>();
    match offset.checked_add(size) {
        Some(end) if end <= len => {}
        _ => {
            return Err(CodecError::OutOfBounds {
                offset,
                len: size,
                buffer: len,
            })
        }
    }
    let align = mem::align_of::<T>();
    if (base.wrapping_add(offset)) % align != 0 {
        return Err(CodecError::Misaligned { offset, align });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use mmarena_derive::Describe;
    use num_complex::Complex;
    use proptest::prelude::*;

    use super::*;
    use crate::error::SizeError;
    use crate::shape::{InvalidKind, ShapeKind};

    #[derive(Clone, Copy, Debug, PartialEq, Describe)]
    struct Sample {
        id: u32,
        weight: f64,
        phase: Complex<f32>,
        flags: [bool; 3],
    }

    #[allow(dead_code)]
    #[derive(Describe)]
    struct Labelled {
        id: u32,
        label: String,
    }

    #[derive(Describe, Debug)]
    struct Link {
        value: u32,
        next: *const Link,
    }

    #[derive(Describe)]
    struct Pair {
        left: *const u64,
        right: *const u8,
    }

    #[derive(Describe)]
    struct Fork {
        left: *const Link,
        right: *const Link,
    }

    fn aligned(len: usize) -> Vec<MaybeUninit<u64>> {
        vec![MaybeUninit::new(0); len.div_ceil(8)]
    }

    fn as_bytes_mut(words: &mut [MaybeUninit<u64>]) -> &mut [MaybeUninit<u8>] {
        let len = words.len() * 8;
        // SAFETY: the byte slice covers exactly the words' storage.
        unsafe { std::slice::from_raw_parts_mut(words.as_mut_ptr().cast(), len) }
    }

    #[test]
    fn marshal_then_view_round_trips() {
        let mut words = aligned(64);
        let bytes = as_bytes_mut(&mut words);
        let value = Sample {
            id: 7,
            weight: 2.5,
            phase: Complex::new(0.5, -1.0),
            flags: [true, false, true],
        };
        let written = marshal(&value, bytes).unwrap();
        assert_eq!(written, mem::size_of::<Sample>());
        // SAFETY: the prefix was just written from a Sample.
        let seen = unsafe { view::<Sample>(bytes, 0).unwrap() };
        assert_eq!(*seen, value);
    }

    #[test]
    fn marshal_rejects_unsupported_types() {
        let mut words = aligned(64);
        let bytes = as_bytes_mut(&mut words);
        let value = Labelled {
            id: 1,
            label: "x".into(),
        };
        let err = marshal(&value, bytes).unwrap_err();
        assert_eq!(err.shape_kind(), Some(ShapeKind::Invalid(InvalidKind::Text)));
        assert!(matches!(err, CodecError::Shape(_)));
    }

    #[test]
    fn strict_marshal_rejects_references() {
        let mut words = aligned(64);
        let bytes = as_bytes_mut(&mut words);
        let link = Link {
            value: 1,
            next: ptr::null(),
        };
        let err = marshal(&link, bytes).unwrap_err();
        assert_eq!(err.shape_kind(), Some(ShapeKind::RawReference));
    }

    #[test]
    fn marshal_flat_copies_chain_and_rewrites_offsets() {
        let third = Link {
            value: 3,
            next: ptr::null(),
        };
        let second = Link {
            value: 2,
            next: &third,
        };
        let first = Link {
            value: 1,
            next: &second,
        };
        let one = mem::size_of::<Link>();
        let mut words = aligned(3 * one);
        let bytes = as_bytes_mut(&mut words);

        // SAFETY: every pointer targets a live local.
        let written = unsafe { marshal_flat(&first, bytes).unwrap() };
        assert_eq!(written, 3 * one);
        // SAFETY: as above.
        assert_eq!(written, unsafe { sizer::flat_size_of(&first).unwrap() });

        // SAFETY: bytes hold the output of marshal_flat for a Link.
        let flat = unsafe { FlatView::<Link>::new(bytes).unwrap() };
        let root = flat.root();
        assert_eq!(root.value, 1);
        assert_eq!(root.next as usize, one);

        // SAFETY: slots are read from records inside the view.
        unsafe {
            let next = flat.follow(root.next).unwrap().unwrap();
            assert_eq!(next.value, 2);
            let last = flat.follow(next.next).unwrap().unwrap();
            assert_eq!(last.value, 3);
            assert!(flat.follow(last.next).unwrap().is_none());
        }
    }

    #[test]
    fn marshal_flat_aligns_pointees() {
        let wide = 0xfeed_u64;
        let narrow = 9u8;
        let pair = Pair {
            left: &wide,
            right: &narrow,
        };
        let mut words = aligned(64);
        let bytes = as_bytes_mut(&mut words);
        // SAFETY: both pointers target live locals.
        let written = unsafe { marshal_flat(&pair, bytes).unwrap() };
        let base = mem::size_of::<Pair>();
        assert_eq!(written, base + 9);

        // SAFETY: bytes hold the output of marshal_flat for a Pair.
        let flat = unsafe { FlatView::<Pair>::new(bytes).unwrap() };
        let root = flat.root();
        assert_eq!(root.left as usize, base);
        assert_eq!(root.right as usize, base + 8);
        // SAFETY: slots read from the root record.
        unsafe {
            assert_eq!(*flat.follow(root.left).unwrap().unwrap(), 0xfeed);
            assert_eq!(*flat.follow(root.right).unwrap().unwrap(), 9);
        }
    }

    #[test]
    fn marshal_flat_places_pointees_depth_first() {
        let deep = Link {
            value: 2,
            next: ptr::null(),
        };
        let left = Link {
            value: 1,
            next: &deep,
        };
        let right = Link {
            value: 3,
            next: ptr::null(),
        };
        let fork = Fork {
            left: &left,
            right: &right,
        };
        let mut words = aligned(128);
        let bytes = as_bytes_mut(&mut words);
        // SAFETY: every pointer targets a live local.
        let written = unsafe { marshal_flat(&fork, bytes).unwrap() };
        let one = mem::size_of::<Link>();
        let base = mem::size_of::<Fork>();
        assert_eq!(written, base + 3 * one);

        // SAFETY: bytes hold the output of marshal_flat for a Fork.
        let flat = unsafe { FlatView::<Fork>::new(bytes).unwrap() };
        let root = flat.root();
        assert_eq!(root.left as usize, base);
        assert_eq!(root.right as usize, base + 2 * one);
        // SAFETY: slots are read from records inside the view.
        unsafe {
            let first = flat.follow(root.left).unwrap().unwrap();
            assert_eq!(first.next as usize, base + one);
            assert_eq!(flat.follow(first.next).unwrap().unwrap().value, 2);
            assert_eq!(flat.follow(root.right).unwrap().unwrap().value, 3);
        }
    }

    #[test]
    fn long_chains_flatten_iteratively() {
        const LEN: usize = 200_000;
        let mut links: Vec<Link> = (0..LEN)
            .map(|i| Link {
                value: i as u32,
                next: ptr::null(),
            })
            .collect();
        for i in 1..LEN {
            let next: *const Link = &links[i];
            links[i - 1].next = next;
        }
        let one = mem::size_of::<Link>();
        let mut words = aligned(LEN * one);
        let bytes = as_bytes_mut(&mut words);
        // SAFETY: every pointer targets an element of `links`.
        let written = unsafe { marshal_flat(&links[0], bytes).unwrap() };
        assert_eq!(written, LEN * one);

        // SAFETY: bytes hold the output of marshal_flat for a Link.
        let flat = unsafe { FlatView::<Link>::new(bytes).unwrap() };
        let mut seen = 0u32;
        let mut node = Some(flat.root());
        while let Some(link) = node {
            assert_eq!(link.value, seen);
            seen += 1;
            // SAFETY: slots are read from records inside the view.
            node = unsafe { flat.follow(link.next).unwrap() };
        }
        assert_eq!(seen as usize, LEN);
    }

    #[test]
    fn marshal_flat_checks_capacity_before_writing() {
        let tail = Link {
            value: 5,
            next: ptr::null(),
        };
        let head = Link {
            value: 4,
            next: &tail,
        };
        let one = mem::size_of::<Link>();
        let mut words = aligned(one);
        let bytes = as_bytes_mut(&mut words);
        // SAFETY: pointers target live locals.
        let err = unsafe { marshal_flat(&head, bytes).unwrap_err() };
        assert_eq!(
            err,
            CodecError::BufferTooSmall {
                required: 2 * one,
                available: one,
            }
        );
        // Nothing was written.
        assert!(words.iter().all(|w| unsafe { w.assume_init() } == 0));
    }

    #[test]
    fn marshal_flat_reports_cycles() {
        let mut node = Link {
            value: 0,
            next: ptr::null(),
        };
        node.next = ptr::addr_of!(node);
        let mut words = aligned(64);
        let bytes = as_bytes_mut(&mut words);
        // SAFETY: the pointer targets the live local itself.
        let err = unsafe { marshal_flat(&node, bytes).unwrap_err() };
        assert!(matches!(
            err,
            CodecError::Size(SizeError::ReferenceCycle { .. })
        ));
    }

    #[test]
    fn follow_rejects_offsets_outside_the_view() {
        let leaf = Link {
            value: 1,
            next: ptr::null(),
        };
        let mut words = aligned(64);
        let bytes = as_bytes_mut(&mut words);
        // SAFETY: no pointers to follow.
        unsafe { marshal_flat(&leaf, bytes).unwrap() };
        // SAFETY: bytes hold a marshalled Link.
        let flat = unsafe { FlatView::<Link>::new(bytes).unwrap() };
        let bogus = 4096 as *const Link;
        // SAFETY: the check fails before any dereference.
        let err = unsafe { flat.follow(bogus).unwrap_err() };
        assert!(matches!(err, CodecError::OutOfBounds { offset: 4096, .. }));
    }

    #[test]
    fn window_checks() {
        let mut words = aligned(16);
        let bytes = as_bytes_mut(&mut words);
        assert!(window::<u64>(bytes, 8).is_ok());
        assert!(matches!(
            window::<u64>(bytes, 12),
            Err(CodecError::OutOfBounds { .. })
        ));
        assert!(matches!(
            window::<u64>(bytes, usize::MAX),
            Err(CodecError::OutOfBounds { .. })
        ));
        assert_eq!(
            window::<u32>(bytes, 2).unwrap_err(),
            CodecError::Misaligned {
                offset: 2,
                align: 4,
            }
        );
        assert!(window::<()>(bytes, 16).is_ok());
    }

    proptest! {
        #[test]
        fn arrays_round_trip(values in proptest::array::uniform8(any::<i32>()), at in 0usize..8) {
            let mut words = aligned(96);
            let bytes = as_bytes_mut(&mut words);
            let offset = at * 4;
            marshal(&values, &mut bytes[offset..]).unwrap();
            // SAFETY: the window was just written from a [i32; 8].
            let seen = unsafe { view::<[i32; 8]>(bytes, offset).unwrap() };
            prop_assert_eq!(*seen, values);
        }
    }
}
