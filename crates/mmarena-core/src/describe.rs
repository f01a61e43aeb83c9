//! The [`Describe`] trait and its implementations for std and ecosystem types.

#![allow(unsafe_code)]

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::mem;
use std::rc::Rc;
use std::sync::{mpsc, Arc};

use indexmap::{IndexMap, IndexSet};
use num_complex::Complex;

use crate::shape::{InvalidKind, NumericKind, ReferenceShape, Shape, StructShape};

/// Structural description of a type's in-memory representation.
///
/// Implemented for scalars, fixed-size arrays, raw pointers and unit, and
/// derivable for structs with `#[derive(Describe)]`. Types that can never be
/// stored (sequences, maps, text, ...) implement it too, reporting an
/// [`Shape::Invalid`] shape, so that classification can reject a struct
/// holding one and name the offending field.
///
/// # Safety
///
/// An implementation whose shape is valid under some policy promises that:
///
/// - the shape mirrors the compiler's layout of `Self` (sizes, alignments
///   and field offsets);
/// - every field is plain data: a bitwise copy of a valid value is a valid
///   value, and no field owns a resource or has interior mutability;
/// - [`Describe::flatten`] reports every raw pointer inside `Self`, at its
///   byte offset, in declaration order.
///
/// Implementations reporting an invalid shape make no promise; the crate
/// never copies such values.
pub unsafe trait Describe: 'static {
    /// Whether any raw pointer can appear inside `Self`, not looking
    /// through pointers.
    const HAS_REFERENCES: bool = false;

    /// The structural description of `Self`.
    fn shape() -> Shape;

    /// Report every raw pointer inside `self` to `flattener`.
    ///
    /// `base` is the byte offset of `self` from the root value being
    /// flattened.
    ///
    /// # Safety
    ///
    /// Every non-null pointer reachable from `self` must point to a live,
    /// aligned value of its pointee type.
    unsafe fn flatten<F: Flattener>(&self, base: usize, flattener: &mut F) -> Result<(), F::Error> {
        let _ = (base, flattener);
        Ok(())
    }
}

/// Visitor for the raw pointers of a value, driven by [`Describe::flatten`].
///
/// The [`sizer`](crate::sizer) and the [`codec`](crate::codec) both walk
/// values through this trait, so flattened sizing and flattened marshalling
/// visit references in the same order.
pub trait Flattener {
    /// Error produced by the visitor.
    type Error;

    /// Visit one pointer stored at byte offset `slot` from the root.
    ///
    /// # Safety
    ///
    /// `pointee` is null or points to a live, aligned `P`.
    unsafe fn reference<P: Describe>(
        &mut self,
        slot: usize,
        pointee: *const P,
    ) -> Result<(), Self::Error>;
}

macro_rules! impl_numeric {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            unsafe impl Describe for $ty {
                fn shape() -> Shape {
                    Shape::Numeric(NumericKind::$kind)
                }
            }
        )*
    };
}

impl_numeric! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    i128 => I128,
    isize => Isize,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    u128 => U128,
    usize => Usize,
    f32 => F32,
    f64 => F64,
    Complex<f32> => Complex32,
    Complex<f64> => Complex64,
}

unsafe impl<T: Describe, const N: usize> Describe for [T; N] {
    const HAS_REFERENCES: bool = T::HAS_REFERENCES && N > 0;

    fn shape() -> Shape {
        Shape::Array {
            element: Box::new(T::shape()),
            len: N,
        }
    }

    unsafe fn flatten<F: Flattener>(&self, base: usize, flattener: &mut F) -> Result<(), F::Error> {
        if !Self::HAS_REFERENCES {
            return Ok(());
        }
        let stride = mem::size_of::<T>();
        for (i, element) in self.iter().enumerate() {
            // SAFETY: forwarded caller contract; elements are reachable from self.
            unsafe { element.flatten(base + i * stride, flattener)? };
        }
        Ok(())
    }
}

unsafe impl Describe for () {
    fn shape() -> Shape {
        Shape::Struct(StructShape::of::<()>(Vec::new()))
    }
}

unsafe impl<P: Describe> Describe for *const P {
    const HAS_REFERENCES: bool = true;

    fn shape() -> Shape {
        Shape::RawReference(ReferenceShape::of::<P>(false))
    }

    unsafe fn flatten<F: Flattener>(&self, base: usize, flattener: &mut F) -> Result<(), F::Error> {
        // SAFETY: forwarded caller contract on reachable pointers.
        unsafe { flattener.reference(base, *self) }
    }
}

unsafe impl<P: Describe> Describe for *mut P {
    const HAS_REFERENCES: bool = true;

    fn shape() -> Shape {
        Shape::RawReference(ReferenceShape::of::<P>(true))
    }

    unsafe fn flatten<F: Flattener>(&self, base: usize, flattener: &mut F) -> Result<(), F::Error> {
        // SAFETY: forwarded caller contract on reachable pointers.
        unsafe { flattener.reference(base, self.cast_const()) }
    }
}

macro_rules! impl_invalid {
    ($kind:ident: $(<$($gen:ident),*> $ty:ty),* $(,)?) => {
        $(
            unsafe impl<$($gen: 'static),*> Describe for $ty {
                fn shape() -> Shape {
                    Shape::Invalid(InvalidKind::$kind)
                }
            }
        )*
    };
}

impl_invalid!(Sequence: <T> Vec<T>, <T> VecDeque<T>, <T> Box<[T]>);

impl_invalid!(Map:
    <K, V> HashMap<K, V>,
    <K, V> BTreeMap<K, V>,
    <T> HashSet<T>,
    <T> BTreeSet<T>,
    <K, V> IndexMap<K, V>,
    <T> IndexSet<T>,
);

impl_invalid!(Dynamic:
    <> Box<dyn Any>,
    <> Box<dyn Any + Send>,
    <> Box<dyn Any + Send + Sync>,
    <> Rc<dyn Any>,
    <> Arc<dyn Any + Send + Sync>,
);

impl_invalid!(Callable:
    <R> fn() -> R,
    <A, R> fn(A) -> R,
    <A, B, R> fn(A, B) -> R,
    <A, B, C, R> fn(A, B, C) -> R,
    <> Box<dyn Fn()>,
    <> Box<dyn Fn() + Send + Sync>,
    <> Box<dyn FnMut()>,
    <> Box<dyn FnOnce()>,
);

impl_invalid!(Channel:
    <T> mpsc::Sender<T>,
    <T> mpsc::SyncSender<T>,
    <T> mpsc::Receiver<T>,
    <T> crossbeam_channel::Sender<T>,
    <T> crossbeam_channel::Receiver<T>,
);

impl_invalid!(Text: <> String, <> Box<str>);
