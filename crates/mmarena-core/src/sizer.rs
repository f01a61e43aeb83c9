//! Byte footprint of validated shapes.
//!
//! Strict sizing reproduces the compiler's layout structurally and
//! cross-checks it against `size_of`. Flattened sizing adds, for every
//! non-null reference, the pointee placed at the next offset aligned for
//! it, recursively. Both orders match what [`codec`](crate::codec) writes.

#![allow(unsafe_code)]

use std::any::{type_name, TypeId};
use std::convert::Infallible;
use std::mem;

use indexmap::IndexSet;

use crate::classify::{classify, classify_with, ShapePolicy};
use crate::describe::{Describe, Flattener};
use crate::error::{ShapeError, SizeError};
use crate::shape::{Shape, ShapeKind};

/// Size of a `T` record under [`ShapePolicy::Strict`].
///
/// Zero-length arrays and empty structs are legal and size 0.
pub fn size_of<T: Describe>() -> Result<usize, SizeError> {
    let shape = classify::<T>()?;
    checked_against::<T>(shape_size(&shape)?)
}

/// Size of `value` under [`ShapePolicy::Strict`]; only its type matters.
pub fn size_of_val<T: Describe>(value: &T) -> Result<usize, SizeError> {
    let _ = value;
    size_of::<T>()
}

/// Structural size of an already validated shape.
///
/// References count as one pointer; their pointees are not followed.
pub fn shape_size(shape: &Shape) -> Result<usize, SizeError> {
    match shape {
        Shape::Numeric(kind) => Ok(kind.size()),
        Shape::Array { element, len } => shape_size(element)?
            .checked_mul(*len)
            .ok_or(SizeError::Overflow),
        Shape::Struct(s) => {
            let mut end = 0usize;
            let mut align = s.align.max(1);
            for field in &s.fields {
                let size = shape_size(&field.shape)?;
                let field_end = field.offset.checked_add(size).ok_or(SizeError::Overflow)?;
                end = end.max(field_end);
                align = align.max(field.shape.align());
            }
            let computed = align_up(end, align)?;
            if computed != s.size {
                return Err(SizeError::LayoutMismatch {
                    type_name: s.name,
                    declared: s.size,
                    computed,
                });
            }
            Ok(computed)
        }
        Shape::RawReference(_) => Ok(mem::size_of::<*const u8>()),
        Shape::Invalid(kind) => Err(SizeError::Shape(ShapeError::Unsupported {
            kind: ShapeKind::Invalid(*kind),
            path: shape.to_string(),
        })),
    }
}

/// Flattened size of `value`: its own bytes plus every non-null pointee
/// reachable from it.
///
/// The result is a snapshot. Pointees are walked depth first, fields in
/// declaration order and array elements in index order; each pointee is
/// placed at the next offset aligned for its type. Two references to the
/// same pointee count it twice. A pointee reached again while it is still
/// being expanded fails with [`SizeError::ReferenceCycle`].
///
/// # Safety
///
/// Every non-null pointer reachable from `value` must point to a live,
/// aligned value of its pointee type, and must not be mutated for the
/// duration of the call.
pub unsafe fn flat_size_of<T: Describe>(value: &T) -> Result<usize, SizeError> {
    let shape = classify_with::<T>(ShapePolicy::Flatten)?;
    let own = checked_against::<T>(shape_size(&shape)?)?;
    // SAFETY: forwarded caller contract.
    let mut walk = unsafe { Walk::new(value, own) };
    while walk.place_next()?.is_some() {}
    Ok(walk.cursor())
}

pub(crate) fn checked_against<T>(computed: usize) -> Result<usize, SizeError> {
    let declared = mem::size_of::<T>();
    if computed != declared {
        return Err(SizeError::LayoutMismatch {
            type_name: type_name::<T>(),
            declared,
            computed,
        });
    }
    Ok(computed)
}

/// Round `value` up to a multiple of `align` (a power of two).
pub(crate) fn align_up(value: usize, align: usize) -> Result<usize, SizeError> {
    debug_assert!(align.is_power_of_two());
    value
        .checked_add(align - 1)
        .map(|v| v & !(align - 1))
        .ok_or(SizeError::Overflow)
}

/// One pointer found while expanding a record, not yet placed.
struct Pending {
    slot: usize,
    address: usize,
    type_id: TypeId,
    type_name: &'static str,
    size: usize,
    align: usize,
    expand: Option<Expand>,
}

/// Collect the pointers of the `P` at `address`, whose copy starts at `base`.
type Expand = unsafe fn(usize, usize, &mut Vec<Pending>);

unsafe fn expand<P: Describe>(address: usize, base: usize, found: &mut Vec<Pending>) {
    // SAFETY: `address` is a live `P` per the caller contract.
    let result = unsafe { (*(address as *const P)).flatten(base, found) };
    match result {
        Ok(()) => {}
        Err(never) => match never {},
    }
}

impl Flattener for Vec<Pending> {
    type Error = Infallible;

    unsafe fn reference<P: Describe>(
        &mut self,
        slot: usize,
        pointee: *const P,
    ) -> Result<(), Infallible> {
        if pointee.is_null() {
            return Ok(());
        }
        self.push(Pending {
            slot,
            address: pointee as usize,
            type_id: TypeId::of::<P>(),
            type_name: type_name::<P>(),
            size: mem::size_of::<P>(),
            align: mem::align_of::<P>(),
            expand: P::HAS_REFERENCES.then_some(expand::<P> as Expand),
        });
        Ok(())
    }
}

enum Step {
    Visit(Pending),
    Leave,
}

/// A pointee given its place in the flattened output.
pub(crate) struct Placed {
    /// Offset of the pointer slot that referred to it.
    pub(crate) slot: usize,
    /// Offset of its copy.
    pub(crate) start: usize,
    pub(crate) address: usize,
    pub(crate) size: usize,
}

/// Depth-first walk over every pointee reachable from a root, on the heap.
///
/// Pointees come out in pre-order, fields in declaration order and array
/// elements in index order, each placed at the next offset aligned for its
/// type. `path` holds the pointees whose subtrees are still open, so a
/// pointee found on it is a cycle.
pub(crate) struct Walk {
    cursor: usize,
    path: IndexSet<(usize, TypeId)>,
    stack: Vec<Step>,
    found: Vec<Pending>,
}

impl Walk {
    /// Start below `root`, whose own bytes end at `cursor`.
    ///
    /// # Safety
    ///
    /// Every non-null pointer reachable from `root` must point to a live,
    /// aligned value of its pointee type for as long as the walk runs.
    pub(crate) unsafe fn new<T: Describe>(root: &T, cursor: usize) -> Self {
        let mut walk = Self {
            cursor,
            path: IndexSet::new(),
            stack: Vec::new(),
            found: Vec::new(),
        };
        walk.path.insert((root as *const T as usize, TypeId::of::<T>()));
        // SAFETY: forwarded caller contract.
        unsafe { expand::<T>(root as *const T as usize, 0, &mut walk.found) };
        walk.push_found();
        walk
    }

    /// End of the output so far.
    pub(crate) fn cursor(&self) -> usize {
        self.cursor
    }

    /// Place the next pointee, or `None` when the walk is done.
    pub(crate) fn place_next(&mut self) -> Result<Option<Placed>, SizeError> {
        while let Some(step) = self.stack.pop() {
            let pending = match step {
                Step::Leave => {
                    self.path.pop();
                    continue;
                }
                Step::Visit(pending) => pending,
            };
            let key = (pending.address, pending.type_id);
            if self.path.contains(&key) {
                return Err(SizeError::ReferenceCycle {
                    type_name: pending.type_name,
                });
            }
            let start = align_up(self.cursor, pending.align)?;
            self.cursor = start.checked_add(pending.size).ok_or(SizeError::Overflow)?;
            if let Some(expand) = pending.expand {
                self.path.insert(key);
                self.stack.push(Step::Leave);
                // SAFETY: the pointee was reached from the root, so it is
                // live per the contract of `Walk::new`.
                unsafe { expand(pending.address, start, &mut self.found) };
                self.push_found();
            }
            return Ok(Some(Placed {
                slot: pending.slot,
                start,
                address: pending.address,
                size: pending.size,
            }));
        }
        Ok(None)
    }

    fn push_found(&mut self) {
        // Reversed, so the first pointer found is the first popped.
        self.stack.extend(self.found.drain(..).rev().map(Step::Visit));
    }
}
