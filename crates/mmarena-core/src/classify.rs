//! Structural validation of shapes.
//!
//! Validation always walks the whole tree: a struct is accepted only when
//! every field is, an array only when its element is. Walking through a
//! reference expands the pointee type once; a pointee already expanded (or
//! the root type itself) is not revisited, so self-referential pointer types
//! terminate.

use std::any::{type_name, TypeId};
use std::fmt::Write as _;

use indexmap::IndexSet;
use smallvec::SmallVec;

use crate::describe::Describe;
use crate::error::ShapeError;
use crate::shape::{short_type_name, Shape, ShapeKind};

/// How raw references are treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ShapePolicy {
    /// References are unsupported. Records are exactly their own bytes.
    #[default]
    Strict,
    /// References are accepted when their pointee is; their data is copied
    /// inline by flattened sizing and marshalling.
    Flatten,
}

/// Classify `T` under [`ShapePolicy::Strict`].
///
/// Returns the validated shape, or the first unsupported node found in
/// declaration order.
pub fn classify<T: Describe>() -> Result<Shape, ShapeError> {
    classify_with::<T>(ShapePolicy::Strict)
}

/// Classify `T` under the given policy.
pub fn classify_with<T: Describe>(policy: ShapePolicy) -> Result<Shape, ShapeError> {
    let shape = T::shape();
    let mut walk = Walk::new(short_type_name(type_name::<T>()), policy);
    walk.expanded.insert(TypeId::of::<T>());
    walk.visit(&shape)?;
    Ok(shape)
}

/// Classify the type of `value` under [`ShapePolicy::Strict`].
///
/// Only the type matters in strict mode; the value is accepted for call
/// sites that hold an instance rather than a type.
pub fn classify_value<T: Describe>(value: &T) -> Result<Shape, ShapeError> {
    let _ = value;
    classify::<T>()
}

/// Validate an already-built shape.
pub fn validate(shape: &Shape, policy: ShapePolicy) -> Result<(), ShapeError> {
    let root = match shape {
        Shape::Struct(s) => short_type_name(s.name),
        other => other.to_string(),
    };
    Walk::new(root, policy).visit(shape)
}

#[derive(Clone, Copy, Debug)]
enum Segment {
    Field(&'static str),
    Element,
    Deref,
}

struct Walk {
    root: String,
    policy: ShapePolicy,
    path: SmallVec<[Segment; 8]>,
    expanded: IndexSet<TypeId>,
}

impl Walk {
    fn new(root: String, policy: ShapePolicy) -> Self {
        Self {
            root,
            policy,
            path: SmallVec::new(),
            expanded: IndexSet::new(),
        }
    }

    fn visit(&mut self, shape: &Shape) -> Result<(), ShapeError> {
        match shape {
            Shape::Numeric(_) => Ok(()),
            Shape::Array { element, .. } => {
                self.path.push(Segment::Element);
                self.visit(element)?;
                self.path.pop();
                Ok(())
            }
            Shape::Struct(s) => {
                for field in &s.fields {
                    self.path.push(Segment::Field(field.name));
                    self.visit(&field.shape)?;
                    self.path.pop();
                }
                Ok(())
            }
            Shape::RawReference(r) => match self.policy {
                ShapePolicy::Strict => Err(self.unsupported(ShapeKind::RawReference)),
                ShapePolicy::Flatten => {
                    if !self.expanded.insert(r.pointee_id) {
                        return Ok(());
                    }
                    self.path.push(Segment::Deref);
                    self.visit(&r.pointee_shape())?;
                    self.path.pop();
                    Ok(())
                }
            },
            Shape::Invalid(kind) => Err(self.unsupported(ShapeKind::Invalid(*kind))),
        }
    }

    fn unsupported(&self, kind: ShapeKind) -> ShapeError {
        let mut path = self.root.clone();
        for segment in &self.path {
            // Writing to a String cannot fail.
            let _ = match segment {
                Segment::Field(name) => write!(path, ".{name}"),
                Segment::Element => write!(path, "[]"),
                Segment::Deref => write!(path, "*"),
            };
        }
        ShapeError::Unsupported { kind, path }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use mmarena_derive::Describe;
    use num_complex::Complex;

    use super::*;
    use crate::shape::{InvalidKind, NumericKind};

    #[allow(dead_code)]
    #[derive(Describe)]
    struct Point {
        x: i64,
        y: i64,
    }

    #[allow(dead_code)]
    #[derive(Describe)]
    struct Tagged {
        id: u32,
        tags: Vec<u32>,
    }

    #[allow(dead_code)]
    #[derive(Describe)]
    struct Outer {
        ok: [Point; 2],
        deep: [Inner; 1],
    }

    #[allow(dead_code)]
    #[derive(Describe)]
    struct Inner {
        label: String,
    }

    #[allow(dead_code)]
    #[derive(Describe)]
    struct Node {
        value: u64,
        next: *const Node,
    }

    #[allow(dead_code)]
    #[derive(Describe)]
    struct Holder {
        index: *const HashMap<u8, u8>,
    }

    #[test]
    fn numerics_classify_as_numeric() {
        assert_eq!(classify::<bool>().unwrap(), Shape::Numeric(NumericKind::Bool));
        assert_eq!(
            classify::<Complex<f32>>().unwrap().kind(),
            ShapeKind::Numeric
        );
        assert_eq!(classify::<[u8; 4]>().unwrap().kind(), ShapeKind::Array);
        assert_eq!(classify::<Point>().unwrap().kind(), ShapeKind::Struct);
    }

    #[test]
    fn struct_with_unsupported_field_is_rejected() {
        let err = classify::<Tagged>().unwrap_err();
        assert_eq!(err.kind(), ShapeKind::Invalid(InvalidKind::Sequence));
        assert_eq!(
            err,
            ShapeError::Unsupported {
                kind: ShapeKind::Invalid(InvalidKind::Sequence),
                path: "Tagged.tags".into(),
            }
        );
    }

    #[test]
    fn rejection_reaches_through_arrays_and_structs() {
        let err = classify::<Outer>().unwrap_err();
        assert_eq!(
            err,
            ShapeError::Unsupported {
                kind: ShapeKind::Invalid(InvalidKind::Text),
                path: "Outer.deep[].label".into(),
            }
        );
    }

    #[test]
    fn zero_length_array_of_invalid_is_still_invalid() {
        let err = classify::<[String; 0]>().unwrap_err();
        assert_eq!(err.kind(), ShapeKind::Invalid(InvalidKind::Text));
    }

    #[test]
    fn strict_policy_rejects_references() {
        let err = classify::<Node>().unwrap_err();
        assert_eq!(
            err,
            ShapeError::Unsupported {
                kind: ShapeKind::RawReference,
                path: "Node.next".into(),
            }
        );
        assert_eq!(
            classify::<*const u8>().unwrap_err().kind(),
            ShapeKind::RawReference
        );
    }

    #[test]
    fn flatten_policy_accepts_self_referential_types() {
        let shape = classify_with::<Node>(ShapePolicy::Flatten).unwrap();
        assert!(shape.has_references());
    }

    #[test]
    fn flatten_policy_still_validates_pointees() {
        let err = classify_with::<Holder>(ShapePolicy::Flatten).unwrap_err();
        assert_eq!(
            err,
            ShapeError::Unsupported {
                kind: ShapeKind::Invalid(InvalidKind::Map),
                path: "Holder.index*".into(),
            }
        );
    }

    #[test]
    fn classify_value_matches_classify() {
        let p = Point { x: 1, y: 2 };
        assert_eq!(classify_value(&p).unwrap(), classify::<Point>().unwrap());
        assert_eq!(p.x + p.y, 3);
    }

    #[test]
    fn validate_names_root_for_non_structs() {
        let shape = Vec::<u8>::shape();
        let err = validate(&shape, ShapePolicy::Strict).unwrap_err();
        assert_eq!(
            err,
            ShapeError::Unsupported {
                kind: ShapeKind::Invalid(InvalidKind::Sequence),
                path: "<sequence>".into(),
            }
        );
    }

    #[test]
    fn array_roots_keep_their_brackets() {
        let err = classify::<[String; 2]>().unwrap_err();
        assert_eq!(err.to_string(), "unsupported text at `[String; 2][]`");
        let err = classify::<[[Vec<u8>; 2]; 3]>().unwrap_err();
        assert_eq!(
            err,
            ShapeError::Unsupported {
                kind: ShapeKind::Invalid(InvalidKind::Sequence),
                path: "[[Vec<u8>; 2]; 3][][]".into(),
            }
        );
    }

    #[test]
    fn unsupported_root_type_uses_its_name() {
        let err = classify::<String>().unwrap_err();
        assert_eq!(
            err,
            ShapeError::Unsupported {
                kind: ShapeKind::Invalid(InvalidKind::Text),
                path: "String".into(),
            }
        );
    }
}
