//! The closed set of value shapes and their native layout facts.

use std::any::TypeId;
use std::fmt;
use std::mem;

use num_complex::Complex;

use crate::describe::Describe;

/// A fixed-width scalar kind.
///
/// Complex kinds follow the component width convention: `Complex32` is a
/// pair of `f32` (8 bytes) and `Complex64` a pair of `f64` (16 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NumericKind {
    /// `bool`.
    Bool,
    /// `i8`.
    I8,
    /// `i16`.
    I16,
    /// `i32`.
    I32,
    /// `i64`.
    I64,
    /// `i128`.
    I128,
    /// `isize`.
    Isize,
    /// `u8`.
    U8,
    /// `u16`.
    U16,
    /// `u32`.
    U32,
    /// `u64`.
    U64,
    /// `u128`.
    U128,
    /// `usize`.
    Usize,
    /// `f32`.
    F32,
    /// `f64`.
    F64,
    /// `Complex<f32>`.
    Complex32,
    /// `Complex<f64>`.
    Complex64,
}

macro_rules! numeric_table {
    ($($kind:ident => $ty:ty, $name:literal;)*) => {
        impl NumericKind {
            /// Every numeric kind, in declaration order.
            pub const ALL: &'static [NumericKind] = &[$(NumericKind::$kind),*];

            /// Native size in bytes.
            pub const fn size(self) -> usize {
                match self {
                    $(Self::$kind => mem::size_of::<$ty>(),)*
                }
            }

            /// Native alignment in bytes.
            pub const fn align(self) -> usize {
                match self {
                    $(Self::$kind => mem::align_of::<$ty>(),)*
                }
            }

            /// The Rust spelling of the kind.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$kind => $name,)*
                }
            }
        }
    };
}

numeric_table! {
    Bool => bool, "bool";
    I8 => i8, "i8";
    I16 => i16, "i16";
    I32 => i32, "i32";
    I64 => i64, "i64";
    I128 => i128, "i128";
    Isize => isize, "isize";
    U8 => u8, "u8";
    U16 => u16, "u16";
    U32 => u32, "u32";
    U64 => u64, "u64";
    U128 => u128, "u128";
    Usize => usize, "usize";
    F32 => f32, "f32";
    F64 => f64, "f64";
    Complex32 => Complex<f32>, "Complex<f32>";
    Complex64 => Complex<f64>, "Complex<f64>";
}

/// A kind of value that can never be stored in raw memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InvalidKind {
    /// Variable-length sequence (`Vec`, `VecDeque`, boxed slices).
    Sequence,
    /// Associative container (`HashMap`, `BTreeMap`, sets, `IndexMap`).
    Map,
    /// Dynamically-typed value (`Box<dyn Any>`).
    Dynamic,
    /// Function pointer or boxed closure.
    Callable,
    /// Channel endpoint.
    Channel,
    /// Owned text (`String`, `Box<str>`).
    Text,
}

impl fmt::Display for InvalidKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sequence => "sequence",
            Self::Map => "map",
            Self::Dynamic => "dynamic value",
            Self::Callable => "callable",
            Self::Channel => "channel",
            Self::Text => "text",
        };
        f.write_str(name)
    }
}

/// Summary tag of a [`Shape`], used to identify offending kinds in errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    /// Scalar value.
    Numeric,
    /// Fixed-size array.
    Array,
    /// Struct with ordered fields.
    Struct,
    /// Raw pointer.
    RawReference,
    /// Unsupported kind.
    Invalid(InvalidKind),
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric => f.write_str("numeric"),
            Self::Array => f.write_str("array"),
            Self::Struct => f.write_str("struct"),
            Self::RawReference => f.write_str("raw reference"),
            Self::Invalid(kind) => write!(f, "{kind}"),
        }
    }
}

/// Structural description of a type's in-memory representation.
///
/// Shapes are produced by [`Describe::shape`] and validated by
/// [`classify`](crate::classify::classify). Construction never fails: an
/// unsupported nested type simply appears as [`Shape::Invalid`] somewhere in
/// the tree, and validation rejects it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Shape {
    /// A scalar.
    Numeric(NumericKind),
    /// `[element; len]`, laid out with a stride of the element size.
    Array {
        /// Shape of every element.
        element: Box<Shape>,
        /// Number of elements.
        len: usize,
    },
    /// A struct (or unit/tuple struct).
    Struct(StructShape),
    /// `*const T` / `*mut T`.
    RawReference(ReferenceShape),
    /// A kind that cannot be stored.
    Invalid(InvalidKind),
}

impl Shape {
    /// The summary tag of this shape.
    pub fn kind(&self) -> ShapeKind {
        match self {
            Self::Numeric(_) => ShapeKind::Numeric,
            Self::Array { .. } => ShapeKind::Array,
            Self::Struct(_) => ShapeKind::Struct,
            Self::RawReference(_) => ShapeKind::RawReference,
            Self::Invalid(kind) => ShapeKind::Invalid(*kind),
        }
    }

    /// Native alignment of a value of this shape.
    pub fn align(&self) -> usize {
        match self {
            Self::Numeric(kind) => kind.align(),
            Self::Array { element, .. } => element.align(),
            Self::Struct(s) => s.align,
            Self::RawReference(_) => mem::align_of::<*const u8>(),
            Self::Invalid(_) => 1,
        }
    }

    /// Whether any reference appears in this shape, not looking through
    /// the references themselves.
    pub fn has_references(&self) -> bool {
        match self {
            Self::Numeric(_) | Self::Invalid(_) => false,
            Self::Array { element, .. } => element.has_references(),
            Self::Struct(s) => s.fields.iter().any(|f| f.shape.has_references()),
            Self::RawReference(_) => true,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(kind) => f.write_str(kind.name()),
            Self::Array { element, len } => write!(f, "[{element}; {len}]"),
            Self::Struct(s) => {
                write!(f, "{} {{", short_type_name(s.name))?;
                for (i, field) in s.fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, " {}: {}", field.name, field.shape)?;
                }
                if s.fields.is_empty() {
                    f.write_str("}")
                } else {
                    f.write_str(" }")
                }
            }
            Self::RawReference(r) => {
                let qualifier = if r.mutable { "mut" } else { "const" };
                write!(f, "*{qualifier} {}", short_type_name(r.pointee_name))
            }
            Self::Invalid(kind) => write!(f, "<{kind}>"),
        }
    }
}

/// Layout of a struct as reported by the compiler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructShape {
    /// Full type name.
    pub name: &'static str,
    /// `size_of` the struct.
    pub size: usize,
    /// `align_of` the struct.
    pub align: usize,
    /// Fields in declaration order.
    pub fields: Vec<FieldShape>,
}

impl StructShape {
    /// Create a struct shape.
    pub fn new(name: &'static str, size: usize, align: usize, fields: Vec<FieldShape>) -> Self {
        Self {
            name,
            size,
            align,
            fields,
        }
    }

    /// The struct shape of `T` with the given fields.
    pub fn of<T>(fields: Vec<FieldShape>) -> Self {
        Self::new(
            std::any::type_name::<T>(),
            mem::size_of::<T>(),
            mem::align_of::<T>(),
            fields,
        )
    }
}

/// One field of a [`StructShape`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldShape {
    /// Field name (`"0"`, `"1"`, ... for tuple structs).
    pub name: &'static str,
    /// Byte offset from the start of the struct.
    pub offset: usize,
    /// Shape of the field.
    pub shape: Shape,
}

impl FieldShape {
    /// Create a field shape.
    pub fn new(name: &'static str, offset: usize, shape: Shape) -> Self {
        Self {
            name,
            offset,
            shape,
        }
    }
}

/// A raw pointer and the type it points to.
///
/// The pointee shape is produced lazily so that a type holding a pointer to
/// itself still has a finite description.
#[derive(Clone, Copy)]
pub struct ReferenceShape {
    /// Full type name of the pointee.
    pub pointee_name: &'static str,
    /// `TypeId` of the pointee.
    pub pointee_id: TypeId,
    /// Whether the pointer is `*mut`.
    pub mutable: bool,
    pointee: fn() -> Shape,
}

impl ReferenceShape {
    /// Describe a pointer to `P`.
    pub fn of<P: Describe>(mutable: bool) -> Self {
        Self {
            pointee_name: std::any::type_name::<P>(),
            pointee_id: TypeId::of::<P>(),
            mutable,
            pointee: P::shape,
        }
    }

    /// Shape of the pointee.
    pub fn pointee_shape(&self) -> Shape {
        (self.pointee)()
    }
}

impl PartialEq for ReferenceShape {
    fn eq(&self, other: &Self) -> bool {
        self.pointee_id == other.pointee_id && self.mutable == other.mutable
    }
}

impl Eq for ReferenceShape {}

impl fmt::Debug for ReferenceShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceShape")
            .field("pointee", &self.pointee_name)
            .field("mutable", &self.mutable)
            .finish()
    }
}

/// Strip module paths from every path inside a type name:
/// `a::b::Node<c::D>` becomes `Node<D>` and `[alloc::string::String; 2]`
/// becomes `[String; 2]`.
pub fn short_type_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut path_start = 0;
    for (i, c) in name.char_indices() {
        if !(c.is_alphanumeric() || c == '_' || c == ':') {
            out.push_str(last_segment(&name[path_start..i]));
            out.push(c);
            path_start = i + c.len_utf8();
        }
    }
    out.push_str(last_segment(&name[path_start..]));
    out
}

fn last_segment(path: &str) -> &str {
    path.rfind("::").map_or(path, |pos| &path[pos + 2..])
}
