//! Reusable record types.
//!
//! Storable records:
//!
//! - [`Coordinate`]: two `i64`s, the canonical two-field record.
//! - [`Mixed`]: complex, integer and boolean-array fields whose aligned
//!   size differs from the naive sum of field sizes.
//! - [`Particle`]: a wider record for benches.
//! - [`Link`]: a self-referential record, storable only flattened.
//!
//! Rejected records each hold one field of an unsupported kind.

use std::any::Any;

use indexmap::IndexMap;
use mmarena_core::{InvalidKind, ShapeKind};
use mmarena_derive::Describe;
use num_complex::Complex;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Describe)]
pub struct Coordinate {
    pub x: i64,
    pub y: i64,
}

impl Coordinate {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// 16 + 16 + 1 + 13 = 46 bytes of fields, 48 bytes aligned.
#[derive(Clone, Copy, Debug, PartialEq, Describe)]
pub struct Mixed {
    pub a: Complex<f64>,
    pub b: Complex<f64>,
    pub c: i8,
    pub d: [bool; 13],
}

impl Mixed {
    pub fn sample(seed: i8) -> Self {
        let f = f64::from(seed);
        Self {
            a: Complex::new(f, -f),
            b: Complex::new(f * 0.5, 1.0),
            c: seed,
            d: std::array::from_fn(|i| (i as i8).wrapping_add(seed) % 2 == 0),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Describe)]
pub struct Particle {
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    pub mass: f32,
    pub alive: bool,
    pub id: u64,
}

impl Particle {
    pub fn at(id: u64) -> Self {
        let p = id as f32;
        Self {
            position: [p, p + 1.0, p + 2.0],
            velocity: [0.0, -1.0, 0.5],
            mass: 1.0,
            alive: true,
            id,
        }
    }
}

#[derive(Clone, Copy, Debug, Describe)]
pub struct Link {
    pub value: u64,
    pub next: *const Link,
}

impl Link {
    pub fn new(value: u64, next: *const Link) -> Self {
        Self { value, next }
    }
}

#[derive(Describe)]
pub struct WithSequence {
    pub id: u32,
    pub items: Vec<u32>,
}

#[derive(Describe)]
pub struct WithMap {
    pub id: u32,
    pub index: IndexMap<u32, u32>,
}

#[derive(Describe)]
pub struct WithDynamic {
    pub id: u32,
    pub payload: Box<dyn Any>,
}

#[derive(Describe)]
pub struct WithCallable {
    pub id: u32,
    pub callback: fn(u32) -> u32,
}

#[derive(Describe)]
pub struct WithChannel {
    pub id: u32,
    pub inbox: crossbeam_channel::Receiver<u32>,
}

#[derive(Describe)]
pub struct WithText {
    pub id: u32,
    pub label: String,
}

#[derive(Describe)]
pub struct WithReference {
    pub id: u32,
    pub target: *const u64,
}

fn double(x: u32) -> u32 {
    x * 2
}

impl WithSequence {
    pub fn sample() -> Self {
        Self {
            id: 1,
            items: vec![1, 2, 3],
        }
    }
}

impl WithMap {
    pub fn sample() -> Self {
        Self {
            id: 1,
            index: IndexMap::from([(1, 2)]),
        }
    }
}

impl WithDynamic {
    pub fn sample() -> Self {
        Self {
            id: 1,
            payload: Box::new(5u8),
        }
    }
}

impl WithCallable {
    pub fn sample() -> Self {
        Self {
            id: 1,
            callback: double,
        }
    }
}

impl WithChannel {
    pub fn sample() -> Self {
        let (_tx, rx) = crossbeam_channel::bounded(1);
        Self { id: 1, inbox: rx }
    }
}

impl WithText {
    pub fn sample() -> Self {
        Self {
            id: 1,
            label: "label".to_owned(),
        }
    }
}

impl WithReference {
    pub fn sample() -> Self {
        Self {
            id: 1,
            target: std::ptr::null(),
        }
    }
}

/// The kind each rejected fixture must be reported as.
pub const REJECTED_KINDS: [(&str, ShapeKind); 7] = [
    ("sequence", ShapeKind::Invalid(InvalidKind::Sequence)),
    ("map", ShapeKind::Invalid(InvalidKind::Map)),
    ("dynamic", ShapeKind::Invalid(InvalidKind::Dynamic)),
    ("callable", ShapeKind::Invalid(InvalidKind::Callable)),
    ("channel", ShapeKind::Invalid(InvalidKind::Channel)),
    ("text", ShapeKind::Invalid(InvalidKind::Text)),
    ("reference", ShapeKind::RawReference),
];
