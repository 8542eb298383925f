//! Field geometry for weft.
//!
//! A [`FieldType`] describes a dense grid of tensor-valued samples: up to three
//! field dimensions (layers, rows, columns), up to two tensor dimensions, and an
//! [`ElementKind`]. Field types are immutable values compared structurally; every
//! stage of the compiler (addressing, launch geometry, source synthesis) is a pure
//! function of them.
//!
//! [`FieldLayout`] is the storage view of a field type: extents with missing
//! dimensions filled in as 1, and the strides used both by generated kernel
//! source and by the host-side programs that emulate it.

pub mod element;
pub mod error;
pub mod field;
pub mod layout;

#[cfg(any(test, feature = "proptest"))]
pub mod proptest_gen;

#[cfg(test)]
pub mod test;

pub use element::ElementKind;
pub use error::*;
pub use field::{FieldType, MAX_FIELD_DIMENSIONS, MAX_TENSOR_ORDER, Shape};
pub use layout::FieldLayout;
