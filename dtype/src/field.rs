use std::fmt;

use itertools::Itertools;
use smallvec::SmallVec;
use snafu::ensure;

use crate::element::ElementKind;
use crate::error::{Result, TensorOrderTooHighSnafu, TooManyFieldDimensionsSnafu, ZeroExtentSnafu};
use crate::layout::FieldLayout;

/// Maximum number of field (spatial) dimensions.
pub const MAX_FIELD_DIMENSIONS: usize = 3;

/// Maximum tensor order (0 = scalar, 1 = vector, 2 = matrix).
pub const MAX_TENSOR_ORDER: usize = 2;

/// Extents of a field or tensor shape, outermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Shape {
    extents: SmallVec<[usize; 3]>,
}

impl Shape {
    pub fn new(extents: &[usize]) -> Self {
        Self { extents: SmallVec::from_slice(extents) }
    }

    /// The zero-dimensional shape (a single point / a scalar tensor).
    pub fn scalar() -> Self {
        Self::default()
    }

    pub fn dimensions(&self) -> usize {
        self.extents.len()
    }

    /// Number of points covered; 1 for the zero-dimensional shape.
    pub fn points(&self) -> usize {
        self.extents.iter().product()
    }

    pub fn extents(&self) -> &[usize] {
        &self.extents
    }

    pub fn get(&self, index: usize) -> Option<usize> {
        self.extents.get(index).copied()
    }

    /// Extent counted from the innermost dimension; 1 when absent.
    pub fn from_inner(&self, index: usize) -> usize {
        let dims = self.extents.len();
        if index < dims { self.extents[dims - 1 - index] } else { 1 }
    }
}

impl From<&[usize]> for Shape {
    fn from(extents: &[usize]) -> Self {
        Self::new(extents)
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(extents: [usize; N]) -> Self {
        Self::new(&extents)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.extents.iter().join(" x "))
    }
}

/// Shape and element kind of a tensor field.
///
/// Structural equality: two field types are equal iff field shape, tensor shape
/// and element kind are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldType {
    field_shape: Shape,
    tensor_shape: Shape,
    element: ElementKind,
}

impl FieldType {
    pub fn new(field_shape: impl Into<Shape>, tensor_shape: impl Into<Shape>, element: ElementKind) -> Result<Self> {
        let field_shape = field_shape.into();
        let tensor_shape = tensor_shape.into();

        let dims = field_shape.dimensions();
        ensure!(
            dims <= MAX_FIELD_DIMENSIONS,
            TooManyFieldDimensionsSnafu { shape: field_shape.extents().to_vec(), dims, max: MAX_FIELD_DIMENSIONS }
        );
        let order = tensor_shape.dimensions();
        ensure!(
            order <= MAX_TENSOR_ORDER,
            TensorOrderTooHighSnafu { shape: tensor_shape.extents().to_vec(), order, max: MAX_TENSOR_ORDER }
        );
        for shape in [&field_shape, &tensor_shape] {
            ensure!(!shape.extents().contains(&0), ZeroExtentSnafu { shape: shape.extents().to_vec() });
        }

        Ok(Self { field_shape, tensor_shape, element })
    }

    /// Scalar float field.
    pub fn scalar(field_shape: &[usize]) -> Result<Self> {
        Self::new(field_shape, Shape::scalar(), ElementKind::Float)
    }

    /// Float field with a vector of `length` elements at every point.
    pub fn vector(field_shape: &[usize], length: usize) -> Result<Self> {
        Self::new(field_shape, [length], ElementKind::Float)
    }

    /// Float field with a `rows x columns` matrix at every point.
    pub fn matrix(field_shape: &[usize], rows: usize, columns: usize) -> Result<Self> {
        Self::new(field_shape, [rows, columns], ElementKind::Float)
    }

    /// Scalar complex field.
    pub fn complex(field_shape: &[usize]) -> Result<Self> {
        Self::new(field_shape, Shape::scalar(), ElementKind::Complex)
    }

    /// Pixel field with `channels` color channels per point (0 for grayscale).
    pub fn pixel(field_shape: &[usize], channels: usize) -> Result<Self> {
        if channels == 0 {
            Self::new(field_shape, Shape::scalar(), ElementKind::Pixel)
        } else {
            Self::new(field_shape, [channels], ElementKind::Pixel)
        }
    }

    pub fn field_shape(&self) -> &Shape {
        &self.field_shape
    }

    pub fn tensor_shape(&self) -> &Shape {
        &self.tensor_shape
    }

    pub fn element(&self) -> ElementKind {
        self.element
    }

    /// Number of field dimensions (0–3).
    pub fn dimensions(&self) -> usize {
        self.field_shape.dimensions()
    }

    /// Tensor order (0 = scalar, 1 = vector, 2 = matrix).
    pub fn tensor_order(&self) -> usize {
        self.tensor_shape.dimensions()
    }

    pub fn points(&self) -> usize {
        self.field_shape.points()
    }

    pub fn tensor_elements(&self) -> usize {
        self.tensor_shape.points()
    }

    /// Product of all field and tensor extents.
    pub fn total_size(&self) -> usize {
        self.points() * self.tensor_elements()
    }

    pub fn columns(&self) -> usize {
        self.field_shape.from_inner(0)
    }

    pub fn rows(&self) -> usize {
        self.field_shape.from_inner(1)
    }

    pub fn layers(&self) -> usize {
        self.field_shape.from_inner(2)
    }

    pub fn layout(&self) -> FieldLayout {
        FieldLayout::of(self)
    }

    /// Same field shape and tensor shape, different element kind.
    pub fn with_element(&self, element: ElementKind) -> Self {
        Self { element, ..self.clone() }
    }

    /// Same field shape and element kind, different tensor shape.
    pub fn with_tensor_shape(&self, tensor_shape: impl Into<Shape>) -> Result<Self> {
        Self::new(self.field_shape.clone(), tensor_shape, self.element)
    }

    /// Same tensor shape and element kind, different field shape.
    pub fn with_field_shape(&self, field_shape: impl Into<Shape>) -> Result<Self> {
        Self::new(field_shape, self.tensor_shape.clone(), self.element)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tensor_order() {
            0 => write!(f, "Scalar")?,
            1 => write!(f, "Vector{}", self.tensor_shape)?,
            _ => write!(f, "Matrix{}", self.tensor_shape)?,
        }
        write!(f, "{}Field{}", self.element, self.field_shape)
    }
}
