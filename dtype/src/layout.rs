use crate::element::ElementKind;
use crate::field::FieldType;

/// Storage layout of a field on the accelerator, in `f32` words.
///
/// Planes are ordered `[part][tensor element][layer][row][column]`: the column
/// index varies fastest, each tensor element owns a contiguous plane of all
/// points, and complex fields store the real block before the imaginary block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldLayout {
    pub columns: usize,
    pub rows: usize,
    pub layers: usize,
    pub row_stride: usize,
    pub layer_stride: usize,
    pub tensor_stride: usize,
    pub tensor_elements: usize,
    /// Offset of the imaginary plane for complex fields, 0 otherwise.
    pub part_stride: usize,
    pub parts: usize,
    pub element: ElementKind,
}

impl FieldLayout {
    pub fn of(field_type: &FieldType) -> Self {
        let columns = field_type.columns();
        let rows = field_type.rows();
        let layers = field_type.layers();
        let row_stride = columns;
        let layer_stride = rows * row_stride;
        let tensor_stride = layers * layer_stride;
        let tensor_elements = field_type.tensor_elements();
        let element = field_type.element();
        let part_stride = if element.is_complex() { tensor_stride * tensor_elements } else { 0 };
        Self {
            columns,
            rows,
            layers,
            row_stride,
            layer_stride,
            tensor_stride,
            tensor_elements,
            part_stride,
            parts: element.parts(),
            element,
        }
    }

    pub fn points(&self) -> usize {
        self.tensor_stride
    }

    /// Accelerator storage length in `f32` words.
    pub fn words(&self) -> usize {
        self.tensor_stride * self.tensor_elements * self.parts
    }

    /// Host storage length in bytes.
    pub fn host_bytes(&self) -> usize {
        self.tensor_stride * self.tensor_elements * self.parts * self.element.host_bytes()
    }

    /// Word offset of a point's first tensor element.
    #[inline]
    pub fn point_index(&self, layer: usize, row: usize, column: usize) -> usize {
        layer * self.layer_stride + row * self.row_stride + column
    }

    /// Word offset of one tensor element at a point (real part for complex).
    #[inline]
    pub fn index(&self, layer: usize, row: usize, column: usize, tensor_element: usize) -> usize {
        tensor_element * self.tensor_stride + self.point_index(layer, row, column)
    }
}
