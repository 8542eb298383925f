use proptest::prelude::*;

use crate::{ElementKind, FieldType, MAX_FIELD_DIMENSIONS, MAX_TENSOR_ORDER};

#[rustfmt::skip]
pub fn element_generator() -> impl Strategy<Value = ElementKind> {
    prop_oneof![Just(ElementKind::Float), Just(ElementKind::Complex), Just(ElementKind::Pixel)]
}

/// Field types with small extents, covering every supported dimensionality.
pub fn field_type_generator() -> impl Strategy<Value = FieldType> {
    (
        prop::collection::vec(1usize..40, 0..=MAX_FIELD_DIMENSIONS),
        prop::collection::vec(1usize..6, 0..=MAX_TENSOR_ORDER),
        element_generator(),
    )
        .prop_map(|(field, tensor, element)| {
            FieldType::new(field.as_slice(), tensor.as_slice(), element).expect("generated shapes are in range")
        })
}

/// Float field types, the kind most operations accept.
pub fn float_field_generator() -> impl Strategy<Value = FieldType> {
    field_type_generator().prop_map(|ft| ft.with_element(ElementKind::Float))
}
