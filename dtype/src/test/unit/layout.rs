use crate::FieldType;

#[test]
fn test_scalar_layout_strides() {
    let layout = FieldType::scalar(&[2, 3, 5]).unwrap().layout();
    assert_eq!(layout.row_stride, 5);
    assert_eq!(layout.layer_stride, 15);
    assert_eq!(layout.tensor_stride, 30);
    assert_eq!(layout.part_stride, 0);
    assert_eq!(layout.words(), 30);
    assert_eq!(layout.index(1, 2, 4, 0), 29);
}

#[test]
fn test_vector_planes_are_contiguous() {
    let layout = FieldType::vector(&[4, 4], 3).unwrap().layout();
    assert_eq!(layout.index(0, 0, 0, 1), 16);
    assert_eq!(layout.index(0, 1, 2, 2), 32 + 6);
    assert_eq!(layout.words(), 48);
}

#[test]
fn test_complex_part_stride() {
    let layout = FieldType::complex(&[8]).unwrap().layout();
    assert_eq!(layout.part_stride, 8);
    assert_eq!(layout.parts, 2);
    assert_eq!(layout.words(), 16);
    assert_eq!(layout.host_bytes(), 64);
}

#[test]
fn test_pixel_host_bytes() {
    let layout = FieldType::pixel(&[4, 4], 3).unwrap().layout();
    assert_eq!(layout.words(), 48);
    assert_eq!(layout.host_bytes(), 48);
}
