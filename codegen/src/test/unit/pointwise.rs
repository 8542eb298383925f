use weft_device::DeviceCapabilities;
use weft_dtype::{ElementKind, FieldType};

use crate::test::{assert_close, run, samples};
use crate::{AddressingMode, BinaryOp, Error, Opcode, UnaryOp, Uncached, output_type, synthesize};

fn caps() -> DeviceCapabilities {
    DeviceCapabilities::DEFAULT
}

#[test]
fn test_add_fields() {
    let ft = FieldType::scalar(&[2, 3]).unwrap();
    let op = synthesize(&Opcode::Binary(BinaryOp::Add), &[ft.clone(), ft], &caps(), &Uncached).unwrap();

    let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    let b = [10.0, 20.0, 30.0, 40.0, 50.0, 60.0];
    assert_eq!(run(&op, &[&a, &b]), vec![11.0, 22.0, 33.0, 44.0, 55.0, 66.0]);
    assert!(op.source().contains("writeOut(_layer, _row, _column, 0,"));
}

#[test]
fn test_scalar_broadcast() {
    let ft = FieldType::scalar(&[2, 2]).unwrap();
    let scalar = FieldType::scalar(&[]).unwrap();
    let op = synthesize(&Opcode::Binary(BinaryOp::Multiply), &[ft, scalar], &caps(), &Uncached).unwrap();

    assert_eq!(run(&op, &[&[1.0, 2.0, 3.0, 4.0], &[3.0]]), vec![3.0, 6.0, 9.0, 12.0]);
    assert!(op.source().contains("readB(0, 0, 0, 0)"));
}

#[test]
fn test_big_tensor_uses_tensor_element_threads() {
    let ft = FieldType::vector(&[4, 4], 6).unwrap();
    let op = synthesize(&Opcode::Scale(2.0), std::slice::from_ref(&ft), &caps(), &Uncached).unwrap();
    assert_eq!(op.stages[0].mode, AddressingMode::TensorElement);
    assert!(op.source().contains("_tensorElement"));

    let input = samples(ft.layout().words(), 1);
    let expected: Vec<f32> = input.iter().map(|v| v * 2.0).collect();
    assert_eq!(run(&op, &[&input]), expected);
}

#[test]
fn test_unary_matches_host() {
    let ft = FieldType::vector(&[3, 5], 2).unwrap();
    let input: Vec<f32> = samples(ft.layout().words(), 2).iter().map(|v| v.abs() + 0.1).collect();
    for unary in [UnaryOp::Sqrt, UnaryOp::Log, UnaryOp::Sigmoid, UnaryOp::Negate] {
        let op = synthesize(&Opcode::Unary(unary), std::slice::from_ref(&ft), &caps(), &Uncached).unwrap();
        let expected: Vec<f32> = input.iter().map(|v| unary.apply(*v)).collect();
        assert_close(&run(&op, &[&input]), &expected, 1e-6);
    }
}

#[test]
fn test_complex_multiply() {
    let ft = FieldType::complex(&[2]).unwrap();
    let op = synthesize(&Opcode::ComplexBinary(BinaryOp::Multiply), &[ft.clone(), ft], &caps(), &Uncached).unwrap();

    // (1 + 2i)(i) = -2 + i, (3)(2 + 2i) = 6 + 6i; real plane before imaginary plane
    let a = [1.0, 3.0, 2.0, 0.0];
    let b = [0.0, 2.0, 1.0, 2.0];
    assert_eq!(run(&op, &[&a, &b]), vec![-2.0, 6.0, 1.0, 6.0]);
}

#[test]
fn test_pixel_operands_produce_float() {
    let pixels = FieldType::pixel(&[4, 4], 1).unwrap();
    let output = output_type(&Opcode::Offset(0.5), &[pixels]).unwrap();
    assert_eq!(output.element(), ElementKind::Float);
}

#[test]
fn test_rejected_operands() {
    let small = FieldType::scalar(&[4, 4]).unwrap();
    let large = FieldType::scalar(&[8, 8]).unwrap();
    let complex = FieldType::complex(&[4, 4]).unwrap();

    let mismatch = output_type(&Opcode::Binary(BinaryOp::Add), &[small.clone(), large]);
    assert!(matches!(mismatch, Err(Error::ShapeMismatch { .. })));

    let complex_input = output_type(&Opcode::Unary(UnaryOp::Exp), std::slice::from_ref(&complex));
    assert!(matches!(complex_input, Err(Error::UnsupportedElement { element: ElementKind::Complex, .. })));

    let undefined = output_type(&Opcode::ComplexBinary(BinaryOp::Max), &[complex.clone(), complex]);
    assert!(matches!(undefined, Err(Error::ShapeMismatch { .. })));

    let arity = output_type(&Opcode::Binary(BinaryOp::Add), &[small]);
    assert!(matches!(arity, Err(Error::OperandCount { expected: 2, actual: 1, .. })));
}
