use weft_device::DeviceCapabilities;
use weft_dtype::FieldType;

use crate::test::{run, samples};
use crate::{AddressingMode, Error, Opcode, ReduceOp, Uncached, output_type, synthesize};

fn caps() -> DeviceCapabilities {
    DeviceCapabilities::DEFAULT
}

#[test]
fn test_tensor_reduce_small() {
    let ft = FieldType::vector(&[2, 2], 3).unwrap();
    let op = synthesize(&Opcode::TensorReduce, &[ft], &caps(), &Uncached).unwrap();
    assert_eq!(op.stages[0].mode, AddressingMode::SmallTensor);
    assert_eq!(op.output.tensor_elements(), 1);

    let input = [1.0, 2.0, 3.0, 4.0, 10.0, 20.0, 30.0, 40.0, 100.0, 200.0, 300.0, 400.0];
    assert_eq!(run(&op, &[&input]), vec![111.0, 222.0, 333.0, 444.0]);
}

#[test]
fn test_tensor_reduce_big_loops() {
    let ft = FieldType::vector(&[3, 3], 6).unwrap();
    let op = synthesize(&Opcode::TensorReduce, std::slice::from_ref(&ft), &caps(), &Uncached).unwrap();
    assert_eq!(op.stages[0].mode, AddressingMode::BigTensor);
    assert!(op.source().contains("for ("));

    let input: Vec<f32> = (0..ft.layout().words()).map(|i| (i % 9) as f32).collect();
    let expected: Vec<f32> = (0..9).map(|p| 6.0 * p as f32).collect();
    assert_eq!(run(&op, &[&input]), expected);
}

#[test]
fn test_field_sum_single_group() {
    let ft = FieldType::scalar(&[4, 4]).unwrap();
    let op = synthesize(&Opcode::FieldReduce(ReduceOp::Sum), &[ft], &caps(), &Uncached).unwrap();
    assert_eq!(op.stages.len(), 1);
    assert_eq!(op.output.dimensions(), 0);

    let input: Vec<f32> = (1..=16).map(|v| v as f32).collect();
    assert_eq!(run(&op, &[&input]), vec![136.0]);
}

#[test]
fn test_field_sum_is_exact() {
    // 4097 * 8192 is representable, but a running sum passes through odd
    // multiples of 4097 above 2^24 that are not.
    let ft = FieldType::scalar(&[8192]).unwrap();
    let op = synthesize(&Opcode::FieldReduce(ReduceOp::Sum), &[ft], &caps(), &Uncached).unwrap();
    assert_eq!(op.stages.len(), 2);
    assert_eq!(op.intermediates.len(), 1);

    let input = vec![4097.0f32; 8192];
    assert_eq!(run(&op, &[&input]), vec![33_562_624.0]);
}

#[test]
fn test_field_max_per_tensor_element() {
    let ft = FieldType::vector(&[100, 100], 2).unwrap();
    let op = synthesize(&Opcode::FieldReduce(ReduceOp::Max), std::slice::from_ref(&ft), &caps(), &Uncached).unwrap();
    assert!(op.stages.len() > 1);

    let input = samples(ft.layout().words(), 7);
    let (first, second) = input.split_at(ft.points());
    let expected = vec![
        first.iter().copied().fold(f32::NEG_INFINITY, f32::max),
        second.iter().copied().fold(f32::NEG_INFINITY, f32::max),
    ];
    assert_eq!(run(&op, &[&input]), expected);
}

#[test]
fn test_field_reduce_rejects_complex() {
    let ft = FieldType::complex(&[8]).unwrap();
    let result = output_type(&Opcode::FieldReduce(ReduceOp::Sum), &[ft]);
    assert!(matches!(result, Err(Error::UnsupportedElement { .. })));
}

#[test]
fn test_reduction_needs_local_memory() {
    let tiny = DeviceCapabilities { local_memory_bytes: 16, ..caps() };
    let ft = FieldType::scalar(&[64, 64]).unwrap();
    let result = synthesize(&Opcode::FieldReduce(ReduceOp::Sum), &[ft], &tiny, &Uncached);
    assert!(matches!(result, Err(Error::LocalMemoryExhausted { .. })));
}
