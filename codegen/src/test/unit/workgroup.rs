use weft_device::DeviceCapabilities;
use weft_dtype::FieldType;

use crate::{AddressingMode, WorkGroupParameters};

fn caps() -> DeviceCapabilities {
    DeviceCapabilities::DEFAULT
}

#[test]
fn test_two_dimensional_defaults() {
    let wg = WorkGroupParameters::new(&[64, 64], &caps());
    assert_eq!(wg.dimensions(), 2);
    assert_eq!(wg.local(), [16, 16, 1]);
    assert_eq!(wg.global(), [64, 64, 1]);
    assert_eq!(wg.group_count(), 16);
}

#[test]
fn test_local_size_shrinks_to_extent() {
    let wg = WorkGroupParameters::new(&[10], &caps());
    assert_eq!(wg.local(), [16, 1, 1]);
    assert_eq!(wg.global(), [16, 1, 1]);
    assert_eq!(wg.extents(), [10, 1, 1]);
}

#[test]
fn test_global_rounds_up_to_local() {
    let wg = WorkGroupParameters::new(&[1000], &caps());
    assert_eq!(wg.local(), [256, 1, 1]);
    assert_eq!(wg.global(), [1024, 1, 1]);
    assert_eq!(wg.work_items().count(), 1024);
    assert_eq!(wg.active_items().count(), 1000);
}

#[test]
fn test_workgroup_limit_halves_widest_axis() {
    let limited = DeviceCapabilities { max_workgroup_size: 64, ..caps() };
    let wg = WorkGroupParameters::new(&[64, 64], &limited);
    assert_eq!(wg.local(), [8, 8, 1]);
    assert!(wg.local_threads() <= 64);
}

#[test]
fn test_tensor_element_axis() {
    let vectors = FieldType::vector(&[8, 8], 6).unwrap();
    let wg = WorkGroupParameters::for_field(&vectors, AddressingMode::TensorElement, &caps());
    assert_eq!(wg.dimensions(), 3);
    assert_eq!(wg.extents(), [8, 8, 6]);
    assert_eq!(wg.local(), [8, 8, 1]);

    let volume = FieldType::vector(&[4, 4, 4], 6).unwrap();
    let wg = WorkGroupParameters::for_field(&volume, AddressingMode::TensorElement, &caps());
    assert_eq!(wg.extents(), [4, 4, 24]);
    assert_eq!(wg.global(), [4, 4, 24]);
}

#[test]
fn test_zero_dimensional_field_launches_one_thread() {
    let point = FieldType::scalar(&[]).unwrap();
    let wg = WorkGroupParameters::for_field(&point, AddressingMode::SmallTensor, &caps());
    assert_eq!(wg.active_items().collect::<Vec<_>>(), vec![[0, 0, 0]]);
}

#[test]
fn test_explicit_workgroups() {
    let wg = WorkGroupParameters::for_workgroups(3, 64);
    assert_eq!(wg.group_count(), 3);
    assert_eq!(wg.local_threads(), 64);
    assert_eq!(wg.global_threads(), 192);

    let grid = WorkGroupParameters::for_workgroup_grid(4, 5, 32);
    assert_eq!(grid.groups(), [4, 5, 1]);
    assert_eq!(grid.global(), [128, 5, 1]);
}
