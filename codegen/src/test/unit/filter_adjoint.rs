use weft_device::DeviceCapabilities;
use weft_dtype::FieldType;

use crate::synth::filter_adjoint::{TilePlan, child_base, node_slot};
use crate::test::{assert_close, naive_filter_adjoint, run, samples};
use crate::{Error, Opcode, Uncached, output_type, synthesize};

fn caps() -> DeviceCapabilities {
    DeviceCapabilities::DEFAULT
}

fn check(rows: usize, columns: usize, size: usize, capabilities: &DeviceCapabilities, chained: bool) {
    let ft = FieldType::scalar(&[rows, columns]).unwrap();
    let op = synthesize(&Opcode::FilterAdjoint { size }, &[ft.clone(), ft], capabilities, &Uncached).unwrap();
    assert_eq!(op.stages.len() > 1, chained, "unexpected chaining for {rows}x{columns}");
    assert_eq!(op.output.field_shape().extents(), &[size, size]);

    let image = samples(rows * columns, 3);
    let gradient = samples(rows * columns, 4);
    assert_close(&run(&op, &[&image, &gradient]), &naive_filter_adjoint(&image, &gradient, rows, columns, size), 1e-4);
}

#[test]
fn test_single_workgroup() {
    check(8, 8, 3, &caps(), false);
}

#[test]
fn test_many_tiles_with_interior_fast_path() {
    check(64, 64, 3, &caps(), true);
}

#[test]
fn test_chained_small_workgroups() {
    let small = DeviceCapabilities { max_workgroup_size: 64, compute_units: 1, ..caps() };
    check(40, 40, 5, &small, true);
}

#[test]
fn test_ragged_edges() {
    let small = DeviceCapabilities { max_workgroup_size: 32, ..caps() };
    check(13, 21, 7, &small, true);
}

#[test]
fn test_tile_search_default() {
    let plan = TilePlan::search(64, 64, 3, &caps()).unwrap();
    assert_eq!(plan.threads, 256);
    assert_eq!((plan.tile_rows, plan.tile_columns), (16, 16));
    assert_eq!(plan.tiles(), 16);
    assert_eq!(plan.levels(), 8);
    assert_eq!(plan.latency(), 7);
    assert_eq!(plan.iterations(), 16);
}

#[test]
fn test_tile_search_shrinks_to_fit() {
    // 256 threads need 900 halo + 2 * 513 tree + 225 staging words = 8604 bytes.
    let limited = DeviceCapabilities { local_memory_bytes: 8 * 1024, ..caps() };
    let plan = TilePlan::search(64, 64, 15, &limited).unwrap();
    assert_eq!(plan.threads, 128);
    assert_eq!((plan.tile_rows, plan.tile_columns), (8, 16));
    assert_eq!(plan.local_words(), 1399);
}

#[test]
fn test_tile_search_exhausts_local_memory() {
    let tiny = DeviceCapabilities { local_memory_bytes: 256, ..caps() };
    let result = TilePlan::search(64, 64, 3, &tiny);
    assert!(matches!(result, Err(Error::LocalMemoryExhausted { required: 444, available: 256, .. })));
}

#[test]
fn test_bank_padded_slots() {
    assert_eq!(node_slot(31), 31);
    assert_eq!(node_slot(32), 33);
    assert_eq!(child_base(15), 30);
    assert_eq!(child_base(16), node_slot(32));
    assert_eq!(child_base(40), node_slot(80));
}

#[test]
fn test_source_vocabulary() {
    let ft = FieldType::scalar(&[32, 32]).unwrap();
    let op = synthesize(&Opcode::FilterAdjoint { size: 3 }, &[ft.clone(), ft], &caps(), &Uncached).unwrap();
    let source = op.source();
    for needle in ["#define image_rows 32", "readGradient(", "__local float tree0", "SLOT(THREADS + lid)", "barrier("] {
        assert!(source.contains(needle), "missing {needle}");
    }
}

#[test]
fn test_rejected_operands() {
    let a = FieldType::scalar(&[8, 8]).unwrap();
    let b = FieldType::scalar(&[8, 4]).unwrap();
    let even = output_type(&Opcode::FilterAdjoint { size: 4 }, &[a.clone(), a.clone()]);
    assert!(matches!(even, Err(Error::UnsupportedShape { .. })));
    let mismatch = output_type(&Opcode::FilterAdjoint { size: 3 }, &[a, b]);
    assert!(matches!(mismatch, Err(Error::ShapeMismatch { .. })));
}
