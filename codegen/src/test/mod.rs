pub mod unit;

use std::sync::Arc;

use weft_device::{AcceleratorAllocator, Buffer, Encoding};

use crate::CompiledOperation;

/// Accelerator buffer holding `values`.
pub(crate) fn device_buffer(values: &[f32]) -> Buffer {
    let allocator = Arc::new(AcceleratorAllocator::new(0, 1 << 28));
    let mut buffer = Buffer::allocate(allocator, values.len(), Encoding::F32).unwrap();
    buffer.write_f32(values).unwrap();
    buffer
}

/// Execute `operation` on fresh accelerator buffers and return its output.
pub(crate) fn run(operation: &CompiledOperation, inputs: &[&[f32]]) -> Vec<f32> {
    let inputs: Vec<Buffer> = inputs.iter().map(|values| device_buffer(values)).collect();
    let output = device_buffer(&vec![0.0; operation.output.layout().words()]);
    let intermediates: Vec<Buffer> =
        operation.intermediates.iter().map(|words| device_buffer(&vec![0.0; *words])).collect();

    operation.execute(&inputs, std::slice::from_ref(&output), &intermediates).unwrap();
    output.read_f32().unwrap()
}

/// Deterministic values in `[-1, 1)`.
pub(crate) fn samples(len: usize, seed: u32) -> Vec<f32> {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state % 2000) as f32 / 1000.0 - 1.0
        })
        .collect()
}

/// `F[u][v] = Σ I[r + u - h][c + v - h] · G[r][c]` with zero padding.
pub(crate) fn naive_filter_adjoint(image: &[f32], gradient: &[f32], rows: usize, columns: usize, size: usize) -> Vec<f32> {
    let h = size as isize / 2;
    let mut filter = vec![0.0f64; size * size];
    for u in 0..size {
        for v in 0..size {
            let mut sum = 0.0f64;
            for r in 0..rows {
                for c in 0..columns {
                    let ir = r as isize + u as isize - h;
                    let ic = c as isize + v as isize - h;
                    if ir >= 0 && ir < rows as isize && ic >= 0 && ic < columns as isize {
                        sum += image[ir as usize * columns + ic as usize] as f64 * gradient[r * columns + c] as f64;
                    }
                }
            }
            filter[u * size + v] = sum;
        }
    }
    filter.into_iter().map(|v| v as f32).collect()
}

#[track_caller]
pub(crate) fn assert_close(actual: &[f32], expected: &[f32], tolerance: f32) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        let bound = tolerance * e.abs().max(1.0);
        assert!((a - e).abs() <= bound, "index {i}: {a} vs {e} (tolerance {bound})");
    }
}
