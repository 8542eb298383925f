//! Radix-2 Stockham transforms of complex power-of-two fields.
//!
//! A transform of an `R x C` field runs `log2(C)` passes along rows followed
//! by `log2(R)` passes along columns, one kernel per pass, ping-ponging
//! between two intermediates. Each pass is out of place and leaves the data
//! in natural order, so no bit-reversal kernel is needed.
//!
//! Twiddle factors are computed once per plan and embedded in every pass's
//! source; the inverse transform halves each pass's output, scaling the whole
//! transform by `1 / (R * C)`.

use std::f64::consts::PI;
use std::sync::Arc;

use itertools::Itertools;
use smallvec::SmallVec;
use snafu::ensure;
use tracing::debug;
use weft_device::DeviceCapabilities;
use weft_dtype::{ElementKind, FieldType};

use super::{expect_operands, float_literal, shape_tag};
use crate::addressing::AddressingMode;
use crate::error::{NotPowerOfTwoSnafu, Result, UnsupportedElementSnafu, UnsupportedShapeSnafu};
use crate::opcode::FftDirection;
use crate::plan::{PlanFamily, PlanKey, PlanStore};
use crate::program::Program;
use crate::source::fill_template;
use crate::types::{BufferArg, BufferSlot, CompiledOperation, SynthesizedKernel};
use crate::workgroup::WorkGroupParameters;

const OPERATION: &str = "fft";

const TEMPLATE: &str = r#"#define N %n%
#define HALF_N %half%
#define SPAN %span%
#define STRIDE %stride%
#define LINES %lines%
#define LINE_STRIDE %line_stride%
#define PART %part%
#define SCALE %scale%

__constant float twiddle_re[HALF_N] = { %twiddle_re% };
__constant float twiddle_im[HALF_N] = { %twiddle_im% };

__kernel void %name%(__global const float* restrict src, __global float* restrict dst) {
    const int j = get_global_id(0);
    const int line = get_global_id(1);
    if (j >= HALF_N || line >= LINES) return;

    const int base = line * LINE_STRIDE;
    const int k = j & (SPAN - 1);
    const int t = k * (N / (2 * SPAN));
    const float ar = src[base + j * STRIDE];
    const float ai = src[PART + base + j * STRIDE];
    const float xr = src[base + (j + HALF_N) * STRIDE];
    const float xi = src[PART + base + (j + HALF_N) * STRIDE];
    const float br = xr * twiddle_re[t] - xi * twiddle_im[t];
    const float bi = xr * twiddle_im[t] + xi * twiddle_re[t];

    const int d = (j - k) * 2 + k;
    dst[base + d * STRIDE] = (ar + br) * SCALE;
    dst[PART + base + d * STRIDE] = (ai + bi) * SCALE;
    dst[base + (d + SPAN) * STRIDE] = (ar - br) * SCALE;
    dst[PART + base + (d + SPAN) * STRIDE] = (ai - bi) * SCALE;
}
"#;

/// Twiddle factors `exp(±2πi k / n)` for `k < n / 2`.
#[derive(Debug, Clone, PartialEq)]
pub struct TwiddleTable {
    pub re: Vec<f32>,
    pub im: Vec<f32>,
}

impl TwiddleTable {
    pub fn new(n: usize, direction: FftDirection) -> Self {
        let sign = match direction {
            FftDirection::Forward => -1.0,
            FftDirection::Inverse => 1.0,
        };
        let (re, im) = (0..n / 2)
            .map(|k| {
                let angle = sign * 2.0 * PI * k as f64 / n as f64;
                (angle.cos() as f32, angle.sin() as f32)
            })
            .unzip();
        Self { re, im }
    }
}

/// One radix-2 pass along one axis.
#[derive(Debug, Clone)]
pub struct FftPass {
    /// Transform length along the axis.
    pub n: usize,
    /// Length of the sub-transforms already combined.
    pub span: usize,
    /// Word distance between consecutive samples of a line.
    pub stride: usize,
    pub lines: usize,
    pub line_stride: usize,
    pub scale: f32,
    pub twiddles: Arc<TwiddleTable>,
}

impl FftPass {
    fn butterfly(&self, src: &[f32], dst: &mut [f32], part: usize, j: usize, line: usize) {
        let half = self.n / 2;
        let base = line * self.line_stride;
        let k = j & (self.span - 1);
        let t = k * (self.n / (2 * self.span));
        let (ar, ai) = (src[base + j * self.stride], src[part + base + j * self.stride]);
        let (xr, xi) = (src[base + (j + half) * self.stride], src[part + base + (j + half) * self.stride]);
        let (wr, wi) = (self.twiddles.re[t], self.twiddles.im[t]);
        let br = xr * wr - xi * wi;
        let bi = xr * wi + xi * wr;

        let d = (j - k) * 2 + k;
        dst[base + d * self.stride] = (ar + br) * self.scale;
        dst[part + base + d * self.stride] = (ai + bi) * self.scale;
        dst[base + (d + self.span) * self.stride] = (ar - br) * self.scale;
        dst[part + base + (d + self.span) * self.stride] = (ai - bi) * self.scale;
    }
}

/// Passes of a transform in execution order.
pub fn plan_passes(field_type: &FieldType, direction: FftDirection) -> Vec<FftPass> {
    let layout = field_type.layout();
    let scale = match direction {
        FftDirection::Forward => 1.0,
        FftDirection::Inverse => 0.5,
    };
    // (length, stride, lines, line stride) per transformed axis
    let mut axes: SmallVec<[(usize, usize, usize, usize); 2]> = SmallVec::new();
    axes.push((layout.columns, 1, layout.rows, layout.row_stride));
    if field_type.dimensions() == 2 {
        axes.push((layout.rows, layout.row_stride, layout.columns, 1));
    }

    let mut passes = Vec::new();
    for (n, stride, lines, line_stride) in axes {
        let twiddles = Arc::new(TwiddleTable::new(n, direction));
        let mut span = 1;
        while span < n {
            passes.push(FftPass { n, span, stride, lines, line_stride, scale, twiddles: Arc::clone(&twiddles) });
            span *= 2;
        }
    }
    passes
}

pub fn output_type(inputs: &[FieldType]) -> Result<FieldType> {
    expect_operands(OPERATION, inputs, 1)?;
    let input = &inputs[0];
    ensure!(
        input.element() == ElementKind::Complex,
        UnsupportedElementSnafu { operation: OPERATION, element: input.element() }
    );
    ensure!(
        matches!(input.dimensions(), 1 | 2) && input.tensor_order() == 0,
        UnsupportedShapeSnafu {
            operation: OPERATION,
            field_type: input.clone(),
            reason: "expected a 1-D or 2-D scalar field",
        }
    );
    for &extent in input.field_shape().extents() {
        ensure!(extent.is_power_of_two(), NotPowerOfTwoSnafu { operation: OPERATION, extent });
        ensure!(
            extent >= 2,
            UnsupportedShapeSnafu {
                operation: OPERATION,
                field_type: input.clone(),
                reason: "transform length must be at least 2",
            }
        );
    }
    Ok(input.clone())
}

pub fn synthesize(
    direction: FftDirection,
    inputs: &[FieldType],
    capabilities: &DeviceCapabilities,
    plans: &dyn PlanStore,
) -> Result<Arc<CompiledOperation>> {
    let output = output_type(inputs)?;
    let key = PlanKey::new(PlanFamily::Fft(direction), &output, capabilities);
    plans.get_or_build(key, &mut || build(direction, &output, capabilities))
}

fn build(direction: FftDirection, field_type: &FieldType, capabilities: &DeviceCapabilities) -> Result<CompiledOperation> {
    let passes = plan_passes(field_type, direction);
    let words = field_type.layout().words();
    let part = field_type.layout().part_stride;
    let last = passes.len() - 1;
    let prefix = format!("fft_{direction}_{}", shape_tag(field_type));
    debug!(plan = %prefix, passes = passes.len(), "transform planned");

    let mut stages = SmallVec::new();
    for (p, pass) in passes.iter().enumerate() {
        let src = if p == 0 { BufferSlot::Input(0) } else { BufferSlot::Intermediate((p - 1) % 2) };
        let dst = if p == last { BufferSlot::Output(0) } else { BufferSlot::Intermediate(p % 2) };
        let name = format!("{prefix}_pass{p}");
        let source = fill_template(
            TEMPLATE,
            &[
                ("n", pass.n.to_string()),
                ("half", (pass.n / 2).to_string()),
                ("span", pass.span.to_string()),
                ("stride", pass.stride.to_string()),
                ("lines", pass.lines.to_string()),
                ("line_stride", pass.line_stride.to_string()),
                ("part", part.to_string()),
                ("scale", float_literal(pass.scale)),
                ("twiddle_re", pass.twiddles.re.iter().map(|v| float_literal(*v)).join(", ")),
                ("twiddle_im", pass.twiddles.im.iter().map(|v| float_literal(*v)).join(", ")),
                ("name", name.clone()),
            ],
        )?;
        stages.push(SynthesizedKernel {
            name,
            source,
            buffer_args: vec![
                BufferArg { index: 0, name: "src".into(), slot: src, words, is_output: false },
                BufferArg { index: 1, name: "dst".into(), slot: dst, words, is_output: true },
            ],
            mode: AddressingMode::SmallTensor,
            workgroup: WorkGroupParameters::for_work_field(&[pass.n / 2, pass.lines], capabilities),
            local_memory_bytes: 0,
            program: Arc::new(FftPassProgram { pass: pass.clone(), part }),
        });
    }

    Ok(CompiledOperation {
        name: prefix,
        output: field_type.clone(),
        stages,
        intermediates: std::iter::repeat_n(words, last.min(2)).collect(),
    })
}

#[derive(Debug)]
struct FftPassProgram {
    pass: FftPass,
    part: usize,
}

impl Program for FftPassProgram {
    fn execute(&self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], workgroup: &WorkGroupParameters) -> Result<()> {
        let src = inputs[0];
        let dst = &mut *outputs[0];
        for [j, line, _] in workgroup.active_items() {
            self.pass.butterfly(src, dst, self.part, j, line);
        }
        Ok(())
    }
}
