//! Tiled small-output correlation.
//!
//! Computes the adjoint of a filter with respect to its weights:
//!
//! ```text
//! F[u][v] = Σ_{r,c} I[r + u - h][c + v - h] · G[r][c],   h = size / 2
//! ```
//!
//! with `I` read as zero outside the image. The output is only `size x size`
//! while the inputs are whole images, so a thread per output point would
//! leave the device idle. Instead each workgroup owns a tile of image points,
//! one thread per point:
//!
//! 1. the tile plus a halo of `h` points is loaded cooperatively into local
//!    memory, unchecked for interior tiles and bounds-checked at the edges;
//! 2. every thread forms the product for one output index per iteration and
//!    a pipelined tree sums the products across the workgroup;
//! 3. workgroups stride over tiles accumulating into a local staging area,
//!    and with more than one workgroup a block reduction sums the staged
//!    partials.
//!
//! # Pipelined reduction
//!
//! The tree is a heap: node 1 is the root, node `n` has children `2n` and
//! `2n + 1`, and the `W` leaves are nodes `W..2W`. Two buffers alternate each
//! iteration. Leaves are written into the current buffer; every internal node
//! sums its children, reading leaves from the current buffer and internal
//! children from the previous one. A node at depth `d` therefore holds the
//! sum for the output index issued `log2(W) - 1 - d` iterations earlier, and
//! the root emits one finished output per iteration once the pipeline has
//! filled after `log2(W) - 1` iterations.
//!
//! Node `n` lives in slot `n + (n >= 32)`: the extra word keeps the children
//! read by threads 0-15 and 16-31 in different banks.

use std::sync::Arc;

use snafu::{ResultExt, ensure};
use tracing::debug;
use weft_device::DeviceCapabilities;
use weft_dtype::FieldType;

use super::block_reduce::{self, MAX_REDUCTION_THREADS, floor_power_of_two};
use super::expect_operands;
use crate::addressing::AddressingMode;
use crate::error::{
    FieldTypeSnafu, LocalMemoryExhaustedSnafu, Result, ShapeMismatchSnafu, UnsupportedElementSnafu,
    UnsupportedShapeSnafu,
};
use crate::opcode::ReduceOp;
use crate::plan::{PlanFamily, PlanKey, PlanStore};
use crate::program::Program;
use crate::source::{SourceWriter, geometry_macros, parameter_list};
use crate::types::{BufferArg, BufferSlot, CompiledOperation, SynthesizedKernel};
use crate::workgroup::WorkGroupParameters;

const OPERATION: &str = "filter adjoint";

/// Smallest workgroup the tile search accepts.
pub const MIN_TILE_THREADS: usize = 16;

/// Workgroups per compute unit a single launch may use.
const GROUPS_PER_COMPUTE_UNIT: usize = 4;

/// Physical local-memory slot of tree node `node`.
#[inline]
pub const fn node_slot(node: usize) -> usize {
    node + (node >= 32) as usize
}

/// Slot of the first child read by thread `lid`, which computes node `lid`.
#[inline]
pub const fn child_base(lid: usize) -> usize {
    2 * lid + (lid >= 16) as usize
}

/// Tiling chosen for one image geometry and filter size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TilePlan {
    pub rows: usize,
    pub columns: usize,
    pub size: usize,
    /// Threads per workgroup, one per tile point.
    pub threads: usize,
    pub tile_rows: usize,
    pub tile_columns: usize,
    pub tiles_down: usize,
    pub tiles_across: usize,
    /// Workgroups launched; each strides over the tiles.
    pub groups: usize,
}

impl TilePlan {
    /// Largest workgroup whose tile, halo, reduction buffers and staging fit
    /// in local memory, halving the thread count from the default.
    pub fn search(rows: usize, columns: usize, size: usize, capabilities: &DeviceCapabilities) -> Result<Self> {
        let mut threads = floor_power_of_two(capabilities.max_workgroup_size.min(MAX_REDUCTION_THREADS));
        loop {
            let plan = Self::with_threads(rows, columns, size, threads, capabilities);
            let required = plan.local_words() * size_of::<f32>();
            if required <= capabilities.local_memory_bytes {
                return Ok(plan);
            }
            if threads / 2 < MIN_TILE_THREADS {
                return LocalMemoryExhaustedSnafu {
                    operation: OPERATION,
                    required,
                    available: capabilities.local_memory_bytes,
                }
                .fail();
            }
            threads /= 2;
        }
    }

    fn with_threads(
        rows: usize,
        columns: usize,
        size: usize,
        threads: usize,
        capabilities: &DeviceCapabilities,
    ) -> Self {
        // Roughly square: columns are the power of two at or above the square root.
        let mut tile_columns = 1;
        while tile_columns * tile_columns < threads {
            tile_columns *= 2;
        }
        let tile_columns = tile_columns.min(threads);
        let tile_rows = threads / tile_columns;
        let tiles_down = rows.div_ceil(tile_rows);
        let tiles_across = columns.div_ceil(tile_columns);
        let capacity = capabilities.compute_units.max(1) * GROUPS_PER_COMPUTE_UNIT;
        let groups = (tiles_down * tiles_across).min(capacity).max(1);
        Self { rows, columns, size, threads, tile_rows, tile_columns, tiles_down, tiles_across, groups }
    }

    pub fn half(&self) -> usize {
        self.size / 2
    }

    pub fn halo_rows(&self) -> usize {
        self.tile_rows + 2 * self.half()
    }

    pub fn halo_columns(&self) -> usize {
        self.tile_columns + 2 * self.half()
    }

    pub fn halo_words(&self) -> usize {
        self.halo_rows() * self.halo_columns()
    }

    /// Words of one reduction buffer: nodes `1..2W` plus the bank padding slot.
    pub fn tree_words(&self) -> usize {
        2 * self.threads + 1
    }

    pub fn outputs(&self) -> usize {
        self.size * self.size
    }

    pub fn local_words(&self) -> usize {
        self.halo_words() + 2 * self.tree_words() + self.outputs()
    }

    pub fn tiles(&self) -> usize {
        self.tiles_down * self.tiles_across
    }

    /// Depth of the reduction tree.
    pub fn levels(&self) -> usize {
        self.threads.trailing_zeros() as usize
    }

    /// Iterations before the root emits its first finished output.
    pub fn latency(&self) -> usize {
        self.levels().saturating_sub(1)
    }

    pub fn iterations(&self) -> usize {
        self.outputs() + self.latency()
    }

    pub fn chained(&self) -> bool {
        self.groups > 1
    }
}

pub fn output_type(size: usize, inputs: &[FieldType]) -> Result<FieldType> {
    expect_operands(OPERATION, inputs, 2)?;
    for input in inputs {
        ensure!(!input.element().is_complex(), UnsupportedElementSnafu { operation: OPERATION, element: input.element() });
        ensure!(
            input.dimensions() == 2 && input.tensor_order() == 0,
            UnsupportedShapeSnafu {
                operation: OPERATION,
                field_type: input.clone(),
                reason: "expected a 2-D scalar field",
            }
        );
    }
    ensure!(
        inputs[0].field_shape() == inputs[1].field_shape(),
        ShapeMismatchSnafu { operation: OPERATION, reason: format!("image {} vs gradient {}", inputs[0], inputs[1]) }
    );
    ensure!(
        size % 2 == 1,
        UnsupportedShapeSnafu {
            operation: OPERATION,
            field_type: inputs[0].clone(),
            reason: format!("filter size {size} must be odd"),
        }
    );
    FieldType::scalar(&[size, size]).context(FieldTypeSnafu)
}

pub fn synthesize(
    size: usize,
    inputs: &[FieldType],
    capabilities: &DeviceCapabilities,
    plans: &dyn PlanStore,
) -> Result<Arc<CompiledOperation>> {
    let output = output_type(size, inputs)?;
    let image = inputs[0].clone();
    let gradient = inputs[1].clone();
    let key = PlanKey::new(PlanFamily::FilterAdjoint, &image, capabilities).with_parameter(size);
    plans.get_or_build(key, &mut || build(size, &image, &gradient, &output, capabilities))
}

fn build(
    size: usize,
    image: &FieldType,
    gradient: &FieldType,
    output: &FieldType,
    capabilities: &DeviceCapabilities,
) -> Result<CompiledOperation> {
    let plan = TilePlan::search(image.rows(), image.columns(), size, capabilities)?;
    let name = format!("filter_adjoint_{size}_{}x{}", plan.rows, plan.columns);
    debug!(
        kernel = %name,
        threads = plan.threads,
        tile = ?(plan.tile_rows, plan.tile_columns),
        tiles = plan.tiles(),
        groups = plan.groups,
        local_bytes = plan.local_words() * size_of::<f32>(),
        "tile plan selected"
    );

    let (destination, slot, words) = if plan.chained() {
        ("partial", BufferSlot::Intermediate(0), plan.groups * plan.outputs())
    } else {
        ("out", BufferSlot::Output(0), plan.outputs())
    };
    let tiled = SynthesizedKernel {
        name: name.clone(),
        source: render(&name, &plan, image, gradient, destination),
        buffer_args: vec![
            BufferArg {
                index: 0,
                name: "image".into(),
                slot: BufferSlot::Input(0),
                words: image.layout().words(),
                is_output: false,
            },
            BufferArg {
                index: 1,
                name: "gradient".into(),
                slot: BufferSlot::Input(1),
                words: gradient.layout().words(),
                is_output: false,
            },
            BufferArg { index: 2, name: destination.into(), slot, words, is_output: true },
        ],
        mode: AddressingMode::SmallTensor,
        workgroup: WorkGroupParameters::for_workgroups(plan.groups, plan.threads),
        local_memory_bytes: plan.local_words() * size_of::<f32>(),
        program: Arc::new(FilterAdjointProgram { plan }),
    };

    if !plan.chained() {
        return Ok(CompiledOperation::single(tiled, output.clone()));
    }

    let finish = block_reduce::kernel(
        format!("{name}_finish"),
        ReduceOp::Sum,
        plan.groups,
        plan.outputs(),
        BufferSlot::Intermediate(0),
        (BufferSlot::Output(0), plan.outputs()),
        capabilities,
    )?;
    Ok(CompiledOperation {
        name,
        output: output.clone(),
        stages: smallvec::smallvec![tiled, finish],
        intermediates: smallvec::smallvec![words],
    })
}

fn render(name: &str, plan: &TilePlan, image: &FieldType, gradient: &FieldType, destination: &str) -> String {
    let mut w = SourceWriter::new();
    w.lines(geometry_macros("image", image));
    w.lines(geometry_macros("gradient", gradient));
    w.lines([
        format!("#define FILTER_SIZE {}", plan.size),
        format!("#define HALF {}", plan.half()),
        format!("#define OUTPUTS {}", plan.outputs()),
        format!("#define THREADS {}", plan.threads),
        format!("#define LATENCY {}", plan.latency()),
        format!("#define ITERATIONS {}", plan.iterations()),
        format!("#define TILE_ROWS {}", plan.tile_rows),
        format!("#define TILE_COLUMNS {}", plan.tile_columns),
        format!("#define HALO_ROWS {}", plan.halo_rows()),
        format!("#define HALO_COLUMNS {}", plan.halo_columns()),
        format!("#define TILES_ACROSS {}", plan.tiles_across),
        format!("#define TILES {}", plan.tiles()),
        format!("#define GROUPS {}", plan.groups),
        "#define SLOT(n) ((n) + ((n) >= 32))".to_string(),
    ]);
    w.blank();

    w.line(format!("__kernel __attribute__((reqd_work_group_size({}, 1, 1)))", plan.threads));
    w.open(format!("void {name}({})", parameter_list(&["image", "gradient"], &[destination])));
    w.lines([
        "__local float halo[HALO_ROWS * HALO_COLUMNS];",
        "__local float tree0[2 * THREADS + 1];",
        "__local float tree1[2 * THREADS + 1];",
        "__local float staging[OUTPUTS];",
        "const int lid = get_local_id(0);",
        "const int group = get_group_id(0);",
        "const int tr = lid / TILE_COLUMNS;",
        "const int tc = lid % TILE_COLUMNS;",
        "// threads 0-15 and 16-31 read children from different banks",
        "const int base = 2 * lid + (lid >= 16);",
        "const int leaves = 2 * lid >= THREADS;",
    ]);
    w.line("for (int i = lid; i < OUTPUTS; i += THREADS)");
    w.line("    staging[i] = 0.0f;");
    w.line("barrier(CLK_LOCAL_MEM_FENCE);");
    w.blank();

    w.open("for (int tile = group; tile < TILES; tile += GROUPS)");
    w.line("const int r0 = (tile / TILES_ACROSS) * TILE_ROWS;");
    w.line("const int c0 = (tile % TILES_ACROSS) * TILE_COLUMNS;");
    w.line(
        "const int interior = r0 >= HALF && c0 >= HALF && r0 + TILE_ROWS + HALF <= image_rows \
         && c0 + TILE_COLUMNS + HALF <= image_columns;",
    );
    w.open("if (interior)");
    w.line("for (int k = lid; k < HALO_ROWS * HALO_COLUMNS; k += THREADS)");
    w.line("    halo[k] = readImage(0, r0 - HALF + k / HALO_COLUMNS, c0 - HALF + k % HALO_COLUMNS, 0);");
    w.close();
    w.open("else");
    w.open("for (int k = lid; k < HALO_ROWS * HALO_COLUMNS; k += THREADS)");
    w.line("const int r = r0 - HALF + k / HALO_COLUMNS;");
    w.line("const int c = c0 - HALF + k % HALO_COLUMNS;");
    w.line("halo[k] = (r >= 0 && r < image_rows && c >= 0 && c < image_columns) ? readImage(0, r, c, 0) : 0.0f;");
    w.close();
    w.close();
    w.line("const int r = r0 + tr;");
    w.line("const int c = c0 + tc;");
    w.line("const float g = (r < gradient_rows && c < gradient_columns) ? readGradient(0, r, c, 0) : 0.0f;");
    w.line("int staged = 0;");
    w.line("barrier(CLK_LOCAL_MEM_FENCE);");
    w.blank();

    w.open("for (int it = 0; it < ITERATIONS; it++)");
    w.line("__local float* cur = (it & 1) ? tree1 : tree0;");
    w.line("__local float* prev = (it & 1) ? tree0 : tree1;");
    w.open("if (it < OUTPUTS)");
    w.line("const int u = it / FILTER_SIZE;");
    w.line("const int v = it % FILTER_SIZE;");
    w.line("cur[SLOT(THREADS + lid)] = halo[(tr + u) * HALO_COLUMNS + tc + v] * g;");
    w.close();
    w.line("barrier(CLK_LOCAL_MEM_FENCE);");
    w.open("if (lid > 0)");
    w.line("const float sum = leaves ? cur[base] + cur[base + 1] : prev[base] + prev[base + 1];");
    w.open("if (lid == 1)");
    w.line("if (it >= LATENCY)");
    w.line("    staging[staged++] += sum;");
    w.close();
    w.open("else");
    w.line("cur[SLOT(lid)] = sum;");
    w.close();
    w.close();
    w.line("barrier(CLK_LOCAL_MEM_FENCE);");
    w.close();
    w.close();
    w.blank();

    w.line("for (int i = lid; i < OUTPUTS; i += THREADS)");
    w.line(format!("    {destination}[group * OUTPUTS + i] = staging[i];"));
    w.close();
    w.finish()
}

#[derive(Debug)]
struct FilterAdjointProgram {
    plan: TilePlan,
}

impl FilterAdjointProgram {
    fn load_halo(&self, image: &[f32], r0: usize, c0: usize, halo: &mut [f32]) {
        let p = &self.plan;
        let h = p.half();
        let hc = p.halo_columns();
        let interior = r0 >= h && c0 >= h && r0 + p.tile_rows + h <= p.rows && c0 + p.tile_columns + h <= p.columns;

        for lid in 0..p.threads {
            for k in (lid..p.halo_words()).step_by(p.threads) {
                let (kr, kc) = (k / hc, k % hc);
                halo[k] = if interior {
                    image[(r0 - h + kr) * p.columns + c0 - h + kc]
                } else {
                    let r = (r0 + kr) as isize - h as isize;
                    let c = (c0 + kc) as isize - h as isize;
                    let inside = r >= 0 && (r as usize) < p.rows && c >= 0 && (c as usize) < p.columns;
                    if inside { image[r as usize * p.columns + c as usize] } else { 0.0 }
                };
            }
        }
    }
}

impl Program for FilterAdjointProgram {
    fn execute(&self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], workgroup: &WorkGroupParameters) -> Result<()> {
        let p = &self.plan;
        let (image, gradient) = (inputs[0], inputs[1]);
        let destination = &mut *outputs[0];
        let threads = p.threads;
        let hc = p.halo_columns();

        let mut local = vec![0.0f32; p.local_words()];
        let mut weights = vec![0.0f32; threads];

        for group in 0..workgroup.group_count() {
            let (halo, rest) = local.split_at_mut(p.halo_words());
            let (tree0, rest) = rest.split_at_mut(p.tree_words());
            let (tree1, staging) = rest.split_at_mut(p.tree_words());
            staging.fill(0.0);

            for tile in (group..p.tiles()).step_by(p.groups) {
                let r0 = (tile / p.tiles_across) * p.tile_rows;
                let c0 = (tile % p.tiles_across) * p.tile_columns;
                self.load_halo(image, r0, c0, halo);
                for (lid, g) in weights.iter_mut().enumerate() {
                    let (r, c) = (r0 + lid / p.tile_columns, c0 + lid % p.tile_columns);
                    *g = if r < p.rows && c < p.columns { gradient[r * p.columns + c] } else { 0.0 };
                }

                let mut staged = 0;
                for it in 0..p.iterations() {
                    let (cur, prev): (&mut [f32], &[f32]) =
                        if it & 1 == 1 { (&mut tree1[..], &tree0[..]) } else { (&mut tree0[..], &tree1[..]) };

                    if it < p.outputs() {
                        let (u, v) = (it / p.size, it % p.size);
                        for (lid, g) in weights.iter().enumerate() {
                            let (tr, tc) = (lid / p.tile_columns, lid % p.tile_columns);
                            cur[node_slot(threads + lid)] = halo[(tr + u) * hc + tc + v] * g;
                        }
                    }
                    // barrier
                    for lid in 1..threads {
                        let base = child_base(lid);
                        let sum = if 2 * lid >= threads {
                            cur[base] + cur[base + 1]
                        } else {
                            prev[base] + prev[base + 1]
                        };
                        if lid == 1 {
                            if it >= p.latency() {
                                staging[staged] += sum;
                                staged += 1;
                            }
                        } else {
                            cur[node_slot(lid)] = sum;
                        }
                    }
                }
            }

            destination[group * p.outputs()..(group + 1) * p.outputs()].copy_from_slice(staging);
        }
        Ok(())
    }
}
