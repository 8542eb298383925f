//! Launch geometry.
//!
//! Axis 0 runs along columns, axis 1 along rows and axis 2 along layers. The
//! global size on every axis is a multiple of the local size, so kernels guard
//! their bodies with an explicit bounds check against the field extents.

use smallvec::SmallVec;
use weft_device::DeviceCapabilities;
use weft_dtype::FieldType;

use crate::addressing::AddressingMode;

/// Default local extents for one, two and three dimensional launches.
const DEFAULT_LOCAL: [[usize; 3]; 3] = [[256, 1, 1], [16, 16, 1], [16, 16, 1]];

/// Global and local iteration-space sizes of one kernel launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkGroupParameters {
    dimensions: usize,
    /// Logical extents covered by the launch; global sizes round these up.
    extents: [usize; 3],
    global: [usize; 3],
    local: [usize; 3],
}

impl WorkGroupParameters {
    /// Launch covering `extents` (axis 0 first) with default local sizes
    /// shrunk to fit the extents and the device's workgroup limit.
    pub fn new(extents: &[usize], capabilities: &DeviceCapabilities) -> Self {
        let dimensions = extents.len().clamp(1, 3);
        let mut padded = [1usize; 3];
        for (axis, extent) in extents.iter().take(3).enumerate() {
            padded[axis] = (*extent).max(1);
        }

        let defaults = DEFAULT_LOCAL[dimensions - 1];
        let mut local = [1usize; 3];
        for axis in 0..dimensions {
            local[axis] = defaults[axis].min(padded[axis].next_power_of_two());
        }
        let limit = capabilities.max_workgroup_size.max(1);
        while local.iter().product::<usize>() > limit {
            let widest = (0..3).max_by_key(|axis| (local[*axis], usize::MAX - axis)).unwrap_or(0);
            local[widest] /= 2;
        }

        let mut global = [1usize; 3];
        for axis in 0..3 {
            global[axis] = padded[axis].div_ceil(local[axis]) * local[axis];
        }
        Self { dimensions, extents: padded, global, local }
    }

    /// Launch geometry of a field under `mode`.
    pub fn for_field(field_type: &FieldType, mode: AddressingMode, capabilities: &DeviceCapabilities) -> Self {
        let mut extents: SmallVec<[usize; 4]> = SmallVec::new();
        let dims = field_type.dimensions();
        if dims >= 1 {
            extents.push(field_type.columns());
        }
        if dims >= 2 {
            extents.push(field_type.rows());
        }
        if dims >= 3 {
            extents.push(field_type.layers());
        }

        if mode == AddressingMode::TensorElement {
            let elements = field_type.tensor_elements();
            if extents.len() < 3 {
                extents.push(elements);
            } else {
                extents[2] *= elements;
            }
        }
        if extents.is_empty() {
            extents.push(1);
        }
        Self::new(&extents, capabilities)
    }

    /// Launch geometry taken from a kernel-specific work field rather than its
    /// nominal output, for kernels producing many outputs per thread.
    pub fn for_work_field(work_extents: &[usize], capabilities: &DeviceCapabilities) -> Self {
        Self::new(work_extents, capabilities)
    }

    /// One-dimensional launch of `groups` workgroups of exactly `threads` threads.
    pub fn for_workgroups(groups: usize, threads: usize) -> Self {
        let groups = groups.max(1);
        let threads = threads.max(1);
        Self {
            dimensions: 1,
            extents: [groups * threads, 1, 1],
            global: [groups * threads, 1, 1],
            local: [threads, 1, 1],
        }
    }

    /// Two-dimensional variant of [`Self::for_workgroups`]: axis 1 selects a
    /// workgroup row, one workgroup high.
    pub fn for_workgroup_grid(groups: usize, rows: usize, threads: usize) -> Self {
        let groups = groups.max(1);
        let rows = rows.max(1);
        let threads = threads.max(1);
        Self {
            dimensions: 2,
            extents: [groups * threads, rows, 1],
            global: [groups * threads, rows, 1],
            local: [threads, 1, 1],
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn extents(&self) -> [usize; 3] {
        self.extents
    }

    pub fn global(&self) -> [usize; 3] {
        self.global
    }

    pub fn local(&self) -> [usize; 3] {
        self.local
    }

    /// Number of workgroups along each axis.
    pub fn groups(&self) -> [usize; 3] {
        [self.global[0] / self.local[0], self.global[1] / self.local[1], self.global[2] / self.local[2]]
    }

    pub fn group_count(&self) -> usize {
        self.groups().iter().product()
    }

    pub fn local_threads(&self) -> usize {
        self.local.iter().product()
    }

    pub fn global_threads(&self) -> usize {
        self.global.iter().product()
    }

    /// Every global id of the launch, axis 0 fastest.
    pub fn work_items(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        let [x, y, z] = self.global;
        (0..z).flat_map(move |k| (0..y).flat_map(move |j| (0..x).map(move |i| [i, j, k])))
    }

    /// Global ids that fall inside the logical extents.
    pub fn active_items(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        let extents = self.extents;
        self.work_items().filter(move |id| id.iter().zip(extents).all(|(i, e)| *i < e))
    }
}
