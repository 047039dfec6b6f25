//! Kernel Dispatch Module
//!
//! Per-kernel thread-space geometry and its translation into walker
//! commands.

use serde::{Deserialize, Serialize};

use crate::hwcmd::render::{GpgpuWalker, MediaObjectWalker};
use crate::hwcmd::HwCommand;

/// Ordering constraint between threads of one kernel, as declared by the
/// caller. Anything other than `None` also orders the kernel after its
/// predecessor in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyPattern {
    #[default]
    None,
    Wavefront,
    Wavefront26,
    VerticalWave,
    HorizontalWave,
    Wavefront26Z,
    Wavefront26X,
    Wavefront26Zig,
    Wavefront26Zi,
}

impl DependencyPattern {
    pub fn requires_barrier(self) -> bool {
        self != DependencyPattern::None
    }

    /// Scoreboard deltas `(x, y)` a thread waits on.
    pub fn scoreboard_deltas(self) -> &'static [(i8, i8)] {
        match self {
            DependencyPattern::None => &[],
            DependencyPattern::Wavefront => &[(-1, 0), (-1, -1), (0, -1)],
            DependencyPattern::VerticalWave => &[(0, -1)],
            DependencyPattern::HorizontalWave => &[(-1, 0)],
            DependencyPattern::Wavefront26
            | DependencyPattern::Wavefront26Z
            | DependencyPattern::Wavefront26X
            | DependencyPattern::Wavefront26Zig
            | DependencyPattern::Wavefront26Zi => &[(-1, 0), (-1, -1), (0, -1), (1, -1)],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Coord {
    pub x: u32,
    pub y: u32,
}

impl Coord {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Media walker loop description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WalkerParams {
    pub scoreboard_mask: u32,
    pub group_id_loop_select: u32,
    pub color_count_minus_one: u32,
    pub mid_loop_unit_x: u32,
    pub mid_loop_unit_y: u32,
    pub middle_loop_extra_steps: u32,
    pub local_loop_exec_count: u32,
    pub global_loop_exec_count: u32,
    pub block_resolution: Coord,
    pub local_start: Coord,
    pub local_end: Coord,
    pub local_outer_loop_stride: Coord,
    pub local_inner_loop_unit: Coord,
    pub global_resolution: Coord,
    pub global_start: Coord,
    pub global_outer_loop_stride: Coord,
    pub global_inner_loop_unit: Coord,
}

/// Number of dwords in a packed set of walker engineering values.
pub const ENGINEERING_VALUE_COUNT: usize = 12;

impl WalkerParams {
    /// Row-by-row scan of a `width` x `height` thread space.
    pub fn raster(width: u32, height: u32) -> Self {
        Self {
            local_loop_exec_count: height.saturating_sub(1),
            block_resolution: Coord::new(width, height),
            local_outer_loop_stride: Coord::new(0, 1),
            local_inner_loop_unit: Coord::new(1, 0),
            global_resolution: Coord::new(width, height),
            global_outer_loop_stride: Coord::new(width, 0),
            global_inner_loop_unit: Coord::new(0, height),
            ..Self::default()
        }
    }

    /// Unpacks walker DW5..DW16 as supplied by the runtime, skipping the
    /// local end coordinate which the runtime leaves to the hardware.
    pub fn from_engineering(values: &[u32; ENGINEERING_VALUE_COUNT]) -> Self {
        let mut cmd = MediaObjectWalker::new();
        for (i, v) in values.iter().enumerate() {
            if i != 5 {
                cmd.set_value(5 + i, *v);
            }
        }
        Self {
            scoreboard_mask: cmd.scoreboard_mask(),
            group_id_loop_select: cmd.group_id_loop_select(),
            color_count_minus_one: cmd.color_count_minus_one(),
            mid_loop_unit_x: cmd.mid_loop_unit_x(),
            mid_loop_unit_y: cmd.local_mid_loop_unit_y(),
            middle_loop_extra_steps: cmd.middle_loop_extra_steps(),
            local_loop_exec_count: cmd.local_loop_exec_count(),
            global_loop_exec_count: cmd.global_loop_exec_count(),
            block_resolution: Coord::new(cmd.block_resolution_x(), cmd.block_resolution_y()),
            local_start: Coord::new(cmd.local_start_x(), cmd.local_start_y()),
            local_end: Coord::default(),
            local_outer_loop_stride: Coord::new(
                cmd.local_outer_loop_stride_x(),
                cmd.local_outer_loop_stride_y(),
            ),
            local_inner_loop_unit: Coord::new(
                cmd.local_inner_loop_unit_x(),
                cmd.local_inner_loop_unit_y(),
            ),
            global_resolution: Coord::new(cmd.global_resolution_x(), cmd.global_resolution_y()),
            global_start: Coord::new(cmd.global_start_x(), cmd.global_start_y()),
            global_outer_loop_stride: Coord::new(
                cmd.global_outer_loop_stride_x(),
                cmd.global_outer_loop_stride_y(),
            ),
            global_inner_loop_unit: Coord::new(
                cmd.global_inner_loop_unit_x(),
                cmd.global_inner_loop_unit_y(),
            ),
        }
    }

    fn apply(&self, cmd: &mut MediaObjectWalker) {
        cmd.set_scoreboard_mask(self.scoreboard_mask)
            .set_group_id_loop_select(self.group_id_loop_select)
            .set_color_count_minus_one(self.color_count_minus_one)
            .set_mid_loop_unit_x(self.mid_loop_unit_x)
            .set_local_mid_loop_unit_y(self.mid_loop_unit_y)
            .set_middle_loop_extra_steps(self.middle_loop_extra_steps)
            .set_local_loop_exec_count(self.local_loop_exec_count)
            .set_global_loop_exec_count(self.global_loop_exec_count)
            .set_block_resolution_x(self.block_resolution.x)
            .set_block_resolution_y(self.block_resolution.y)
            .set_local_start_x(self.local_start.x)
            .set_local_start_y(self.local_start.y)
            .set_local_end_x(self.local_end.x)
            .set_local_end_y(self.local_end.y)
            .set_local_outer_loop_stride_x(self.local_outer_loop_stride.x)
            .set_local_outer_loop_stride_y(self.local_outer_loop_stride.y)
            .set_local_inner_loop_unit_x(self.local_inner_loop_unit.x)
            .set_local_inner_loop_unit_y(self.local_inner_loop_unit.y)
            .set_global_resolution_x(self.global_resolution.x)
            .set_global_resolution_y(self.global_resolution.y)
            .set_global_start_x(self.global_start.x)
            .set_global_start_y(self.global_start.y)
            .set_global_outer_loop_stride_x(self.global_outer_loop_stride.x)
            .set_global_outer_loop_stride_y(self.global_outer_loop_stride.y)
            .set_global_inner_loop_unit_x(self.global_inner_loop_unit.x)
            .set_global_inner_loop_unit_y(self.global_inner_loop_unit.y);
    }
}

/// SIMD width of a GPGPU kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SimdSize {
    Simd8,
    #[default]
    Simd16,
    Simd32,
}

impl SimdSize {
    fn encoding(self) -> u32 {
        match self {
            SimdSize::Simd8 => GpgpuWalker::SIMD_SIZE_SIMD8,
            SimdSize::Simd16 => GpgpuWalker::SIMD_SIZE_SIMD16,
            SimdSize::Simd32 => GpgpuWalker::SIMD_SIZE_SIMD32,
        }
    }

    fn execution_mask(self) -> u32 {
        match self {
            SimdSize::Simd8 => 0xFF,
            SimdSize::Simd16 => 0xFFFF,
            SimdSize::Simd32 => 0xFFFF_FFFF,
        }
    }
}

/// Thread group layout of a GPGPU dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpgpuGeometry {
    /// Hardware threads per thread group.
    pub threads_per_group: u32,
    pub group_space_width: u32,
    pub group_space_height: u32,
    pub group_space_depth: u32,
    pub simd: SimdSize,
}

impl Default for GpgpuGeometry {
    fn default() -> Self {
        Self {
            threads_per_group: 1,
            group_space_width: 1,
            group_space_height: 1,
            group_space_depth: 1,
            simd: SimdSize::default(),
        }
    }
}

/// One kernel of a task.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KernelDispatchDescriptor {
    pub name: String,
    /// Index of the kernel's interface descriptor.
    pub interface_descriptor_offset: u32,
    /// Per-thread indirect (curbe) data.
    pub indirect_data_length: u32,
    pub indirect_data_offset: u32,
    pub pattern: DependencyPattern,
    pub walker: WalkerParams,
    pub gpgpu: GpgpuGeometry,
}

impl KernelDispatchDescriptor {
    /// Kernel scanning a `width` x `height` thread space without
    /// dependencies.
    pub fn raster(name: &str, interface_descriptor_offset: u32, width: u32, height: u32) -> Self {
        Self {
            name: name.to_string(),
            interface_descriptor_offset,
            walker: WalkerParams::raster(width, height),
            ..Self::default()
        }
    }

    pub fn with_pattern(mut self, pattern: DependencyPattern) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn media_walker(&self) -> MediaObjectWalker {
        let mut cmd = MediaObjectWalker::new();
        cmd.set_interface_descriptor_offset(self.interface_descriptor_offset)
            .set_indirect_data_length(self.indirect_data_length)
            .set_indirect_data_start_address(self.indirect_data_offset);
        self.walker.apply(&mut cmd);

        if self.pattern.requires_barrier() {
            cmd.set_use_scoreboard(1);
            if self.walker.scoreboard_mask == 0 {
                let count = self.pattern.scoreboard_deltas().len() as u32;
                cmd.set_scoreboard_mask((1 << count) - 1);
            }
        }
        cmd
    }

    pub fn gpgpu_walker(&self) -> GpgpuWalker {
        let g = &self.gpgpu;
        let mut cmd = GpgpuWalker::new();
        cmd.set_interface_descriptor_offset(self.interface_descriptor_offset)
            .set_indirect_data_length(self.indirect_data_length)
            .set_indirect_data_start_address(self.indirect_data_offset >> 6)
            .set_thread_width_counter_maximum(g.threads_per_group.saturating_sub(1))
            .set_simd_size(g.simd.encoding())
            .set_thread_group_id_x_dimension(g.group_space_width)
            .set_thread_group_id_y_dimension(g.group_space_height)
            .set_thread_group_id_z_dimension(g.group_space_depth)
            .set_right_execution_mask(g.simd.execution_mask())
            .set_bottom_execution_mask(0xFFFF_FFFF);
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engineering_values_unpack() {
        let mut values = [0u32; ENGINEERING_VALUE_COUNT];
        values[0] = 0x0F; // scoreboard mask
        values[1] = (3 << 24) | (2 << 8);
        values[2] = (1 << 16) | 7;
        values[3] = (16 << 16) | 32;
        values[4] = (2 << 16) | 1;
        values[5] = 0xFFFF_FFFF; // local end, ignored
        values[6] = 1 << 16;
        values[7] = 1;
        values[8] = (64 << 16) | 128;
        values[11] = 16 << 16;

        let p = WalkerParams::from_engineering(&values);
        assert_eq!(p.scoreboard_mask, 0x0F);
        assert_eq!(p.color_count_minus_one, 3);
        assert_eq!(p.mid_loop_unit_x, 2);
        assert_eq!(p.local_loop_exec_count, 7);
        assert_eq!(p.global_loop_exec_count, 1);
        assert_eq!(p.block_resolution, Coord::new(32, 16));
        assert_eq!(p.local_start, Coord::new(1, 2));
        assert_eq!(p.local_end, Coord::default());
        assert_eq!(p.local_outer_loop_stride, Coord::new(0, 1));
        assert_eq!(p.local_inner_loop_unit, Coord::new(1, 0));
        assert_eq!(p.global_resolution, Coord::new(128, 64));
        assert_eq!(p.global_inner_loop_unit, Coord::new(0, 16));
    }

    #[test]
    fn test_media_walker_encoding() {
        let kernel = KernelDispatchDescriptor::raster("scale", 2, 8, 4);
        let cmd = kernel.media_walker();
        assert_eq!(cmd.interface_descriptor_offset(), 2);
        assert_eq!(cmd.block_resolution_x(), 8);
        assert_eq!(cmd.block_resolution_y(), 4);
        assert_eq!(cmd.local_loop_exec_count(), 3);
        assert_eq!(cmd.use_scoreboard(), 0);
        assert_eq!(cmd.value(0), 0x7103_000F);

        let dependent = kernel.with_pattern(DependencyPattern::Wavefront26).media_walker();
        assert_eq!(dependent.use_scoreboard(), 1);
        assert_eq!(dependent.scoreboard_mask(), 0xF);
    }

    #[test]
    fn test_walker_round_trips_through_engineering_values() {
        let params = WalkerParams::raster(40, 30);
        let cmd = KernelDispatchDescriptor {
            walker: params,
            ..Default::default()
        }
        .media_walker();

        let mut values = [0u32; ENGINEERING_VALUE_COUNT];
        for (i, v) in values.iter_mut().enumerate() {
            *v = cmd.value(5 + i);
        }
        assert_eq!(WalkerParams::from_engineering(&values), params);
    }

    #[test]
    fn test_gpgpu_walker_encoding() {
        let kernel = KernelDispatchDescriptor {
            indirect_data_offset: 0x140,
            indirect_data_length: 64,
            gpgpu: GpgpuGeometry {
                threads_per_group: 4,
                group_space_width: 10,
                group_space_height: 5,
                group_space_depth: 1,
                simd: SimdSize::Simd16,
            },
            ..Default::default()
        };
        let cmd = kernel.gpgpu_walker();
        assert_eq!(cmd.thread_width_counter_maximum(), 3);
        assert_eq!(cmd.simd_size(), GpgpuWalker::SIMD_SIZE_SIMD16);
        assert_eq!(cmd.thread_group_id_x_dimension(), 10);
        assert_eq!(cmd.thread_group_id_y_dimension(), 5);
        assert_eq!(cmd.right_execution_mask(), 0xFFFF);
        assert_eq!(cmd.indirect_data_start_address() << 6, 0x140);
    }

    #[test]
    fn test_pattern_barrier_requirement() {
        assert!(!DependencyPattern::None.requires_barrier());
        assert!(DependencyPattern::VerticalWave.requires_barrier());
        assert_eq!(DependencyPattern::Wavefront.scoreboard_deltas().len(), 3);
    }
}
