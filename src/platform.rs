//! Platform Configuration Module
//!
//! Static per-device data programmed once per submission: L3 cache
//! partition presets, preemption granularity, debug-control registers and
//! the render engine timestamp frequency.

use bitflags::bitflags;

use crate::catalog::{Generation, Platform};
use crate::error::{Error, Result};

/// L3 control register.
pub const L3_CNTL_REG: u32 = 0x7034;

/// Command streamer debug mode register; masked, upper half is write-enable.
pub const CS_DEBUG_MODE1: u32 = 0x20EC;
pub const CS_DEBUG_MODE1_GLOBAL_DEBUG: u32 = 1 << 6;

/// Thread dispatcher control.
pub const TD_CTL: u32 = 0xE400;
pub const TD_CTL_FORCE_THREAD_BKPT_ENABLE: u32 = 1 << 4;
pub const TD_CTL_FORCE_EXT_EXCEPTION_ENABLE: u32 = 1 << 7;

pub const PREEMPTION_CONTROL: u32 = 0x2580;
pub const MID_THREAD_PREEMPT_VALUE: u32 = 0x0006_0000;
pub const THREAD_GROUP_PREEMPT_VALUE: u32 = 0x0006_0002;
pub const MID_BATCH_PREEMPT_VALUE: u32 = 0x0006_0004;

/// Render engine timestamp, low dword; the high dword follows at +4.
pub const CS_TIMESTAMP: u32 = 0x2358;

/// Command streamer general purpose registers, 64 bits each.
pub const CS_GPR_BASE: u32 = 0x2600;
pub const CS_GPR_COUNT: u32 = 16;

/// Low dword of GPR `n`.
pub const fn cs_gpr(n: u32) -> u32 {
    CS_GPR_BASE + 8 * n
}

pub const L3_CONFIG_COUNT: usize = 8;
/// Preset used when shared local memory is requested.
pub const SLM_PLANE_DEFAULT: usize = 5;

/// Register writes of one L3 preset. Gen8 and gen9 only program the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L3ConfigRegisterValues {
    pub config_register0: u32,
    pub config_register1: u32,
    pub config_register2: u32,
    pub config_register3: u32,
}

impl L3ConfigRegisterValues {
    const fn control(value: u32) -> Self {
        Self {
            config_register0: 0,
            config_register1: 0,
            config_register2: 0,
            config_register3: value,
        }
    }

    /// Value written to [`L3_CNTL_REG`].
    pub fn l3_control(&self) -> u32 {
        self.config_register3
    }
}

/// Way allocation of a preset, in KB for a GT2 part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L3Partition {
    pub slm: u32,
    pub urb: u32,
    pub rest: u32,
    pub dc: u32,
    pub ro: u32,
    pub is: u32,
    pub c: u32,
    pub t: u32,
}

impl L3Partition {
    const fn new(slm: u32, urb: u32, rest: u32, dc: u32, ro: u32) -> Self {
        Self {
            slm,
            urb,
            rest,
            dc,
            ro,
            is: 0,
            c: 0,
            t: 0,
        }
    }

    pub fn total(&self) -> u32 {
        self.slm + self.urb + self.rest + self.dc + self.ro + self.is + self.c + self.t
    }
}

pub static SKL_L3_PLANE: [L3ConfigRegisterValues; L3_CONFIG_COUNT] = [
    L3ConfigRegisterValues::control(0x6000_0060),
    L3ConfigRegisterValues::control(0x0080_8060),
    L3ConfigRegisterValues::control(0x0081_8040),
    L3ConfigRegisterValues::control(0x0003_0040),
    L3ConfigRegisterValues::control(0x8000_0040),
    L3ConfigRegisterValues::control(0x6000_0121),
    L3ConfigRegisterValues::control(0x0041_0121),
    L3ConfigRegisterValues::control(0x0080_8121),
];

pub static SKL_L3_PARTITION: [L3Partition; L3_CONFIG_COUNT] = [
    L3Partition::new(0, 48, 48, 0, 0),
    L3Partition::new(0, 48, 0, 16, 32),
    L3Partition::new(0, 32, 0, 16, 48),
    L3Partition::new(0, 32, 0, 0, 64),
    L3Partition::new(0, 32, 64, 0, 0),
    L3Partition::new(32, 16, 48, 0, 0),
    L3Partition::new(32, 16, 0, 16, 32),
    L3Partition::new(32, 16, 0, 32, 16),
];

pub static BDW_L3_PLANE: [L3ConfigRegisterValues; L3_CONFIG_COUNT] = [
    L3ConfigRegisterValues::control(0x6000_0060),
    L3ConfigRegisterValues::control(0x0041_0060),
    L3ConfigRegisterValues::control(0x0041_8040),
    L3ConfigRegisterValues::control(0x0002_0040),
    L3ConfigRegisterValues::control(0x8000_0040),
    L3ConfigRegisterValues::control(0x6000_0021),
    L3ConfigRegisterValues::control(0x0041_0021),
    L3ConfigRegisterValues::control(0x0080_8021),
];

pub static BDW_L3_PARTITION: [L3Partition; L3_CONFIG_COUNT] = [
    L3Partition::new(0, 384, 384, 0, 0),
    L3Partition::new(0, 384, 0, 128, 256),
    L3Partition::new(0, 256, 0, 128, 384),
    L3Partition::new(0, 256, 0, 0, 512),
    L3Partition::new(0, 256, 512, 0, 0),
    L3Partition::new(192, 128, 384, 0, 0),
    L3Partition::new(192, 128, 0, 128, 256),
    L3Partition::new(192, 128, 0, 256, 128),
];

fn check_plane(plane: usize) -> Result<()> {
    if plane >= L3_CONFIG_COUNT {
        return Err(Error::InvalidL3Plane {
            plane,
            max: L3_CONFIG_COUNT - 1,
        });
    }
    Ok(())
}

/// Register values of L3 preset `plane`.
pub fn l3_preset(generation: Generation, plane: usize) -> Result<&'static L3ConfigRegisterValues> {
    check_plane(plane)?;
    Ok(match generation {
        Generation::Gen8 => &BDW_L3_PLANE[plane],
        Generation::Gen9 => &SKL_L3_PLANE[plane],
    })
}

pub fn l3_partition(generation: Generation, plane: usize) -> Result<&'static L3Partition> {
    check_plane(plane)?;
    Ok(match generation {
        Generation::Gen8 => &BDW_L3_PARTITION[plane],
        Generation::Gen9 => &SKL_L3_PARTITION[plane],
    })
}

bitflags! {
    /// Device capabilities and workarounds that change the emitted stream.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeviceFeatures: u32 {
        const PER_CTXT_PREEMPTION_GRANULARITY_CONTROL = 1 << 0;
        const GPGPU_MID_BATCH_PREEMPT = 1 << 1;
        const GPGPU_THREAD_GROUP_PREEMPT = 1 << 2;
        const GPGPU_MID_THREAD_PREEMPT = 1 << 3;
        const MEDIA_MID_BATCH_PREEMPT = 1 << 4;
        const MEDIA_THREAD_GROUP_PREEMPT = 1 << 5;
        const MEDIA_MID_THREAD_PREEMPT = 1 << 6;
        /// Workaround: reprogram VFE after the final pipe control.
        const SEND_DUMMY_VFE_AFTER_PIPELINE_SELECT = 1 << 16;
    }
}

/// Preemption control value, or `None` when the device has no per-context
/// granularity control. Mid-thread is downgraded to thread-group: the
/// render engine of this family cannot resume mid-thread.
pub fn preemption_value(features: DeviceFeatures, gpgpu: bool) -> Option<u32> {
    if !features.contains(DeviceFeatures::PER_CTXT_PREEMPTION_GRANULARITY_CONTROL) {
        return None;
    }

    let (thread_group, mid_batch) = if gpgpu {
        (
            DeviceFeatures::GPGPU_THREAD_GROUP_PREEMPT | DeviceFeatures::GPGPU_MID_THREAD_PREEMPT,
            DeviceFeatures::GPGPU_MID_BATCH_PREEMPT,
        )
    } else {
        (
            DeviceFeatures::MEDIA_THREAD_GROUP_PREEMPT | DeviceFeatures::MEDIA_MID_THREAD_PREEMPT,
            DeviceFeatures::MEDIA_MID_BATCH_PREEMPT,
        )
    };

    if features.intersects(thread_group) {
        Some(THREAD_GROUP_PREEMPT_VALUE)
    } else if features.intersects(mid_batch) {
        Some(MID_BATCH_PREEMPT_VALUE)
    } else {
        // Still programmed; leaving the register unset hangs the engine.
        Some(MID_BATCH_PREEMPT_VALUE)
    }
}

/// Masked write turning on global debug in [`CS_DEBUG_MODE1`].
pub fn cs_debug_mode1_value() -> u32 {
    (CS_DEBUG_MODE1_GLOBAL_DEBUG << 16) | CS_DEBUG_MODE1_GLOBAL_DEBUG
}

pub fn td_ctl_value() -> u32 {
    TD_CTL_FORCE_THREAD_BKPT_ENABLE | TD_CTL_FORCE_EXT_EXCEPTION_ENABLE
}

/// Nanoseconds per render engine timestamp tick.
pub fn ns_per_tick(platform: Platform) -> f64 {
    match platform {
        Platform::Bdw => 80.0,
        Platform::Bxt | Platform::Glk => 52.083,
        Platform::Skl | Platform::Kbl => 83.333,
    }
}

pub fn ticks_to_ns(platform: Platform, ticks: u64) -> u64 {
    (ticks as f64 * ns_per_tick(platform)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l3_tables() {
        assert_eq!(l3_preset(Generation::Gen9, 0).unwrap().l3_control(), 0x6000_0060);
        assert_eq!(l3_preset(Generation::Gen9, SLM_PLANE_DEFAULT).unwrap().l3_control(), 0x6000_0121);
        assert_eq!(l3_preset(Generation::Gen9, 7).unwrap().l3_control(), 0x0080_8121);
        assert_eq!(l3_preset(Generation::Gen8, 1).unwrap().l3_control(), 0x0041_0060);
        assert_eq!(l3_preset(Generation::Gen8, SLM_PLANE_DEFAULT).unwrap().l3_control(), 0x6000_0021);

        for plane in SKL_L3_PLANE.iter().chain(BDW_L3_PLANE.iter()) {
            assert_eq!(plane.config_register0, 0);
            assert_eq!(plane.config_register1, 0);
            assert_eq!(plane.config_register2, 0);
        }
    }

    #[test]
    fn test_gpr_offsets() {
        assert_eq!(cs_gpr(0), 0x2600);
        assert_eq!(cs_gpr(7) + 4, 0x263C);
        assert_eq!(cs_gpr(CS_GPR_COUNT - 1), 0x2678);
    }

    #[test]
    fn test_l3_plane_out_of_range() {
        match l3_preset(Generation::Gen9, L3_CONFIG_COUNT) {
            Err(Error::InvalidL3Plane { plane, max }) => {
                assert_eq!(plane, 8);
                assert_eq!(max, 7);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(l3_partition(Generation::Gen8, 100).is_err());
    }

    #[test]
    fn test_partitions_fill_l3() {
        for plane in 0..L3_CONFIG_COUNT {
            assert_eq!(l3_partition(Generation::Gen9, plane).unwrap().total(), 96);
            assert_eq!(l3_partition(Generation::Gen8, plane).unwrap().total(), 768);
        }
        // SLM presets are exactly the ones reserving SLM space.
        assert!(SKL_L3_PARTITION[SLM_PLANE_DEFAULT].slm > 0);
        assert_eq!(SKL_L3_PARTITION[4].slm, 0);
    }

    #[test]
    fn test_preemption_selection() {
        assert_eq!(preemption_value(DeviceFeatures::empty(), true), None);

        let base = DeviceFeatures::PER_CTXT_PREEMPTION_GRANULARITY_CONTROL;
        assert_eq!(
            preemption_value(base | DeviceFeatures::GPGPU_MID_THREAD_PREEMPT, true),
            Some(THREAD_GROUP_PREEMPT_VALUE)
        );
        assert_eq!(
            preemption_value(base | DeviceFeatures::GPGPU_MID_BATCH_PREEMPT, true),
            Some(MID_BATCH_PREEMPT_VALUE)
        );
        assert_eq!(
            preemption_value(base | DeviceFeatures::MEDIA_THREAD_GROUP_PREEMPT, false),
            Some(THREAD_GROUP_PREEMPT_VALUE)
        );
        // GPGPU capabilities don't apply to the media pipe.
        assert_eq!(
            preemption_value(base | DeviceFeatures::GPGPU_THREAD_GROUP_PREEMPT, false),
            Some(MID_BATCH_PREEMPT_VALUE)
        );
        assert_eq!(preemption_value(base, false), Some(MID_BATCH_PREEMPT_VALUE));
    }

    #[test]
    fn test_debug_register_values() {
        assert_eq!(cs_debug_mode1_value(), 0x0040_0040);
        assert_eq!(td_ctl_value(), 0x90);
    }

    #[test]
    fn test_ticks_to_ns() {
        assert_eq!(ticks_to_ns(Platform::Skl, 12), 999);
        assert_eq!(ticks_to_ns(Platform::Kbl, 1_000), 83_333);
        assert_eq!(ticks_to_ns(Platform::Bxt, 1_000), 52_083);
        assert_eq!(ticks_to_ns(Platform::Bdw, 10), 800);
        assert_eq!(ticks_to_ns(Platform::Glk, 0), 0);
    }
}
