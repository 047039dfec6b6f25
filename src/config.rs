//! Configuration Module
//!
//! Handles configuration file parsing for the device context and the demo
//! workload driven by the service binary.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::catalog::Platform;
use crate::error::Error;
use crate::platform::{DeviceFeatures, SLM_PLANE_DEFAULT};
use crate::sequencer::{SequencerConfig, DEFAULT_HW_THREAD_LIMIT, DEFAULT_URB_ENTRIES};
use crate::streamer::DEFAULT_TICKS_PER_COMMAND;

/// Backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Target platform: "bdw", "skl", "bxt", "kbl" or "glk"
    #[serde(default = "default_platform")]
    pub platform: Platform,

    /// L3 cache partitioning preset (0-7)
    #[serde(default = "default_l3_plane")]
    pub l3_plane: usize,

    /// Device feature and workaround names, e.g. "GPGPU_THREAD_GROUP_PREEMPT"
    #[serde(default = "default_features")]
    pub features: Vec<String>,

    /// Bytes of command buffer space shared by all in-flight tasks
    #[serde(default = "default_command_pool_size")]
    pub command_pool_size: usize,

    /// Number of task sync slots
    #[serde(default = "default_task_slots")]
    pub task_slots: u32,

    /// Command-buffer batching: slots also record the frame tracker tag
    #[serde(default)]
    pub batching: bool,

    /// Build and submit, but execute nothing
    #[serde(default)]
    pub null_hw: bool,

    /// Thread limit requested for every task
    #[serde(default)]
    pub max_threads: Option<u32>,

    /// Hardware thread count of the device
    #[serde(default = "default_hw_thread_limit")]
    pub hw_thread_limit: u32,

    #[serde(default = "default_urb_entries")]
    pub urb_entries: u32,

    /// Software command streamer clock: ticks per command
    #[serde(default = "default_ticks_per_command")]
    pub ticks_per_command: u64,

    /// Demo workload: tasks to submit (0 = until Ctrl+C)
    #[serde(default = "default_demo_tasks")]
    pub demo_tasks: u32,

    /// Demo workload: kernels per task
    #[serde(default = "default_demo_kernels")]
    pub demo_kernels: u32,

    /// Demo workload: thread space of each kernel
    #[serde(default = "default_thread_space_width")]
    pub thread_space_width: u32,

    #[serde(default = "default_thread_space_height")]
    pub thread_space_height: u32,

    /// Interval between completion polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Give up waiting for a task after this long
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,
}

fn default_platform() -> Platform {
    Platform::Skl
}

fn default_l3_plane() -> usize {
    SLM_PLANE_DEFAULT
}

fn default_features() -> Vec<String> {
    vec![
        "PER_CTXT_PREEMPTION_GRANULARITY_CONTROL".to_string(),
        "GPGPU_THREAD_GROUP_PREEMPT".to_string(),
        "MEDIA_THREAD_GROUP_PREEMPT".to_string(),
    ]
}

fn default_command_pool_size() -> usize {
    256 * 1024
}

fn default_task_slots() -> u32 {
    64
}

fn default_hw_thread_limit() -> u32 {
    DEFAULT_HW_THREAD_LIMIT
}

fn default_urb_entries() -> u32 {
    DEFAULT_URB_ENTRIES
}

fn default_ticks_per_command() -> u64 {
    DEFAULT_TICKS_PER_COMMAND
}

fn default_demo_tasks() -> u32 {
    16
}

fn default_demo_kernels() -> u32 {
    3
}

fn default_thread_space_width() -> u32 {
    32
}

fn default_thread_space_height() -> u32 {
    16
}

fn default_poll_interval_ms() -> u64 {
    1
}

fn default_task_timeout_ms() -> u64 {
    2000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            l3_plane: default_l3_plane(),
            features: default_features(),
            command_pool_size: default_command_pool_size(),
            task_slots: default_task_slots(),
            batching: false,
            null_hw: false,
            max_threads: None,
            hw_thread_limit: default_hw_thread_limit(),
            urb_entries: default_urb_entries(),
            ticks_per_command: default_ticks_per_command(),
            demo_tasks: default_demo_tasks(),
            demo_kernels: default_demo_kernels(),
            thread_space_width: default_thread_space_width(),
            thread_space_height: default_thread_space_height(),
            poll_interval_ms: default_poll_interval_ms(),
            task_timeout_ms: default_task_timeout_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Parses the feature names.
    pub fn device_features(&self) -> crate::Result<DeviceFeatures> {
        self.features.iter().try_fold(DeviceFeatures::empty(), |acc, name| {
            DeviceFeatures::from_name(name)
                .map(|f| acc | f)
                .ok_or_else(|| Error::Config(format!("unknown device feature '{}'", name)))
        })
    }

    pub fn sequencer_config(&self) -> crate::Result<SequencerConfig> {
        if self.task_slots == 0 {
            return Err(Error::Config("task_slots must be at least 1".to_string()));
        }
        if self.hw_thread_limit == 0 {
            return Err(Error::Config("hw_thread_limit must be at least 1".to_string()));
        }
        Ok(SequencerConfig {
            platform: self.platform,
            l3_plane: self.l3_plane,
            features: self.device_features()?,
            hw_thread_limit: self.hw_thread_limit,
            urb_entries: self.urb_entries,
        })
    }
}
