//! cmhal-backend
//!
//! Command-buffer builder and submission core for gen8/gen9 Intel media
//! GPUs: bit-exact command encoders, the per-task command sequencer and
//! GPU timestamp based completion tracking.

#[macro_use]
pub mod hwcmd;

pub mod backend;
pub mod catalog;
pub mod cmdbuf;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod platform;
pub mod resource;
pub mod sequencer;
pub mod streamer;
pub mod sync;

pub use backend::{
    BufferHandle, LinearStateHeap, SoftwareBackend, StateHeap, SubmissionBackend, SubmittedBuffer,
    SurfaceBinding,
};
pub use catalog::{CommandCatalog, CommandKind, Generation, Platform};
pub use cmdbuf::{CommandBuffer, CommandBufferPool};
pub use config::Config;
pub use dispatch::{DependencyPattern, KernelDispatchDescriptor, WalkerParams};
pub use error::{Error, Result};
pub use hwcmd::HwCommand;
pub use platform::DeviceFeatures;
pub use resource::{ResourceHandle, ResourceTable, SharedResource};
pub use sequencer::{CommandSequencer, DispatchMode, SequencerConfig, SubmissionReceipt, TaskParams};
pub use streamer::{CommandStreamer, ExecutionSummary};
pub use sync::{SyncTracker, TaskTimestamps, INVALID_MARKER};
