//! Synchronization Tracker Module
//!
//! Per-task completion tracking through GPU-written timestamps. Each task
//! owns a slot in a long-lived timestamp resource; the host resets the slot
//! to the invalid marker before the task's commands are built and from then
//! on only reads it. The command stream is the only writer.
//!
//! Slot layout (qwords): `[submit, complete]`, or with command-buffer
//! batching `[submit, complete, tag, tracker index]`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use crate::catalog::Platform;
use crate::error::{Error, Result};
use crate::platform::ticks_to_ns;
use crate::resource::{ResourceHandle, ResourceTable, SharedResource};

/// Marker value meaning "not written by the GPU yet".
pub const INVALID_MARKER: u64 = u64::MAX;

const SUBMIT_MARKER: usize = 0;
const COMPLETE_MARKER: usize = 8;
const TAG_MARKER: usize = 16;
const TRACKER_INDEX_MARKER: usize = 24;

/// Offsets inside the status resource.
pub const SYNC_TAG_OFFSET: usize = 0;
pub const FRAME_TRACKER_OFFSET: usize = 8;
const STATUS_RESOURCE_SIZE: usize = 64;

/// Whether the GPU, having reported `last`, has passed `tag`. Tags wrap at
/// `u32::MAX`; a tag up to 2^31 behind `last` counts as reached.
pub fn sync_tag_reached(last: u32, tag: u32) -> bool {
    last.wrapping_sub(tag) as i32 >= 0
}

/// GPU timestamps of one finished task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskTimestamps {
    pub submit_ticks: u64,
    pub complete_ticks: u64,
    pub elapsed_ns: u64,
}

pub struct SyncTracker {
    platform: Platform,
    timestamps: Arc<SharedResource>,
    timestamp_handle: ResourceHandle,
    status: Arc<SharedResource>,
    status_handle: ResourceHandle,
    slot_count: u32,
    slot_stride: usize,
    batching: bool,
    next_sync_tag: AtomicU32,
    next_frame_tag: AtomicU32,
    /// Tasks whose slot is handed out. Only bookkeeping is locked; slot
    /// contents are atomics.
    allocated: Mutex<HashSet<u32>>,
}

impl SyncTracker {
    /// Creates the timestamp and status resources in `resources`.
    pub fn new(
        resources: &mut ResourceTable,
        platform: Platform,
        slot_count: u32,
        batching: bool,
    ) -> Self {
        let slot_stride = if batching { 32 } else { 16 };
        let (timestamp_handle, timestamps) =
            resources.create("task-timestamps", slot_count as usize * slot_stride);
        let (status_handle, status) = resources.create("sync-status", STATUS_RESOURCE_SIZE);
        timestamps.fill(INVALID_MARKER);

        debug!(
            "Sync tracker: {} slots of {} bytes at {:#x}",
            slot_count,
            slot_stride,
            timestamps.gpu_address()
        );

        Self {
            platform,
            timestamps,
            timestamp_handle,
            status,
            status_handle,
            slot_count,
            slot_stride,
            batching,
            next_sync_tag: AtomicU32::new(1),
            next_frame_tag: AtomicU32::new(1),
            allocated: Mutex::new(HashSet::new()),
        }
    }

    pub fn slot_count(&self) -> u32 {
        self.slot_count
    }

    pub fn slot_stride(&self) -> usize {
        self.slot_stride
    }

    pub fn batching(&self) -> bool {
        self.batching
    }

    pub fn timestamp_resource(&self) -> ResourceHandle {
        self.timestamp_handle
    }

    pub fn status_resource(&self) -> ResourceHandle {
        self.status_handle
    }

    fn slot_offset(&self, task_id: u32) -> Result<usize> {
        if task_id >= self.slot_count {
            return Err(Error::TaskIdOutOfRange {
                task_id,
                max: self.slot_count.saturating_sub(1),
            });
        }
        Ok(task_id as usize * self.slot_stride)
    }

    /// Marks the task's slot as in use and returns its offset.
    pub fn allocate_slot(&self, task_id: u32) -> Result<usize> {
        let offset = self.slot_offset(task_id)?;
        let mut allocated = self.allocated.lock().map_err(|_| {
            Error::Backend("sync slot bookkeeping poisoned".to_string())
        })?;
        if !allocated.insert(task_id) {
            return Err(Error::SubmissionInFlight(task_id));
        }
        Ok(offset)
    }

    /// Returns a slot once the host is done with its timestamps.
    pub fn release_slot(&self, task_id: u32) {
        if let Ok(mut allocated) = self.allocated.lock() {
            allocated.remove(&task_id);
        }
    }

    pub fn is_allocated(&self, task_id: u32) -> bool {
        self.allocated
            .lock()
            .map(|a| a.contains(&task_id))
            .unwrap_or(false)
    }

    /// Writes the invalid marker into the slot. Must run before any command
    /// that targets the slot is appended.
    pub fn reset(&self, task_id: u32) -> Result<()> {
        let offset = self.slot_offset(task_id)?;
        self.timestamps.store(offset + SUBMIT_MARKER, INVALID_MARKER)?;
        self.timestamps.store(offset + COMPLETE_MARKER, INVALID_MARKER)?;
        trace!("Reset sync slot {} at offset {:#x}", task_id, offset);
        Ok(())
    }

    /// Records which frame-tracker tag a batched task was built with.
    pub fn write_tag_marker(&self, task_id: u32, tag: u32, tracker_index: u32) -> Result<()> {
        if !self.batching {
            return Ok(());
        }
        let offset = self.slot_offset(task_id)?;
        self.timestamps.store(offset + TAG_MARKER, tag as u64)?;
        self.timestamps
            .store(offset + TRACKER_INDEX_MARKER, tracker_index as u64)?;
        Ok(())
    }

    pub fn submit_marker_offset(&self, task_id: u32) -> Result<usize> {
        Ok(self.slot_offset(task_id)? + SUBMIT_MARKER)
    }

    pub fn complete_marker_offset(&self, task_id: u32) -> Result<usize> {
        Ok(self.slot_offset(task_id)? + COMPLETE_MARKER)
    }

    /// `None` unless batching is on.
    pub fn tag_marker_offset(&self, task_id: u32) -> Result<Option<usize>> {
        let offset = self.slot_offset(task_id)?;
        Ok(self.batching.then_some(offset + TAG_MARKER))
    }

    pub fn submit_marker_address(&self, task_id: u32) -> Result<u64> {
        Ok(self.timestamps.gpu_address() + self.submit_marker_offset(task_id)? as u64)
    }

    pub fn complete_marker_address(&self, task_id: u32) -> Result<u64> {
        Ok(self.timestamps.gpu_address() + self.complete_marker_offset(task_id)? as u64)
    }

    pub fn sync_tag_address(&self) -> u64 {
        self.status.gpu_address() + SYNC_TAG_OFFSET as u64
    }

    pub fn frame_tracker_address(&self) -> u64 {
        self.status.gpu_address() + FRAME_TRACKER_OFFSET as u64
    }

    pub fn submit_marker(&self, task_id: u32) -> Result<u64> {
        self.timestamps.load(self.submit_marker_offset(task_id)?)
    }

    pub fn complete_marker(&self, task_id: u32) -> Result<u64> {
        self.timestamps.load(self.complete_marker_offset(task_id)?)
    }

    /// Non-blocking completion check.
    pub fn poll_task_complete(&self, task_id: u32) -> Result<bool> {
        Ok(self.complete_marker(task_id)? != INVALID_MARKER)
    }

    /// Timestamps of a finished task, `None` while it is still running.
    pub fn task_timestamps(&self, task_id: u32) -> Result<Option<TaskTimestamps>> {
        let submit = self.submit_marker(task_id)?;
        let complete = self.complete_marker(task_id)?;
        if submit == INVALID_MARKER || complete == INVALID_MARKER {
            return Ok(None);
        }
        let elapsed = complete.saturating_sub(submit);
        Ok(Some(TaskTimestamps {
            submit_ticks: submit,
            complete_ticks: complete,
            elapsed_ns: ticks_to_ns(self.platform, elapsed),
        }))
    }

    /// Tag for the next submission. Tags start at 1 and only increase.
    pub fn next_sync_tag(&self) -> u32 {
        self.next_sync_tag.fetch_add(1, Ordering::AcqRel)
    }

    /// Last tag the GPU reported as reached.
    pub fn last_sync_tag(&self) -> u32 {
        self.status.load(SYNC_TAG_OFFSET).unwrap_or(0) as u32
    }

    pub fn next_frame_tag(&self) -> u32 {
        self.next_frame_tag.fetch_add(1, Ordering::AcqRel)
    }

    /// Last frame-tracker tag stored by the command stream.
    pub fn completed_frame_tag(&self) -> u32 {
        self.status.load(FRAME_TRACKER_OFFSET).unwrap_or(0) as u32
    }
}
