//! Backend Module
//!
//! Interfaces the sequencer consumes from the rest of the driver, and an
//! in-process implementation of both: command buffers come from a
//! [`CommandBufferPool`], resources from a [`ResourceTable`], and submitted
//! streams are queued for the software command streamer.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::cmdbuf::{BufferId, CommandBuffer, CommandBufferPool};
use crate::error::{Error, Result};
use crate::hwcmd::render::BaseAddresses;
use crate::resource::{ResourceHandle, ResourceTable, SharedResource};

/// Opaque reference to a submitted command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub BufferId);

/// A surface bound to the current media state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceBinding {
    pub resource: ResourceHandle,
    pub binding_table_index: u32,
    pub for_write: bool,
}

/// Render/compute state heap: interface descriptors, curbe data and
/// surface states live here; the sequencer only embeds its offsets.
pub trait StateHeap {
    fn interface_descriptor_offset(&self) -> u32;

    /// Total bytes of interface descriptors in use.
    fn interface_descriptor_length(&self) -> u32;

    /// Reserves `size` bytes of curbe data, returning its offset.
    fn curbe_offset(&mut self, size: u32) -> Result<u32>;

    fn surface_state_offset(&self) -> u32;

    fn base_addresses(&self) -> BaseAddresses;

    fn surface_bindings(&self) -> &[SurfaceBinding];
}

/// OS command submission interface.
pub trait SubmissionBackend {
    /// Hands out a buffer holding at least `min_bytes`; it may hold more.
    fn acquire_command_buffer(&mut self, min_bytes: usize) -> Result<CommandBuffer>;

    /// Gives the unwritten tail of `buf` back to the pool.
    fn return_unused_capacity(&mut self, buf: &mut CommandBuffer);

    /// Gives back a buffer that will not be submitted.
    fn discard_command_buffer(&mut self, buf: CommandBuffer);

    /// Hands a finished buffer to the GPU. On error nothing was queued and
    /// the buffer stays allocated until the caller releases it by id.
    fn submit(&mut self, buf: CommandBuffer, null_hw: bool) -> Result<BufferHandle>;

    /// Marks a submitted buffer as no longer referenced by the GPU.
    fn release_command_buffer(&mut self, handle: BufferHandle);

    /// Adds a resource to the residency list of the buffer being built.
    fn register_resource(&mut self, resource: ResourceHandle, for_write: bool) -> Result<()>;

    fn resource_address(&self, resource: ResourceHandle) -> Result<u64>;
}

/// A finished stream as handed to the command streamer.
#[derive(Debug)]
pub struct SubmittedBuffer {
    pub handle: BufferHandle,
    pub gpu_address: u64,
    pub bytes: Vec<u8>,
    /// Resources registered while the stream was built, with write intent.
    pub residency: Vec<(Arc<SharedResource>, bool)>,
    pub null_hw: bool,
}

/// In-process backend over a command buffer pool and a resource table.
pub struct SoftwareBackend {
    pool: CommandBufferPool,
    resources: ResourceTable,
    residency: HashMap<ResourceHandle, bool>,
    queue: VecDeque<SubmittedBuffer>,
    sink: Option<UnboundedSender<SubmittedBuffer>>,
    submit_count: u64,
}

/// GPU address of the command buffer pool.
pub const COMMAND_POOL_ADDRESS: u64 = 0x10_0000;

impl SoftwareBackend {
    pub fn new(pool_capacity: usize) -> Self {
        Self {
            pool: CommandBufferPool::new(COMMAND_POOL_ADDRESS, pool_capacity),
            resources: ResourceTable::new(),
            residency: HashMap::new(),
            queue: VecDeque::new(),
            sink: None,
            submit_count: 0,
        }
    }

    /// Forwards submitted streams to `sink` instead of queueing them.
    pub fn with_sink(mut self, sink: UnboundedSender<SubmittedBuffer>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn resources(&self) -> &ResourceTable {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut ResourceTable {
        &mut self.resources
    }

    pub fn pool(&self) -> &CommandBufferPool {
        &self.pool
    }

    pub fn submit_count(&self) -> u64 {
        self.submit_count
    }

    /// Resources registered for the buffer currently being built.
    pub fn pending_residency(&self) -> impl Iterator<Item = (&ResourceHandle, &bool)> {
        self.residency.iter()
    }

    /// Drains queued submissions.
    pub fn take_submitted(&mut self) -> Vec<SubmittedBuffer> {
        self.queue.drain(..).collect()
    }
}

impl SubmissionBackend for SoftwareBackend {
    fn acquire_command_buffer(&mut self, min_bytes: usize) -> Result<CommandBuffer> {
        self.residency.clear();
        self.pool.acquire(min_bytes)
    }

    fn return_unused_capacity(&mut self, buf: &mut CommandBuffer) {
        self.pool.return_unused(buf);
    }

    fn discard_command_buffer(&mut self, mut buf: CommandBuffer) {
        self.pool.return_unused(&mut buf);
        self.pool.release(buf.id());
        self.residency.clear();
    }

    fn submit(&mut self, buf: CommandBuffer, null_hw: bool) -> Result<BufferHandle> {
        let handle = BufferHandle(buf.id());
        let gpu_address = buf.gpu_address();

        let mut residency = Vec::with_capacity(self.residency.len());
        for (handle, for_write) in self.residency.drain() {
            residency.push((self.resources.get(handle)?.clone(), for_write));
        }

        let submitted = SubmittedBuffer {
            handle,
            gpu_address,
            bytes: buf.into_bytes(),
            residency,
            null_hw,
        };
        let length = submitted.bytes.len();

        match &self.sink {
            Some(sink) => sink
                .send(submitted)
                .map_err(|_| Error::Backend("command streamer has shut down".to_string()))?,
            None => self.queue.push_back(submitted),
        }
        self.submit_count += 1;
        info!(
            "Submitted command buffer {} ({} bytes{})",
            handle.0,
            length,
            if null_hw { ", null hardware" } else { "" }
        );
        Ok(handle)
    }

    fn release_command_buffer(&mut self, handle: BufferHandle) {
        debug!("Releasing command buffer {}", handle.0);
        self.pool.release(handle.0);
    }

    fn register_resource(&mut self, resource: ResourceHandle, for_write: bool) -> Result<()> {
        self.resources.get(resource)?;
        let entry = self.residency.entry(resource).or_insert(false);
        *entry |= for_write;
        Ok(())
    }

    fn resource_address(&self, resource: ResourceHandle) -> Result<u64> {
        Ok(self.resources.get(resource)?.gpu_address())
    }
}

/// Size of one interface descriptor.
pub const INTERFACE_DESCRIPTOR_SIZE: u32 = 32;
/// Curbe allocations are aligned to a register (32 bytes).
pub const CURBE_ALIGNMENT: u32 = 32;

/// State heap laid out as one linear region: interface descriptors, then
/// curbe data, then surface states.
pub struct LinearStateHeap {
    bases: BaseAddresses,
    descriptor_count: u32,
    curbe_base: u32,
    curbe_size: u32,
    curbe_used: u32,
    surface_state_base: u32,
    bindings: Vec<SurfaceBinding>,
}

impl LinearStateHeap {
    pub fn new(heap_address: u64, heap_size: u32, descriptor_count: u32, curbe_size: u32) -> Self {
        let curbe_base = descriptor_count * INTERFACE_DESCRIPTOR_SIZE;
        let surface_state_base = (curbe_base + curbe_size).next_multiple_of(64);
        Self {
            bases: BaseAddresses {
                general_state: heap_address,
                general_state_size: heap_size,
                surface_state: heap_address,
                dynamic_state: heap_address,
                dynamic_state_size: heap_size,
                indirect_object: heap_address,
                indirect_object_size: heap_size,
                instruction: heap_address,
                instruction_size: heap_size,
            },
            descriptor_count,
            curbe_base,
            curbe_size,
            curbe_used: 0,
            surface_state_base,
            bindings: Vec::new(),
        }
    }

    pub fn bind_surface(&mut self, resource: ResourceHandle, for_write: bool) -> u32 {
        let index = self.bindings.len() as u32;
        self.bindings.push(SurfaceBinding {
            resource,
            binding_table_index: index,
            for_write,
        });
        index
    }

    /// Starts a new media state: curbe space and bindings are released.
    pub fn reset(&mut self) {
        self.curbe_used = 0;
        self.bindings.clear();
    }

    pub fn curbe_used(&self) -> u32 {
        self.curbe_used
    }
}

impl StateHeap for LinearStateHeap {
    fn interface_descriptor_offset(&self) -> u32 {
        0
    }

    fn interface_descriptor_length(&self) -> u32 {
        self.descriptor_count * INTERFACE_DESCRIPTOR_SIZE
    }

    fn curbe_offset(&mut self, size: u32) -> Result<u32> {
        let aligned = size.next_multiple_of(CURBE_ALIGNMENT);
        if self.curbe_used + aligned > self.curbe_size {
            warn!(
                "Curbe allocation of {} bytes exceeds heap ({} of {} used)",
                size, self.curbe_used, self.curbe_size
            );
            return Err(Error::Backend(format!("curbe heap exhausted: {} bytes requested", size)));
        }
        let offset = self.curbe_base + self.curbe_used;
        self.curbe_used += aligned;
        Ok(offset)
    }

    fn surface_state_offset(&self) -> u32 {
        self.surface_state_base
    }

    fn base_addresses(&self) -> BaseAddresses {
        self.bases
    }

    fn surface_bindings(&self) -> &[SurfaceBinding] {
        &self.bindings
    }
}
