//! Command Sequencer Module
//!
//! Builds the command stream of one task in protocol order: submit
//! timestamp, pipeline state, one walker per kernel with barriers where the
//! caller declared dependencies, then the completion timestamp, sync tag and
//! tracker writes. A failure at any step after the buffer was acquired
//! restores the buffer to its initial cursor and never submits it.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};

use crate::backend::{BufferHandle, StateHeap, SubmissionBackend, CURBE_ALIGNMENT};
use crate::catalog::{CommandCatalog, CommandKind, Generation, Platform};
use crate::cmdbuf::{CommandBuffer, CursorSnapshot};
use crate::dispatch::{DependencyPattern, KernelDispatchDescriptor};
use crate::error::{Error, Result};
use crate::hwcmd::mi::{
    MediaStateFlush, MiAluInstruction, MiBatchBufferEnd, MiBatchBufferStart,
    MiConditionalBatchBufferEnd, MiLoadRegisterImm, MiLoadRegisterMem, MiLoadRegisterReg, MiMath,
    MiStoreDataImm, MiStoreRegisterMem, PipeControl, PipeControlFlags,
};
use crate::hwcmd::render::{
    GpgpuCsrBaseAddress, MediaCurbeLoad, MediaInterfaceDescriptorLoad, MediaVfeState,
    PipelineSelect, StateBaseAddressG8, StateBaseAddressG9, StateSip,
};
use crate::hwcmd::HwCommand;
use crate::platform::{
    cs_debug_mode1_value, cs_gpr, l3_preset, preemption_value, td_ctl_value, DeviceFeatures,
    CS_DEBUG_MODE1, CS_TIMESTAMP, L3_CNTL_REG, PREEMPTION_CONTROL, SLM_PLANE_DEFAULT, TD_CTL,
};
use crate::resource::ResourceHandle;
use crate::sync::{sync_tag_reached, SyncTracker};

/// Smallest buffer worth building a task into.
pub const MIN_COMMAND_BUFFER_SIZE: usize = 1024;

pub const DEFAULT_URB_ENTRIES: u32 = 32;
const DUMMY_VFE_URB_ENTRIES: u32 = 1;

/// Hardware threads of a GT2 part (24 EUs x 7 threads).
pub const DEFAULT_HW_THREAD_LIMIT: u32 = 168;

/// Only one frame tracker is used.
const FRAME_TRACKER_INDEX: u32 = 0;

/// How the kernels of a task reach the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    #[default]
    MediaWalker,
    Gpgpu,
    /// Commands were prebuilt into a second-level batch buffer.
    Batch(ResourceHandle),
}

/// Early exit point: the batch ends when the first dword of `resource` is
/// not greater than `compare_value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionalEnd {
    pub resource: ResourceHandle,
    pub compare_value: u32,
}

/// Per-task options supplied by the runtime.
#[derive(Debug, Clone, Default)]
pub struct TaskParams {
    pub mode: DispatchMode,
    /// Bit `i` set: kernel `i + 1` must not start before kernel `i` is done.
    pub sync_bitmap: u64,
    /// Conditional end points, keyed by the index of the kernel they precede.
    /// Only media walker dispatch honors them.
    pub conditional_ends: BTreeMap<usize, ConditionalEnd>,
    pub curbe_size: u32,
    /// Buffers accessed through their GPU address.
    pub buffer_table: Vec<ResourceHandle>,
    /// Thread limit requested by the runtime; clamped to the device limit.
    pub max_threads: Option<u32>,
    pub sip_debug: bool,
    /// Offset of the system routine from the instruction base.
    pub sip_kernel_offset: u64,
    /// Context save area for mid-thread preemption.
    pub csr_resource: Option<ResourceHandle>,
    pub null_hw: bool,
}

impl TaskParams {
    pub fn conditional_end_bitmap(&self) -> u64 {
        self.conditional_ends
            .keys()
            .filter(|&&i| i < 64)
            .fold(0, |bitmap, &i| bitmap | (1 << i))
    }
}

/// Device context settings fixed for the lifetime of a sequencer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencerConfig {
    pub platform: Platform,
    pub l3_plane: usize,
    pub features: DeviceFeatures,
    pub hw_thread_limit: u32,
    pub urb_entries: u32,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            platform: Platform::Skl,
            l3_plane: SLM_PLANE_DEFAULT,
            features: DeviceFeatures::empty(),
            hw_thread_limit: DEFAULT_HW_THREAD_LIMIT,
            urb_entries: DEFAULT_URB_ENTRIES,
        }
    }
}

/// Result of a successful submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub task_id: u32,
    pub handle: BufferHandle,
    pub sync_tag: u32,
    pub frame_tag: u32,
    /// Bytes of commands submitted.
    pub length: usize,
    pub null_hw: bool,
}

struct PendingSubmission {
    task_id: u32,
    buffer: CommandBuffer,
    start: CursorSnapshot,
    sync_tag: u32,
    frame_tag: u32,
    null_hw: bool,
}

/// Submitted buffer the GPU may still be reading.
struct InFlight {
    task_id: u32,
    handle: BufferHandle,
    sync_tag: u32,
}

/// Whether kernel `index` must wait for its predecessor.
pub fn barrier_required(
    sync_bitmap: u64,
    index: usize,
    pattern: DependencyPattern,
    media_walker: bool,
) -> bool {
    if index == 0 {
        return false;
    }
    let predecessor_synced = index - 1 < 64 && sync_bitmap & (1 << (index - 1)) != 0;
    predecessor_synced || (media_walker && pattern.requires_barrier())
}

pub struct CommandSequencer<B, H> {
    catalog: &'static CommandCatalog,
    config: SequencerConfig,
    l3_control: u32,
    backend: B,
    heap: H,
    tracker: Arc<SyncTracker>,
    pending: Option<PendingSubmission>,
    in_flight: Vec<InFlight>,
}

impl<B: SubmissionBackend, H: StateHeap> CommandSequencer<B, H> {
    pub fn new(
        config: SequencerConfig,
        backend: B,
        heap: H,
        tracker: Arc<SyncTracker>,
    ) -> Result<Self> {
        let generation = config.platform.generation();
        let l3_control = l3_preset(generation, config.l3_plane)?.l3_control();
        info!(
            "Command sequencer for {:?} ({}), L3 plane {} ({:#010x})",
            config.platform, generation, config.l3_plane, l3_control
        );
        Ok(Self {
            catalog: CommandCatalog::for_generation(generation),
            config,
            l3_control,
            backend,
            heap,
            tracker,
            pending: None,
            in_flight: Vec::new(),
        })
    }

    pub fn catalog(&self) -> &'static CommandCatalog {
        self.catalog
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn heap_mut(&mut self) -> &mut H {
        &mut self.heap
    }

    pub fn tracker(&self) -> &Arc<SyncTracker> {
        &self.tracker
    }

    /// Submitted buffers not yet known to be finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn poll_task_complete(&self, task_id: u32) -> Result<bool> {
        self.tracker.poll_task_complete(task_id)
    }

    pub fn last_sync_tag(&self) -> u32 {
        self.tracker.last_sync_tag()
    }

    /// Builds and submits one task.
    pub fn submit_task(
        &mut self,
        task_id: u32,
        kernels: &[KernelDispatchDescriptor],
        params: &TaskParams,
    ) -> Result<SubmissionReceipt> {
        self.begin_submission(task_id, kernels, params)?;
        self.end_submission()
    }

    /// Acquires a command buffer and writes the whole stream of the task
    /// into it. The buffer is held until [`Self::end_submission`].
    pub fn begin_submission(
        &mut self,
        task_id: u32,
        kernels: &[KernelDispatchDescriptor],
        params: &TaskParams,
    ) -> Result<()> {
        if let Some(pending) = &self.pending {
            return Err(Error::SubmissionInFlight(pending.task_id));
        }
        self.retire_completed();
        self.tracker.allocate_slot(task_id)?;

        let mut buffer = match self.backend.acquire_command_buffer(MIN_COMMAND_BUFFER_SIZE) {
            Ok(buffer) => buffer,
            Err(e) => {
                self.tracker.release_slot(task_id);
                return Err(e);
            }
        };
        let start = buffer.snapshot();
        let sync_tag = self.tracker.next_sync_tag();
        let frame_tag = self.tracker.next_frame_tag();

        let built = self.build(&mut buffer, task_id, sync_tag, frame_tag, kernels, params);
        if let Err(e) = built {
            self.rollback(buffer, start, task_id, &e);
            return Err(e);
        }

        debug!(
            "Built task {}: {} kernels, {} bytes, sync tag {}",
            task_id,
            kernels.len(),
            buffer.offset(),
            sync_tag
        );
        self.pending = Some(PendingSubmission {
            task_id,
            buffer,
            start,
            sync_tag,
            frame_tag,
            null_hw: params.null_hw,
        });
        Ok(())
    }

    /// Hands the buffer built by [`Self::begin_submission`] to the backend.
    pub fn end_submission(&mut self) -> Result<SubmissionReceipt> {
        let PendingSubmission {
            task_id,
            mut buffer,
            sync_tag,
            frame_tag,
            null_hw,
            ..
        } = self.pending.take().ok_or(Error::NoSubmissionInFlight)?;

        let length = buffer.offset();
        let id = BufferHandle(buffer.id());
        self.backend.return_unused_capacity(&mut buffer);
        let handle = match self.backend.submit(buffer, null_hw) {
            Ok(handle) => handle,
            Err(e) => {
                error!("Submission of task {} failed: {}", task_id, e);
                self.backend.release_command_buffer(id);
                self.tracker.release_slot(task_id);
                return Err(e);
            }
        };

        if null_hw {
            // Nothing will execute; the buffer is free immediately.
            self.backend.release_command_buffer(handle);
            self.tracker.release_slot(task_id);
        } else {
            self.in_flight.push(InFlight {
                task_id,
                handle,
                sync_tag,
            });
        }

        Ok(SubmissionReceipt {
            task_id,
            handle,
            sync_tag,
            frame_tag,
            length,
            null_hw,
        })
    }

    /// Drops the buffer built by [`Self::begin_submission`] without
    /// submitting it.
    pub fn abort_submission(&mut self) -> Result<()> {
        let pending = self.pending.take().ok_or(Error::NoSubmissionInFlight)?;
        let cause = Error::Backend("submission aborted".to_string());
        self.rollback(pending.buffer, pending.start, pending.task_id, &cause);
        Ok(())
    }

    /// Releases buffers and sync slots of tasks whose sync tag the GPU has
    /// reached and whose completion timestamp is written. A tag stored
    /// ahead of a conditional end alone does not retire a task. Returns how
    /// many were retired.
    pub fn retire_completed(&mut self) -> usize {
        let tracker = Arc::clone(&self.tracker);
        let last = tracker.last_sync_tag();
        let (done, busy): (Vec<_>, Vec<_>) = self.in_flight.drain(..).partition(|f| {
            sync_tag_reached(last, f.sync_tag)
                && tracker.poll_task_complete(f.task_id).unwrap_or(false)
        });
        self.in_flight = busy;

        for finished in &done {
            trace!(
                "Retiring task {} (buffer {}, tag {})",
                finished.task_id,
                finished.handle.0,
                finished.sync_tag
            );
            self.backend.release_command_buffer(finished.handle);
            self.tracker.release_slot(finished.task_id);
        }
        done.len()
    }

    fn rollback(
        &mut self,
        mut buffer: CommandBuffer,
        start: CursorSnapshot,
        task_id: u32,
        cause: &Error,
    ) {
        if let Some(overflow) = buffer.rollback(start) {
            error!(
                "Command buffer overflow while building task {}: {} bytes short",
                task_id, overflow
            );
        }
        warn!("Rolled back task {}: {}", task_id, cause);
        self.backend.discard_command_buffer(buffer);
        self.tracker.release_slot(task_id);
    }

    fn emit<T: HwCommand>(
        &self,
        buffer: &mut CommandBuffer,
        kind: CommandKind,
        cmd: &T,
    ) -> Result<()> {
        let size = self
            .catalog
            .byte_size(kind)
            .ok_or(Error::UnsupportedCommand {
                kind,
                generation: self.catalog.generation(),
            })?;
        debug_assert_eq!(size, T::BYTE_SIZE);
        trace!("{} at {:#x}", T::NAME, buffer.offset());
        buffer.append(cmd)
    }

    fn build(
        &mut self,
        buffer: &mut CommandBuffer,
        task_id: u32,
        sync_tag: u32,
        frame_tag: u32,
        kernels: &[KernelDispatchDescriptor],
        params: &TaskParams,
    ) -> Result<()> {
        // Slot must read invalid before anything that targets it exists.
        self.tracker.reset(task_id)?;
        self.tracker
            .write_tag_marker(task_id, frame_tag, FRAME_TRACKER_INDEX)?;

        self.backend
            .register_resource(self.tracker.timestamp_resource(), true)?;
        self.backend
            .register_resource(self.tracker.status_resource(), true)?;
        if let DispatchMode::Batch(batch) = params.mode {
            self.backend.register_resource(batch, false)?;
        }

        self.emit_prologue(buffer, task_id, kernels, params)?;
        self.emit_dispatch(buffer, task_id, sync_tag, kernels, params)?;
        self.emit_epilogue(buffer, task_id, sync_tag, frame_tag, kernels, params)
    }

    fn emit_prologue(
        &mut self,
        buffer: &mut CommandBuffer,
        task_id: u32,
        kernels: &[KernelDispatchDescriptor],
        params: &TaskParams,
    ) -> Result<()> {
        use CommandKind as K;
        let gpgpu = params.mode == DispatchMode::Gpgpu;

        let submit = timestamp_write(
            self.tracker.submit_marker_address(task_id)?,
            PipeControlFlags::WRITE_CACHE,
        );
        self.emit(buffer, K::PipeControl, &submit)?;

        if params.sip_debug {
            let lri = MiLoadRegisterImm::write(CS_DEBUG_MODE1, cs_debug_mode1_value());
            self.emit(buffer, K::MiLoadRegisterImm, &lri)?;
            let lri = MiLoadRegisterImm::write(TD_CTL, td_ctl_value());
            self.emit(buffer, K::MiLoadRegisterImm, &lri)?;
        }

        let l3 = MiLoadRegisterImm::write(L3_CNTL_REG, self.l3_control);
        self.emit(buffer, K::MiLoadRegisterImm, &l3)?;

        if let Some(value) = preemption_value(self.config.features, gpgpu) {
            let lri = MiLoadRegisterImm::write(PREEMPTION_CONTROL, value);
            self.emit(buffer, K::MiLoadRegisterImm, &lri)?;
        }

        let mut select = PipelineSelect::new();
        select.set_pipeline_selection(if gpgpu {
            PipelineSelect::PIPELINE_SELECTION_GPGPU
        } else {
            PipelineSelect::PIPELINE_SELECTION_MEDIA
        });
        if self.catalog.generation() == Generation::Gen9 {
            select.set_mask_bits(PipelineSelect::GEN9_MASK_BITS);
        }
        self.emit(buffer, K::PipelineSelect, &select)?;

        let bases = self.heap.base_addresses();
        match self.catalog.generation() {
            Generation::Gen8 => {
                self.emit(buffer, K::StateBaseAddress, &StateBaseAddressG8::from_bases(&bases))?
            }
            Generation::Gen9 => {
                self.emit(buffer, K::StateBaseAddress, &StateBaseAddressG9::from_bases(&bases))?
            }
        }

        // Surface states live in the heap; the stream only needs them resident.
        for binding in self.heap.surface_bindings() {
            self.backend
                .register_resource(binding.resource, binding.for_write)?;
        }

        if gpgpu {
            self.emit_context_save_state(buffer, params)?;
        }

        let vfe = self.vfe_state(kernels, params, self.config.urb_entries);
        self.emit(buffer, K::MediaVfeState, &vfe)?;

        if params.curbe_size > 0 {
            let offset = self.heap.curbe_offset(params.curbe_size)?;
            let mut curbe = MediaCurbeLoad::new();
            curbe
                .set_curbe_total_data_length(params.curbe_size.next_multiple_of(CURBE_ALIGNMENT))
                .set_curbe_data_start_address(offset);
            self.emit(buffer, K::MediaCurbeLoad, &curbe)?;
        }

        let mut idl = MediaInterfaceDescriptorLoad::new();
        idl.set_interface_descriptor_total_length(self.heap.interface_descriptor_length())
            .set_interface_descriptor_data_start_address(self.heap.interface_descriptor_offset());
        self.emit(buffer, K::MediaInterfaceDescriptorLoad, &idl)
    }

    /// System routine and context save area of the GPGPU pipe.
    fn emit_context_save_state(
        &mut self,
        buffer: &mut CommandBuffer,
        params: &TaskParams,
    ) -> Result<()> {
        use CommandKind as K;

        if params.csr_resource.is_some() {
            let mut stall = PipeControl::new();
            stall.set_flags(PipeControlFlags::WRITE_CACHE);
            self.emit(buffer, K::PipeControl, &stall)?;
        }
        if !params.sip_debug && params.csr_resource.is_none() {
            return Ok(());
        }

        let mut sip = StateSip::new();
        sip.set_system_instruction_pointer(params.sip_kernel_offset >> 4);
        self.emit(buffer, K::StateSip, &sip)?;

        if let Some(csr) = params.csr_resource {
            self.backend.register_resource(csr, true)?;
            let mut base = GpgpuCsrBaseAddress::new();
            base.set_gpgpu_csr_base_address(self.backend.resource_address(csr)? >> 12);
            self.emit(buffer, K::GpgpuCsrBaseAddress, &base)?;
        }
        Ok(())
    }

    fn vfe_state(
        &self,
        kernels: &[KernelDispatchDescriptor],
        params: &TaskParams,
        urb_entries: u32,
    ) -> MediaVfeState {
        let limit = self.config.hw_thread_limit;
        let requested = params.max_threads.unwrap_or(limit);
        if requested > limit {
            debug!("Clamping {} requested threads to {}", requested, limit);
        }
        let max_threads = requested.min(limit).max(1);

        // URB entries carry the per-thread indirect data, in registers.
        let urb_entry_size = kernels
            .iter()
            .map(|k| k.indirect_data_length.div_ceil(32))
            .max()
            .unwrap_or(0)
            .max(1);

        let mut vfe = MediaVfeState::new();
        vfe.set_maximum_number_of_threads(max_threads - 1)
            .set_number_of_urb_entries(urb_entries)
            .set_curbe_allocation_size(params.curbe_size.div_ceil(32))
            .set_urb_entry_allocation_size(urb_entry_size);

        if params.mode == DispatchMode::MediaWalker {
            if let Some(kernel) = kernels.iter().find(|k| k.pattern.requires_barrier()) {
                let deltas = kernel.pattern.scoreboard_deltas();
                vfe.set_scoreboard_enable(1)
                    .set_scoreboard_type(MediaVfeState::SCOREBOARD_TYPE_STALLING)
                    .set_scoreboard_mask((1 << deltas.len()) - 1)
                    .set_scoreboard_deltas(deltas);
            }
        }
        vfe
    }

    fn emit_dispatch(
        &mut self,
        buffer: &mut CommandBuffer,
        task_id: u32,
        sync_tag: u32,
        kernels: &[KernelDispatchDescriptor],
        params: &TaskParams,
    ) -> Result<()> {
        use CommandKind as K;

        let gpgpu = match params.mode {
            DispatchMode::Batch(batch) => {
                let mut start = MiBatchBufferStart::new();
                start
                    .set_address_space_indicator(MiBatchBufferStart::ADDRESS_SPACE_INDICATOR_PPGTT)
                    .set_batch_buffer_start_address(self.backend.resource_address(batch)? >> 2);
                return self.emit(buffer, K::MiBatchBufferStart, &start);
            }
            DispatchMode::Gpgpu => true,
            DispatchMode::MediaWalker => false,
        };

        if gpgpu && !params.conditional_ends.is_empty() {
            warn!(
                "Ignoring {} conditional ends of task {} in GPGPU mode",
                params.conditional_ends.len(),
                task_id
            );
        }

        for (i, kernel) in kernels.iter().enumerate() {
            if let Some(cond) = params.conditional_ends.get(&i).filter(|_| !gpgpu) {
                self.emit_conditional_end(buffer, task_id, sync_tag, cond)?;
            }

            if barrier_required(params.sync_bitmap, i, kernel.pattern, !gpgpu) {
                trace!("Barrier before kernel {} '{}'", i, kernel.name);
                let mut barrier = PipeControl::new();
                barrier.set_flags(PipeControlFlags::KERNEL_BARRIER);
                self.emit(buffer, K::PipeControl, &barrier)?;
            }

            if gpgpu {
                self.emit(buffer, K::GpgpuWalker, &kernel.gpgpu_walker())?;
                self.emit(buffer, K::MediaStateFlush, &MediaStateFlush::new())?;
            } else {
                self.emit(buffer, K::MediaObjectWalker, &kernel.media_walker())?;
            }
        }
        Ok(())
    }

    /// The batch may stop at the compare, so the completion marker gets a
    /// value computed on the GPU first: the current timestamp when the
    /// batch will end here, the invalid marker when it will continue.
    ///
    /// R0 = timestamp, R1 = compared dword, R2 = compare value, R3 = 1.
    /// `R7 = (TS + 1) & !borrow(R2 - R1) - 1`.
    fn emit_conditional_end(
        &mut self,
        buffer: &mut CommandBuffer,
        task_id: u32,
        sync_tag: u32,
        cond: &ConditionalEnd,
    ) -> Result<()> {
        use CommandKind as K;
        use MiAluInstruction as Alu;

        self.backend.register_resource(cond.resource, false)?;
        let compare_address = self.backend.resource_address(cond.resource)?;
        let complete = self.tracker.complete_marker_address(task_id)?;

        self.emit(buffer, K::PipeControl, &self.sync_tag_write(sync_tag))?;

        let timestamp_lo = MiLoadRegisterReg::copy(CS_TIMESTAMP, cs_gpr(0));
        let timestamp_hi = MiLoadRegisterReg::copy(CS_TIMESTAMP + 4, cs_gpr(0) + 4);
        self.emit(buffer, K::MiLoadRegisterReg, &timestamp_lo)?;
        self.emit(buffer, K::MiLoadRegisterReg, &timestamp_hi)?;
        let compared = MiLoadRegisterMem::load(cs_gpr(1), compare_address);
        self.emit(buffer, K::MiLoadRegisterMem, &compared)?;

        let gpr_writes = [
            (cs_gpr(1) + 4, 0),
            (cs_gpr(2), cond.compare_value),
            (cs_gpr(2) + 4, 0),
            (cs_gpr(3), 1),
            (cs_gpr(3) + 4, 0),
        ];
        for (register, value) in gpr_writes {
            let lri = MiLoadRegisterImm::write(register, value);
            self.emit(buffer, K::MiLoadRegisterImm, &lri)?;
        }

        let program = [
            Alu::load(Alu::OPERAND_SRCA, 3),
            Alu::load(Alu::OPERAND_SRCB, 0),
            Alu::op(Alu::OPCODE_ADD),
            Alu::store(14, Alu::OPERAND_ACCU),
            Alu::load(Alu::OPERAND_SRCB, 1),
            Alu::load(Alu::OPERAND_SRCA, 2),
            Alu::op(Alu::OPCODE_SUB),
            Alu::store_inverted(4, Alu::OPERAND_CF),
            Alu::load(Alu::OPERAND_SRCA, 4),
            Alu::load(Alu::OPERAND_SRCB, 14),
            Alu::op(Alu::OPCODE_AND),
            Alu::store(6, Alu::OPERAND_ACCU),
            Alu::load(Alu::OPERAND_SRCA, 6),
            Alu::load(Alu::OPERAND_SRCB, 3),
            Alu::op(Alu::OPCODE_SUB),
            Alu::store(7, Alu::OPERAND_ACCU),
        ];
        self.emit_math(buffer, &program)?;

        let result_lo = MiStoreRegisterMem::store(cs_gpr(7), complete);
        let result_hi = MiStoreRegisterMem::store(cs_gpr(7) + 4, complete + 4);
        self.emit(buffer, K::MiStoreRegisterMem, &result_lo)?;
        self.emit(buffer, K::MiStoreRegisterMem, &result_hi)?;

        let mut end = MiConditionalBatchBufferEnd::new();
        end.set_compare_data_dword(cond.compare_value)
            .set_use_global_gtt(0)
            .set_compare_address(compare_address >> 3);
        self.emit(buffer, K::MiConditionalBatchBufferEnd, &end)
    }

    fn emit_math(&self, buffer: &mut CommandBuffer, program: &[MiAluInstruction]) -> Result<()> {
        self.emit(buffer, CommandKind::MiMath, &MiMath::with_instructions(program.len()))?;
        for inst in program {
            buffer.append(inst)?;
        }
        Ok(())
    }

    fn sync_tag_write(&self, sync_tag: u32) -> PipeControl {
        let mut pc = PipeControl::new();
        pc.set_post_sync_operation(PipeControl::POST_SYNC_OPERATION_WRITE_IMMEDIATE_DATA)
            .set_post_sync_address(self.tracker.sync_tag_address())
            .set_immediate_data(sync_tag as u64);
        pc
    }

    fn emit_epilogue(
        &mut self,
        buffer: &mut CommandBuffer,
        task_id: u32,
        sync_tag: u32,
        frame_tag: u32,
        kernels: &[KernelDispatchDescriptor],
        params: &TaskParams,
    ) -> Result<()> {
        use CommandKind as K;

        let mut flush = PipeControl::new();
        flush.set_flags(PipeControlFlags::WRITE_CACHE);
        self.emit(buffer, K::PipeControl, &flush)?;

        for &stateless in &params.buffer_table {
            self.backend.register_resource(stateless, true)?;
        }

        let complete = timestamp_write(
            self.tracker.complete_marker_address(task_id)?,
            PipeControlFlags::READ_CACHE,
        );
        self.emit(buffer, K::PipeControl, &complete)?;

        self.emit(buffer, K::PipeControl, &self.sync_tag_write(sync_tag))?;

        let tracker = MiStoreDataImm::qword(self.tracker.frame_tracker_address(), frame_tag as u64);
        self.emit(buffer, K::MiStoreDataImm, &tracker)?;

        // Keeps the next context from faulting on stale media state.
        let mut clear = PipeControl::new();
        clear.set_flags(
            PipeControlFlags::WRITE_CACHE
                | PipeControlFlags::GENERIC_MEDIA_STATE_CLEAR
                | PipeControlFlags::INDIRECT_STATE_POINTERS_DISABLE
                | PipeControlFlags::CS_STALL,
        );
        self.emit(buffer, K::PipeControl, &clear)?;

        if self
            .config
            .features
            .contains(DeviceFeatures::SEND_DUMMY_VFE_AFTER_PIPELINE_SELECT)
        {
            let dummy = self.vfe_state(kernels, params, DUMMY_VFE_URB_ENTRIES);
            self.emit(buffer, K::MediaVfeState, &dummy)?;
        }

        self.emit(buffer, K::MiBatchBufferEnd, &MiBatchBufferEnd::new())
    }
}

fn timestamp_write(address: u64, flags: PipeControlFlags) -> PipeControl {
    let mut pc = PipeControl::new();
    pc.set_flags(flags)
        .set_post_sync_operation(PipeControl::POST_SYNC_OPERATION_WRITE_TIMESTAMP)
        .set_post_sync_address(address);
    pc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LinearStateHeap, SoftwareBackend};
    use crate::catalog::CommandKind as K;
    use crate::hwcmd::mi::PipeControl;
    use crate::hwcmd::render::{GpgpuWalker, MediaObjectWalker};
    use crate::platform::{MID_BATCH_PREEMPT_VALUE, THREAD_GROUP_PREEMPT_VALUE};
    use crate::resource::ResourceTable;
    use crate::sync::SYNC_TAG_OFFSET;

    type Sequencer = CommandSequencer<SoftwareBackend, LinearStateHeap>;

    fn heap() -> LinearStateHeap {
        LinearStateHeap::new(0x20_0000, 0x1_0000, 4, 1024)
    }

    fn sequencer(config: SequencerConfig) -> Sequencer {
        let mut backend = SoftwareBackend::new(64 * 1024);
        let tracker = Arc::new(SyncTracker::new(
            backend.resources_mut(),
            config.platform,
            16,
            false,
        ));
        CommandSequencer::new(config, backend, heap(), tracker).unwrap()
    }

    fn kernels(count: usize) -> Vec<KernelDispatchDescriptor> {
        (0..count)
            .map(|i| KernelDispatchDescriptor::raster(&format!("k{}", i), i as u32, 16, 8))
            .collect()
    }

    /// Splits a stream into commands.
    fn decode(generation: Generation, bytes: &[u8]) -> Vec<(CommandKind, Vec<u32>)> {
        let catalog = CommandCatalog::for_generation(generation);
        let words: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let mut out = Vec::new();
        let mut i = 0;
        while i < words.len() {
            let entry = catalog.decode(words[i]).expect("unknown command");
            let len = entry.stream_dwords(words[i]);
            out.push((entry.kind, words[i..i + len].to_vec()));
            i += len;
        }
        out
    }

    fn submitted_stream(seq: &mut Sequencer) -> Vec<(CommandKind, Vec<u32>)> {
        let generation = seq.catalog().generation();
        let mut submitted = seq.backend_mut().take_submitted();
        assert_eq!(submitted.len(), 1);
        decode(generation, &submitted.remove(0).bytes)
    }

    fn kinds(stream: &[(CommandKind, Vec<u32>)]) -> Vec<CommandKind> {
        stream.iter().map(|(k, _)| *k).collect()
    }

    fn pipe_controls(stream: &[(CommandKind, Vec<u32>)]) -> Vec<PipeControl> {
        stream
            .iter()
            .filter(|(k, _)| *k == K::PipeControl)
            .map(|(_, dw)| PipeControl::from_dwords(dw).unwrap())
            .collect()
    }

    fn is_barrier(pc: &PipeControl) -> bool {
        pc.flags() == PipeControlFlags::KERNEL_BARRIER
            && pc.post_sync_operation() == PipeControl::POST_SYNC_OPERATION_NO_WRITE
    }

    fn register_writes(stream: &[(CommandKind, Vec<u32>)]) -> Vec<(u32, u32)> {
        stream
            .iter()
            .filter(|(k, _)| *k == K::MiLoadRegisterImm)
            .map(|(_, dw)| {
                let lri = MiLoadRegisterImm::from_dwords(dw).unwrap();
                (lri.register(), lri.data_dword())
            })
            .collect()
    }

    #[test]
    fn test_three_kernel_stream() {
        let mut seq = sequencer(SequencerConfig::default());
        let params = TaskParams {
            sync_bitmap: 0b01,
            ..Default::default()
        };
        let receipt = seq.submit_task(3, &kernels(3), &params).unwrap();
        let stream = submitted_stream(&mut seq);

        assert_eq!(
            kinds(&stream),
            vec![
                K::PipeControl,
                K::MiLoadRegisterImm,
                K::PipelineSelect,
                K::StateBaseAddress,
                K::MediaVfeState,
                K::MediaInterfaceDescriptorLoad,
                K::MediaObjectWalker,
                K::PipeControl,
                K::MediaObjectWalker,
                K::MediaObjectWalker,
                K::PipeControl,
                K::PipeControl,
                K::PipeControl,
                K::MiStoreDataImm,
                K::PipeControl,
                K::MiBatchBufferEnd,
            ]
        );

        let catalog = seq.catalog();
        let expected: usize = kinds(&stream)
            .iter()
            .map(|k| catalog.byte_size(*k).unwrap())
            .sum();
        assert_eq!(receipt.length, expected);

        let tracker = seq.tracker().clone();
        let pcs = pipe_controls(&stream);
        assert_eq!(pcs.iter().filter(|pc| is_barrier(pc)).count(), 1);

        let timestamps: Vec<u64> = pcs
            .iter()
            .filter(|pc| pc.post_sync_operation() == PipeControl::POST_SYNC_OPERATION_WRITE_TIMESTAMP)
            .map(|pc| pc.post_sync_address())
            .collect();
        assert_eq!(
            timestamps,
            vec![
                tracker.submit_marker_address(3).unwrap(),
                tracker.complete_marker_address(3).unwrap(),
            ]
        );

        let tag = pcs
            .iter()
            .find(|pc| {
                pc.post_sync_operation() == PipeControl::POST_SYNC_OPERATION_WRITE_IMMEDIATE_DATA
            })
            .unwrap();
        assert_eq!(tag.post_sync_address(), tracker.sync_tag_address());
        assert_eq!(tag.immediate_data(), receipt.sync_tag as u64);

        let sdi = MiStoreDataImm::from_dwords(&stream[13].1).unwrap();
        assert_eq!(sdi.address() << 2, tracker.frame_tracker_address());
        assert_eq!(sdi.data(), receipt.frame_tag as u64);

        let page_fault = &pcs[pcs.len() - 1];
        assert!(page_fault.flags().contains(
            PipeControlFlags::GENERIC_MEDIA_STATE_CLEAR
                | PipeControlFlags::INDIRECT_STATE_POINTERS_DISABLE
                | PipeControlFlags::CS_STALL
        ));

        // Slot was reset and nothing has executed it yet.
        assert!(!seq.poll_task_complete(3).unwrap());
        assert_eq!(seq.in_flight(), 1);
    }

    #[test]
    fn test_no_barrier_without_dependencies() {
        let mut seq = sequencer(SequencerConfig::default());
        seq.submit_task(0, &kernels(4), &TaskParams::default()).unwrap();
        let stream = submitted_stream(&mut seq);
        assert_eq!(pipe_controls(&stream).iter().filter(|pc| is_barrier(pc)).count(), 0);
        assert_eq!(
            kinds(&stream).iter().filter(|k| **k == K::MediaObjectWalker).count(),
            4
        );
    }

    #[test]
    fn test_dependency_pattern_forces_barrier_on_media_only() {
        let mut list = kernels(3);
        list[2] = list[2].clone().with_pattern(DependencyPattern::Wavefront26);

        let mut seq = sequencer(SequencerConfig::default());
        seq.submit_task(0, &list, &TaskParams::default()).unwrap();
        let stream = submitted_stream(&mut seq);
        let barriers: Vec<usize> = stream
            .iter()
            .enumerate()
            .filter(|(_, (k, dw))| {
                *k == K::PipeControl && is_barrier(&PipeControl::from_dwords(dw).unwrap())
            })
            .map(|(i, _)| i)
            .collect();
        assert_eq!(barriers.len(), 1);
        assert_eq!(stream[barriers[0] + 1].0, K::MediaObjectWalker);
        let walker = MediaObjectWalker::from_dwords(&stream[barriers[0] + 1].1).unwrap();
        assert_eq!(walker.interface_descriptor_offset(), 2);

        let vfe = stream.iter().find(|(k, _)| *k == K::MediaVfeState).unwrap();
        let vfe = MediaVfeState::from_dwords(&vfe.1).unwrap();
        assert_eq!(vfe.scoreboard_enable(), 1);
        assert_eq!(vfe.scoreboard_mask(), 0xF);

        let gpgpu = TaskParams {
            mode: DispatchMode::Gpgpu,
            ..Default::default()
        };
        seq.submit_task(1, &list, &gpgpu).unwrap();
        let stream = submitted_stream(&mut seq);
        assert_eq!(pipe_controls(&stream).iter().filter(|pc| is_barrier(pc)).count(), 0);
    }

    #[test]
    fn test_barrier_required() {
        let none = DependencyPattern::None;
        assert!(!barrier_required(u64::MAX, 0, DependencyPattern::Wavefront, true));
        assert!(barrier_required(0b10, 2, none, true));
        assert!(!barrier_required(0b10, 1, none, true));
        assert!(barrier_required(0, 1, DependencyPattern::Wavefront, true));
        assert!(!barrier_required(0, 1, DependencyPattern::Wavefront, false));
        assert!(!barrier_required(u64::MAX, 100, none, true));
    }

    #[test]
    fn test_gpgpu_stream() {
        let mut seq = sequencer(SequencerConfig::default());
        let (csr, _) = seq.backend_mut().resources_mut().create("csr", 0x4000);
        let params = TaskParams {
            mode: DispatchMode::Gpgpu,
            sync_bitmap: 0b1,
            csr_resource: Some(csr),
            sip_kernel_offset: 0x800,
            ..Default::default()
        };
        seq.submit_task(0, &kernels(2), &params).unwrap();
        let csr_address = seq.backend().resources().get(csr).unwrap().gpu_address();
        let stream = submitted_stream(&mut seq);
        let k = kinds(&stream);

        let select = PipelineSelect::from_dwords(&stream[2].1).unwrap();
        assert_eq!(select.pipeline_selection(), PipelineSelect::PIPELINE_SELECTION_GPGPU);
        assert_eq!(
            &k[4..8],
            &[K::PipeControl, K::StateSip, K::GpgpuCsrBaseAddress, K::MediaVfeState]
        );
        let sip = StateSip::from_dwords(&stream[5].1).unwrap();
        assert_eq!(sip.system_instruction_pointer(), 0x80);
        let base = GpgpuCsrBaseAddress::from_dwords(&stream[6].1).unwrap();
        assert_eq!(base.gpgpu_csr_base_address() << 12, csr_address);

        let walkers: Vec<usize> = k
            .iter()
            .enumerate()
            .filter(|(_, k)| **k == K::GpgpuWalker)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(walkers.len(), 2);
        for i in &walkers {
            assert_eq!(k[i + 1], K::MediaStateFlush);
        }
        assert_eq!(k[walkers[1] - 1], K::PipeControl);
        let walker = GpgpuWalker::from_dwords(&stream[walkers[1]].1).unwrap();
        assert_eq!(walker.interface_descriptor_offset(), 1);
    }

    #[test]
    fn test_l3_register_write() {
        for (platform, plane) in [(Platform::Skl, 0usize), (Platform::Bdw, 3), (Platform::Kbl, 7)] {
            let mut seq = sequencer(SequencerConfig {
                platform,
                l3_plane: plane,
                ..Default::default()
            });
            seq.submit_task(0, &kernels(1), &TaskParams::default()).unwrap();
            let stream = submitted_stream(&mut seq);
            let expected = l3_preset(platform.generation(), plane).unwrap().l3_control();
            assert_eq!(register_writes(&stream), vec![(L3_CNTL_REG, expected)]);
        }
    }

    #[test]
    fn test_invalid_l3_plane_rejected() {
        let mut backend = SoftwareBackend::new(4096);
        let tracker = Arc::new(SyncTracker::new(backend.resources_mut(), Platform::Skl, 4, false));
        let config = SequencerConfig {
            l3_plane: 8,
            ..Default::default()
        };
        assert!(matches!(
            CommandSequencer::new(config, backend, heap(), tracker),
            Err(Error::InvalidL3Plane { plane: 8, .. })
        ));
    }

    #[test]
    fn test_preemption_and_debug_registers() {
        let mut seq = sequencer(SequencerConfig {
            features: DeviceFeatures::PER_CTXT_PREEMPTION_GRANULARITY_CONTROL
                | DeviceFeatures::MEDIA_THREAD_GROUP_PREEMPT,
            ..Default::default()
        });
        let params = TaskParams {
            sip_debug: true,
            ..Default::default()
        };
        seq.submit_task(0, &kernels(1), &params).unwrap();
        let stream = submitted_stream(&mut seq);
        let writes = register_writes(&stream);
        assert_eq!(writes.len(), 4);
        assert_eq!(writes[0], (CS_DEBUG_MODE1, cs_debug_mode1_value()));
        assert_eq!(writes[1], (TD_CTL, td_ctl_value()));
        assert_eq!(writes[2].0, L3_CNTL_REG);
        assert_eq!(writes[3], (PREEMPTION_CONTROL, THREAD_GROUP_PREEMPT_VALUE));

        // GPGPU flags are unset, so the GPGPU pipe falls back to mid-batch.
        let gpgpu = TaskParams {
            mode: DispatchMode::Gpgpu,
            ..Default::default()
        };
        seq.submit_task(1, &kernels(1), &gpgpu).unwrap();
        let stream = submitted_stream(&mut seq);
        assert_eq!(
            register_writes(&stream).last(),
            Some(&(PREEMPTION_CONTROL, MID_BATCH_PREEMPT_VALUE))
        );
    }

    #[test]
    fn test_dummy_vfe_workaround() {
        let mut seq = sequencer(SequencerConfig {
            features: DeviceFeatures::SEND_DUMMY_VFE_AFTER_PIPELINE_SELECT,
            ..Default::default()
        });
        seq.submit_task(0, &kernels(1), &TaskParams::default()).unwrap();
        let stream = submitted_stream(&mut seq);
        let n = stream.len();
        assert_eq!(stream[n - 1].0, K::MiBatchBufferEnd);
        assert_eq!(stream[n - 2].0, K::MediaVfeState);
        let dummy = MediaVfeState::from_dwords(&stream[n - 2].1).unwrap();
        assert_eq!(dummy.number_of_urb_entries(), 1);
    }

    #[test]
    fn test_vfe_thread_clamp_and_curbe() {
        let mut seq = sequencer(SequencerConfig::default());
        let params = TaskParams {
            max_threads: Some(1000),
            curbe_size: 80,
            ..Default::default()
        };
        seq.submit_task(0, &kernels(1), &params).unwrap();
        let stream = submitted_stream(&mut seq);

        let vfe = stream.iter().find(|(k, _)| *k == K::MediaVfeState).unwrap();
        let vfe = MediaVfeState::from_dwords(&vfe.1).unwrap();
        assert_eq!(vfe.maximum_number_of_threads(), DEFAULT_HW_THREAD_LIMIT - 1);
        assert_eq!(vfe.curbe_allocation_size(), 3);
        assert_eq!(vfe.number_of_urb_entries(), DEFAULT_URB_ENTRIES);

        let curbe = stream.iter().find(|(k, _)| *k == K::MediaCurbeLoad).unwrap();
        let curbe = MediaCurbeLoad::from_dwords(&curbe.1).unwrap();
        assert_eq!(curbe.curbe_total_data_length(), 96);
        assert_eq!(curbe.curbe_data_start_address(), 128);

        let idl = stream
            .iter()
            .find(|(k, _)| *k == K::MediaInterfaceDescriptorLoad)
            .unwrap();
        let idl = MediaInterfaceDescriptorLoad::from_dwords(&idl.1).unwrap();
        assert_eq!(idl.interface_descriptor_total_length(), 128);
    }

    #[test]
    fn test_gen8_stream_uses_gen8_layouts() {
        let mut seq = sequencer(SequencerConfig {
            platform: Platform::Bdw,
            ..Default::default()
        });
        let receipt = seq.submit_task(0, &kernels(1), &TaskParams::default()).unwrap();
        let stream = submitted_stream(&mut seq);
        let sba = stream.iter().find(|(k, _)| *k == K::StateBaseAddress).unwrap();
        assert_eq!(sba.1.len(), StateBaseAddressG8::DW_SIZE);
        let select = PipelineSelect::from_dwords(&stream[2].1).unwrap();
        assert_eq!(select.mask_bits(), 0);
        let total: usize = stream.iter().map(|(_, dw)| dw.len() * 4).sum();
        assert_eq!(total, receipt.length);
    }

    #[test]
    fn test_batch_mode() {
        let mut seq = sequencer(SequencerConfig::default());
        let (batch, res) = seq.backend_mut().resources_mut().create("batch", 256);
        let params = TaskParams {
            mode: DispatchMode::Batch(batch),
            ..Default::default()
        };
        seq.begin_submission(0, &kernels(2), &params).unwrap();
        assert!(seq
            .backend()
            .pending_residency()
            .any(|(h, w)| *h == batch && !*w));
        seq.end_submission().unwrap();

        let stream = submitted_stream(&mut seq);
        let k = kinds(&stream);
        assert!(!k.contains(&K::MediaObjectWalker));
        let start = stream.iter().find(|(k, _)| *k == K::MiBatchBufferStart).unwrap();
        let start = MiBatchBufferStart::from_dwords(&start.1).unwrap();
        assert_eq!(start.batch_buffer_start_address() << 2, res.gpu_address());
        assert_eq!(
            start.address_space_indicator(),
            MiBatchBufferStart::ADDRESS_SPACE_INDICATOR_PPGTT
        );
    }

    #[test]
    fn test_conditional_end() {
        let mut seq = sequencer(SequencerConfig::default());
        let (flag, res) = seq.backend_mut().resources_mut().create("cond", 8);
        let mut params = TaskParams::default();
        params.conditional_ends.insert(
            1,
            ConditionalEnd {
                resource: flag,
                compare_value: 5,
            },
        );
        assert_eq!(params.conditional_end_bitmap(), 0b10);

        let receipt = seq.submit_task(0, &kernels(2), &params).unwrap();
        let complete = seq.tracker().complete_marker_address(0).unwrap();
        let stream = submitted_stream(&mut seq);
        let k = kinds(&stream);
        let at = k
            .iter()
            .position(|k| *k == K::MiConditionalBatchBufferEnd)
            .unwrap();
        assert_eq!(
            &k[at - 12..at + 2],
            &[
                K::PipeControl,
                K::MiLoadRegisterReg,
                K::MiLoadRegisterReg,
                K::MiLoadRegisterMem,
                K::MiLoadRegisterImm,
                K::MiLoadRegisterImm,
                K::MiLoadRegisterImm,
                K::MiLoadRegisterImm,
                K::MiLoadRegisterImm,
                K::MiMath,
                K::MiStoreRegisterMem,
                K::MiStoreRegisterMem,
                K::MiConditionalBatchBufferEnd,
                K::MediaObjectWalker
            ]
        );
        let tag = PipeControl::from_dwords(&stream[at - 12].1).unwrap();
        assert_eq!(tag.immediate_data(), receipt.sync_tag as u64);

        let ts = MiLoadRegisterReg::from_dwords(&stream[at - 11].1).unwrap();
        assert_eq!((ts.source(), ts.destination()), (CS_TIMESTAMP, cs_gpr(0)));
        let compared = MiLoadRegisterMem::from_dwords(&stream[at - 9].1).unwrap();
        assert_eq!(compared.register(), cs_gpr(1));
        assert_eq!(compared.memory_address() << 2, res.gpu_address());
        let user = MiLoadRegisterImm::from_dwords(&stream[at - 7].1).unwrap();
        assert_eq!((user.register(), user.data_dword()), (cs_gpr(2), 5));

        let math = &stream[at - 3].1;
        assert_eq!(math.len(), 17);
        assert_eq!(math[0], 0x0D00_000F);
        assert_eq!(math[1], 0x0800_8003);
        assert_eq!(math[8], 0x5800_1033);

        let lo = MiStoreRegisterMem::from_dwords(&stream[at - 2].1).unwrap();
        let hi = MiStoreRegisterMem::from_dwords(&stream[at - 1].1).unwrap();
        assert_eq!((lo.register(), lo.memory_address() << 2), (cs_gpr(7), complete));
        assert_eq!((hi.register(), hi.memory_address() << 2), (cs_gpr(7) + 4, complete + 4));

        let end = MiConditionalBatchBufferEnd::from_dwords(&stream[at].1).unwrap();
        assert_eq!(end.compare_data_dword(), 5);
        assert_eq!(end.compare_address() << 3, res.gpu_address());

        // Only the epilogue writes the completion timestamp unconditionally.
        let timestamps = pipe_controls(&stream)
            .iter()
            .filter(|pc| pc.post_sync_address() == complete)
            .count();
        assert_eq!(timestamps, 1);
    }

    #[test]
    fn test_conditional_end_ignored_in_gpgpu_mode() {
        let mut seq = sequencer(SequencerConfig::default());
        let (flag, _) = seq.backend_mut().resources_mut().create("cond", 8);
        let mut params = TaskParams {
            mode: DispatchMode::Gpgpu,
            ..Default::default()
        };
        params.conditional_ends.insert(
            0,
            ConditionalEnd {
                resource: flag,
                compare_value: 5,
            },
        );

        seq.submit_task(0, &kernels(2), &params).unwrap();
        let k = kinds(&submitted_stream(&mut seq));
        assert!(!k.contains(&K::MiConditionalBatchBufferEnd));
        assert!(!k.contains(&K::MiMath));
        assert_eq!(k.iter().filter(|k| **k == K::GpgpuWalker).count(), 2);
    }

    #[test]
    fn test_failed_submit_releases_buffer() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let mut backend = SoftwareBackend::new(64 * 1024).with_sink(tx);
        let tracker = Arc::new(SyncTracker::new(backend.resources_mut(), Platform::Skl, 16, false));
        let mut seq =
            CommandSequencer::new(SequencerConfig::default(), backend, heap(), tracker).unwrap();
        drop(rx);

        for task_id in 0..3 {
            assert!(matches!(
                seq.submit_task(task_id, &kernels(1), &TaskParams::default()),
                Err(Error::Backend(_))
            ));
            assert_eq!(seq.backend().pool().outstanding(), 0);
            assert!(!seq.tracker().is_allocated(task_id));
        }
        assert_eq!(seq.backend().submit_count(), 0);
        assert_eq!(seq.in_flight(), 0);
        assert_eq!(seq.backend().pool().available(), 64 * 1024);
    }

    #[test]
    fn test_null_hw_releases_immediately() {
        let mut seq = sequencer(SequencerConfig::default());
        let params = TaskParams {
            null_hw: true,
            ..Default::default()
        };
        let receipt = seq.submit_task(2, &kernels(1), &params).unwrap();
        assert!(receipt.null_hw);
        assert_eq!(seq.in_flight(), 0);
        assert!(!seq.tracker().is_allocated(2));
        assert_eq!(seq.backend().pool().outstanding(), 0);
        let submitted = seq.backend_mut().take_submitted();
        assert!(submitted[0].null_hw);
    }

    #[test]
    fn test_buffers_retire_on_sync_tag() {
        let mut seq = sequencer(SequencerConfig::default());
        let first = seq.submit_task(0, &kernels(1), &TaskParams::default()).unwrap();
        assert!(matches!(
            seq.submit_task(0, &kernels(1), &TaskParams::default()),
            Err(Error::SubmissionInFlight(0))
        ));
        assert_eq!(seq.backend().pool().outstanding(), 1);

        let status = seq
            .backend()
            .resources()
            .get(seq.tracker().status_resource())
            .unwrap()
            .clone();
        status.store(SYNC_TAG_OFFSET, first.sync_tag as u64).unwrap();
        // Tag alone may come from ahead of a conditional end.
        assert_eq!(seq.retire_completed(), 0);
        complete_task(&seq, 0);

        let second = seq.submit_task(0, &kernels(1), &TaskParams::default()).unwrap();
        assert!(second.sync_tag > first.sync_tag);
        assert_eq!(seq.in_flight(), 1);
        assert_eq!(seq.last_sync_tag(), first.sync_tag);
    }

    fn complete_task(seq: &Sequencer, task_id: u32) {
        let timestamps = seq
            .backend()
            .resources()
            .get(seq.tracker().timestamp_resource())
            .unwrap()
            .clone();
        let address = seq.tracker().complete_marker_address(task_id).unwrap();
        timestamps.store_at(address, 100).unwrap();
    }

    #[test]
    fn test_retire_across_sync_tag_wrap() {
        let mut seq = sequencer(SequencerConfig::default());
        seq.submit_task(3, &kernels(1), &TaskParams::default()).unwrap();
        seq.in_flight[0].sync_tag = u32::MAX;
        complete_task(&seq, 3);

        let status = seq
            .backend()
            .resources()
            .get(seq.tracker().status_resource())
            .unwrap()
            .clone();
        status.store(SYNC_TAG_OFFSET, u32::MAX as u64 - 1).unwrap();
        assert_eq!(seq.retire_completed(), 0);

        status.store(SYNC_TAG_OFFSET, 1).unwrap();
        assert_eq!(seq.retire_completed(), 1);
        assert_eq!(seq.backend().pool().outstanding(), 0);
        assert!(!seq.tracker().is_allocated(3));
    }

    #[test]
    fn test_end_without_begin() {
        let mut seq = sequencer(SequencerConfig::default());
        assert!(matches!(seq.end_submission(), Err(Error::NoSubmissionInFlight)));
        assert!(matches!(seq.abort_submission(), Err(Error::NoSubmissionInFlight)));
    }

    #[test]
    fn test_second_begin_rejected_while_pending() {
        let mut seq = sequencer(SequencerConfig::default());
        seq.begin_submission(0, &kernels(1), &TaskParams::default()).unwrap();
        assert!(matches!(
            seq.begin_submission(1, &kernels(1), &TaskParams::default()),
            Err(Error::SubmissionInFlight(0))
        ));
        seq.abort_submission().unwrap();
        assert!(!seq.tracker().is_allocated(0));
        assert_eq!(seq.backend().submit_count(), 0);
        assert_eq!(seq.backend().pool().outstanding(), 0);
    }

    /// Backend that hands out fixed-size buffers and fails the n-th
    /// resource registration.
    struct FailingBackend {
        capacity: usize,
        fail_registration: Option<usize>,
        registrations: usize,
        discarded: Vec<CursorSnapshot>,
        submits: usize,
    }

    impl FailingBackend {
        fn new(capacity: usize, fail_registration: Option<usize>) -> Self {
            Self {
                capacity,
                fail_registration,
                registrations: 0,
                discarded: Vec::new(),
                submits: 0,
            }
        }
    }

    impl SubmissionBackend for FailingBackend {
        fn acquire_command_buffer(&mut self, _min_bytes: usize) -> Result<CommandBuffer> {
            Ok(CommandBuffer::new(1, 0x1000, self.capacity))
        }

        fn return_unused_capacity(&mut self, buf: &mut CommandBuffer) {
            buf.trim_to_used();
        }

        fn discard_command_buffer(&mut self, buf: CommandBuffer) {
            self.discarded.push(buf.snapshot());
        }

        fn submit(&mut self, buf: CommandBuffer, _null_hw: bool) -> Result<BufferHandle> {
            self.submits += 1;
            Ok(BufferHandle(buf.id()))
        }

        fn release_command_buffer(&mut self, _handle: BufferHandle) {}

        fn register_resource(&mut self, resource: ResourceHandle, _for_write: bool) -> Result<()> {
            let n = self.registrations;
            self.registrations += 1;
            if self.fail_registration == Some(n) {
                return Err(Error::UnknownResource(resource.0));
            }
            Ok(())
        }

        fn resource_address(&self, resource: ResourceHandle) -> Result<u64> {
            Ok(0x4000_0000 + resource.0 as u64 * 0x1000)
        }
    }

    fn failing(backend: FailingBackend) -> CommandSequencer<FailingBackend, LinearStateHeap> {
        let mut table = ResourceTable::new();
        let tracker = Arc::new(SyncTracker::new(&mut table, Platform::Skl, 4, false));
        let mut heap = heap();
        heap.bind_surface(ResourceHandle(90), false);
        CommandSequencer::new(SequencerConfig::default(), backend, heap, tracker).unwrap()
    }

    fn failing_params() -> TaskParams {
        TaskParams {
            buffer_table: vec![ResourceHandle(91)],
            ..Default::default()
        }
    }

    #[test]
    fn test_rollback_on_overflow() {
        let mut seq = failing(FailingBackend::new(64, None));
        let result = seq.begin_submission(1, &kernels(2), &failing_params());
        assert!(matches!(result, Err(Error::CommandBufferOverflow { .. })));

        let backend = seq.backend();
        assert_eq!(backend.submits, 0);
        assert_eq!(
            backend.discarded,
            vec![CursorSnapshot {
                offset: 0,
                remaining: 64
            }]
        );
        assert!(!seq.tracker().is_allocated(1));
        assert!(matches!(seq.end_submission(), Err(Error::NoSubmissionInFlight)));
    }

    #[test]
    fn test_rollback_at_every_registration() {
        // Timestamps, status, the bound surface and the stateless buffer.
        for fail_at in 0..4 {
            let mut seq = failing(FailingBackend::new(4096, Some(fail_at)));
            let result = seq.begin_submission(1, &kernels(2), &failing_params());
            assert!(
                matches!(result, Err(Error::UnknownResource(_))),
                "registration {} did not fail",
                fail_at
            );
            let backend = seq.backend();
            assert_eq!(backend.submits, 0);
            assert_eq!(
                backend.discarded,
                vec![CursorSnapshot {
                    offset: 0,
                    remaining: 4096
                }]
            );
            assert!(!seq.tracker().is_allocated(1));
        }

        let mut seq = failing(FailingBackend::new(4096, Some(4)));
        seq.submit_task(1, &kernels(2), &failing_params()).unwrap();
        assert_eq!(seq.backend().submits, 1);
        assert!(seq.backend().discarded.is_empty());
    }

    #[test]
    fn test_rollback_on_heap_exhaustion() {
        let mut seq = failing(FailingBackend::new(4096, None));
        let params = TaskParams {
            curbe_size: 4096,
            ..failing_params()
        };
        assert!(matches!(
            seq.begin_submission(0, &kernels(1), &params),
            Err(Error::Backend(_))
        ));
        assert_eq!(seq.backend().submits, 0);
        assert_eq!(seq.backend().discarded.len(), 1);
        assert_eq!(seq.backend().discarded[0].offset, 0);
    }
}
