//! Command Streamer Module
//!
//! Software stand-in for the render engine command streamer. Decodes a
//! submitted stream with the command catalog and performs the memory writes
//! it asks for against the buffer's resident resources. Kernels are not
//! executed; walkers only advance the timestamp clock.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::backend::SubmittedBuffer;
use crate::catalog::{CommandCatalog, CommandKind, Generation};
use crate::error::{Error, Result};
use crate::hwcmd::mi::{
    MiAluInstruction, MiConditionalBatchBufferEnd, MiLoadRegisterImm, MiLoadRegisterMem,
    MiLoadRegisterReg, MiStoreDataImm, MiStoreRegisterMem, PipeControl,
};
use crate::hwcmd::render::{GpgpuWalker, MediaObjectWalker};
use crate::hwcmd::HwCommand;
use crate::platform::{cs_gpr, CS_GPR_COUNT, CS_TIMESTAMP};
use crate::resource::SharedResource;

/// Timestamp ticks charged for every command.
pub const DEFAULT_TICKS_PER_COMMAND: u64 = 4;

/// Outcome of running one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionSummary {
    pub commands: usize,
    pub bytes: usize,
    /// Stopped by MI_CONDITIONAL_BATCH_BUFFER_END.
    pub ended_early: bool,
    pub elapsed_ticks: u64,
}

/// Resource a submitted buffer may touch, with write permission.
pub type Residency = [(Arc<SharedResource>, bool)];

/// ALU source and flag registers used by MI_MATH.
#[derive(Debug, Clone, Copy, Default)]
struct AluState {
    srca: u64,
    srcb: u64,
    accu: u64,
    zf: bool,
    cf: bool,
}

pub struct CommandStreamer {
    catalog: &'static CommandCatalog,
    timestamp: u64,
    ticks_per_command: u64,
    registers: HashMap<u32, u32>,
    alu: AluState,
    /// Byte offset of the command being processed.
    cursor: usize,
    batch_ended: bool,
    ended_early: bool,
}

impl CommandStreamer {
    pub fn new(generation: Generation, ticks_per_command: u64) -> Self {
        Self {
            catalog: CommandCatalog::for_generation(generation),
            timestamp: 0,
            ticks_per_command,
            registers: HashMap::new(),
            alu: AluState::default(),
            cursor: 0,
            batch_ended: false,
            ended_early: false,
        }
    }

    /// Current value of the timestamp register.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Last value loaded into an MMIO register.
    pub fn register(&self, offset: u32) -> Option<u32> {
        self.registers.get(&offset).copied()
    }

    /// Value a register read returns: the live clock for the timestamp
    /// register, the last write otherwise, zero if never written.
    fn read_register(&self, offset: u32) -> u32 {
        match offset {
            CS_TIMESTAMP => self.timestamp as u32,
            o if o == CS_TIMESTAMP + 4 => (self.timestamp >> 32) as u32,
            o => self.registers.get(&o).copied().unwrap_or(0),
        }
    }

    fn write_register(&mut self, offset: u32, value: u32) {
        self.registers.insert(offset, value);
    }

    /// 64-bit general purpose register `n`.
    pub fn gpr(&self, n: u32) -> u64 {
        let lo = self.read_register(cs_gpr(n)) as u64;
        let hi = self.read_register(cs_gpr(n) + 4) as u64;
        lo | (hi << 32)
    }

    fn set_gpr(&mut self, n: u32, value: u64) {
        self.write_register(cs_gpr(n), value as u32);
        self.write_register(cs_gpr(n) + 4, (value >> 32) as u32);
    }

    /// Runs a submitted buffer to its end.
    pub fn execute(&mut self, submitted: &SubmittedBuffer) -> Result<ExecutionSummary> {
        if submitted.null_hw {
            debug!("Skipping null hardware buffer {}", submitted.handle.0);
            return Ok(ExecutionSummary::default());
        }
        self.run(&submitted.bytes, &submitted.residency)
    }

    /// Runs `stream` until MI_BATCH_BUFFER_END or a taken conditional end.
    pub fn run(&mut self, stream: &[u8], residency: &Residency) -> Result<ExecutionSummary> {
        let start_ticks = self.timestamp;
        self.cursor = 0;
        self.batch_ended = false;
        self.ended_early = false;

        let mut commands = 0;
        while self.cursor < stream.len() && !self.batch_ended {
            let consumed = self.process_command(&stream[self.cursor..], residency)?;
            self.cursor += consumed;
            commands += 1;
        }

        if !self.batch_ended {
            warn!("Command stream ran off its end without MI_BATCH_BUFFER_END");
        }

        Ok(ExecutionSummary {
            commands,
            bytes: self.cursor,
            ended_early: self.ended_early,
            elapsed_ticks: self.timestamp - start_ticks,
        })
    }

    /// Process a single command.
    /// Returns the number of bytes consumed.
    pub fn process_command(&mut self, data: &[u8], residency: &Residency) -> Result<usize> {
        if data.len() < 4 {
            return Err(self.decode_error("truncated command header"));
        }
        let dw0 = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);

        let Some(entry) = self.catalog.decode(dw0) else {
            warn!("Unknown command header 0x{:08X} at {:#x}", dw0, self.cursor);
            return Err(self.decode_error(&format!("unknown command header 0x{:08X}", dw0)));
        };
        let size = entry.stream_dwords(dw0) * 4;
        if size > data.len() {
            return Err(self.decode_error(&format!("{} truncated", entry.name)));
        }

        let words: Vec<u32> = data[..size]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        trace!("{} at {:#x}", entry.name, self.cursor);
        self.timestamp += self.ticks_per_command;

        match entry.kind {
            CommandKind::PipeControl => self.handle_pipe_control(&words, residency)?,
            CommandKind::MiStoreDataImm => self.handle_store_data_imm(&words, residency)?,
            CommandKind::MiLoadRegisterImm => self.handle_load_register_imm(&words)?,
            CommandKind::MiLoadRegisterReg => self.handle_load_register_reg(&words)?,
            CommandKind::MiLoadRegisterMem => self.handle_load_register_mem(&words, residency)?,
            CommandKind::MiStoreRegisterMem => {
                self.handle_store_register_mem(&words, residency)?
            }
            CommandKind::MiMath => self.handle_math(&words[1..])?,
            CommandKind::MiConditionalBatchBufferEnd => {
                self.handle_conditional_end(&words, residency)?
            }
            CommandKind::MiBatchBufferEnd => self.batch_ended = true,
            CommandKind::MediaObjectWalker => self.handle_media_walker(&words)?,
            CommandKind::GpgpuWalker => self.handle_gpgpu_walker(&words)?,
            CommandKind::MiBatchBufferStart => {
                debug!("Second-level batch at {:#x} not followed", self.cursor);
            }
            _ => {}
        }

        Ok(size)
    }

    fn decode_error(&self, reason: &str) -> Error {
        Error::Decode {
            offset: self.cursor,
            reason: reason.to_string(),
        }
    }

    fn parse<T: HwCommand>(&self, words: &[u32]) -> Result<T> {
        T::from_dwords(words).ok_or_else(|| self.decode_error(&format!("{} truncated", T::NAME)))
    }

    fn target<'a>(
        &self,
        residency: &'a Residency,
        address: u64,
        write: bool,
    ) -> Result<&'a SharedResource> {
        let Some((resource, writable)) = residency.iter().find(|(r, _)| r.contains(address, 8))
        else {
            return Err(self.decode_error(&format!("access to non-resident address {:#x}", address)));
        };
        if write && !*writable {
            warn!(
                "Write to {:#x} in '{}', which was registered read-only",
                address,
                resource.name()
            );
        }
        Ok(resource.as_ref())
    }

    fn handle_pipe_control(&mut self, words: &[u32], residency: &Residency) -> Result<()> {
        let cmd: PipeControl = self.parse(words)?;
        let address = cmd.post_sync_address();
        match cmd.post_sync_operation() {
            PipeControl::POST_SYNC_OPERATION_NO_WRITE => {}
            PipeControl::POST_SYNC_OPERATION_WRITE_TIMESTAMP => {
                self.target(residency, address, true)?
                    .store_at(address, self.timestamp)?;
            }
            PipeControl::POST_SYNC_OPERATION_WRITE_IMMEDIATE_DATA => {
                self.target(residency, address, true)?
                    .store_at(address, cmd.immediate_data())?;
            }
            op => warn!("PIPE_CONTROL post-sync operation {} not supported", op),
        }
        Ok(())
    }

    fn handle_store_data_imm(&mut self, words: &[u32], residency: &Residency) -> Result<()> {
        let cmd: MiStoreDataImm = self.parse(words)?;
        let address = cmd.address() << 2;
        if cmd.store_qword() == 1 {
            self.target(residency, address, true)?
                .store_at(address, cmd.data())
        } else {
            self.store_dword(residency, address, cmd.data_dword0())
        }
    }

    /// Dword store into one half of the containing qword.
    fn store_dword(&self, residency: &Residency, address: u64, value: u32) -> Result<()> {
        let base = address & !7;
        let resource = self.target(residency, base, true)?;
        let current = resource.load((base - resource.gpu_address()) as usize)?;
        let shift = (address & 4) * 8;
        let merged = (current & !(0xFFFF_FFFFu64 << shift)) | ((value as u64) << shift);
        resource.store_at(base, merged)
    }

    fn load_dword(&self, residency: &Residency, address: u64) -> Result<u32> {
        let base = address & !7;
        let resource = self.target(residency, base, false)?;
        let qword = resource.load((base - resource.gpu_address()) as usize)?;
        Ok((qword >> ((address & 4) * 8)) as u32)
    }

    fn handle_load_register_imm(&mut self, words: &[u32]) -> Result<()> {
        let cmd: MiLoadRegisterImm = self.parse(words)?;
        trace!("LRI {:#06x} = {:#010x}", cmd.register(), cmd.data_dword());
        self.write_register(cmd.register(), cmd.data_dword());
        Ok(())
    }

    fn handle_load_register_reg(&mut self, words: &[u32]) -> Result<()> {
        let cmd: MiLoadRegisterReg = self.parse(words)?;
        let value = self.read_register(cmd.source());
        trace!("LRR {:#06x} -> {:#06x} = {:#010x}", cmd.source(), cmd.destination(), value);
        self.write_register(cmd.destination(), value);
        Ok(())
    }

    fn handle_load_register_mem(&mut self, words: &[u32], residency: &Residency) -> Result<()> {
        let cmd: MiLoadRegisterMem = self.parse(words)?;
        let value = self.load_dword(residency, cmd.memory_address() << 2)?;
        trace!("LRM {:#06x} = {:#010x}", cmd.register(), value);
        self.write_register(cmd.register(), value);
        Ok(())
    }

    fn handle_store_register_mem(&mut self, words: &[u32], residency: &Residency) -> Result<()> {
        let cmd: MiStoreRegisterMem = self.parse(words)?;
        let value = self.read_register(cmd.register());
        self.store_dword(residency, cmd.memory_address() << 2, value)
    }

    fn handle_math(&mut self, program: &[u32]) -> Result<()> {
        for &word in program {
            let inst: MiAluInstruction = self.parse(&[word])?;
            self.execute_alu(&inst)?;
        }
        Ok(())
    }

    fn alu_operand(&self, operand: u32) -> Result<u64> {
        let flag = |set: bool| if set { u64::MAX } else { 0 };
        Ok(match operand {
            n if n < CS_GPR_COUNT => self.gpr(n),
            MiAluInstruction::OPERAND_SRCA => self.alu.srca,
            MiAluInstruction::OPERAND_SRCB => self.alu.srcb,
            MiAluInstruction::OPERAND_ACCU => self.alu.accu,
            MiAluInstruction::OPERAND_ZF => flag(self.alu.zf),
            MiAluInstruction::OPERAND_CF => flag(self.alu.cf),
            other => {
                return Err(self.decode_error(&format!("invalid ALU operand {:#x}", other)));
            }
        })
    }

    fn load_alu_source(&mut self, register: u32, value: u64) -> Result<()> {
        match register {
            MiAluInstruction::OPERAND_SRCA => self.alu.srca = value,
            MiAluInstruction::OPERAND_SRCB => self.alu.srcb = value,
            other => {
                return Err(self.decode_error(&format!("ALU load into {:#x}", other)));
            }
        }
        Ok(())
    }

    fn execute_alu(&mut self, inst: &MiAluInstruction) -> Result<()> {
        let (a, b) = (self.alu.srca, self.alu.srcb);
        match inst.alu_opcode() {
            MiAluInstruction::OPCODE_NOOP => {}
            MiAluInstruction::OPCODE_LOAD => {
                let value = self.alu_operand(inst.operand2())?;
                self.load_alu_source(inst.operand1(), value)?;
            }
            MiAluInstruction::OPCODE_LOADINV => {
                let value = self.alu_operand(inst.operand2())?;
                self.load_alu_source(inst.operand1(), !value)?;
            }
            MiAluInstruction::OPCODE_LOAD0 => self.load_alu_source(inst.operand1(), 0)?,
            MiAluInstruction::OPCODE_LOAD1 => self.load_alu_source(inst.operand1(), 1)?,
            MiAluInstruction::OPCODE_ADD => {
                let (sum, carry) = a.overflowing_add(b);
                self.set_accu(sum, carry);
            }
            MiAluInstruction::OPCODE_SUB => {
                let (diff, borrow) = a.overflowing_sub(b);
                self.set_accu(diff, borrow);
            }
            MiAluInstruction::OPCODE_AND => self.set_accu(a & b, false),
            MiAluInstruction::OPCODE_OR => self.set_accu(a | b, false),
            MiAluInstruction::OPCODE_XOR => self.set_accu(a ^ b, false),
            MiAluInstruction::OPCODE_STORE | MiAluInstruction::OPCODE_STOREINV => {
                let mut value = self.alu_operand(inst.operand2())?;
                if inst.alu_opcode() == MiAluInstruction::OPCODE_STOREINV {
                    value = !value;
                }
                let dst = inst.operand1();
                if dst >= CS_GPR_COUNT {
                    return Err(self.decode_error(&format!("ALU store into {:#x}", dst)));
                }
                self.set_gpr(dst, value);
            }
            op => warn!("ALU opcode {:#x} not supported", op),
        }
        Ok(())
    }

    fn set_accu(&mut self, value: u64, carry: bool) {
        self.alu.accu = value;
        self.alu.zf = value == 0;
        self.alu.cf = carry;
    }

    fn handle_conditional_end(&mut self, words: &[u32], residency: &Residency) -> Result<()> {
        let cmd: MiConditionalBatchBufferEnd = self.parse(words)?;
        let address = cmd.compare_address() << 3;
        let resource = self.target(residency, address, false)?;
        let value = resource.load((address - resource.gpu_address()) as usize)? as u32;
        if value <= cmd.compare_data_dword() {
            debug!(
                "Conditional end taken at {:#x}: {} <= {}",
                self.cursor,
                value,
                cmd.compare_data_dword()
            );
            self.batch_ended = true;
            self.ended_early = true;
        }
        Ok(())
    }

    fn handle_media_walker(&mut self, words: &[u32]) -> Result<()> {
        let cmd: MediaObjectWalker = self.parse(words)?;
        let threads = cmd.block_resolution_x() as u64 * cmd.block_resolution_y() as u64;
        self.timestamp += threads;
        Ok(())
    }

    fn handle_gpgpu_walker(&mut self, words: &[u32]) -> Result<()> {
        let cmd: GpgpuWalker = self.parse(words)?;
        let groups = cmd.thread_group_id_x_dimension() as u64
            * cmd.thread_group_id_y_dimension() as u64
            * cmd.thread_group_id_z_dimension() as u64;
        self.timestamp += groups * (cmd.thread_width_counter_maximum() as u64 + 1);
        Ok(())
    }
}
