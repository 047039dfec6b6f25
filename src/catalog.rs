//! Command Catalog Module
//!
//! Per-generation table of the commands the sequencer can emit: their size
//! and, for command-streamer commands, the DW0 bits that identify them in a
//! stream. Tables are built once per process and never change afterwards.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::hwcmd::mi::{
    MediaStateFlush, MiBatchBufferEnd, MiBatchBufferStart, MiConditionalBatchBufferEnd,
    MiLoadRegisterImm, MiLoadRegisterMem, MiLoadRegisterReg, MiMath, MiNoop, MiStoreDataImm,
    MiStoreRegisterMem, PipeControl,
};
use crate::hwcmd::render::{
    GpgpuCsrBaseAddress, GpgpuWalker, MediaCurbeLoad, MediaInterfaceDescriptorLoad,
    MediaObjectWalker, MediaVfeState, PipelineSelect, StateBaseAddressG8, StateBaseAddressG9,
    StateSip,
};
use crate::hwcmd::{vebox_g8, vebox_g9, HwCommand};

/// Command-set generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Generation {
    Gen8,
    Gen9,
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generation::Gen8 => write!(f, "gen8"),
            Generation::Gen9 => write!(f, "gen9"),
        }
    }
}

/// Device family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Broadwell
    Bdw,
    /// Skylake
    Skl,
    /// Broxton
    Bxt,
    /// Kaby Lake
    Kbl,
    /// Gemini Lake
    Glk,
}

impl Platform {
    pub fn generation(self) -> Generation {
        match self {
            Platform::Bdw => Generation::Gen8,
            Platform::Skl | Platform::Bxt | Platform::Kbl | Platform::Glk => Generation::Gen9,
        }
    }

    /// Low-power parts run the timestamp counter at a different rate.
    pub fn is_low_power(self) -> bool {
        matches!(self, Platform::Bxt | Platform::Glk)
    }
}

/// Every command type known to some generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    PipeControl,
    MiNoop,
    MiBatchBufferEnd,
    MiBatchBufferStart,
    MiLoadRegisterImm,
    MiConditionalBatchBufferEnd,
    MiStoreDataImm,
    MiLoadRegisterReg,
    MiLoadRegisterMem,
    MiStoreRegisterMem,
    MiMath,
    MediaStateFlush,
    PipelineSelect,
    StateBaseAddress,
    MediaVfeState,
    MediaCurbeLoad,
    MediaInterfaceDescriptorLoad,
    MediaObjectWalker,
    GpgpuWalker,
    StateSip,
    GpgpuCsrBaseAddress,
    VeboxState,
    VeboxSurfaceState,
    VeboxTilingConvert,
    VebDiIecp,
    VeboxAceLaceState,
    VeboxAlphaAoiState,
    VeboxCapturePipeState,
    VeboxCcmState,
    VeboxCscState,
    VeboxDndiState,
    VeboxFrontEndCscState,
    VeboxProcampState,
    VeboxTccState,
    VeboxGamutState,
    VeboxStdSteState,
    VeboxIecpState,
    VeboxVertexTable,
}

/// DW0 bits identifying MI commands: type and opcode.
pub const MI_HEADER_MASK: u32 = 0xFF80_0000;
/// DW0 bits identifying render, media and VEBOX commands: type, pipeline,
/// opcode and sub-opcode.
pub const PIPE_HEADER_MASK: u32 = 0xFFFF_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub kind: CommandKind,
    pub name: &'static str,
    pub dw_size: usize,
    /// DW0 identity of stream commands. State blocks live in memory, not in
    /// the stream, and carry none.
    pub header: Option<(u32, u32)>,
}

impl CatalogEntry {
    fn command<T: HwCommand>(kind: CommandKind, mask: u32) -> Self {
        Self {
            kind,
            name: T::NAME,
            dw_size: T::DW_SIZE,
            header: Some((mask, T::default().value(0) & mask)),
        }
    }

    fn state<T: HwCommand>(kind: CommandKind) -> Self {
        Self {
            kind,
            name: T::NAME,
            dw_size: T::DW_SIZE,
            header: None,
        }
    }

    pub fn byte_size(&self) -> usize {
        self.dw_size * 4
    }

    /// Dwords the command occupies in a stream given its first dword.
    /// MI_MATH carries a variable number of ALU instructions after the
    /// header; everything else is fixed size.
    pub fn stream_dwords(&self, dw0: u32) -> usize {
        match self.kind {
            CommandKind::MiMath => MiMath::stream_dwords(dw0),
            _ => self.dw_size,
        }
    }

    pub fn matches(&self, dw0: u32) -> bool {
        match self.header {
            Some((mask, value)) => dw0 & mask == value,
            None => false,
        }
    }
}

pub struct CommandCatalog {
    generation: Generation,
    entries: HashMap<CommandKind, CatalogEntry>,
    /// Stream commands, most specific mask first.
    decode_order: Vec<CatalogEntry>,
}

static GEN8_CATALOG: Lazy<CommandCatalog> = Lazy::new(|| CommandCatalog::build(Generation::Gen8));
static GEN9_CATALOG: Lazy<CommandCatalog> = Lazy::new(|| CommandCatalog::build(Generation::Gen9));

impl CommandCatalog {
    pub fn for_generation(generation: Generation) -> &'static CommandCatalog {
        match generation {
            Generation::Gen8 => &GEN8_CATALOG,
            Generation::Gen9 => &GEN9_CATALOG,
        }
    }

    fn build(generation: Generation) -> Self {
        use CommandKind as K;

        let mut list = vec![
            CatalogEntry::command::<PipeControl>(K::PipeControl, PIPE_HEADER_MASK),
            CatalogEntry::command::<MiNoop>(K::MiNoop, MI_HEADER_MASK),
            CatalogEntry::command::<MiBatchBufferEnd>(K::MiBatchBufferEnd, MI_HEADER_MASK),
            CatalogEntry::command::<MiBatchBufferStart>(K::MiBatchBufferStart, MI_HEADER_MASK),
            CatalogEntry::command::<MiLoadRegisterImm>(K::MiLoadRegisterImm, MI_HEADER_MASK),
            CatalogEntry::command::<MiConditionalBatchBufferEnd>(
                K::MiConditionalBatchBufferEnd,
                MI_HEADER_MASK,
            ),
            CatalogEntry::command::<MiStoreDataImm>(K::MiStoreDataImm, MI_HEADER_MASK),
            CatalogEntry::command::<MiLoadRegisterReg>(K::MiLoadRegisterReg, MI_HEADER_MASK),
            CatalogEntry::command::<MiLoadRegisterMem>(K::MiLoadRegisterMem, MI_HEADER_MASK),
            CatalogEntry::command::<MiStoreRegisterMem>(K::MiStoreRegisterMem, MI_HEADER_MASK),
            CatalogEntry::command::<MiMath>(K::MiMath, MI_HEADER_MASK),
            CatalogEntry::command::<MediaStateFlush>(K::MediaStateFlush, PIPE_HEADER_MASK),
            CatalogEntry::command::<PipelineSelect>(K::PipelineSelect, PIPE_HEADER_MASK),
            CatalogEntry::command::<MediaVfeState>(K::MediaVfeState, PIPE_HEADER_MASK),
            CatalogEntry::command::<MediaCurbeLoad>(K::MediaCurbeLoad, PIPE_HEADER_MASK),
            CatalogEntry::command::<MediaInterfaceDescriptorLoad>(
                K::MediaInterfaceDescriptorLoad,
                PIPE_HEADER_MASK,
            ),
            CatalogEntry::command::<MediaObjectWalker>(K::MediaObjectWalker, PIPE_HEADER_MASK),
            CatalogEntry::command::<GpgpuWalker>(K::GpgpuWalker, PIPE_HEADER_MASK),
            CatalogEntry::command::<StateSip>(K::StateSip, PIPE_HEADER_MASK),
            CatalogEntry::command::<GpgpuCsrBaseAddress>(K::GpgpuCsrBaseAddress, PIPE_HEADER_MASK),
            CatalogEntry::state::<vebox_g9::AlphaAoiState>(K::VeboxAlphaAoiState),
            CatalogEntry::state::<vebox_g9::ProcampState>(K::VeboxProcampState),
        ];

        match generation {
            Generation::Gen8 => list.extend([
                CatalogEntry::command::<StateBaseAddressG8>(K::StateBaseAddress, PIPE_HEADER_MASK),
                CatalogEntry::command::<vebox_g8::VeboxState>(K::VeboxState, PIPE_HEADER_MASK),
                CatalogEntry::command::<vebox_g8::SurfaceState>(
                    K::VeboxSurfaceState,
                    PIPE_HEADER_MASK,
                ),
                CatalogEntry::state::<vebox_g8::CcmState>(K::VeboxCcmState),
                CatalogEntry::state::<vebox_g8::DndiState>(K::VeboxDndiState),
            ]),
            Generation::Gen9 => list.extend([
                CatalogEntry::command::<StateBaseAddressG9>(K::StateBaseAddress, PIPE_HEADER_MASK),
                CatalogEntry::command::<vebox_g9::VeboxState>(K::VeboxState, PIPE_HEADER_MASK),
                CatalogEntry::command::<vebox_g9::SurfaceState>(
                    K::VeboxSurfaceState,
                    PIPE_HEADER_MASK,
                ),
                CatalogEntry::command::<vebox_g9::TilingConvert>(
                    K::VeboxTilingConvert,
                    PIPE_HEADER_MASK,
                ),
                CatalogEntry::command::<vebox_g9::VebDiIecp>(K::VebDiIecp, PIPE_HEADER_MASK),
                CatalogEntry::state::<vebox_g9::AceLaceState>(K::VeboxAceLaceState),
                CatalogEntry::state::<vebox_g9::CapturePipeState>(K::VeboxCapturePipeState),
                CatalogEntry::state::<vebox_g9::CcmState>(K::VeboxCcmState),
                CatalogEntry::state::<vebox_g9::CscState>(K::VeboxCscState),
                CatalogEntry::state::<vebox_g9::DndiState>(K::VeboxDndiState),
                CatalogEntry::state::<vebox_g9::FrontEndCscState>(K::VeboxFrontEndCscState),
                CatalogEntry::state::<vebox_g9::TccState>(K::VeboxTccState),
                CatalogEntry::state::<vebox_g9::GamutState>(K::VeboxGamutState),
                CatalogEntry::state::<vebox_g9::StdSteState>(K::VeboxStdSteState),
                CatalogEntry::state::<vebox_g9::IecpState>(K::VeboxIecpState),
                CatalogEntry::state::<vebox_g9::VertexTable>(K::VeboxVertexTable),
            ]),
        }

        let mut decode_order: Vec<CatalogEntry> =
            list.iter().filter(|e| e.header.is_some()).copied().collect();
        decode_order.sort_by_key(|e| std::cmp::Reverse(e.header.map(|(m, _)| m.count_ones())));

        let entries = list.into_iter().map(|e| (e.kind, e)).collect();

        Self {
            generation,
            entries,
            decode_order,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn entry(&self, kind: CommandKind) -> Option<&CatalogEntry> {
        self.entries.get(&kind)
    }

    /// Size in dwords, `None` when the generation has no such command.
    pub fn dword_size(&self, kind: CommandKind) -> Option<usize> {
        self.entry(kind).map(|e| e.dw_size)
    }

    pub fn byte_size(&self, kind: CommandKind) -> Option<usize> {
        self.entry(kind).map(|e| e.byte_size())
    }

    /// Identify the command starting with `dw0`.
    pub fn decode(&self, dw0: u32) -> Option<&CatalogEntry> {
        self.decode_order.iter().find(|e| e.matches(dw0))
    }

    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }
}
