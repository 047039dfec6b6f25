//! MI and pipe-control commands.
//!
//! Layouts shared by gen8 and gen9 command streamers.

use bitflags::bitflags;

hw_command! {
    /// Pipeline barrier with an optional post-sync write.
    pub struct PipeControl("PIPE_CONTROL", 6) {
        dword_length: 0[0..=7] = 4;
        command_subopcode: 0[16..=23] = 0;
        command_opcode: 0[24..=26] = 2;
        command_subtype: 0[27..=28] = 3;
        command_type: 0[29..=31] = 3;

        depth_cache_flush_enable: 1[0..=0];
        stall_at_pixel_scoreboard: 1[1..=1];
        state_cache_invalidation_enable: 1[2..=2];
        constant_cache_invalidation_enable: 1[3..=3];
        vf_cache_invalidation_enable: 1[4..=4];
        dc_flush_enable: 1[5..=5];
        pipe_control_flush_enable: 1[7..=7];
        notify_enable: 1[8..=8];
        indirect_state_pointers_disable: 1[9..=9];
        texture_cache_invalidation_enable: 1[10..=10];
        instruction_cache_invalidate_enable: 1[11..=11];
        render_target_cache_flush_enable: 1[12..=12];
        depth_stall_enable: 1[13..=13];
        post_sync_operation: 1[14..=15];
        generic_media_state_clear: 1[16..=16];
        psd_sync_enable: 1[17..=17];
        tlb_invalidate: 1[18..=18];
        global_snapshot_count_reset: 1[19..=19];
        command_streamer_stall_enable: 1[20..=20];
        store_data_index: 1[21..=21];
        lri_post_sync_operation: 1[23..=23];
        destination_address_type: 1[24..=24];
        flush_llc: 1[26..=26];
        tile_cache_flush_enable: 1[28..=28];
    }
    wide {
        /// Post-sync destination, in dwords (byte address >> 2).
        address: 2[2..=63];
        immediate_data: 4[0..=63];
    }
}

impl PipeControl {
    pub const POST_SYNC_OPERATION_NO_WRITE: u32 = 0;
    pub const POST_SYNC_OPERATION_WRITE_IMMEDIATE_DATA: u32 = 1;
    pub const POST_SYNC_OPERATION_WRITE_PS_DEPTH_COUNT: u32 = 2;
    pub const POST_SYNC_OPERATION_WRITE_TIMESTAMP: u32 = 3;

    pub const DESTINATION_ADDRESS_TYPE_PPGTT: u32 = 0;
    pub const DESTINATION_ADDRESS_TYPE_GGTT: u32 = 1;

    /// OR the given flush/invalidate bits into DW1.
    pub fn set_flags(&mut self, flags: PipeControlFlags) -> &mut Self {
        self.dw[1] |= flags.bits();
        self
    }

    pub fn flags(&self) -> PipeControlFlags {
        PipeControlFlags::from_bits_truncate(self.dw[1])
    }

    /// Byte address of the post-sync write.
    pub fn set_post_sync_address(&mut self, gpu_address: u64) -> &mut Self {
        self.set_address(gpu_address >> 2)
    }

    pub fn post_sync_address(&self) -> u64 {
        self.address() << 2
    }
}

bitflags! {
    /// Cache and stall controls of PIPE_CONTROL DW1, at their hardware bit
    /// positions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipeControlFlags: u32 {
        const DEPTH_CACHE_FLUSH = 1 << 0;
        const STALL_AT_PIXEL_SCOREBOARD = 1 << 1;
        const STATE_CACHE_INVALIDATE = 1 << 2;
        const CONSTANT_CACHE_INVALIDATE = 1 << 3;
        const VF_CACHE_INVALIDATE = 1 << 4;
        const DC_FLUSH = 1 << 5;
        const PIPE_CONTROL_FLUSH = 1 << 7;
        const NOTIFY = 1 << 8;
        const INDIRECT_STATE_POINTERS_DISABLE = 1 << 9;
        const TEXTURE_CACHE_INVALIDATE = 1 << 10;
        const INSTRUCTION_CACHE_INVALIDATE = 1 << 11;
        const RENDER_TARGET_CACHE_FLUSH = 1 << 12;
        const DEPTH_STALL = 1 << 13;
        const GENERIC_MEDIA_STATE_CLEAR = 1 << 16;
        const TLB_INVALIDATE = 1 << 18;
        const CS_STALL = 1 << 20;
    }
}

impl PipeControlFlags {
    /// Flush used after kernel execution so results reach memory.
    pub const WRITE_CACHE: Self = Self::from_bits_truncate(
        Self::RENDER_TARGET_CACHE_FLUSH.bits() | Self::DC_FLUSH.bits() | Self::CS_STALL.bits(),
    );

    /// Invalidation used before a consumer reads data.
    pub const READ_CACHE: Self = Self::from_bits_truncate(
        Self::STATE_CACHE_INVALIDATE.bits()
            | Self::CONSTANT_CACHE_INVALIDATE.bits()
            | Self::VF_CACHE_INVALIDATE.bits()
            | Self::INSTRUCTION_CACHE_INVALIDATE.bits()
            | Self::TEXTURE_CACHE_INVALIDATE.bits()
            | Self::CS_STALL.bits(),
    );

    /// Barrier between two dependent kernels.
    pub const KERNEL_BARRIER: Self = Self::from_bits_truncate(
        Self::TEXTURE_CACHE_INVALIDATE.bits() | Self::RENDER_TARGET_CACHE_FLUSH.bits(),
    );
}

hw_command! {
    pub struct MiNoop("MI_NOOP", 1) {
        identification_number: 0[0..=21];
        identification_number_register_write_enable: 0[22..=22];
        mi_command_opcode: 0[23..=28] = 0;
        command_type: 0[29..=31] = 0;
    }
}

hw_command! {
    pub struct MiBatchBufferEnd("MI_BATCH_BUFFER_END", 1) {
        end_context: 0[0..=0];
        mi_command_opcode: 0[23..=28] = 10;
        command_type: 0[29..=31] = 0;
    }
}

hw_command! {
    pub struct MiBatchBufferStart("MI_BATCH_BUFFER_START", 3) {
        dword_length: 0[0..=7] = 1;
        address_space_indicator: 0[8..=8];
        resource_streamer_enable: 0[10..=10];
        predication_enable: 0[15..=15];
        add_offset_enable: 0[16..=16];
        second_level_batch_buffer: 0[22..=22];
        mi_command_opcode: 0[23..=28] = 49;
        command_type: 0[29..=31] = 0;
    }
    wide {
        /// Batch buffer address in dwords.
        batch_buffer_start_address: 1[2..=63];
    }
}

impl MiBatchBufferStart {
    pub const ADDRESS_SPACE_INDICATOR_GGTT: u32 = 0;
    pub const ADDRESS_SPACE_INDICATOR_PPGTT: u32 = 1;
}

hw_command! {
    pub struct MiLoadRegisterImm("MI_LOAD_REGISTER_IMM", 3) {
        dword_length: 0[0..=7] = 1;
        byte_write_disables: 0[8..=11];
        add_cs_mmio_start_offset: 0[19..=19];
        mi_command_opcode: 0[23..=28] = 34;
        command_type: 0[29..=31] = 0;
        /// MMIO offset in dwords.
        register_offset: 1[2..=22];
        data_dword: 2[0..=31];
    }
}

impl MiLoadRegisterImm {
    /// Register write of `data` to the MMIO byte offset `register`.
    pub fn write(register: u32, data: u32) -> Self {
        let mut cmd = Self::new();
        cmd.set_register_offset(register >> 2).set_data_dword(data);
        cmd
    }

    pub fn register(&self) -> u32 {
        self.register_offset() << 2
    }
}

hw_command! {
    /// Ends the batch early when the value at `compare_address` is not
    /// greater than `compare_data_dword`.
    pub struct MiConditionalBatchBufferEnd("MI_CONDITIONAL_BATCH_BUFFER_END", 4) {
        dword_length: 0[0..=7] = 2;
        compare_mask_mode: 0[19..=19];
        compare_semaphore: 0[21..=21];
        use_global_gtt: 0[22..=22];
        mi_command_opcode: 0[23..=28] = 54;
        command_type: 0[29..=31] = 0;
        compare_data_dword: 1[0..=31];
    }
    wide {
        /// Compare address in qwords.
        compare_address: 2[3..=63];
    }
}

hw_command! {
    /// Qword form of the store: DW3 and DW4 are written together.
    pub struct MiStoreDataImm("MI_STORE_DATA_IMM", 5) {
        dword_length: 0[0..=9] = 3;
        store_qword: 0[21..=21];
        use_global_gtt: 0[22..=22];
        mi_command_opcode: 0[23..=28] = 32;
        command_type: 0[29..=31] = 0;
        core_mode_enable: 1[0..=0];
        data_dword0: 3[0..=31];
        data_dword1: 4[0..=31];
    }
    wide {
        /// Destination in dwords.
        address: 1[2..=63];
    }
}

impl MiStoreDataImm {
    /// Store of `value` as a qword at `gpu_address`.
    pub fn qword(gpu_address: u64, value: u64) -> Self {
        let mut cmd = Self::new();
        cmd.set_store_qword(1)
            .set_address(gpu_address >> 2)
            .set_data_dword0(value as u32)
            .set_data_dword1((value >> 32) as u32);
        cmd
    }

    pub fn data(&self) -> u64 {
        (self.data_dword0() as u64) | ((self.data_dword1() as u64) << 32)
    }
}

hw_command! {
    pub struct MiLoadRegisterReg("MI_LOAD_REGISTER_REG", 3) {
        dword_length: 0[0..=7] = 1;
        mi_command_opcode: 0[23..=28] = 42;
        command_type: 0[29..=31] = 0;
        source_register_offset: 1[2..=22];
        destination_register_offset: 2[2..=22];
    }
}

impl MiLoadRegisterReg {
    /// Copy of the MMIO register at byte offset `source` into `destination`.
    pub fn copy(source: u32, destination: u32) -> Self {
        let mut cmd = Self::new();
        cmd.set_source_register_offset(source >> 2)
            .set_destination_register_offset(destination >> 2);
        cmd
    }

    pub fn source(&self) -> u32 {
        self.source_register_offset() << 2
    }

    pub fn destination(&self) -> u32 {
        self.destination_register_offset() << 2
    }
}

hw_command! {
    pub struct MiLoadRegisterMem("MI_LOAD_REGISTER_MEM", 4) {
        dword_length: 0[0..=7] = 2;
        async_mode_enable: 0[21..=21];
        use_global_gtt: 0[22..=22];
        mi_command_opcode: 0[23..=28] = 41;
        command_type: 0[29..=31] = 0;
        register_offset: 1[2..=22];
    }
    wide {
        /// Source in dwords.
        memory_address: 2[2..=63];
    }
}

impl MiLoadRegisterMem {
    /// Load of the dword at `gpu_address` into the register at `register`.
    pub fn load(register: u32, gpu_address: u64) -> Self {
        let mut cmd = Self::new();
        cmd.set_register_offset(register >> 2)
            .set_memory_address(gpu_address >> 2);
        cmd
    }

    pub fn register(&self) -> u32 {
        self.register_offset() << 2
    }
}

hw_command! {
    pub struct MiStoreRegisterMem("MI_STORE_REGISTER_MEM", 4) {
        dword_length: 0[0..=7] = 2;
        use_global_gtt: 0[22..=22];
        mi_command_opcode: 0[23..=28] = 36;
        command_type: 0[29..=31] = 0;
        register_offset: 1[2..=22];
    }
    wide {
        /// Destination in dwords.
        memory_address: 2[2..=63];
    }
}

impl MiStoreRegisterMem {
    /// Store of the register at `register` to the dword at `gpu_address`.
    pub fn store(register: u32, gpu_address: u64) -> Self {
        let mut cmd = Self::new();
        cmd.set_register_offset(register >> 2)
            .set_memory_address(gpu_address >> 2);
        cmd
    }

    pub fn register(&self) -> u32 {
        self.register_offset() << 2
    }
}

hw_command! {
    /// Header of an ALU program. `dword_length + 1` [`MiAluInstruction`]
    /// words follow it in the stream.
    pub struct MiMath("MI_MATH", 1) {
        dword_length: 0[0..=7] = 0;
        mi_command_opcode: 0[23..=28] = 26;
        command_type: 0[29..=31] = 0;
    }
}

impl MiMath {
    /// Header for a program of `instructions` ALU words.
    pub fn with_instructions(instructions: usize) -> Self {
        let mut cmd = Self::new();
        cmd.set_dword_length(instructions.saturating_sub(1) as u32);
        cmd
    }

    /// Dwords taken by a MI_MATH whose header is `dw0`.
    pub fn stream_dwords(dw0: u32) -> usize {
        (dw0 & 0xFF) as usize + 2
    }
}

hw_command! {
    /// One ALU instruction of a MI_MATH payload.
    pub struct MiAluInstruction("MI_ALU_INSTRUCTION", 1) {
        operand2: 0[0..=9];
        operand1: 0[10..=19];
        alu_opcode: 0[20..=31];
    }
}

impl MiAluInstruction {
    pub const OPCODE_NOOP: u32 = 0x000;
    pub const OPCODE_LOAD: u32 = 0x080;
    pub const OPCODE_LOADINV: u32 = 0x480;
    pub const OPCODE_LOAD0: u32 = 0x081;
    pub const OPCODE_LOAD1: u32 = 0x481;
    pub const OPCODE_ADD: u32 = 0x100;
    pub const OPCODE_SUB: u32 = 0x101;
    pub const OPCODE_AND: u32 = 0x102;
    pub const OPCODE_OR: u32 = 0x103;
    pub const OPCODE_XOR: u32 = 0x104;
    pub const OPCODE_STORE: u32 = 0x180;
    pub const OPCODE_STOREINV: u32 = 0x580;

    /// General purpose registers R0..R15 are operands 0..15.
    pub const OPERAND_SRCA: u32 = 0x20;
    pub const OPERAND_SRCB: u32 = 0x21;
    pub const OPERAND_ACCU: u32 = 0x31;
    pub const OPERAND_ZF: u32 = 0x32;
    pub const OPERAND_CF: u32 = 0x33;

    fn encode(opcode: u32, operand1: u32, operand2: u32) -> Self {
        let mut cmd = Self::new();
        cmd.set_alu_opcode(opcode)
            .set_operand1(operand1)
            .set_operand2(operand2);
        cmd
    }

    /// `dst` (SRCA or SRCB) = `src`.
    pub fn load(dst: u32, src: u32) -> Self {
        Self::encode(Self::OPCODE_LOAD, dst, src)
    }

    pub fn store(dst: u32, src: u32) -> Self {
        Self::encode(Self::OPCODE_STORE, dst, src)
    }

    /// `dst` = !`src`.
    pub fn store_inverted(dst: u32, src: u32) -> Self {
        Self::encode(Self::OPCODE_STOREINV, dst, src)
    }

    /// ADD, SUB, AND, OR or XOR of SRCA and SRCB into ACCU.
    pub fn op(opcode: u32) -> Self {
        Self::encode(opcode, 0, 0)
    }
}

hw_command! {
    pub struct MediaStateFlush("MEDIA_STATE_FLUSH", 2) {
        dword_length: 0[0..=15] = 0;
        subopcode: 0[16..=23] = 4;
        media_command_opcode: 0[24..=26] = 0;
        pipeline: 0[27..=28] = 2;
        command_type: 0[29..=31] = 3;
        interface_descriptor_offset: 1[0..=5];
        watermark_required: 1[6..=6];
        flush_to_go: 1[7..=7];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hwcmd::testing::{
        assert_all, assert_defaults, assert_field_isolation, assert_round_trip,
    };
    use crate::hwcmd::HwCommand;

    #[test]
    fn test_mi_generic_checks() {
        assert_all::<PipeControl>();
        assert_all::<MiNoop>();
        assert_all::<MiBatchBufferEnd>();
        assert_all::<MiBatchBufferStart>();
        assert_all::<MiLoadRegisterImm>();
        assert_all::<MiConditionalBatchBufferEnd>();
        assert_all::<MiStoreDataImm>();
        assert_all::<MediaStateFlush>();
        assert_all::<MiLoadRegisterReg>();
        assert_all::<MiLoadRegisterMem>();
        assert_all::<MiStoreRegisterMem>();
        assert_all::<MiAluInstruction>();
        // Length follows the ALU payload, not the header.
        assert_defaults::<MiMath>();
        assert_field_isolation::<MiMath>();
        assert_round_trip::<MiMath>();
    }

    #[test]
    fn test_header_words() {
        assert_eq!(PipeControl::new().value(0), 0x7A00_0004);
        assert_eq!(MiBatchBufferEnd::new().value(0), 0x0500_0000);
        assert_eq!(MiNoop::new().value(0), 0);
        assert_eq!(MiLoadRegisterImm::new().value(0), 0x1100_0001);
        assert_eq!(MiBatchBufferStart::new().value(0), 0x1880_0001);
        assert_eq!(MiConditionalBatchBufferEnd::new().value(0), 0x1B00_0002);
        assert_eq!(MiStoreDataImm::new().value(0), 0x1000_0003);
        assert_eq!(MediaStateFlush::new().value(0), 0x7004_0000);
        assert_eq!(MiLoadRegisterReg::new().value(0), 0x1500_0001);
        assert_eq!(MiLoadRegisterMem::new().value(0), 0x1480_0002);
        assert_eq!(MiStoreRegisterMem::new().value(0), 0x1200_0002);
        assert_eq!(MiMath::new().value(0), 0x0D00_0000);
    }

    #[test]
    fn test_pipe_control_timestamp_write() {
        let mut pc = PipeControl::new();
        pc.set_post_sync_operation(PipeControl::POST_SYNC_OPERATION_WRITE_TIMESTAMP)
            .set_post_sync_address(0x1_2345_6780)
            .set_flags(PipeControlFlags::WRITE_CACHE);

        assert_eq!(pc.post_sync_address(), 0x1_2345_6780);
        assert_eq!(pc.value(2), 0x2345_6780);
        assert_eq!(pc.value(3), 0x1);
        assert_eq!(pc.post_sync_operation(), 3);
        assert_eq!(pc.render_target_cache_flush_enable(), 1);
        assert_eq!(pc.dc_flush_enable(), 1);
        assert_eq!(pc.command_streamer_stall_enable(), 1);
        assert_eq!(pc.texture_cache_invalidation_enable(), 0);
        assert!(pc.flags().contains(PipeControlFlags::WRITE_CACHE));
    }

    #[test]
    fn test_flags_match_field_positions() {
        let mut pc = PipeControl::new();
        pc.set_flags(PipeControlFlags::KERNEL_BARRIER);
        let mut expected = PipeControl::new();
        expected
            .set_texture_cache_invalidation_enable(1)
            .set_render_target_cache_flush_enable(1);
        assert_eq!(pc, expected);

        let mut pc = PipeControl::new();
        pc.set_flags(PipeControlFlags::GENERIC_MEDIA_STATE_CLEAR | PipeControlFlags::CS_STALL);
        assert_eq!(pc.generic_media_state_clear(), 1);
        assert_eq!(pc.command_streamer_stall_enable(), 1);
        assert_eq!(pc.post_sync_operation(), 0);
    }

    #[test]
    fn test_load_register_imm() {
        let lri = MiLoadRegisterImm::write(0x7034, 0x6000_0121);
        assert_eq!(lri.register(), 0x7034);
        assert_eq!(lri.value(1), 0x7034);
        assert_eq!(lri.value(2), 0x6000_0121);
    }

    #[test]
    fn test_store_data_imm_qword() {
        let sdi = MiStoreDataImm::qword(0xFFFF_0008, 0x1_0000_0002);
        assert_eq!(sdi.store_qword(), 1);
        assert_eq!(sdi.address() << 2, 0xFFFF_0008);
        assert_eq!(sdi.data(), 0x1_0000_0002);
        assert_eq!(sdi.value(3), 2);
        assert_eq!(sdi.value(4), 1);
    }

    #[test]
    fn test_register_memory_moves() {
        let lrr = MiLoadRegisterReg::copy(0x2358, 0x2600);
        assert_eq!(lrr.source(), 0x2358);
        assert_eq!(lrr.destination(), 0x2600);
        assert_eq!(lrr.value(1), 0x2358);
        assert_eq!(lrr.value(2), 0x2600);

        let lrm = MiLoadRegisterMem::load(0x2608, 0x1_0000_0104);
        assert_eq!(lrm.register(), 0x2608);
        assert_eq!(lrm.value(2), 0x0000_0104);
        assert_eq!(lrm.value(3), 0x1);

        let srm = MiStoreRegisterMem::store(0x263C, 0xFFFF_0008);
        assert_eq!(srm.register(), 0x263C);
        assert_eq!(srm.memory_address() << 2, 0xFFFF_0008);
    }

    #[test]
    fn test_math_program_encoding() {
        let math = MiMath::with_instructions(16);
        assert_eq!(math.dword_length(), 15);
        assert_eq!(MiMath::stream_dwords(math.value(0)), 17);

        let load = MiAluInstruction::load(MiAluInstruction::OPERAND_SRCA, 3);
        assert_eq!(load.value(0), 0x0800_8003);
        let store = MiAluInstruction::store_inverted(4, MiAluInstruction::OPERAND_CF);
        assert_eq!(store.value(0), 0x5800_1033);
        assert_eq!(MiAluInstruction::op(MiAluInstruction::OPCODE_SUB).value(0), 0x1010_0000);
    }
}
