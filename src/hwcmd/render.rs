//! Render engine commands used by the media and GPGPU pipes.

hw_command! {
    pub struct PipelineSelect("PIPELINE_SELECT", 1) {
        pipeline_selection: 0[0..=1];
        media_sampler_dop_clock_gate_enable: 0[4..=4];
        mask_bits: 0[8..=15];
        command_subopcode: 0[16..=23] = 4;
        command_opcode: 0[24..=26] = 1;
        command_subtype: 0[27..=28] = 1;
        command_type: 0[29..=31] = 3;
    }
}

impl PipelineSelect {
    pub const PIPELINE_SELECTION_3D: u32 = 0;
    pub const PIPELINE_SELECTION_MEDIA: u32 = 1;
    pub const PIPELINE_SELECTION_GPGPU: u32 = 2;

    /// Write-enable mask for the selection and DOP clock gate bits.
    pub const GEN9_MASK_BITS: u32 = 0x13;
}

hw_command! {
    /// Gen9 layout, including the bindless surface state heap.
    pub struct StateBaseAddressG9("STATE_BASE_ADDRESS", 19) {
        dword_length: 0[0..=7] = 17;
        command_subopcode: 0[16..=23] = 1;
        command_opcode: 0[24..=26] = 1;
        command_subtype: 0[27..=28] = 0;
        command_type: 0[29..=31] = 3;

        general_state_base_address_modify_enable: 1[0..=0];
        general_state_memory_object_control_state: 1[4..=10];
        stateless_data_port_access_memory_object_control_state: 3[16..=22];
        surface_state_base_address_modify_enable: 4[0..=0];
        surface_state_memory_object_control_state: 4[4..=10];
        dynamic_state_base_address_modify_enable: 6[0..=0];
        dynamic_state_memory_object_control_state: 6[4..=10];
        indirect_object_base_address_modify_enable: 8[0..=0];
        indirect_object_memory_object_control_state: 8[4..=10];
        instruction_base_address_modify_enable: 10[0..=0];
        instruction_memory_object_control_state: 10[4..=10];

        general_state_buffer_size_modify_enable: 12[0..=0];
        general_state_buffer_size: 12[12..=31];
        dynamic_state_buffer_size_modify_enable: 13[0..=0];
        dynamic_state_buffer_size: 13[12..=31];
        indirect_object_buffer_size_modify_enable: 14[0..=0];
        indirect_object_buffer_size: 14[12..=31];
        instruction_buffer_size_modify_enable: 15[0..=0];
        instruction_buffer_size: 15[12..=31];

        bindless_surface_state_base_address_modify_enable: 16[0..=0];
        bindless_surface_state_memory_object_control_state: 16[4..=10];
        bindless_surface_state_size: 18[12..=31];
    }
    wide {
        general_state_base_address: 1[12..=63];
        surface_state_base_address: 4[12..=63];
        dynamic_state_base_address: 6[12..=63];
        indirect_object_base_address: 8[12..=63];
        instruction_base_address: 10[12..=63];
        bindless_surface_state_base_address: 16[12..=63];
    }
}

hw_command! {
    pub struct StateBaseAddressG8("STATE_BASE_ADDRESS", 16) {
        dword_length: 0[0..=7] = 14;
        command_subopcode: 0[16..=23] = 1;
        command_opcode: 0[24..=26] = 1;
        command_subtype: 0[27..=28] = 0;
        command_type: 0[29..=31] = 3;

        general_state_base_address_modify_enable: 1[0..=0];
        general_state_memory_object_control_state: 1[4..=10];
        stateless_data_port_access_memory_object_control_state: 3[16..=22];
        surface_state_base_address_modify_enable: 4[0..=0];
        surface_state_memory_object_control_state: 4[4..=10];
        dynamic_state_base_address_modify_enable: 6[0..=0];
        dynamic_state_memory_object_control_state: 6[4..=10];
        indirect_object_base_address_modify_enable: 8[0..=0];
        indirect_object_memory_object_control_state: 8[4..=10];
        instruction_base_address_modify_enable: 10[0..=0];
        instruction_memory_object_control_state: 10[4..=10];

        general_state_buffer_size_modify_enable: 12[0..=0];
        general_state_buffer_size: 12[12..=31];
        dynamic_state_buffer_size_modify_enable: 13[0..=0];
        dynamic_state_buffer_size: 13[12..=31];
        indirect_object_buffer_size_modify_enable: 14[0..=0];
        indirect_object_buffer_size: 14[12..=31];
        instruction_buffer_size_modify_enable: 15[0..=0];
        instruction_buffer_size: 15[12..=31];
    }
    wide {
        general_state_base_address: 1[12..=63];
        surface_state_base_address: 4[12..=63];
        dynamic_state_base_address: 6[12..=63];
        indirect_object_base_address: 8[12..=63];
        instruction_base_address: 10[12..=63];
    }
}

/// Fills the fields both STATE_BASE_ADDRESS generations share.
macro_rules! fill_state_base_address {
    ($cmd:expr, $bases:expr) => {{
        let b = $bases;
        $cmd.set_general_state_base_address_modify_enable(1)
            .set_general_state_base_address(b.general_state >> 12)
            .set_general_state_buffer_size_modify_enable(1)
            .set_general_state_buffer_size(b.general_state_size >> 12)
            .set_surface_state_base_address_modify_enable(1)
            .set_surface_state_base_address(b.surface_state >> 12)
            .set_dynamic_state_base_address_modify_enable(1)
            .set_dynamic_state_base_address(b.dynamic_state >> 12)
            .set_dynamic_state_buffer_size_modify_enable(1)
            .set_dynamic_state_buffer_size(b.dynamic_state_size >> 12)
            .set_indirect_object_base_address_modify_enable(1)
            .set_indirect_object_base_address(b.indirect_object >> 12)
            .set_indirect_object_buffer_size_modify_enable(1)
            .set_indirect_object_buffer_size(b.indirect_object_size >> 12)
            .set_instruction_base_address_modify_enable(1)
            .set_instruction_base_address(b.instruction >> 12)
            .set_instruction_buffer_size_modify_enable(1)
            .set_instruction_buffer_size(b.instruction_size >> 12);
    }};
}

/// Heap bases programmed by STATE_BASE_ADDRESS. Addresses must be 4K
/// aligned; sizes are in bytes and rounded down to 4K.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BaseAddresses {
    pub general_state: u64,
    pub general_state_size: u32,
    pub surface_state: u64,
    pub dynamic_state: u64,
    pub dynamic_state_size: u32,
    pub indirect_object: u64,
    pub indirect_object_size: u32,
    pub instruction: u64,
    pub instruction_size: u32,
}

impl StateBaseAddressG9 {
    pub fn from_bases(bases: &BaseAddresses) -> Self {
        let mut cmd = Self::new();
        fill_state_base_address!(cmd, bases);
        cmd.set_bindless_surface_state_base_address_modify_enable(1);
        cmd
    }
}

impl StateBaseAddressG8 {
    pub fn from_bases(bases: &BaseAddresses) -> Self {
        let mut cmd = Self::new();
        fill_state_base_address!(cmd, bases);
        cmd
    }
}

hw_command! {
    pub struct MediaVfeState("MEDIA_VFE_STATE", 9) {
        dword_length: 0[0..=15] = 7;
        subopcode: 0[16..=23] = 0;
        media_command_opcode: 0[24..=26] = 0;
        pipeline: 0[27..=28] = 2;
        command_type: 0[29..=31] = 3;

        per_thread_scratch_space: 1[0..=3];
        stack_size: 1[4..=7];
        scratch_space_base_pointer: 1[10..=31];
        scratch_space_base_pointer_high: 2[0..=15];
        bypass_gateway_control: 3[6..=6];
        reset_gateway_timer: 3[7..=7];
        number_of_urb_entries: 3[8..=15];
        maximum_number_of_threads: 3[16..=31];
        slice_disable: 4[0..=1];
        curbe_allocation_size: 5[0..=15];
        urb_entry_allocation_size: 5[16..=31];
        scoreboard_mask: 6[0..=7];
        scoreboard_type: 6[30..=30];
        scoreboard_enable: 6[31..=31];

        scoreboard_0_delta_x: 7[0..=3];
        scoreboard_0_delta_y: 7[4..=7];
        scoreboard_1_delta_x: 7[8..=11];
        scoreboard_1_delta_y: 7[12..=15];
        scoreboard_2_delta_x: 7[16..=19];
        scoreboard_2_delta_y: 7[20..=23];
        scoreboard_3_delta_x: 7[24..=27];
        scoreboard_3_delta_y: 7[28..=31];
        scoreboard_4_delta_x: 8[0..=3];
        scoreboard_4_delta_y: 8[4..=7];
        scoreboard_5_delta_x: 8[8..=11];
        scoreboard_5_delta_y: 8[12..=15];
        scoreboard_6_delta_x: 8[16..=19];
        scoreboard_6_delta_y: 8[20..=23];
        scoreboard_7_delta_x: 8[24..=27];
        scoreboard_7_delta_y: 8[28..=31];
    }
}

impl MediaVfeState {
    pub const SCOREBOARD_TYPE_STALLING: u32 = 0;
    pub const SCOREBOARD_TYPE_NON_STALLING: u32 = 1;

    /// Programs the eight scoreboard deltas as signed 4-bit values.
    pub fn set_scoreboard_deltas(&mut self, deltas: &[(i8, i8)]) -> &mut Self {
        for (i, (x, y)) in deltas.iter().take(8).enumerate() {
            let word = 7 + i / 4;
            let shift = (i % 4) as u32 * 8;
            let packed = ((*x as u32) & 0xF) | (((*y as u32) & 0xF) << 4);
            self.dw[word] = (self.dw[word] & !(0xFF << shift)) | (packed << shift);
        }
        self
    }
}

hw_command! {
    pub struct MediaCurbeLoad("MEDIA_CURBE_LOAD", 4) {
        dword_length: 0[0..=15] = 2;
        subopcode: 0[16..=23] = 1;
        media_command_opcode: 0[24..=26] = 0;
        pipeline: 0[27..=28] = 2;
        command_type: 0[29..=31] = 3;
        curbe_total_data_length: 2[0..=16];
        curbe_data_start_address: 3[0..=31];
    }
}

hw_command! {
    pub struct MediaInterfaceDescriptorLoad("MEDIA_INTERFACE_DESCRIPTOR_LOAD", 4) {
        dword_length: 0[0..=15] = 2;
        subopcode: 0[16..=23] = 2;
        media_command_opcode: 0[24..=26] = 0;
        pipeline: 0[27..=28] = 2;
        command_type: 0[29..=31] = 3;
        interface_descriptor_total_length: 2[0..=16];
        interface_descriptor_data_start_address: 3[0..=31];
    }
}

hw_command! {
    pub struct MediaObjectWalker("MEDIA_OBJECT_WALKER", 17) {
        dword_length: 0[0..=14] = 15;
        subopcode: 0[16..=23] = 3;
        media_command_opcode: 0[24..=26] = 1;
        pipeline: 0[27..=28] = 2;
        command_type: 0[29..=31] = 3;

        interface_descriptor_offset: 1[0..=5];
        indirect_data_length: 2[0..=16];
        use_scoreboard: 2[21..=21];
        masked_dispatch: 2[22..=23];
        thread_synchronization: 2[24..=24];
        indirect_data_start_address: 3[0..=31];
        scoreboard_mask: 5[0..=7];
        group_id_loop_select: 5[8..=31];
        mid_loop_unit_x: 6[8..=9];
        local_mid_loop_unit_y: 6[12..=13];
        middle_loop_extra_steps: 6[16..=20];
        color_count_minus_one: 6[24..=31];
        local_loop_exec_count: 7[0..=11];
        global_loop_exec_count: 7[16..=27];
        block_resolution_x: 8[0..=10];
        block_resolution_y: 8[16..=26];
        local_start_x: 9[0..=10];
        local_start_y: 9[16..=26];
        local_end_x: 10[0..=10];
        local_end_y: 10[16..=26];
        local_outer_loop_stride_x: 11[0..=11];
        local_outer_loop_stride_y: 11[16..=27];
        local_inner_loop_unit_x: 12[0..=11];
        local_inner_loop_unit_y: 12[16..=27];
        global_resolution_x: 13[0..=10];
        global_resolution_y: 13[16..=26];
        global_start_x: 14[0..=11];
        global_start_y: 14[16..=27];
        global_outer_loop_stride_x: 15[0..=11];
        global_outer_loop_stride_y: 15[16..=27];
        global_inner_loop_unit_x: 16[0..=11];
        global_inner_loop_unit_y: 16[16..=27];
    }
}

hw_command! {
    pub struct GpgpuWalker("GPGPU_WALKER", 15) {
        dword_length: 0[0..=7] = 13;
        predicate_enable: 0[8..=8];
        indirect_parameter_enable: 0[10..=10];
        subopcode: 0[16..=23] = 5;
        media_command_opcode: 0[24..=26] = 1;
        pipeline: 0[27..=28] = 2;
        command_type: 0[29..=31] = 3;

        interface_descriptor_offset: 1[0..=5];
        indirect_data_length: 2[0..=16];
        /// 64-byte aligned offset from the indirect object base.
        indirect_data_start_address: 3[6..=31];
        thread_width_counter_maximum: 4[0..=5];
        thread_height_counter_maximum: 4[8..=13];
        thread_depth_counter_maximum: 4[16..=21];
        simd_size: 4[30..=31];
        thread_group_id_starting_x: 5[0..=31];
        thread_group_id_x_dimension: 7[0..=31];
        thread_group_id_starting_y: 8[0..=31];
        thread_group_id_y_dimension: 10[0..=31];
        thread_group_id_starting_resume_z: 11[0..=31];
        thread_group_id_z_dimension: 12[0..=31];
        right_execution_mask: 13[0..=31];
        bottom_execution_mask: 14[0..=31];
    }
}

impl GpgpuWalker {
    pub const SIMD_SIZE_SIMD8: u32 = 0;
    pub const SIMD_SIZE_SIMD16: u32 = 1;
    pub const SIMD_SIZE_SIMD32: u32 = 2;
}

hw_command! {
    pub struct StateSip("STATE_SIP", 3) {
        dword_length: 0[0..=7] = 1;
        command_subopcode: 0[16..=23] = 2;
        command_opcode: 0[24..=26] = 1;
        command_subtype: 0[27..=28] = 0;
        command_type: 0[29..=31] = 3;
    }
    wide {
        /// Kernel start pointer of the system routine, in 16-byte units.
        system_instruction_pointer: 1[4..=63];
    }
}

hw_command! {
    pub struct GpgpuCsrBaseAddress("GPGPU_CSR_BASE_ADDRESS", 3) {
        dword_length: 0[0..=7] = 1;
        command_subopcode: 0[16..=23] = 4;
        command_opcode: 0[24..=26] = 1;
        command_subtype: 0[27..=28] = 0;
        command_type: 0[29..=31] = 3;
    }
    wide {
        gpgpu_csr_base_address: 1[12..=63];
    }
}
