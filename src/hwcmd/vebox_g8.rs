//! VEBOX commands and state blocks, gen8 layouts.

/// Identical on gen8 and gen9.
pub use super::vebox_g9::{AlphaAoiState, ProcampState};

hw_command! {
    /// 21-bit coefficients, with the vignette format bit sharing DW0.
    pub struct CcmState("VEBOX_CCM_STATE", 9) {
        c1: 0[0..=20] = 1141;
        vignette_correction_format: 0[30..=30];
        color_correction_matrix_enable: 0[31..=31];
        c0: 1[0..=20] = 2792;
        c3: 2[0..=20] = 71;
        c2: 3[0..=20] = 34;
        c5: 4[0..=20] = 2097100;
        c4: 5[0..=20] = 3363;
        c7: 6[0..=20] = 168;
        c6: 7[0..=20] = 2097140;
        c8: 8[0..=20] = 3434;
    }
}

hw_command! {
    pub struct DndiState("VEBOX_DNDI_STATE", 10) {
        denoise_asd_threshold: 0[0..=7];
        denoise_history_increase: 0[8..=11] = 8;
        denoise_maximum_history: 0[16..=23];
        denoise_stad_threshold: 0[24..=31];
        denoise_threshold_for_sum_of_complexity_measure: 1[0..=7];
        denoise_moving_pixel_threshold: 1[8..=12];
        stmm_c2: 1[13..=15];
        low_temporal_difference_threshold: 1[16..=21];
        temporal_difference_threshold: 1[24..=29];
        block_noise_estimate_noise_threshold: 2[0..=7];
        block_noise_estimate_edge_threshold: 2[8..=11] = 1;
        smooth_mv_threshold: 2[14..=15];
        sad_tight_threshold: 2[16..=19] = 5;
        content_adaptive_threshold_slope: 2[20..=23] = 9;
        good_neighbor_threshold: 2[24..=29] = 4;
        maximum_stmm: 3[0..=7];
        multiplier_for_vecm: 3[8..=13];
        blending_constant_across_time_for_small_values_of_stmm: 3[16..=23] = 125;
        blending_constant_across_time_for_large_values_of_stmm: 3[24..=30] = 64;
        stmm_blending_constant_select: 3[31..=31];
        sdi_delta: 4[0..=7];
        sdi_threshold: 4[8..=15];
        stmm_output_shift: 4[16..=19];
        stmm_shift_up: 4[20..=21];
        stmm_shift_down: 4[22..=23];
        minimum_stmm: 4[24..=31];
        fmd_temporal_difference_threshold: 5[0..=7];
        sdi_fallback_mode_2_constant: 5[8..=15];
        sdi_fallback_mode_1_t2_constant: 5[16..=23];
        sdi_fallback_mode_1_t1_constant: 5[24..=31];
        dndi_top_first: 6[3..=3];
        progressive_dn: 6[6..=6];
        mcdi_enable: 6[7..=7];
        fmd_tear_threshold: 6[8..=13];
        cat_threshold: 6[14..=15];
        fmd2_vertical_difference_threshold: 6[16..=23];
        fmd1_vertical_difference_threshold: 6[24..=31];
        sad_tha: 7[0..=3] = 5;
        sad_thb: 7[4..=7] = 10;
        progressive_cadence_reconstruction_for_1st_field_of_current_frame: 7[8..=9];
        mc_pixel_consistency_threshold: 7[10..=15] = 25;
        progressive_cadence_reconstruction_for_2nd_field_of_previous_frame: 7[16..=17];
        neighbor_pixel_threshold: 7[19..=22] = 10;
        initial_denoise_history: 7[23..=28] = 32;
        chroma_low_temporal_difference_threshold: 8[0..=5];
        chroma_temporal_difference_threshold: 8[6..=11];
        chroma_denoise_enable: 8[12..=12];
        chroma_denoise_stad_threshold: 8[16..=23];
        hot_pixel_threshold: 9[0..=7];
        hot_pixel_count: 9[8..=11];
    }
}

hw_command! {
    pub struct VeboxState("VEBOX_STATE", 12) {
        dword_length: 0[0..=11] = 10;
        subopcode_b: 0[16..=20] = 2;
        subopcode_a: 0[21..=23] = 0;
        command_opcode: 0[24..=26] = 4;
        pipeline: 0[27..=28] = 2;
        command_type: 0[29..=31] = 3;

        color_gamut_expansion_enable: 1[0..=0];
        color_gamut_compression_enable: 1[1..=1];
        global_iecp_enable: 1[2..=2];
        dn_enable: 1[3..=3];
        di_enable: 1[4..=4];
        dndi_first_frame: 1[5..=5];
        downsample_method_422_to_420: 1[6..=6];
        downsample_method_444_to_422: 1[7..=7];
        di_output_frames: 1[8..=9];
        demosaic_enable: 1[10..=10];
        vignette_enable: 1[11..=11];
        alpha_plane_enable: 1[12..=12];
        hot_pixel_filtering_enable: 1[13..=13];
        single_slice_vebox_enable: 1[14..=14];
        state_surface_control_bits: 1[25..=31];
    }
    wide {
        dndi_state_table_pointer: 2[12..=47];
        iecp_state_table_pointer: 4[12..=47];
        gamut_state_table_pointer: 6[12..=47];
        vertex_table_pointer: 8[12..=47];
        capture_pipe_state_table_pointer: 10[12..=47];
    }
}

hw_command! {
    /// DW6 is reserved on gen8.
    pub struct SurfaceState("VEBOX_SURFACE_STATE", 7) {
        dword_length: 0[0..=11] = 5;
        subopcode_b: 0[16..=20] = 0;
        subopcode_a: 0[21..=23] = 0;
        media_command_opcode: 0[24..=26] = 4;
        media_command_pipeline: 0[27..=28] = 2;
        command_type: 0[29..=31] = 3;

        surface_identification: 1[0..=0];
        width: 2[4..=17];
        height: 2[18..=31];
        tile_walk: 3[0..=0];
        tiled_surface: 3[1..=1];
        half_pitch_for_chroma: 3[2..=2];
        surface_pitch: 3[3..=19];
        bayer_pattern_format: 3[24..=24];
        bayer_pattern_offset: 3[25..=26];
        interleave_chroma: 3[27..=27];
        surface_format: 3[28..=31];
        y_offset_for_u_cb: 4[0..=14];
        x_offset_for_u_cb: 4[16..=28];
        y_offset_for_v_cr: 5[0..=14];
        x_offset_for_v_cr: 5[16..=28];
    }
}
