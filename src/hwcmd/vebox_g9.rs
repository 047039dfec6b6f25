//! VEBOX commands and state blocks, gen9 layouts.
//!
//! State blocks (ACE/LACE, DNDI, IECP pieces) live in the VEBOX state heap
//! and carry no header; VEBOX_STATE, VEBOX_SURFACE_STATE,
//! VEBOX_TILING_CONVERT and VEB_DI_IECP are command-streamer commands.

use crate::hwcmd::{FieldSpec, HwCommand};

hw_command! {
    pub struct AceLaceState("VEBOX_ACE_LACE_STATE", 13) {
        ace_enable: 0[0..=0];
        skin_threshold: 0[2..=6] = 26;
        lace_histogram_enable: 0[12..=12];
        lace_histogram_size: 0[13..=13];
        lace_single_histogram_set: 0[14..=15];
        min_ace_luma: 0[16..=31];
        ymin: 1[0..=7] = 16;
        y1: 1[8..=15] = 36;
        y2: 1[16..=23] = 56;
        y3: 1[24..=31] = 76;
        y4: 2[0..=7] = 96;
        y5: 2[8..=15] = 116;
        y6: 2[16..=23] = 136;
        y7: 2[24..=31] = 156;
        y8: 3[0..=7] = 176;
        y9: 3[8..=15] = 196;
        y10: 3[16..=23] = 216;
        ymax: 3[24..=31] = 235;
        b1: 4[0..=7] = 36;
        b2: 4[8..=15] = 56;
        b3: 4[16..=23] = 76;
        b4: 4[24..=31] = 96;
        b5: 5[0..=7] = 116;
        b6: 5[8..=15] = 136;
        b7: 5[16..=23] = 156;
        b8: 5[24..=31] = 176;
        b9: 6[0..=7] = 196;
        b10: 6[8..=15] = 216;
        s0: 7[0..=10] = 1024;
        s1: 7[16..=26] = 1024;
        s2: 8[0..=10] = 1024;
        s3: 8[16..=26] = 1024;
        s4: 9[0..=10] = 1024;
        s5: 9[16..=26] = 1024;
        s6: 10[0..=10] = 1024;
        s7: 10[16..=26] = 1024;
        s8: 11[0..=10] = 1024;
        s9: 11[16..=26] = 1024;
        s10: 12[0..=10] = 1024;
        max_ace_luma: 12[16..=31];
    }
}

impl AceLaceState {
    pub const LACE_HISTOGRAM_SIZE_128_BIN: u32 = 0;
    pub const LACE_HISTOGRAM_SIZE_256_BIN: u32 = 1;
    pub const LACE_SINGLE_HISTOGRAM_SET_CURRENT: u32 = 0;
    pub const LACE_SINGLE_HISTOGRAM_SET_PREVIOUS: u32 = 1;
}

hw_command! {
    pub struct AlphaAoiState("VEBOX_ALPHA_AOI_STATE", 3) {
        color_pipe_alpha: 0[0..=15];
        alpha_from_state_select: 0[16..=16];
        full_image_histogram: 0[17..=17];
        aoi_min_x: 1[0..=13];
        aoi_max_x: 1[16..=29] = 3;
        aoi_min_y: 2[0..=13];
        aoi_max_y: 2[16..=29] = 3;
    }
}

hw_command! {
    pub struct CapturePipeState("VEBOX_CAPTURE_PIPE_STATE", 7) {
        good_pixel_neighbor_threshold: 0[0..=5] = 35;
        average_color_threshold: 0[8..=15] = 255;
        green_imbalance_threshold: 0[16..=19] = 1;
        shift_min_cost: 0[20..=22] = 1;
        good_pixel_threshold: 0[24..=29] = 5;
        bad_color_threshold3: 1[0..=3] = 10;
        number_big_pixel_threshold: 1[4..=7] = 10;
        bad_color_threshold2: 1[8..=15] = 175;
        bad_color_threshold1: 1[16..=23] = 100;
        good_intensity_threshold: 1[24..=27] = 10;
        scale_for_min_cost: 1[28..=31] = 10;
        white_balance_correction_enable: 2[0..=0];
        black_point_correction_enable: 2[1..=1];
        vignette_correction_format: 2[2..=2];
        rgb_histogram_enable: 2[3..=3];
        black_point_offset_green_bottom_msb: 2[4..=4];
        black_point_offset_blue_msb: 2[5..=5];
        black_point_offset_red_msb: 2[6..=6];
        black_point_offset_green_top_msb: 2[7..=7];
        uv_threshold_value: 2[8..=15] = 64;
        y_outlier_value: 2[16..=23] = 253;
        y_bright_value: 2[24..=31] = 230;
        black_point_offset_green_top: 3[0..=15];
        black_point_offset_red: 3[16..=31];
        black_point_offset_green_bottom: 4[0..=15];
        black_point_offset_blue: 4[16..=31];
        white_balance_green_top_correction: 5[0..=15];
        white_balance_red_correction: 5[16..=31];
        white_balance_green_bottom_correction: 6[0..=15];
        white_balance_blue_correction: 6[16..=31];
    }
}

hw_command! {
    /// Coefficients are s2.14 in 17 bits; the dword order pairs C1/C0,
    /// C3/C2, C5/C4 and C7/C6.
    pub struct CcmState("VEBOX_CCM_STATE", 9) {
        c1: 0[0..=16] = 1141;
        color_correction_matrix_enable: 0[31..=31];
        c0: 1[0..=16] = 2792;
        c3: 2[0..=16] = 71;
        c2: 3[0..=16] = 34;
        c5: 4[0..=16] = 131020;
        c4: 5[0..=16] = 3363;
        c7: 6[0..=16] = 168;
        c6: 7[0..=16] = 131060;
        c8: 8[0..=16] = 3434;
    }
}

hw_command! {
    pub struct CscState("VEBOX_CSC_STATE", 12) {
        c0: 0[0..=18] = 65536;
        yuv_channel_swap: 0[30..=30];
        transform_enable: 0[31..=31];
        c1: 1[0..=18];
        c2: 2[0..=18];
        c3: 3[0..=18];
        c4: 4[0..=18] = 65536;
        c5: 5[0..=18];
        c6: 6[0..=18];
        c7: 7[0..=18];
        c8: 8[0..=18] = 65536;
        offset_in1: 9[0..=15];
        offset_out1: 9[16..=31];
        offset_in2: 10[0..=15];
        offset_out2: 10[16..=31];
        offset_in3: 11[0..=15];
        offset_out3: 11[16..=31];
    }
}

hw_command! {
    pub struct FrontEndCscState("VEBOX_FRONT_END_CSC_STATE", 12) {
        fecsc_c0: 0[0..=18] = 65536;
        front_end_csc_transform_enable: 0[31..=31];
        fecsc_c1: 1[0..=18];
        fecsc_c2: 2[0..=18];
        fecsc_c3: 3[0..=18];
        fecsc_c4: 4[0..=18] = 65536;
        fecsc_c5: 5[0..=18];
        fecsc_c6: 6[0..=18];
        fecsc_c7: 7[0..=18];
        fecsc_c8: 8[0..=18] = 65536;
        offset_in1: 9[0..=15];
        offset_out1: 9[16..=31];
        offset_in2: 10[0..=15];
        offset_out2: 10[16..=31];
        offset_in3: 11[0..=15];
        offset_out3: 11[16..=31];
    }
}

hw_command! {
    /// Denoise and deinterlace state.
    pub struct DndiState("VEBOX_DNDI_STATE", 18) {
        denoise_moving_pixel_threshold: 0[0..=4];
        denoise_history_increase: 0[8..=11] = 8;
        denoise_maximum_history: 0[12..=19];
        denoise_stad_threshold: 0[20..=31];
        low_temporal_difference_threshold: 1[0..=9];
        temporal_difference_threshold: 1[10..=19];
        denoise_asd_threshold: 1[20..=31];
        initial_denoise_history: 2[10..=15] = 32;
        denoise_threshold_for_sum_of_complexity_measure: 2[16..=27];
        progressive_dn: 2[28..=28];
        block_noise_estimate_noise_threshold: 3[0..=11];
        block_noise_estimate_edge_threshold: 3[12..=19] = 16;
        hot_pixel_threshold: 3[20..=27];
        hot_pixel_count: 3[28..=31];
        chroma_low_temporal_difference_threshold: 4[0..=5];
        chroma_temporal_difference_threshold: 4[6..=11];
        chroma_denoise_enable: 4[12..=12] = 1;
        chroma_denoise_stad_threshold: 4[16..=23];
        dn_wr0: 5[0..=4];
        dn_wr1: 5[5..=9];
        dn_wr2: 5[10..=14];
        dn_wr3: 5[15..=19];
        dn_wr4: 5[20..=24];
        dn_wr5: 5[25..=29];
        dn_thmin: 6[0..=12];
        dn_thmax: 6[16..=28];
        dn_dyn_thmin: 7[0..=12];
        dn_prt5: 7[16..=28];
        dn_prt3: 8[0..=12];
        dn_prt4: 8[16..=28];
        dn_prt1: 9[0..=12];
        dn_prt2: 9[16..=28];
        dn_wd20: 10[0..=4];
        dn_wd21: 10[5..=9];
        dn_wd22: 10[10..=14];
        dn_prt0: 10[16..=28];
        dn_wd00: 11[0..=4];
        dn_wd01: 11[5..=9];
        dn_wd02: 11[10..=14];
        dn_wd10: 11[15..=19];
        dn_wd11: 11[20..=24];
        dn_wd12: 11[25..=29];
        smooth_mv_threshold: 12[0..=1];
        sad_tight_threshold: 12[2..=5] = 5;
        content_adaptive_threshold_slope: 12[6..=9] = 9;
        stmm_c2: 12[10..=12];
        maximum_stmm: 13[0..=7];
        multiplier_for_vecm: 13[8..=13];
        blending_constant_across_time_for_small_values_of_stmm: 13[16..=23];
        blending_constant_across_time_for_large_values_of_stmm: 13[24..=30];
        stmm_blending_constant_select: 13[31..=31];
        sdi_delta: 14[0..=7];
        sdi_threshold: 14[8..=15];
        stmm_output_shift: 14[16..=19];
        stmm_shift_up: 14[20..=21];
        stmm_shift_down: 14[22..=23];
        minimum_stmm: 14[24..=31];
        fmd_temporal_difference_threshold: 15[0..=7];
        sdi_fallback_mode_2_constant: 15[8..=15];
        sdi_fallback_mode_1_t2_constant: 15[16..=23];
        sdi_fallback_mode_1_t1_constant: 15[24..=31];
        dndi_top_first: 16[3..=3];
        mcdi_enable: 16[7..=7];
        fmd_tear_threshold: 16[8..=13];
        cat_threshold: 16[14..=15];
        fmd2_vertical_difference_threshold: 16[16..=23];
        fmd1_vertical_difference_threshold: 16[24..=31];
        sad_tha: 17[0..=3] = 5;
        sad_thb: 17[4..=7] = 10;
        progressive_cadence_reconstruction_for_1st_field_of_current_frame: 17[8..=9];
        mc_pixel_consistency_threshold: 17[10..=15] = 25;
        progressive_cadence_reconstruction_for_2nd_field_of_previous_frame: 17[16..=17];
        neighbor_pixel_threshold: 17[19..=22] = 10;
    }
}

impl DndiState {
    pub const STMM_SHIFT_UP_SHIFT_BY_6: u32 = 0;
    pub const STMM_SHIFT_UP_SHIFT_BY_7: u32 = 1;
    pub const STMM_SHIFT_UP_SHIFT_BY_8: u32 = 2;
    pub const STMM_SHIFT_DOWN_SHIFT_BY_4: u32 = 0;
    pub const STMM_SHIFT_DOWN_SHIFT_BY_5: u32 = 1;
    pub const STMM_SHIFT_DOWN_SHIFT_BY_6: u32 = 2;
    pub const PROGRESSIVE_CADENCE_DEINTERLACE: u32 = 0;
    pub const PROGRESSIVE_CADENCE_PUT_TOGETHER_WITH_SAME_FRAME: u32 = 2;
    pub const PROGRESSIVE_CADENCE_PUT_TOGETHER_WITH_PREVIOUS_FRAME: u32 = 3;
}

hw_command! {
    pub struct ProcampState("VEBOX_PROCAMP_STATE", 2) {
        procamp_enable: 0[0..=0];
        /// s7.4 two's complement.
        brightness: 0[1..=12] = 0;
        /// u4.7, 1.0 is 128.
        contrast: 0[17..=27] = 128;
        sin_cs: 1[0..=15] = 0;
        /// s7.8, 1.0 is 256.
        cos_cs: 1[16..=31] = 256;
    }
}

hw_command! {
    /// Total color control.
    pub struct TccState("VEBOX_TCC_STATE", 11) {
        tcc_enable: 0[7..=7];
        satfactor1: 0[8..=15] = 220;
        satfactor2: 0[16..=23] = 220;
        satfactor3: 0[24..=31] = 220;
        satfactor4: 1[8..=15] = 220;
        satfactor5: 1[16..=23] = 220;
        satfactor6: 1[24..=31] = 220;
        basecolor1: 2[0..=9] = 145;
        basecolor2: 2[10..=19] = 307;
        basecolor3: 2[20..=29] = 483;
        basecolor4: 3[0..=9] = 657;
        basecolor5: 3[10..=19] = 819;
        basecolor6: 3[20..=29] = 995;
        colortransitslope2: 4[0..=15] = 405;
        colortransitslope23: 4[16..=31] = 744;
        colortransitslope34: 5[0..=15] = 1131;
        colortransitslope45: 5[16..=31] = 407;
        colortransitslope56: 6[0..=15] = 372;
        colortransitslope61: 6[16..=31] = 377;
        colorbias1: 7[2..=11] = 0;
        colorbias2: 7[12..=21] = 150;
        colorbias3: 7[22..=31] = 0;
        colorbias4: 8[2..=11] = 0;
        colorbias5: 8[12..=21] = 0;
        colorbias6: 8[22..=31] = 0;
        ste_slope_bits: 9[0..=2];
        ste_threshold: 9[8..=12];
        uv_threshold_bits: 9[16..=18] = 3;
        uv_threshold: 9[24..=30] = 3;
        uvmaxcolor: 10[0..=8] = 448;
        inv_uvmaxcolor: 10[16..=31] = 146;
    }
}

hw_command! {
    /// Gamut expansion and compression state.
    pub struct GamutState("VEBOX_GAMUT_STATE", 38) {
        cm_w: 0[0..=9];
        global_mode_enable: 0[15..=15];
        ar: 0[16..=24] = 436;
        ab: 1[0..=6];
        ag: 1[8..=14];
        cm_s: 1[16..=25];
        ri: 2[0..=7];
        cm_i: 2[8..=15];
        rs: 2[16..=25];
        /// Expansion matrix, s1.14 two's complement.
        c0: 3[0..=14];
        c1: 3[16..=30];
        c2: 4[0..=14];
        c3: 4[16..=30];
        c4: 5[0..=14];
        c5: 5[16..=30];
        c6: 6[0..=14];
        c7: 6[16..=30];
        c8: 7[0..=14];

        pwl_gamma_point_1: 8[0..=7] = 1;
        pwl_gamma_point_2: 8[8..=15] = 2;
        pwl_gamma_point_3: 8[16..=23] = 5;
        pwl_gamma_point_4: 8[24..=31] = 9;
        pwl_gamma_point_5: 9[0..=7] = 16;
        pwl_gamma_point_6: 9[8..=15] = 26;
        pwl_gamma_point_7: 9[16..=23] = 42;
        pwl_gamma_point_8: 9[24..=31] = 65;
        pwl_gamma_point_9: 10[0..=7] = 96;
        pwl_gamma_point_10: 10[8..=15] = 136;
        pwl_gamma_point_11: 10[16..=23] = 187;
        pwl_gamma_bias_1: 11[0..=7] = 13;
        pwl_gamma_bias_2: 11[8..=15] = 23;
        pwl_gamma_bias_3: 11[16..=23] = 38;
        pwl_gamma_bias_4: 11[24..=31] = 53;
        pwl_gamma_bias_5: 12[0..=7] = 71;
        pwl_gamma_bias_6: 12[8..=15] = 91;
        pwl_gamma_bias_7: 12[16..=23] = 114;
        pwl_gamma_bias_8: 12[24..=31] = 139;
        pwl_gamma_bias_9: 13[0..=7] = 165;
        pwl_gamma_bias_10: 13[8..=15] = 193;
        pwl_gamma_bias_11: 13[16..=23] = 223;
        pwl_gamma_slope_0: 14[0..=11];
        pwl_gamma_slope_1: 14[16..=27];
        pwl_gamma_slope_2: 15[0..=11];
        pwl_gamma_slope_3: 15[16..=27];
        pwl_gamma_slope_4: 16[0..=11];
        pwl_gamma_slope_5: 16[16..=27];
        pwl_gamma_slope_6: 17[0..=11];
        pwl_gamma_slope_7: 17[16..=27];
        pwl_gamma_slope_8: 18[0..=11];
        pwl_gamma_slope_9: 18[16..=27];
        pwl_gamma_slope_10: 19[0..=11];
        pwl_gamma_slope_11: 19[16..=27];
        pwl_inv_gamma_point_1: 20[0..=7] = 30;
        pwl_inv_gamma_point_2: 20[8..=15] = 55;
        pwl_inv_gamma_point_3: 20[16..=23] = 79;
        pwl_inv_gamma_point_4: 20[24..=31] = 101;
        pwl_inv_gamma_point_5: 21[0..=7] = 122;
        pwl_inv_gamma_point_6: 21[8..=15] = 141;
        pwl_inv_gamma_point_7: 21[16..=23] = 162;
        pwl_inv_gamma_point_8: 21[24..=31] = 181;
        pwl_inv_gamma_point_9: 22[0..=7] = 200;
        pwl_inv_gamma_point_10: 22[8..=15] = 219;
        pwl_inv_gamma_point_11: 22[16..=23] = 237;
        pwl_inv_gamma_bias_1: 23[0..=7] = 3;
        pwl_inv_gamma_bias_2: 23[8..=15] = 10;
        pwl_inv_gamma_bias_3: 23[16..=23] = 20;
        pwl_inv_gamma_bias_4: 23[24..=31] = 33;
        pwl_inv_gamma_bias_5: 24[0..=7] = 49;
        pwl_inv_gamma_bias_6: 24[8..=15] = 67;
        pwl_inv_gamma_bias_7: 24[16..=23] = 92;
        pwl_inv_gamma_bias_8: 24[24..=31] = 117;
        pwl_inv_gamma_bias_9: 25[0..=7] = 147;
        pwl_inv_gamma_bias_10: 25[8..=15] = 180;
        pwl_inv_gamma_bias_11: 25[16..=23] = 215;
        pwl_inv_gamma_slope_0: 26[0..=11];
        pwl_inv_gamma_slope_1: 26[16..=27];
        pwl_inv_gamma_slope_2: 27[0..=11];
        pwl_inv_gamma_slope_3: 27[16..=27];
        pwl_inv_gamma_slope_4: 28[0..=11];
        pwl_inv_gamma_slope_5: 28[16..=27];
        pwl_inv_gamma_slope_6: 29[0..=11];
        pwl_inv_gamma_slope_7: 29[16..=27];
        pwl_inv_gamma_slope_8: 30[0..=11];
        pwl_inv_gamma_slope_9: 30[16..=27];
        pwl_inv_gamma_slope_10: 31[0..=11];
        pwl_inv_gamma_slope_11: 31[16..=27];

        offset_in_r: 32[0..=14];
        offset_in_g: 32[16..=30];
        offset_in_b: 33[0..=14];
        offset_out_b: 33[16..=30];
        offset_out_r: 34[0..=14];
        offset_out_g: 34[16..=30];
        d1_out: 35[0..=9] = 287;
        d_out_default: 35[10..=19] = 164;
        d_in_default: 35[20..=29] = 205;
        full_range_mapping_enable: 35[30..=30];
        d1_in: 36[0..=9] = 820;
        compression_line_shift: 36[28..=30] = 3;
        xvycc_dec_enc_enable: 36[31..=31] = 1;
        cpi_override: 37[0..=0];
        basic_mode_scaling_factor: 37[11..=24];
        luma_chroma_only_correction: 37[29..=29];
        gcc_basic_mode_selection: 37[30..=31];
    }
}

impl GamutState {
    pub const GLOBAL_MODE_ADVANCED: u32 = 0;
    pub const GLOBAL_MODE_BASIC: u32 = 1;
    pub const GCC_BASIC_MODE_SCALING_FACTOR: u32 = 1;
    pub const GCC_BASIC_MODE_SINGLE_AXIS_GAMMA_CORRECTION: u32 = 2;
    pub const GCC_BASIC_MODE_SCALING_FACTOR_WITH_FIXED_LUMA: u32 = 3;
}
hw_command! {
    /// Skin tone detection and enhancement.
    pub struct StdSteState("VEBOX_STD_STE_STATE", 29) {
        std_enable: 0[0..=0];
        ste_enable: 0[1..=1];
        output_control: 0[2..=2];
        sat_max: 0[4..=9] = 31;
        hue_max: 0[10..=15] = 14;
        u_mid: 0[16..=23] = 110;
        v_mid: 0[24..=31] = 154;
        sin: 1[0..=7] = 101;
        cos: 1[10..=17] = 79;
        hs_margin: 1[18..=20] = 3;
        diamond_du: 1[21..=27];
        diamond_margin: 1[28..=30] = 4;
        std_score_output: 1[31..=31];
        diamond_dv: 2[0..=6];
        diamond_th: 2[7..=12] = 35;
        diamond_alpha: 2[13..=20] = 100;
        vy_std_enable: 3[7..=7];
        y_point1: 3[8..=15] = 46;
        y_point2: 3[16..=23] = 47;
        y_point3: 3[24..=31] = 254;
        y_point4: 4[0..=7] = 255;
        y_slope1: 4[8..=12] = 31;
        y_slope2: 4[13..=17] = 31;
        inv_margin_vyl: 5[0..=15];
        inv_skin_types_margin: 5[16..=31] = 20;
        inv_margin_vyu: 6[0..=15] = 1600;

        p0l: 6[16..=23] = 46;
        p1l: 6[24..=31] = 216;
        p2l: 7[0..=7] = 236;
        p3l: 7[8..=15] = 236;
        b0l: 7[16..=23] = 133;
        b1l: 7[24..=31] = 130;
        b2l: 8[0..=7] = 130;
        b3l: 8[8..=15] = 130;
        s0l: 8[16..=26] = 2043;
        s1l: 9[0..=10];
        s2l: 9[11..=21];
        s3l: 10[0..=10];
        p0u: 10[11..=18] = 46;
        p1u: 10[19..=26] = 66;
        p2u: 11[0..=7] = 150;
        p3u: 11[8..=15] = 236;
        b0u: 11[16..=23] = 143;
        b1u: 11[24..=31] = 163;
        b2u: 12[0..=7] = 200;
        b3u: 12[8..=15] = 200;
        s0u: 12[16..=26] = 256;
        s1u: 13[0..=10] = 113;
        s2u: 13[11..=21] = 1869;
        s3u: 14[0..=10];
        skin_types_enable: 14[11..=11];
        skin_types_thresh: 14[12..=19] = 120;
        skin_types_margin: 14[20..=27] = 20;

        satp1: 15[0..=6] = 122;
        satp2: 15[7..=13] = 6;
        satp3: 15[14..=20] = 31;
        satb1: 15[21..=30] = 1016;
        satb2: 16[0..=9] = 8;
        satb3: 16[10..=19] = 124;
        sats0: 16[20..=30] = 297;
        sats1: 17[0..=10] = 85;
        sats2: 17[11..=21] = 297;
        sats3: 18[0..=10] = 256;
        huep1: 18[11..=17] = 122;
        huep2: 18[18..=24] = 6;
        huep3: 18[25..=31] = 14;
        hueb1: 19[0..=9] = 8;
        hueb2: 19[10..=19] = 8;
        hueb3: 19[20..=29] = 56;
        hues0: 20[0..=10] = 384;
        hues1: 20[11..=21] = 85;
        hues2: 21[0..=10] = 384;
        hues3: 21[11..=21] = 256;

        satp1_dark: 22[0..=6] = 123;
        satp2_dark: 22[7..=13] = 31;
        satp3_dark: 22[14..=20] = 31;
        satb1_dark: 22[21..=30];
        satb2_dark: 23[0..=9] = 124;
        satb3_dark: 23[10..=19] = 124;
        sats0_dark: 23[20..=30] = 397;
        sats1_dark: 24[0..=10] = 189;
        sats2_dark: 24[11..=21] = 256;
        sats3_dark: 25[0..=10] = 256;
        huep1_dark: 25[11..=17];
        huep2_dark: 25[18..=24] = 2;
        huep3_dark: 25[25..=31] = 14;
        hueb1_dark: 26[0..=9];
        hueb2_dark: 26[10..=19];
        hueb3_dark: 26[20..=29] = 56;
        hues0_dark: 27[0..=10] = 299;
        hues1_dark: 27[11..=21] = 256;
        hues2_dark: 28[0..=10] = 299;
        hues3_dark: 28[11..=21] = 256;
    }
}

impl StdSteState {
    pub const OUTPUT_CONTROL_PIXELS: u32 = 0;
    pub const OUTPUT_CONTROL_STD_DECISION: u32 = 1;
}

/// Dwords of the aggregate IECP block.
const IECP_DW_SIZE: usize = 91;

/// IECP state as laid out in the VEBOX state heap: STD/STE, ACE/LACE, TCC,
/// ProcAmp, CSC, alpha/AOI, CCM and front-end CSC blocks back to back.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct IecpState {
    dw: [u32; IECP_DW_SIZE],
}

macro_rules! iecp_blocks {
    ($($block:ident: $ty:ty = $offset:expr;)*) => {
        impl IecpState {
            $(
                pub const $block: usize = $offset;
            )*
        }

        ::paste::paste! {
            impl IecpState {
                pub fn new() -> Self {
                    let mut state = Self { dw: [0; IECP_DW_SIZE] };
                    $(
                        state.set_block(Self::$block, &<$ty>::new());
                    )*
                    state
                }

                $(
                    pub fn [<$block:lower>](&self) -> $ty {
                        self.block(Self::$block)
                    }

                    pub fn [<set_ $block:lower>](&mut self, state: &$ty) -> &mut Self {
                        self.set_block(Self::$block, state);
                        self
                    }
                )*
            }

            impl ::std::fmt::Debug for IecpState {
                fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                    f.debug_struct("VEBOX_IECP_STATE")
                        $( .field(stringify!([<$block:lower>]), &self.[<$block:lower>]()) )*
                        .finish()
                }
            }
        }

        const _: () = assert!(0 $( + <$ty>::DW_SIZE )* == IECP_DW_SIZE);
    };
}

iecp_blocks! {
    STD_STE: StdSteState = 0;
    ACE_LACE: AceLaceState = 29;
    TCC: TccState = 42;
    PROCAMP: ProcampState = 53;
    CSC: CscState = 55;
    ALPHA_AOI: AlphaAoiState = 67;
    CCM: CcmState = 70;
    FRONT_END_CSC: FrontEndCscState = 79;
}

impl IecpState {
    fn block<T: HwCommand>(&self, offset: usize) -> T {
        T::from_dwords(&self.dw[offset..]).unwrap_or_default()
    }

    fn set_block<T: HwCommand>(&mut self, offset: usize, state: &T) {
        self.dw[offset..offset + T::DW_SIZE].copy_from_slice(state.dwords());
    }
}

impl Default for IecpState {
    fn default() -> Self {
        Self::new()
    }
}

impl HwCommand for IecpState {
    const NAME: &'static str = "VEBOX_IECP_STATE";
    const DW_SIZE: usize = IECP_DW_SIZE;
    const FIELDS: &'static [FieldSpec] = &[];

    fn dwords(&self) -> &[u32] {
        &self.dw
    }

    fn dwords_mut(&mut self) -> &mut [u32] {
        &mut self.dw
    }

    fn from_dwords(src: &[u32]) -> Option<Self> {
        let dw: [u32; IECP_DW_SIZE] = src.get(..IECP_DW_SIZE)?.try_into().ok()?;
        Some(Self { dw })
    }
}

hw_command! {
    pub struct VertexTableEntry("VEBOX_VERTEX_TABLE_ENTRY", 1) {
        cv: 0[0..=11];
        lv: 0[16..=27];
    }
}

const VERTEX_TABLE_ENTRIES: usize = 512;

/// Gamut compression vertex table, one dword per vertex.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct VertexTable {
    dw: [u32; VERTEX_TABLE_ENTRIES],
}

impl VertexTable {
    pub const ENTRIES: usize = VERTEX_TABLE_ENTRIES;

    pub fn new() -> Self {
        Self {
            dw: [0; VERTEX_TABLE_ENTRIES],
        }
    }

    /// Entry `index`, `None` past the end of the table.
    pub fn entry(&self, index: usize) -> Option<VertexTableEntry> {
        VertexTableEntry::from_dwords(self.dw.get(index..)?)
    }

    /// Store an entry; returns false past the end of the table.
    pub fn set_entry(&mut self, index: usize, entry: VertexTableEntry) -> bool {
        match self.dw.get_mut(index) {
            Some(slot) => {
                *slot = entry.value(0);
                true
            }
            None => false,
        }
    }

    /// Fill the table from `(lv, cv)` pairs; the rest stays zero.
    pub fn from_vertices(vertices: &[(u32, u32)]) -> Self {
        let mut table = Self::new();
        for (index, &(lv, cv)) in vertices.iter().take(VERTEX_TABLE_ENTRIES).enumerate() {
            let mut entry = VertexTableEntry::new();
            entry.set_lv(lv).set_cv(cv);
            table.set_entry(index, entry);
        }
        table
    }
}

impl Default for VertexTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ::std::fmt::Debug for VertexTable {
    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
        let used = self.dw.iter().filter(|&&v| v != 0).count();
        write!(f, "VEBOX_VERTEX_TABLE {{ entries: {}, non_zero: {} }}", VERTEX_TABLE_ENTRIES, used)
    }
}

impl HwCommand for VertexTable {
    const NAME: &'static str = "VEBOX_VERTEX_TABLE";
    const DW_SIZE: usize = VERTEX_TABLE_ENTRIES;
    const FIELDS: &'static [FieldSpec] = &[];

    fn dwords(&self) -> &[u32] {
        &self.dw
    }

    fn dwords_mut(&mut self) -> &mut [u32] {
        &mut self.dw
    }

    fn from_dwords(src: &[u32]) -> Option<Self> {
        let dw: [u32; VERTEX_TABLE_ENTRIES] = src.get(..VERTEX_TABLE_ENTRIES)?.try_into().ok()?;
        Some(Self { dw })
    }
}

hw_command! {
    pub struct VeboxState("VEBOX_STATE", 16) {
        dword_length: 0[0..=11] = 14;
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
        single_slice_vebox_enable: 1[14..=15];
        lace_correction_enable: 1[16..=16];
        disable_encoder_statistics: 1[17..=17];
        disable_temporal_denoise_filter: 1[18..=18];
        single_pipe_enable: 1[19..=19];
        forward_gamma_correction_enable: 1[21..=21];
        state_surface_control_bits: 1[25..=31];

        arbitration_priority_control_for_lace_lut: 13[30..=31];
    }
    wide {
        /// Pointers are 4K aligned; the fields hold address >> 12.
        dndi_state_table_pointer: 2[12..=47];
        iecp_state_table_pointer: 4[12..=47];
        gamut_state_table_pointer: 6[12..=47];
        vertex_table_pointer: 8[12..=47];
        capture_pipe_state_table_pointer: 10[12..=47];
        lace_lut_table_pointer: 12[12..=47];
        gamma_correction_values_address: 14[12..=63];
    }
}

impl VeboxState {
    pub const DI_OUTPUT_FRAMES_BOTH: u32 = 0;
    pub const DI_OUTPUT_FRAMES_PREVIOUS_ONLY: u32 = 1;
    pub const DI_OUTPUT_FRAMES_CURRENT_ONLY: u32 = 2;
    pub const SINGLE_SLICE_BOTH_SLICES_ENABLED: u32 = 0;
    pub const SINGLE_SLICE_SLICE0_ONLY: u32 = 1;
}

hw_command! {
    pub struct SurfaceState("VEBOX_SURFACE_STATE", 9) {
        dword_length: 0[0..=11] = 7;
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
        y_offset_for_frame: 6[0..=14];
        x_offset_for_frame: 6[16..=30];
        derived_surface_pitch: 7[0..=16];
        surface_pitch_for_skin_score_output_surfaces: 8[0..=16];
    }
}

impl SurfaceState {
    pub const SURFACE_IDENTIFICATION_INPUT: u32 = 0;
    pub const SURFACE_IDENTIFICATION_OUTPUT: u32 = 1;
    pub const TILE_WALK_X_MAJOR: u32 = 0;
    pub const TILE_WALK_Y_MAJOR: u32 = 1;
    pub const SURFACE_FORMAT_YCRCB_NORMAL: u32 = 0;
    pub const SURFACE_FORMAT_PLANAR_420_8: u32 = 4;
    pub const SURFACE_FORMAT_PACKED_444A8: u32 = 5;
}

hw_command! {
    pub struct TilingConvert("VEBOX_TILING_CONVERT", 5) {
        dword_length: 0[0..=11] = 3;
        subopcode_b: 0[16..=20] = 1;
        subopcode_a: 0[21..=23] = 0;
        command_opcode: 0[24..=26] = 4;
        pipeline: 0[27..=28] = 2;
        command_type: 0[29..=31] = 3;
        input_surface_control_bits: 1[0..=10];
        output_surface_control_bits: 3[0..=10];
    }
    wide {
        input_address: 1[12..=63];
        output_address: 3[12..=63];
    }
}

hw_command! {
    /// Per-surface control bits embedded in VEB_DI_IECP address dwords.
    pub struct DiIecpSurfaceControlBits("VEB_DI_IECP_COMMAND_SURFACE_CONTROL_BITS", 1) {
        index_to_mocs_tables: 0[1..=6];
        memory_compression_enable: 0[7..=7];
        memory_compression_mode: 0[8..=8];
        tiled_resource_mode: 0[9..=10];
    }
}

hw_command! {
    /// Each surface takes a dword pair: control bits and address low in the
    /// first, address high and arbitration priority in the second.
    pub struct VebDiIecp("VEB_DI_IECP", 24) {
        dword_length: 0[0..=11] = 22;
        subopb: 0[16..=20] = 3;
        subopa: 0[21..=23] = 0;
        opcode: 0[24..=26] = 4;
        pipeline: 0[27..=28] = 2;
        command_type: 0[29..=31] = 3;
        ending_x: 1[0..=13];
        starting_x: 1[16..=29];

        current_frame_input_surface_control: 2[0..=10];
        current_frame_input_arbitration_priority: 3[30..=31];
        previous_frame_input_surface_control: 4[0..=10];
        previous_frame_input_arbitration_priority: 5[30..=31];
        stmm_input_surface_control: 6[0..=10];
        stmm_input_arbitration_priority: 7[30..=31];
        stmm_output_surface_control: 8[0..=10];
        stmm_output_arbitration_priority: 9[30..=31];
        denoised_current_output_surface_control: 10[0..=10];
        denoised_current_output_arbitration_priority: 11[30..=31];
        current_frame_output_surface_control: 12[0..=10];
        current_frame_output_arbitration_priority: 13[30..=31];
        previous_frame_output_surface_control: 14[0..=10];
        previous_frame_output_arbitration_priority: 15[30..=31];
        statistics_output_surface_control: 16[0..=10];
        statistics_output_arbitration_priority: 17[30..=31];
        alpha_vignette_surface_control: 18[0..=10];
        alpha_vignette_arbitration_priority: 19[30..=31];
        lace_ace_rgb_histogram_surface_control: 20[0..=10];
        lace_ace_rgb_histogram_arbitration_priority: 21[30..=31];
        skin_score_output_surface_control: 22[0..=10];
        skin_score_output_arbitration_priority: 23[30..=31];
    }
    wide {
        /// Surface addresses are 4K aligned; fields hold address >> 12.
        current_frame_input_address: 2[12..=47];
        previous_frame_input_address: 4[12..=47];
        stmm_input_address: 6[12..=47];
        stmm_output_address: 8[12..=47];
        denoised_current_output_address: 10[12..=47];
        current_frame_output_address: 12[12..=47];
        previous_frame_output_address: 14[12..=47];
        statistics_output_address: 16[12..=47];
        alpha_vignette_address: 18[12..=47];
        lace_ace_rgb_histogram_address: 20[12..=47];
        skin_score_output_address: 22[12..=47];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hwcmd::testing::assert_all;
    use crate::hwcmd::HwCommand;

    #[test]
    fn test_vebox_g9_generic_checks() {
        assert_all::<AceLaceState>();
        assert_all::<AlphaAoiState>();
        assert_all::<CapturePipeState>();
        assert_all::<CcmState>();
        assert_all::<CscState>();
        assert_all::<FrontEndCscState>();
        assert_all::<DndiState>();
        assert_all::<ProcampState>();
        assert_all::<TccState>();
        assert_all::<GamutState>();
        assert_all::<StdSteState>();
        assert_all::<VertexTableEntry>();
        assert_all::<VeboxState>();
        assert_all::<SurfaceState>();
        assert_all::<TilingConvert>();
        assert_all::<DiIecpSurfaceControlBits>();
        assert_all::<VebDiIecp>();
    }

    #[test]
    fn test_sizes() {
        assert_eq!(AceLaceState::BYTE_SIZE, 52);
        assert_eq!(AlphaAoiState::BYTE_SIZE, 12);
        assert_eq!(CapturePipeState::BYTE_SIZE, 28);
        assert_eq!(CcmState::BYTE_SIZE, 36);
        assert_eq!(CscState::BYTE_SIZE, 48);
        assert_eq!(FrontEndCscState::BYTE_SIZE, 48);
        assert_eq!(DndiState::BYTE_SIZE, 72);
        assert_eq!(ProcampState::BYTE_SIZE, 8);
        assert_eq!(TccState::BYTE_SIZE, 44);
        assert_eq!(GamutState::BYTE_SIZE, 152);
        assert_eq!(StdSteState::BYTE_SIZE, 116);
        assert_eq!(<IecpState as HwCommand>::BYTE_SIZE, 364);
        assert_eq!(<VertexTable as HwCommand>::BYTE_SIZE, 2048);
        assert_eq!(VeboxState::BYTE_SIZE, 64);
        assert_eq!(SurfaceState::BYTE_SIZE, 36);
        assert_eq!(TilingConvert::BYTE_SIZE, 20);
        assert_eq!(DiIecpSurfaceControlBits::BYTE_SIZE, 4);
        assert_eq!(VebDiIecp::BYTE_SIZE, 96);
    }

    #[test]
    fn test_dndi_defaults() {
        let dndi = DndiState::new();
        assert_eq!(dndi.initial_denoise_history(), 32);
        assert_eq!(dndi.denoise_history_increase(), 8);
        assert_eq!(dndi.block_noise_estimate_edge_threshold(), 16);
        assert_eq!(dndi.chroma_denoise_enable(), 1);
        assert_eq!(dndi.sad_tight_threshold(), 5);
        assert_eq!(dndi.content_adaptive_threshold_slope(), 9);
        assert_eq!(dndi.sad_tha(), 5);
        assert_eq!(dndi.sad_thb(), 10);
        assert_eq!(dndi.mc_pixel_consistency_threshold(), 25);
        assert_eq!(dndi.neighbor_pixel_threshold(), 10);
        assert_eq!(dndi.value(2), 32 << 10);
        assert_eq!(dndi.value(17), 5 | (10 << 4) | (25 << 10) | (10 << 19));
    }

    #[test]
    fn test_procamp_and_tcc_defaults() {
        let procamp = ProcampState::new();
        assert_eq!(procamp.value(0), 128 << 17);
        assert_eq!(procamp.value(1), 256 << 16);

        let tcc = TccState::new();
        assert_eq!(tcc.value(0), 0xDCDC_DC00);
        assert_eq!(tcc.value(1), 0xDCDC_DC00);
        assert_eq!(tcc.basecolor3(), 483);
        assert_eq!(tcc.colorbias2(), 150);
        assert_eq!(tcc.uvmaxcolor(), 448);
        assert_eq!(tcc.inv_uvmaxcolor(), 146);
    }

    #[test]
    fn test_ccm_and_csc_defaults() {
        let ccm = CcmState::new();
        let coefs = [
            ccm.c0(),
            ccm.c1(),
            ccm.c2(),
            ccm.c3(),
            ccm.c4(),
            ccm.c5(),
            ccm.c6(),
            ccm.c7(),
            ccm.c8(),
        ];
        assert_eq!(coefs, [2792, 1141, 34, 71, 3363, 131020, 131060, 168, 3434]);
        assert_eq!(ccm.color_correction_matrix_enable(), 0);

        let csc = CscState::new();
        assert_eq!((csc.c0(), csc.c4(), csc.c8()), (65536, 65536, 65536));
        assert_eq!(csc.value(1), 0);
    }

    #[test]
    fn test_ace_lace_curve_defaults() {
        let ace = AceLaceState::new();
        assert_eq!(ace.skin_threshold(), 26);
        assert_eq!(ace.value(1), 16 | (36 << 8) | (56 << 16) | (76 << 24));
        assert_eq!(ace.ymax(), 235);
        assert_eq!(ace.b10(), 216);
        assert_eq!(ace.s10(), 1024);
        assert_eq!(ace.max_ace_luma(), 0);
    }

    #[test]
    fn test_vebox_state_pointer_split() {
        let mut state = VeboxState::new();
        state.set_dndi_state_table_pointer(0x1_2345_6000 >> 12);
        assert_eq!(state.value(2), 0x2345_6000);
        assert_eq!(state.value(3), 0x1);
        state.set_arbitration_priority_control_for_lace_lut(2);
        state.set_lace_lut_table_pointer(0xFFFF_FFFF_F);
        assert_eq!(state.value(13), 0x8000_FFFF);
        assert_eq!(state.value(0), 0x7402_000E);
    }

    #[test]
    fn test_di_iecp_surface_control_embedding() {
        let mut bits = DiIecpSurfaceControlBits::new();
        bits.set_index_to_mocs_tables(2).set_tiled_resource_mode(1);

        let mut cmd = VebDiIecp::new();
        cmd.set_current_frame_output_surface_control(bits.value(0))
            .set_current_frame_output_address(0x8000_0000 >> 12);
        assert_eq!(cmd.value(12), 0x8000_0000 | (2 << 1) | (1 << 9));
        assert_eq!(cmd.value(13), 0);
        assert_eq!(cmd.value(0), 0x7403_0016);
    }

    #[test]
    fn test_gamut_defaults() {
        let gamut = GamutState::new();
        assert_eq!(gamut.global_mode_enable(), GamutState::GLOBAL_MODE_ADVANCED);
        assert_eq!(gamut.value(0), 436 << 16);
        assert_eq!(gamut.value(8), 0x0905_0201);
        assert_eq!(gamut.pwl_gamma_point_11(), 187);
        assert_eq!(gamut.pwl_gamma_bias_11(), 223);
        assert_eq!(gamut.pwl_inv_gamma_point_1(), 30);
        assert_eq!(gamut.pwl_inv_gamma_bias_11(), 215);
        assert_eq!(gamut.value(14), 0);
        assert_eq!(gamut.value(35), 287 | (164 << 10) | (205 << 20));
        assert_eq!(gamut.value(36), 0xB000_0334);
        assert_eq!(gamut.value(37), 0);
    }

    #[test]
    fn test_std_ste_defaults() {
        let ste = StdSteState::new();
        assert_eq!(ste.value(0), 0x9A6E_39F0);
        assert_eq!(ste.output_control(), StdSteState::OUTPUT_CONTROL_PIXELS);
        assert_eq!(ste.value(5), 20 << 16);
        assert_eq!(ste.inv_margin_vyu(), 1600);
        assert_eq!(ste.s0l(), 2043);
        assert_eq!(ste.s2u(), 1869);
        assert_eq!(ste.huep1(), 122);
        assert_eq!(ste.hues0_dark(), 299);
        assert_eq!(ste.skin_types_enable(), 0);
        assert_eq!(ste.skin_types_thresh(), 120);
    }

    #[test]
    fn test_iecp_state_layout() {
        let mut iecp = IecpState::new();
        assert_eq!(iecp.std_ste(), StdSteState::new());
        assert_eq!(iecp.tcc(), TccState::new());
        assert_eq!(iecp.value(IecpState::TCC), 0xDCDC_DC00);
        assert_eq!(iecp.value(IecpState::PROCAMP), 128 << 17);
        assert_eq!(iecp.value(IecpState::FRONT_END_CSC), 65536);

        let mut ccm = CcmState::new();
        ccm.set_color_correction_matrix_enable(1);
        iecp.set_ccm(&ccm);
        assert_eq!(iecp.value(IecpState::CCM) >> 31, 1);
        assert_eq!(iecp.ccm(), ccm);
        assert_eq!(iecp.alpha_aoi(), AlphaAoiState::new());

        let bytes = iecp.to_bytes();
        assert_eq!(bytes.len(), 364);
        let off = IecpState::PROCAMP * 4;
        assert_eq!(&bytes[off..off + 4], &(128u32 << 17).to_le_bytes());
        assert_eq!(IecpState::from_dwords(iecp.dwords()), Some(iecp));
        assert_eq!(IecpState::from_dwords(&[0; 90]), None);
    }

    #[test]
    fn test_vertex_table() {
        let table = VertexTable::from_vertices(&[(0x123, 0x456), (0xFFF, 0)]);
        assert_eq!(table.value(0), 0x0123_0456);
        assert_eq!(table.value(1), 0x0FFF_0000);
        assert_eq!(table.entry(1).map(|e| e.lv()), Some(0xFFF));
        assert_eq!(table.entry(511).map(|e| e.value(0)), Some(0));
        assert!(table.entry(VertexTable::ENTRIES).is_none());

        let mut table = VertexTable::default();
        assert!(!table.set_entry(512, VertexTableEntry::new()));
        let mut entry = VertexTableEntry::new();
        entry.set_cv(7);
        assert!(table.set_entry(511, entry));
        assert_eq!(table.to_bytes()[2044..], 7u32.to_le_bytes());
    }

    #[test]
    fn test_surface_state_header() {
        let mut ss = SurfaceState::new();
        assert_eq!(ss.value(0), 0x7400_0007);
        ss.set_width(1919).set_height(1079);
        assert_eq!(ss.value(2), (1919 << 4) | (1079 << 18));
        assert_eq!(TilingConvert::new().value(0), 0x7401_0003);
    }
}
