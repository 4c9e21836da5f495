use bytes::Bytes;
use parking_lot::Mutex;

use super::types::{NALUnit, NALUnitType, PPSInfo, SPSInfo, SliceHeader, SliceType};
use crate::error::{AvError, Result};
use crate::utils::BitReader;

const HIGH_PROFILES: [u8; 10] = [100, 110, 122, 244, 44, 83, 86, 118, 128, 138];
const EXTENDED_SAR: u32 = 255;
/// Upper bound for `log2_max_frame_num_minus4` and `log2_max_pic_order_cnt_lsb_minus4`.
const MAX_LOG2_MINUS4: u32 = 12;
/// 16384 pixels, past the largest picture any H.264 level allows.
const MAX_DIMENSION_IN_MBS: u32 = 1024;
const MAX_POC_CYCLE: u32 = 255;

#[derive(Debug, Default)]
struct ParserState {
    sps: Option<SPSInfo>,
    pps: Option<PPSInfo>,
}

/// Tracks the active parameter sets of an H.264 stream.
#[derive(Debug, Default)]
pub struct H264Parser {
    state: Mutex<ParserState>,
}

impl H264Parser {
    /// A parser with no parameter sets yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one NAL unit (header byte included), remembering SPS and PPS contents.
    pub fn parse_nalu(&self, data: &[u8]) -> Result<NALUnit> {
        let nalu = NALUnit::parse(Bytes::copy_from_slice(data))?;

        match nalu.unit_type() {
            NALUnitType::SPS => {
                let sps = parse_sps(&unescape_rbsp(&data[1..]))?;
                log::debug!(
                    "SPS: profile {} level {} {}x{}",
                    sps.profile_idc,
                    sps.level_idc,
                    sps.width,
                    sps.height
                );
                self.state.lock().sps = Some(sps);
            }
            NALUnitType::PPS => {
                let pps = parse_pps(&unescape_rbsp(&data[1..]))?;
                self.state.lock().pps = Some(pps);
            }
            _ => {}
        }

        Ok(nalu)
    }

    /// The last SPS parsed.
    pub fn sps(&self) -> Option<SPSInfo> {
        self.state.lock().sps.clone()
    }

    /// The last PPS parsed.
    pub fn pps(&self) -> Option<PPSInfo> {
        self.state.lock().pps.clone()
    }

    /// Display size from the last SPS.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let state = self.state.lock();
        state.sps.as_ref().map(|sps| (sps.width, sps.height))
    }

    /// True for IDR slices.
    pub fn is_keyframe(&self, nalu: &NALUnit) -> bool {
        nalu.is_keyframe()
    }
}

/// Strips emulation-prevention bytes (`00 00 03` becomes `00 00`).
pub fn unescape_rbsp(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0;

    for &byte in data {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        out.push(byte);
    }
    out
}

/// Inserts emulation-prevention bytes so no start code can appear in the payload.
pub fn escape_rbsp(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 64);
    let mut zeros = 0;

    for &byte in data {
        if zeros >= 2 && byte <= 0x03 {
            out.push(0x03);
            zeros = 0;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        out.push(byte);
    }
    out
}

/// Parses `seq_parameter_set_rbsp()` (NAL header excluded, emulation prevention removed).
pub fn parse_sps(data: &[u8]) -> Result<SPSInfo> {
    let mut reader = BitReader::new(data);

    let profile_idc = reader.read_bits(8)? as u8;
    let constraint_flags = reader.read_bits(8)? as u8;
    let level_idc = reader.read_bits(8)? as u8;
    let seq_parameter_set_id = reader.read_golomb()?;
    if seq_parameter_set_id > 31 {
        return Err(AvError::MalformedBitstream(format!(
            "seq_parameter_set_id {} out of range",
            seq_parameter_set_id
        )));
    }

    let mut chroma_format_idc = 1;
    if HIGH_PROFILES.contains(&profile_idc) {
        chroma_format_idc = reader.read_golomb()?;
        if chroma_format_idc > 3 {
            return Err(malformed("chroma_format_idc", chroma_format_idc));
        }
        if chroma_format_idc == 3 && reader.read_bit()? {
            // separate_colour_plane_flag: planes coded as monochrome
            chroma_format_idc = 0;
        }
        reader.read_golomb()?; // bit_depth_luma_minus8
        reader.read_golomb()?; // bit_depth_chroma_minus8
        reader.read_bit()?; // qpprime_y_zero_transform_bypass_flag

        if reader.read_bit()? {
            let count = if chroma_format_idc != 3 { 8 } else { 12 };
            for i in 0..count {
                if reader.read_bit()? {
                    skip_scaling_list(&mut reader, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    let log2_max_frame_num_minus4 = reader.read_golomb()?;
    if log2_max_frame_num_minus4 > MAX_LOG2_MINUS4 {
        return Err(malformed("log2_max_frame_num_minus4", log2_max_frame_num_minus4));
    }
    let log2_max_frame_num = log2_max_frame_num_minus4 + 4;
    let pic_order_cnt_type = reader.read_golomb()?;
    match pic_order_cnt_type {
        0 => {
            let log2_max_poc_lsb_minus4 = reader.read_golomb()?;
            if log2_max_poc_lsb_minus4 > MAX_LOG2_MINUS4 {
                return Err(malformed(
                    "log2_max_pic_order_cnt_lsb_minus4",
                    log2_max_poc_lsb_minus4,
                ));
            }
        }
        1 => {
            reader.read_bit()?; // delta_pic_order_always_zero_flag
            reader.read_signed_golomb()?; // offset_for_non_ref_pic
            reader.read_signed_golomb()?; // offset_for_top_to_bottom_field
            let cycle = reader.read_golomb()?;
            if cycle > MAX_POC_CYCLE {
                return Err(malformed("num_ref_frames_in_pic_order_cnt_cycle", cycle));
            }
            for _ in 0..cycle {
                reader.read_signed_golomb()?;
            }
        }
        2 => {}
        other => {
            return Err(AvError::MalformedBitstream(format!(
                "pic_order_cnt_type {} out of range",
                other
            )))
        }
    }

    let max_num_ref_frames = reader.read_golomb()?;
    reader.read_bit()?; // gaps_in_frame_num_value_allowed_flag

    let pic_width_in_mbs = read_dimension_in_mbs(&mut reader, "pic_width_in_mbs_minus1")?;
    let pic_height_in_map_units =
        read_dimension_in_mbs(&mut reader, "pic_height_in_map_units_minus1")?;
    let frame_mbs_only = reader.read_bit()? as u32;
    if frame_mbs_only == 0 {
        reader.read_bit()?; // mb_adaptive_frame_field_flag
    }
    reader.read_bit()?; // direct_8x8_inference_flag

    // both factors are bounded by MAX_DIMENSION_IN_MBS, so neither product overflows
    let mut width = pic_width_in_mbs * 16;
    let mut height = (2 - frame_mbs_only) * pic_height_in_map_units * 16;

    if reader.read_bit()? {
        let (crop_x, crop_y) = match chroma_format_idc {
            0 => (1, 2 - frame_mbs_only),
            1 => (2, 2 * (2 - frame_mbs_only)),
            2 => (2, 2 - frame_mbs_only),
            _ => (1, 2 - frame_mbs_only),
        };
        let left = reader.read_golomb()?;
        let right = reader.read_golomb()?;
        let top = reader.read_golomb()?;
        let bottom = reader.read_golomb()?;
        width = crop(width, crop_x, left, right)
            .ok_or_else(|| AvError::MalformedBitstream("horizontal crop exceeds width".into()))?;
        height = crop(height, crop_y, top, bottom)
            .ok_or_else(|| AvError::MalformedBitstream("vertical crop exceeds height".into()))?;
        if width == 0 || height == 0 {
            return Err(AvError::MalformedBitstream(
                "cropping leaves an empty picture".into(),
            ));
        }
    }

    let frame_rate = if reader.read_bit()? {
        parse_vui_frame_rate(&mut reader)?
    } else {
        None
    };

    Ok(SPSInfo {
        profile_idc,
        constraint_flags,
        level_idc,
        seq_parameter_set_id,
        log2_max_frame_num,
        pic_order_cnt_type,
        max_num_ref_frames,
        width,
        height,
        frame_rate,
    })
}

/// Reads VUI fields up to `timing_info`, which is all the pipeline uses.
fn parse_vui_frame_rate(reader: &mut BitReader) -> Result<Option<f32>> {
    if reader.read_bit()? {
        let aspect_ratio_idc = reader.read_bits(8)?;
        if aspect_ratio_idc == EXTENDED_SAR {
            reader.skip_bits(32)?; // sar_width, sar_height
        }
    }
    if reader.read_bit()? {
        reader.read_bit()?; // overscan_appropriate_flag
    }
    if reader.read_bit()? {
        reader.skip_bits(4)?; // video_format, video_full_range_flag
        if reader.read_bit()? {
            reader.skip_bits(24)?; // colour_primaries, transfer, matrix
        }
    }
    if reader.read_bit()? {
        reader.read_golomb()?;
        reader.read_golomb()?;
    }
    if !reader.read_bit()? {
        return Ok(None);
    }

    let num_units_in_tick = reader.read_bits(32)?;
    let time_scale = reader.read_bits(32)?;
    if num_units_in_tick == 0 {
        return Ok(None);
    }
    Ok(Some(time_scale as f32 / (2.0 * num_units_in_tick as f32)))
}

/// Parses a PPS RBSP (header byte and emulation prevention removed).
pub fn parse_pps(data: &[u8]) -> Result<PPSInfo> {
    let mut reader = BitReader::new(data);

    let pic_parameter_set_id = reader.read_golomb()?;
    let seq_parameter_set_id = reader.read_golomb()?;
    let entropy_coding_mode_flag = reader.read_bit()?;
    reader.read_bit()?; // bottom_field_pic_order_in_frame_present_flag

    let num_slice_groups_minus1 = reader.read_golomb()?;
    if num_slice_groups_minus1 > 0 {
        return Err(AvError::UnsupportedFormat(
            "slice groups (FMO) are not supported".into(),
        ));
    }
    reader.read_golomb()?; // num_ref_idx_l0_default_active_minus1
    reader.read_golomb()?; // num_ref_idx_l1_default_active_minus1
    reader.read_bit()?; // weighted_pred_flag
    reader.skip_bits(2)?; // weighted_bipred_idc
    reader.read_signed_golomb()?; // pic_init_qp_minus26
    reader.read_signed_golomb()?; // pic_init_qs_minus26
    reader.read_signed_golomb()?; // chroma_qp_index_offset
    let deblocking_filter_control_present = reader.read_bit()?;

    Ok(PPSInfo {
        pic_parameter_set_id,
        seq_parameter_set_id,
        entropy_coding_mode_flag,
        deblocking_filter_control_present,
    })
}

/// Reads a baseline slice header, leaving `reader` at the start of `slice_data()`.
///
/// Only I and P slices with POC type 2 and no reference list reordering are
/// understood; anything else is reported as unsupported.
pub fn read_slice_header(
    reader: &mut BitReader,
    nalu: &NALUnit,
    sps: &SPSInfo,
    pps: &PPSInfo,
) -> Result<SliceHeader> {
    let is_idr = nalu.unit_type() == NALUnitType::CodedSliceIDR;

    let first_mb_in_slice = reader.read_golomb()?;
    let code = reader.read_golomb()?;
    let slice_type = SliceType::from_code(code)
        .ok_or_else(|| AvError::MalformedBitstream(format!("slice_type {} out of range", code)))?;
    if !matches!(slice_type, SliceType::I | SliceType::P) {
        return Err(AvError::UnsupportedFormat(format!(
            "{:?} slices are not supported",
            slice_type
        )));
    }
    if sps.pic_order_cnt_type != 2 {
        return Err(AvError::UnsupportedFormat(format!(
            "pic_order_cnt_type {} slices are not supported",
            sps.pic_order_cnt_type
        )));
    }
    let pic_parameter_set_id = reader.read_golomb()?;
    let frame_num = reader.read_bits(sps.log2_max_frame_num)?;
    let idr_pic_id = if is_idr {
        Some(reader.read_golomb()?)
    } else {
        None
    };

    if slice_type == SliceType::P {
        if reader.read_bit()? {
            reader.read_golomb()?; // num_ref_idx_l0_active_minus1
        }
        if reader.read_bit()? {
            return Err(AvError::UnsupportedFormat(
                "reference list modification is not supported".into(),
            ));
        }
    }

    if nalu.nal_ref_idc != 0 {
        if is_idr {
            reader.read_bit()?; // no_output_of_prior_pics_flag
            reader.read_bit()?; // long_term_reference_flag
        } else if reader.read_bit()? {
            return Err(AvError::UnsupportedFormat(
                "adaptive reference picture marking is not supported".into(),
            ));
        }
    }

    reader.read_signed_golomb()?; // slice_qp_delta
    if pps.deblocking_filter_control_present {
        let disable_deblocking_filter_idc = reader.read_golomb()?;
        if disable_deblocking_filter_idc != 1 {
            reader.read_signed_golomb()?; // slice_alpha_c0_offset_div2
            reader.read_signed_golomb()?; // slice_beta_offset_div2
        }
    }

    Ok(SliceHeader {
        first_mb_in_slice,
        slice_type,
        pic_parameter_set_id,
        frame_num,
        idr_pic_id,
    })
}

fn malformed(field: &str, value: u32) -> AvError {
    AvError::MalformedBitstream(format!("{} {} out of range", field, value))
}

/// Reads a `*_minus1` macroblock count and returns the count itself.
fn read_dimension_in_mbs(reader: &mut BitReader, field: &str) -> Result<u32> {
    let minus1 = reader.read_golomb()?;
    if minus1 >= MAX_DIMENSION_IN_MBS {
        return Err(malformed(field, minus1));
    }
    Ok(minus1 + 1)
}

/// `size - unit * (a + b)`, or `None` if the crop does not fit.
fn crop(size: u32, unit: u32, a: u32, b: u32) -> Option<u32> {
    let amount = a.checked_add(b)?.checked_mul(unit)?;
    size.checked_sub(amount)
}

fn skip_scaling_list(reader: &mut BitReader, size: usize) -> Result<()> {
    let mut last_scale: i32 = 8;
    let mut next_scale: i32 = 8;

    for _ in 0..size {
        if next_scale != 0 {
            let delta_scale = reader.read_signed_golomb()?;
            if !(-128..=127).contains(&delta_scale) {
                return Err(AvError::MalformedBitstream(format!(
                    "delta_scale {} out of range",
                    delta_scale
                )));
            }
            next_scale = (last_scale + delta_scale + 256) % 256;
        }
        last_scale = if next_scale == 0 { last_scale } else { next_scale };
    }

    Ok(())
}
