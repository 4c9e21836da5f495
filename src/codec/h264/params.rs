//! Writing and carrying SPS/PPS parameter sets.

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use bytes::Bytes;

use super::parser::{escape_rbsp, parse_pps, parse_sps, unescape_rbsp};
use super::types::{NALUnit, NALUnitType, PPSInfo, SPSInfo};
use crate::error::{AvError, Result};
use crate::utils::BitWriter;

/// `profile_idc` of the constrained baseline streams written here.
pub const PROFILE_BASELINE: u8 = 66;

/// An SPS/PPS pair, each a complete NAL unit (header byte, escaped payload).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSets {
    /// SPS NAL unit
    pub sps: Bytes,
    /// PPS NAL unit
    pub pps: Bytes,
}

impl ParameterSets {
    /// Pairs an SPS and a PPS NAL unit.
    pub fn new(sps: impl Into<Bytes>, pps: impl Into<Bytes>) -> Self {
        Self {
            sps: sps.into(),
            pps: pps.into(),
        }
    }

    /// Parses both units, checking their NAL types.
    pub fn parse(&self) -> Result<(SPSInfo, PPSInfo)> {
        let sps = NALUnit::parse(self.sps.clone())?;
        let pps = NALUnit::parse(self.pps.clone())?;
        if sps.unit_type() != NALUnitType::SPS || pps.unit_type() != NALUnitType::PPS {
            return Err(AvError::MalformedBitstream(format!(
                "expected SPS and PPS, got NAL types {} and {}",
                sps.nal_type, pps.nal_type
            )));
        }
        Ok((
            parse_sps(&unescape_rbsp(&self.sps[1..]))?,
            parse_pps(&unescape_rbsp(&self.pps[1..]))?,
        ))
    }

    /// SDP `sprop-parameter-sets` value: base64 SPS and PPS joined by a comma.
    pub fn to_sprop(&self) -> String {
        format!(
            "{},{}",
            BASE64_STANDARD.encode(&self.sps),
            BASE64_STANDARD.encode(&self.pps)
        )
    }

    /// Parses an SDP `sprop-parameter-sets` value.
    pub fn from_sprop(value: &str) -> Result<Self> {
        let mut sps = None;
        let mut pps = None;
        for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let nal = BASE64_STANDARD
                .decode(part)
                .map_err(|e| AvError::MalformedBitstream(format!("sprop base64: {}", e)))?;
            match NALUnit::parse(Bytes::from(nal))? {
                unit if unit.unit_type() == NALUnitType::SPS => sps = Some(unit.data),
                unit if unit.unit_type() == NALUnitType::PPS => pps = Some(unit.data),
                unit => log::debug!("ignoring NAL type {} in sprop-parameter-sets", unit.nal_type),
            }
        }
        match (sps, pps) {
            (Some(sps), Some(pps)) => Ok(Self { sps, pps }),
            _ => Err(AvError::MalformedBitstream(
                "sprop-parameter-sets needs both SPS and PPS".into(),
            )),
        }
    }
}

/// Inputs for a constrained-baseline SPS.
#[derive(Debug, Clone, Copy)]
pub struct SpsParams {
    /// Display width in pixels
    pub width: u32,
    /// Display height in pixels
    pub height: u32,
    /// Frame rate signalled in the VUI timing info
    pub fps: u32,
    /// Bits of `frame_num`
    pub log2_max_frame_num: u32,
}

impl SpsParams {
    /// Baseline parameters for `width` x `height` at `fps`.
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps,
            log2_max_frame_num: 4,
        }
    }

    /// Smallest level whose frame size limit (in macroblocks) fits the picture.
    pub fn level_idc(&self) -> u8 {
        let mbs = self.width.div_ceil(16) * self.height.div_ceil(16);
        match mbs {
            0..=99 => 10,
            100..=396 => 21,
            397..=1620 => 30,
            1621..=3600 => 31,
            3601..=8192 => 40,
            8193..=22080 => 50,
            _ => 51,
        }
    }
}

/// Writes an SPS NAL unit: baseline profile, POC type 2, one reference frame,
/// cropping for sizes that aren't macroblock multiples, VUI timing from `fps`.
pub fn write_sps(params: &SpsParams) -> Bytes {
    let width_mbs = params.width.div_ceil(16);
    let height_mbs = params.height.div_ceil(16);
    let crop_right = (width_mbs * 16 - params.width) / 2;
    let crop_bottom = (height_mbs * 16 - params.height) / 2;

    let mut w = BitWriter::new();
    w.write_bits(PROFILE_BASELINE as u32, 8);
    w.write_bits(0xC0, 8); // constraint_set0 + constraint_set1
    w.write_bits(params.level_idc() as u32, 8);
    w.write_golomb(0); // seq_parameter_set_id
    w.write_golomb(params.log2_max_frame_num - 4);
    w.write_golomb(2); // pic_order_cnt_type
    w.write_golomb(1); // max_num_ref_frames
    w.write_bit(false); // gaps_in_frame_num_value_allowed_flag
    w.write_golomb(width_mbs - 1);
    w.write_golomb(height_mbs - 1);
    w.write_bit(true); // frame_mbs_only_flag
    w.write_bit(true); // direct_8x8_inference_flag

    let cropped = crop_right != 0 || crop_bottom != 0;
    w.write_bit(cropped);
    if cropped {
        w.write_golomb(0);
        w.write_golomb(crop_right);
        w.write_golomb(0);
        w.write_golomb(crop_bottom);
    }

    w.write_bit(true); // vui_parameters_present_flag
    w.write_bit(false); // aspect_ratio_info_present_flag
    w.write_bit(false); // overscan_info_present_flag
    w.write_bit(false); // video_signal_type_present_flag
    w.write_bit(false); // chroma_loc_info_present_flag
    w.write_bit(true); // timing_info_present_flag
    w.write_bits(1, 32); // num_units_in_tick
    w.write_bits(params.fps.max(1) * 2, 32); // time_scale
    w.write_bit(true); // fixed_frame_rate_flag
    w.write_bit(false); // nal_hrd_parameters_present_flag
    w.write_bit(false); // vcl_hrd_parameters_present_flag
    w.write_bit(false); // pic_struct_present_flag
    w.write_bit(false); // bitstream_restriction_flag
    w.write_trailing_bits();

    nal_unit(3, NALUnitType::SPS, &w.into_bytes())
}

/// Writes a CAVLC PPS with deblocking control present.
pub fn write_pps() -> Bytes {
    let mut w = BitWriter::new();
    w.write_golomb(0); // pic_parameter_set_id
    w.write_golomb(0); // seq_parameter_set_id
    w.write_bit(false); // entropy_coding_mode_flag
    w.write_bit(false); // bottom_field_pic_order_in_frame_present_flag
    w.write_golomb(0); // num_slice_groups_minus1
    w.write_golomb(0); // num_ref_idx_l0_default_active_minus1
    w.write_golomb(0); // num_ref_idx_l1_default_active_minus1
    w.write_bit(false); // weighted_pred_flag
    w.write_bits(0, 2); // weighted_bipred_idc
    w.write_signed_golomb(0); // pic_init_qp_minus26
    w.write_signed_golomb(0); // pic_init_qs_minus26
    w.write_signed_golomb(0); // chroma_qp_index_offset
    w.write_bit(true); // deblocking_filter_control_present_flag
    w.write_bit(false); // constrained_intra_pred_flag
    w.write_bit(false); // redundant_pic_cnt_present_flag
    w.write_trailing_bits();

    nal_unit(3, NALUnitType::PPS, &w.into_bytes())
}

/// Prepends a NAL header to an RBSP and applies emulation prevention.
pub fn nal_unit(nal_ref_idc: u8, nal_type: NALUnitType, rbsp: &[u8]) -> Bytes {
    let escaped = escape_rbsp(rbsp);
    let mut out = Vec::with_capacity(escaped.len() + 1);
    out.push(((nal_ref_idc & 0x03) << 5) | nal_type as u8);
    out.extend_from_slice(&escaped);
    Bytes::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_written_sps_parses_back() {
        let sps = write_sps(&SpsParams::new(640, 480, 30));
        let pps = write_pps();
        assert_eq!(sps[0], 0x67);
        assert_eq!(pps[0], 0x68);

        let (sps_info, pps_info) = ParameterSets::new(sps, pps).parse().unwrap();
        assert_eq!(sps_info.profile_idc, PROFILE_BASELINE);
        assert_eq!(sps_info.level_idc, 30);
        assert_eq!((sps_info.width, sps_info.height), (640, 480));
        assert_eq!(sps_info.frame_rate, Some(30.0));
        assert_eq!(sps_info.log2_max_frame_num, 4);
        assert_eq!(sps_info.pic_order_cnt_type, 2);
        assert!(pps_info.deblocking_filter_control_present);
        assert!(!pps_info.entropy_coding_mode_flag);
    }

    #[test]
    fn test_cropped_dimensions() {
        let sps = write_sps(&SpsParams::new(1920, 1080, 25));
        let info = parse_sps(&unescape_rbsp(&sps[1..])).unwrap();
        assert_eq!((info.width, info.height), (1920, 1080));
        assert_eq!(info.level_idc, 40);

        let sps = write_sps(&SpsParams::new(358, 202, 15));
        let info = parse_sps(&unescape_rbsp(&sps[1..])).unwrap();
        assert_eq!((info.width, info.height), (358, 202));
    }

    #[test]
    fn test_sprop_round_trip() {
        let sets = ParameterSets::new(write_sps(&SpsParams::new(320, 240, 30)), write_pps());
        let sprop = sets.to_sprop();
        assert!(sprop.starts_with("Z0LA"));
        assert_eq!(ParameterSets::from_sprop(&sprop).unwrap(), sets);

        assert!(ParameterSets::from_sprop("aM4=").is_err());
        assert!(ParameterSets::from_sprop("not base64!").is_err());
    }
}
