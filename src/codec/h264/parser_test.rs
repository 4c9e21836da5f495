use super::params::{nal_unit, write_pps, write_sps, SpsParams};
use super::parser::*;
use super::types::*;
use crate::utils::{BitReader, BitWriter};
use pretty_assertions::assert_eq;

#[test]
fn test_emulation_prevention() {
    assert_eq!(unescape_rbsp(&[0x00, 0x00, 0x03, 0x01]), vec![0x00, 0x00, 0x01]);
    assert_eq!(
        unescape_rbsp(&[0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x02]),
        vec![0x00, 0x00, 0x01, 0x00, 0x00, 0x02]
    );
    assert_eq!(unescape_rbsp(&[0x00, 0x01, 0x02, 0x03]), vec![0x00, 0x01, 0x02, 0x03]);

    let raw = [0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x03, 0xFF];
    let escaped = escape_rbsp(&raw);
    assert_eq!(
        escaped,
        vec![0x00, 0x00, 0x03, 0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x03, 0xFF]
    );
    assert_eq!(unescape_rbsp(&escaped), raw.to_vec());
}

#[test]
fn test_parse_nalu() {
    let parser = H264Parser::new();

    let nalu = parser.parse_nalu(&[0x01, 0x02, 0x03, 0x04]).unwrap();
    assert_eq!(nalu.nal_type, 1);
    assert_eq!(nalu.nal_ref_idc, 0);
    assert!(!nalu.is_keyframe());

    let nalu = parser.parse_nalu(&[0x65, 0x02, 0x03, 0x04]).unwrap();
    assert_eq!(nalu.unit_type(), NALUnitType::CodedSliceIDR);
    assert_eq!(nalu.nal_ref_idc, 3);
    assert!(nalu.is_keyframe());

    assert!(parser.parse_nalu(&[]).is_err());
    assert!(parser.parse_nalu(&[0xE5, 0x00]).is_err());
}

#[test]
fn test_dimensions() {
    let parser = H264Parser::new();
    assert_eq!(parser.dimensions(), None);

    parser
        .parse_nalu(&write_sps(&SpsParams::new(1280, 720, 30)))
        .unwrap();
    parser.parse_nalu(&write_pps()).unwrap();

    assert_eq!(parser.dimensions(), Some((1280, 720)));
    assert_eq!(parser.sps().unwrap().level_idc, 31);
    assert_eq!(parser.pps().unwrap().pic_parameter_set_id, 0);
}

#[test]
fn test_truncated_sps() {
    let sps = write_sps(&SpsParams::new(640, 480, 30));
    let parser = H264Parser::new();
    assert!(parser.parse_nalu(&sps[..6]).is_err());
    assert_eq!(parser.dimensions(), None);
}

#[test]
fn test_slice_header() {
    let sps = parse_sps(&unescape_rbsp(&write_sps(&SpsParams::new(64, 64, 30))[1..])).unwrap();
    let pps = parse_pps(&unescape_rbsp(&write_pps()[1..])).unwrap();

    let mut w = BitWriter::new();
    w.write_golomb(0); // first_mb_in_slice
    w.write_golomb(SliceType::P.uniform_code());
    w.write_golomb(0); // pic_parameter_set_id
    w.write_bits(9, sps.log2_max_frame_num);
    w.write_bit(false); // num_ref_idx_active_override_flag
    w.write_bit(false); // ref_pic_list_modification_flag_l0
    w.write_bit(false); // adaptive_ref_pic_marking_mode_flag
    w.write_signed_golomb(0);
    w.write_golomb(1); // disable_deblocking_filter_idc
    w.align_byte();
    w.write_bytes(&[0xAA, 0x80]);

    let nal = nal_unit(2, NALUnitType::CodedSliceNonIDR, &w.into_bytes());
    let nalu = NALUnit::parse(nal.clone()).unwrap();
    let rbsp = unescape_rbsp(&nal[1..]);
    let mut reader = BitReader::new(&rbsp);
    let header = read_slice_header(&mut reader, &nalu, &sps, &pps).unwrap();

    assert_eq!(header.slice_type, SliceType::P);
    assert_eq!(header.frame_num, 9);
    assert_eq!(header.idr_pic_id, None);
    reader.align_byte();
    assert_eq!(&rbsp[reader.byte_position()..], &[0xAA, 0x80]);
}

#[test]
fn test_slice_type_codes() {
    assert_eq!(SliceType::from_code(2), Some(SliceType::I));
    assert_eq!(SliceType::from_code(7), Some(SliceType::I));
    assert_eq!(SliceType::from_code(5), Some(SliceType::P));
    assert_eq!(SliceType::from_code(10), None);
}

#[test]
fn test_sps_with_oversized_frame_num_is_rejected() {
    // log2_max_frame_num_minus4 decodes to just under 2^32
    let data = [66, 0, 30, 0x80, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF, 0x80, 0, 0];
    let err = parse_sps(&data).unwrap_err();
    assert!(matches!(err, crate::AvError::MalformedBitstream(_)));

    let parser = H264Parser::new();
    let mut nal = vec![0x67];
    nal.extend_from_slice(&data);
    assert!(parser.parse_nalu(&nal).is_err());
    assert_eq!(parser.sps(), None);
}

/// Baseline SPS body up to (not including) `frame_cropping_flag`.
fn baseline_sps_head(width_mbs_minus1: u32, height_mbs_minus1: u32) -> BitWriter {
    let mut w = BitWriter::new();
    w.write_bits(66, 8);
    w.write_bits(0, 8);
    w.write_bits(30, 8);
    w.write_golomb(0); // seq_parameter_set_id
    w.write_golomb(0); // log2_max_frame_num_minus4
    w.write_golomb(2); // pic_order_cnt_type
    w.write_golomb(1); // max_num_ref_frames
    w.write_bit(false); // gaps_in_frame_num_value_allowed_flag
    w.write_golomb(width_mbs_minus1);
    w.write_golomb(height_mbs_minus1);
    w.write_bit(true); // frame_mbs_only_flag
    w.write_bit(true); // direct_8x8_inference_flag
    w
}

#[test]
fn test_sps_dimension_overflow_is_rejected() {
    let mut w = baseline_sps_head(u32::MAX - 1, 0);
    w.write_bit(false);
    w.write_bit(false);
    w.write_trailing_bits();
    assert!(parse_sps(&w.into_bytes()).is_err());

    let mut w = baseline_sps_head(3, 2);
    w.write_bit(true); // frame_cropping_flag
    w.write_golomb(0x7FFF_FFFF);
    w.write_golomb(0x7FFF_FFFF);
    w.write_golomb(0);
    w.write_golomb(0);
    w.write_bit(false);
    w.write_trailing_bits();
    assert!(parse_sps(&w.into_bytes()).is_err());

    let mut w = baseline_sps_head(3, 2);
    w.write_bit(false);
    w.write_bit(false);
    w.write_trailing_bits();
    let sps = parse_sps(&w.into_bytes()).unwrap();
    assert_eq!((sps.width, sps.height), (64, 48));
}

#[test]
fn test_scaling_list_delta_out_of_range() {
    let mut w = BitWriter::new();
    w.write_bits(100, 8); // high profile
    w.write_bits(0, 8);
    w.write_bits(40, 8);
    w.write_golomb(0); // seq_parameter_set_id
    w.write_golomb(1); // chroma_format_idc
    w.write_golomb(0); // bit_depth_luma_minus8
    w.write_golomb(0); // bit_depth_chroma_minus8
    w.write_bit(false); // qpprime_y_zero_transform_bypass_flag
    w.write_bit(true); // seq_scaling_matrix_present_flag
    w.write_bit(true); // seq_scaling_list_present_flag[0]
    w.write_signed_golomb(100_000);
    w.write_trailing_bits();

    let err = parse_sps(&w.into_bytes()).unwrap_err();
    assert!(err.to_string().contains("delta_scale"));
}

#[test]
fn test_pps_with_slice_groups_is_unsupported() {
    let mut w = BitWriter::new();
    w.write_golomb(0); // pic_parameter_set_id
    w.write_golomb(0); // seq_parameter_set_id
    w.write_bit(false); // entropy_coding_mode_flag
    w.write_bit(false); // bottom_field_pic_order_in_frame_present_flag
    w.write_golomb(3); // num_slice_groups_minus1
    w.write_trailing_bits();
    assert!(matches!(
        parse_pps(&w.into_bytes()),
        Err(crate::AvError::UnsupportedFormat(_))
    ));
}
