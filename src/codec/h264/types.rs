use bytes::Bytes;

use crate::error::{AvError, Result};

/// One NAL unit without its start code or length prefix.
#[derive(Debug, Clone)]
pub struct NALUnit {
    /// `nal_unit_type`, 5 bits
    pub nal_type: u8,
    /// `nal_ref_idc`, 2 bits
    pub nal_ref_idc: u8,
    /// The whole unit, header byte included
    pub data: Bytes,
}

impl NALUnit {
    /// Reads the one-byte NAL header, rejecting empty units and a set forbidden bit.
    pub fn parse(data: Bytes) -> Result<Self> {
        let header = *data
            .first()
            .ok_or_else(|| AvError::MalformedBitstream("empty NAL unit".into()))?;
        if header & 0x80 != 0 {
            return Err(AvError::MalformedBitstream(format!(
                "forbidden_zero_bit set in NAL header {:#04x}",
                header
            )));
        }
        Ok(Self {
            nal_type: header & 0x1F,
            nal_ref_idc: (header >> 5) & 0x03,
            data,
        })
    }

    /// The unit type from the header byte.
    pub fn unit_type(&self) -> NALUnitType {
        NALUnitType::from(self.nal_type)
    }

    /// True for IDR slices.
    pub fn is_keyframe(&self) -> bool {
        matches!(
            self.unit_type(),
            NALUnitType::CodedSliceIDR | NALUnitType::SPS | NALUnitType::PPS
        )
    }
}

/// Fields of a sequence parameter set that the pipeline acts on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SPSInfo {
    /// 66 for baseline
    pub profile_idc: u8,
    /// The six constraint_set flags and reserved bits
    pub constraint_flags: u8,
    /// Level times ten
    pub level_idc: u8,
    /// `seq_parameter_set_id`
    pub seq_parameter_set_id: u32,
    /// MaxFrameNum is `1 << log2_max_frame_num`
    pub log2_max_frame_num: u32,
    /// Picture order count scheme, 0 to 2
    pub pic_order_cnt_type: u32,
    /// Reference frames the decoder keeps
    pub max_num_ref_frames: u32,
    /// Display width after frame cropping
    pub width: u32,
    /// Display height after frame cropping
    pub height: u32,
    /// From VUI timing info, when present
    pub frame_rate: Option<f32>,
}

/// Fields of a picture parameter set that the pipeline acts on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PPSInfo {
    /// `pic_parameter_set_id`
    pub pic_parameter_set_id: u32,
    /// SPS this PPS refers to
    pub seq_parameter_set_id: u32,
    /// CABAC when set, CAVLC otherwise
    pub entropy_coding_mode_flag: bool,
    /// Slice headers carry deblocking controls when set
    pub deblocking_filter_control_present: bool,
}

/// The slice header subset produced by baseline, single-slice, POC type 2 streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceHeader {
    /// Address of the first macroblock, zero for a new picture
    pub first_mb_in_slice: u32,
    /// Kind of slice
    pub slice_type: SliceType,
    /// PPS the slice refers to
    pub pic_parameter_set_id: u32,
    /// `frame_num`, modulo MaxFrameNum
    pub frame_num: u32,
    /// Present on IDR slices only
    pub idr_pic_id: Option<u32>,
}

/// `slice_type` kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceType {
    /// Predicted
    P,
    /// Bi-predicted
    B,
    /// Intra
    I,
    /// Switching predicted
    SP,
    /// Switching intra
    SI,
}

impl SliceType {
    /// Maps `slice_type` (0..=9) to its kind; values 5..=9 repeat 0..=4.
    pub fn from_code(code: u32) -> Option<Self> {
        match code % 5 {
            _ if code > 9 => None,
            0 => Some(SliceType::P),
            1 => Some(SliceType::B),
            2 => Some(SliceType::I),
            3 => Some(SliceType::SP),
            _ => Some(SliceType::SI),
        }
    }

    /// Code signalling that every slice of the picture has this type.
    pub fn uniform_code(self) -> u32 {
        match self {
            SliceType::P => 5,
            SliceType::B => 6,
            SliceType::I => 7,
            SliceType::SP => 8,
            SliceType::SI => 9,
        }
    }
}

/// `nal_unit_type` values up to filler data. Later types map to `Unspecified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NALUnitType {
    /// Type 0 and anything past filler data
    Unspecified = 0,
    /// Slice of a non-IDR picture
    CodedSliceNonIDR = 1,
    /// Slice data partition A
    CodedSliceDataPartitionA = 2,
    /// Slice data partition B
    CodedSliceDataPartitionB = 3,
    /// Slice data partition C
    CodedSliceDataPartitionC = 4,
    /// Slice of an IDR picture
    CodedSliceIDR = 5,
    /// Supplemental enhancement information
    SEI = 6,
    /// Sequence parameter set
    SPS = 7,
    /// Picture parameter set
    PPS = 8,
    /// Access unit delimiter
    AccessUnitDelimiter = 9,
    /// End of sequence
    EndOfSequence = 10,
    /// End of stream
    EndOfStream = 11,
    /// Filler data
    FillerData = 12,
}

impl NALUnitType {
    /// True for coded slices and data partitions.
    pub fn is_slice(self) -> bool {
        matches!(
            self,
            NALUnitType::CodedSliceNonIDR
                | NALUnitType::CodedSliceDataPartitionA
                | NALUnitType::CodedSliceDataPartitionB
                | NALUnitType::CodedSliceDataPartitionC
                | NALUnitType::CodedSliceIDR
        )
    }

    /// True for SPS and PPS.
    pub fn is_parameter_set(self) -> bool {
        matches!(self, NALUnitType::SPS | NALUnitType::PPS)
    }
}

impl From<u8> for NALUnitType {
    fn from(value: u8) -> Self {
        match value {
            1 => NALUnitType::CodedSliceNonIDR,
            2 => NALUnitType::CodedSliceDataPartitionA,
            3 => NALUnitType::CodedSliceDataPartitionB,
            4 => NALUnitType::CodedSliceDataPartitionC,
            5 => NALUnitType::CodedSliceIDR,
            6 => NALUnitType::SEI,
            7 => NALUnitType::SPS,
            8 => NALUnitType::PPS,
            9 => NALUnitType::AccessUnitDelimiter,
            10 => NALUnitType::EndOfSequence,
            11 => NALUnitType::EndOfStream,
            12 => NALUnitType::FillerData,
            _ => NALUnitType::Unspecified,
        }
    }
}
