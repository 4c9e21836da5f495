use crate::utils::BitWriter;

/// Length of an ADTS header without CRC.
pub const ADTS_HEADER_SIZE: usize = 7;
/// The 12-bit value every ADTS header starts with.
pub const ADTS_SYNC_WORD: u32 = 0xFFF;

const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Index of `sample_rate` in the MPEG-4 sampling frequency table.
pub fn sample_rate_index(sample_rate: u32) -> Option<u8> {
    SAMPLE_RATES
        .iter()
        .position(|&rate| rate == sample_rate)
        .map(|i| i as u8)
}

/// Sampling frequency at `index` in the MPEG-4 table.
pub fn sample_rate_from_index(index: u8) -> Option<u32> {
    SAMPLE_RATES.get(index as usize).copied()
}

/// ADTS profile field; the MPEG-4 audio object type is this value plus one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileType {
    /// AAC Main
    Main = 0,
    /// AAC Low Complexity
    LC = 1,
    /// AAC Scalable Sample Rate
    SSR = 2,
    /// AAC Long Term Prediction
    LTP = 3,
}

impl From<u8> for ProfileType {
    fn from(value: u8) -> Self {
        match value {
            0 => ProfileType::Main,
            1 => ProfileType::LC,
            2 => ProfileType::SSR,
            3 => ProfileType::LTP,
            _ => ProfileType::LC, // Default to LC for unknown profiles
        }
    }
}

/// AAC stream parameters shared by ADTS headers and AudioSpecificConfig.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AACConfig {
    /// Audio object type
    pub profile: ProfileType,
    /// Index into the MPEG-4 sampling frequency table
    pub sample_rate_index: u8,
    /// MPEG-4 channel configuration, 1 to 7
    pub channel_configuration: u8,
    /// PCM frames per access unit
    pub frame_length: u16,
}

impl AACConfig {
    /// Sampling frequency in Hz, if the index is listed.
    pub fn sample_rate(&self) -> Option<u32> {
        sample_rate_from_index(self.sample_rate_index)
    }

    /// `AudioSpecificConfig`: object type (5 bits), frequency index (4),
    /// channel configuration (4), then three zero GASpecificConfig flags.
    pub fn audio_specific_config(&self) -> [u8; 2] {
        let object_type = self.profile as u16 + 1;
        let value = (object_type << 11)
            | ((self.sample_rate_index as u16 & 0x0F) << 7)
            | ((self.channel_configuration as u16 & 0x0F) << 3);
        value.to_be_bytes()
    }

    /// ADTS header for an access unit of `payload_len` bytes.
    pub fn adts_header(&self, payload_len: usize) -> ADTSHeader {
        ADTSHeader {
            sync_word: ADTS_SYNC_WORD,
            id: 0, // MPEG-4
            layer: 0,
            protection_absent: true,
            profile: self.profile,
            sample_rate_index: self.sample_rate_index,
            private_bit: false,
            channel_configuration: self.channel_configuration,
            original_copy: false,
            home: false,
            copyright_id_bit: false,
            copyright_id_start: false,
            frame_length: (payload_len + ADTS_HEADER_SIZE) as u16,
            buffer_fullness: 0x7FF, // variable bitrate
            number_of_raw_blocks: 0,
        }
    }
}

impl Default for AACConfig {
    fn default() -> Self {
        Self {
            profile: ProfileType::LC,
            sample_rate_index: 4,     // 44100 Hz
            channel_configuration: 1, // mono
            frame_length: 1024,
        }
    }
}

/// Fixed and variable ADTS header fields.
#[derive(Debug, Clone)]
pub struct ADTSHeader {
    /// 12 bits
    pub sync_word: u32,
    /// 1 bit, 0=MPEG-4, 1=MPEG-2
    pub id: u8,
    /// 2 bits
    pub layer: u8,
    /// 1 bit
    pub protection_absent: bool,
    /// 2 bits
    pub profile: ProfileType,
    /// 4 bits
    pub sample_rate_index: u8,
    /// 1 bit
    pub private_bit: bool,
    /// 3 bits
    pub channel_configuration: u8,
    /// 1 bit
    pub original_copy: bool,
    /// 1 bit
    pub home: bool,
    /// 1 bit
    pub copyright_id_bit: bool,
    /// 1 bit
    pub copyright_id_start: bool,
    /// 13 bits, header included
    pub frame_length: u16,
    /// 11 bits
    pub buffer_fullness: u16,
    /// 2 bits
    pub number_of_raw_blocks: u8,
}

impl ADTSHeader {
    /// True when the header starts with the ADTS sync word.
    pub fn sync_word_valid(&self) -> bool {
        self.sync_word == ADTS_SYNC_WORD
    }

    /// Sampling frequency in Hz, if the index is listed.
    pub fn sample_rate(&self) -> Option<u32> {
        sample_rate_from_index(self.sample_rate_index)
    }

    /// Header size including the CRC when protection is present.
    pub fn header_len(&self) -> usize {
        if self.protection_absent {
            ADTS_HEADER_SIZE
        } else {
            ADTS_HEADER_SIZE + 2
        }
    }

    /// Serializes the header without CRC.
    pub fn to_bytes(&self) -> [u8; ADTS_HEADER_SIZE] {
        let mut w = BitWriter::new();
        w.write_bits(self.sync_word, 12);
        w.write_bits(self.id as u32, 1);
        w.write_bits(self.layer as u32, 2);
        w.write_bit(self.protection_absent);
        w.write_bits(self.profile as u32, 2);
        w.write_bits(self.sample_rate_index as u32, 4);
        w.write_bit(self.private_bit);
        w.write_bits(self.channel_configuration as u32, 3);
        w.write_bit(self.original_copy);
        w.write_bit(self.home);
        w.write_bit(self.copyright_id_bit);
        w.write_bit(self.copyright_id_start);
        w.write_bits(self.frame_length as u32, 13);
        w.write_bits(self.buffer_fullness as u32, 11);
        w.write_bits(self.number_of_raw_blocks as u32, 2);

        let mut out = [0u8; ADTS_HEADER_SIZE];
        out.copy_from_slice(&w.into_bytes());
        out
    }
}
