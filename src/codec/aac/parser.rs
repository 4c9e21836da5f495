use super::types::{AACConfig, ADTSHeader, ProfileType, ADTS_HEADER_SIZE, ADTS_SYNC_WORD};
use crate::error::{AvError, Result};
use crate::utils::BitReader;

/// One access unit located inside an ADTS stream.
#[derive(Debug)]
pub struct AdtsFrame<'a> {
    /// Header of this frame
    pub header: ADTSHeader,
    /// Raw access unit following the header
    pub payload: &'a [u8],
}

/// ADTS reader that remembers the last stream parameters it saw.
#[derive(Debug, Default)]
pub struct AACParser {
    config: Option<AACConfig>,
}

impl AACParser {
    /// A parser with no stream parameters yet.
    pub fn new() -> Self {
        Self { config: None }
    }

    /// True when `data` starts with the 12-bit ADTS sync word.
    pub fn is_adts(data: &[u8]) -> bool {
        data.len() >= 2 && data[0] == 0xFF && data[1] & 0xF0 == 0xF0
    }

    /// Reads the fixed and variable ADTS header at the start of `data`.
    pub fn parse_adts_header(&mut self, data: &[u8]) -> Result<ADTSHeader> {
        if data.len() < ADTS_HEADER_SIZE {
            return Err(AvError::MalformedBitstream("ADTS header too short".into()));
        }

        let mut reader = BitReader::new(data);

        let sync_word = reader.read_bits(12)?;
        if sync_word != ADTS_SYNC_WORD {
            return Err(AvError::MalformedBitstream("invalid ADTS sync word".into()));
        }

        let id = reader.read_bits(1)? as u8;
        let layer = reader.read_bits(2)? as u8;
        let protection_absent = reader.read_bit()?;
        let profile = ProfileType::from(reader.read_bits(2)? as u8);
        let sample_rate_index = reader.read_bits(4)? as u8;
        let private_bit = reader.read_bit()?;
        let channel_configuration = reader.read_bits(3)? as u8;
        let original_copy = reader.read_bit()?;
        let home = reader.read_bit()?;
        let copyright_id_bit = reader.read_bit()?;
        let copyright_id_start = reader.read_bit()?;
        let frame_length = reader.read_bits(13)? as u16;
        let buffer_fullness = reader.read_bits(11)? as u16;
        let number_of_raw_blocks = reader.read_bits(2)? as u8;

        let header = ADTSHeader {
            sync_word,
            id,
            layer,
            protection_absent,
            profile,
            sample_rate_index,
            private_bit,
            channel_configuration,
            original_copy,
            home,
            copyright_id_bit,
            copyright_id_start,
            frame_length,
            buffer_fullness,
            number_of_raw_blocks,
        };

        self.config = Some(AACConfig {
            profile,
            sample_rate_index,
            channel_configuration,
            frame_length: 1024,
        });

        Ok(header)
    }

    /// Splits a buffer holding one or more complete ADTS frames.
    pub fn split_frames<'a>(&mut self, data: &'a [u8]) -> Result<Vec<AdtsFrame<'a>>> {
        let mut frames = Vec::new();
        let mut pos = 0;

        while pos < data.len() {
            let header = self.parse_adts_header(&data[pos..])?;
            let frame_len = header.frame_length as usize;
            let header_len = header.header_len();
            if frame_len <= header_len {
                return Err(AvError::MalformedBitstream(format!(
                    "ADTS frame length {} leaves no payload",
                    frame_len
                )));
            }
            if header.number_of_raw_blocks != 0 {
                return Err(AvError::UnsupportedFormat(
                    "ADTS frames with multiple raw data blocks".into(),
                ));
            }
            let payload = data.get(pos + header_len..pos + frame_len).ok_or_else(|| {
                AvError::MalformedBitstream(format!(
                    "ADTS frame of {} bytes truncated to {}",
                    frame_len,
                    data.len() - pos
                ))
            })?;
            frames.push(AdtsFrame { header, payload });
            pos += frame_len;
        }
        Ok(frames)
    }

    /// Overrides the remembered stream parameters.
    pub fn set_config(&mut self, config: AACConfig) {
        self.config = Some(config);
    }

    /// Stream parameters from the most recent ADTS header.
    pub fn config(&self) -> Option<&AACConfig> {
        self.config.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_adts_header() {
        // AAC-LC, 44.1kHz, stereo, 7 + 4 bytes
        let data = [0xFF, 0xF1, 0x50, 0x80, 0x01, 0x7F, 0xFC];

        let mut parser = AACParser::new();
        let header = parser.parse_adts_header(&data).unwrap();

        assert!(header.sync_word_valid());
        assert_eq!(header.profile, ProfileType::LC);
        assert_eq!(header.sample_rate(), Some(44100));
        assert_eq!(header.channel_configuration, 2);
        assert_eq!(header.frame_length, 11);
        assert_eq!(header.to_bytes(), data);
        assert_eq!(parser.config().unwrap().channel_configuration, 2);
    }

    #[test]
    fn test_split_frames() {
        let config = AACConfig::default();
        let mut data = config.adts_header(3).to_bytes().to_vec();
        data.extend_from_slice(&[1, 2, 3]);
        data.extend_from_slice(&config.adts_header(2).to_bytes());
        data.extend_from_slice(&[4, 5]);

        let mut parser = AACParser::new();
        let frames = parser.split_frames(&data).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].payload, &[1, 2, 3]);
        assert_eq!(frames[1].payload, &[4, 5]);
        assert_eq!(frames[1].header.channel_configuration, 1);

        assert!(parser.split_frames(&data[..data.len() - 1]).is_err());
    }

    #[test]
    fn test_invalid_sync_word() {
        let data = [0x00, 0x00, 0x50, 0x80, 0x43, 0x80, 0x00];
        let mut parser = AACParser::new();
        assert!(!AACParser::is_adts(&data));
        assert!(parser.parse_adts_header(&data).is_err());
    }
}
