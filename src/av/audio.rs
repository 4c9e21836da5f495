use bytes::Bytes;

use crate::config::AudioConfig;
use crate::error::{AvError, Result};

/// Interleaved little-endian PCM from capture plus its timestamp in microseconds.
#[derive(Debug, Clone)]
pub struct RawAudioBuffer {
    /// Interleaved little-endian samples
    pub data: Bytes,
    /// Presentation time of the first frame, in microseconds
    pub pts: i64,
}

impl RawAudioBuffer {
    /// Wraps PCM bytes captured at `pts`.
    pub fn new(data: impl Into<Bytes>, pts: i64) -> Self {
        Self {
            data: data.into(),
            pts,
        }
    }

    /// Builds a 16-bit buffer from interleaved samples.
    pub fn from_i16(samples: &[i16], pts: i64) -> Self {
        let data: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::new(data, pts)
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the buffer holds no PCM.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of interleaved frames under `config`; partial frames are an error.
    pub fn frame_count(&self, config: &AudioConfig) -> Result<usize> {
        let frame = config.bytes_per_frame();
        if frame == 0 || self.data.len() % frame != 0 {
            return Err(AvError::Submission(format!(
                "{} PCM bytes is not a whole number of {}-byte frames",
                self.data.len(),
                frame
            )));
        }
        Ok(self.data.len() / frame)
    }

    /// Duration in microseconds at the config's sample rate.
    pub fn duration_us(&self, config: &AudioConfig) -> Result<i64> {
        let frames = self.frame_count(config)? as i64;
        Ok(frames * 1_000_000 / config.sample_rate().max(1) as i64)
    }
}

/// Reads 16-bit little-endian interleaved PCM back into samples.
pub fn pcm_to_i16(data: &[u8]) -> Vec<i16> {
    data.chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}
