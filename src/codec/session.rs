//! The seam between the pipeline and a codec implementation.
//!
//! A [`CodecBackend`] hands out stateful sessions bound to one format. Each
//! session is owned by exactly one worker thread, which submits work
//! serially and releases the session with `invalidate` before dropping it.
//! Platform encoders plug in here; [`SoftwareBackend`](super::software::SoftwareBackend)
//! is the in-process reference implementation.

use bytes::Bytes;

use crate::av::ImageBuffer;
use crate::codec::h264::{ParameterSets, SPSInfo};
use crate::config::{AudioConfig, VideoConfig};
use crate::error::{AvError, Result};

/// What a video decompression session is bound to: the parameter sets and
/// the picture geometry they describe.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFormatDescription {
    parameter_sets: ParameterSets,
    sps: SPSInfo,
}

impl VideoFormatDescription {
    /// Parses the SPS/PPS pair; fails with `MalformedBitstream` if either is unreadable.
    pub fn from_parameter_sets(parameter_sets: ParameterSets) -> Result<Self> {
        let (sps, _) = parameter_sets.parse()?;
        Ok(Self {
            parameter_sets,
            sps,
        })
    }

    /// The SPS/PPS pair.
    pub fn parameter_sets(&self) -> &ParameterSets {
        &self.parameter_sets
    }

    /// The parsed SPS.
    pub fn sps(&self) -> &SPSInfo {
        &self.sps
    }

    /// Display width in pixels.
    pub fn width(&self) -> u32 {
        self.sps.width
    }

    /// Display height in pixels.
    pub fn height(&self) -> u32 {
        self.sps.height
    }

    /// Frame rate from the SPS timing info, if signalled.
    pub fn frame_rate(&self) -> Option<f32> {
        self.sps.frame_rate
    }
}

/// Parameters for a video compression session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSessionParams {
    /// Picture width in pixels
    pub width: u32,
    /// Picture height in pixels
    pub height: u32,
    /// Target bits per second
    pub bitrate: u32,
    /// Frames per second
    pub fps: u32,
    /// Longest run of frames between IDR pictures
    pub max_keyframe_interval: u32,
}

impl VideoSessionParams {
    /// Session parameters for frames of `width` x `height` under `config`'s rate settings.
    pub fn new(config: &VideoConfig, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bitrate: config.bitrate(),
            fps: config.fps(),
            max_keyframe_interval: config.max_keyframe_interval(),
        }
    }
}

/// One compressed picture as the session hands it back.
#[derive(Debug, Clone)]
pub struct CompressedSample {
    /// Parameter sets the slices refer to
    pub format: VideoFormatDescription,
    /// NAL units, each behind a 4-byte big-endian length
    pub data: Bytes,
    /// Presentation time in microseconds
    pub pts: i64,
    /// True for IDR pictures
    pub keyframe: bool,
}

/// One AAC access unit and the number of PCM frames it covers.
#[derive(Debug, Clone)]
pub struct AudioAccessUnit {
    /// Raw access unit
    pub data: Bytes,
    /// PCM frames per channel the unit decodes to
    pub frames: usize,
}

/// A stateful H.264 encoder bound to one picture size.
pub trait VideoCompressionSession: Send {
    /// Compresses one NV12 picture. Sessions may buffer and return `None`.
    fn encode_frame(
        &mut self,
        image: &ImageBuffer,
        pts: i64,
        force_keyframe: bool,
    ) -> Result<Option<CompressedSample>>;

    /// Emits everything still buffered.
    fn flush(&mut self) -> Result<Vec<CompressedSample>>;

    /// Drops buffered state ahead of release.
    fn invalidate(&mut self) {}
}

/// A stateful H.264 decoder bound to one SPS/PPS pair.
pub trait VideoDecompressionSession: Send {
    /// The parameter sets the session was created for.
    fn format(&self) -> &VideoFormatDescription;

    /// Decodes one picture given as length-prefixed slice NAL units.
    fn decode_sample(&mut self, sample: &[u8], pts: i64) -> Result<Option<ImageBuffer>>;

    /// Returns pictures the session was still holding.
    fn flush(&mut self) -> Result<Vec<ImageBuffer>>;

    /// Drops reference pictures ahead of release.
    fn invalidate(&mut self) {}
}

/// A stateful AAC encoder bound to one [`AudioConfig`].
pub trait AudioCompressionSession: Send {
    /// Appends interleaved PCM and returns every access unit completed by it.
    fn encode(&mut self, pcm: &[u8]) -> Result<Vec<AudioAccessUnit>>;

    /// Encodes buffered PCM short of a full access unit.
    fn flush(&mut self) -> Result<Vec<AudioAccessUnit>>;

    /// Drops buffered PCM ahead of release.
    fn invalidate(&mut self) {}
}

/// A stateful AAC decoder bound to one [`AudioConfig`].
pub trait AudioDecompressionSession: Send {
    /// Decodes one raw access unit into interleaved PCM.
    fn decode(&mut self, access_unit: &[u8]) -> Result<Option<Bytes>>;

    /// Drops decoder state ahead of release.
    fn invalidate(&mut self) {}
}

/// Creates codec sessions. Failures are `SessionCreation` errors.
pub trait CodecBackend: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Builds an encoder for pictures of `params`' size.
    fn create_video_compression_session(
        &self,
        params: &VideoSessionParams,
    ) -> Result<Box<dyn VideoCompressionSession>>;

    /// Builds a decoder for `format`.
    fn create_video_decompression_session(
        &self,
        format: &VideoFormatDescription,
    ) -> Result<Box<dyn VideoDecompressionSession>>;

    /// Builds an AAC encoder for `config`.
    fn create_audio_compression_session(
        &self,
        config: &AudioConfig,
    ) -> Result<Box<dyn AudioCompressionSession>>;

    /// Builds an AAC decoder for `config`.
    fn create_audio_decompression_session(
        &self,
        config: &AudioConfig,
    ) -> Result<Box<dyn AudioDecompressionSession>>;
}

/// Errors from session creation are fatal whatever the backend called them.
pub(crate) fn creation_error(error: AvError) -> AvError {
    match error {
        AvError::SessionCreation(_) => error,
        other => AvError::SessionCreation(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::h264::params::{write_pps, write_sps, SpsParams};

    #[test]
    fn test_format_description_geometry() {
        let sets = ParameterSets::new(write_sps(&SpsParams::new(352, 288, 25)), write_pps());
        let format = VideoFormatDescription::from_parameter_sets(sets.clone()).unwrap();
        assert_eq!((format.width(), format.height()), (352, 288));
        assert_eq!(format.frame_rate(), Some(25.0));
        assert_eq!(format.parameter_sets(), &sets);

        let swapped = ParameterSets::new(sets.pps.clone(), sets.sps.clone());
        assert!(VideoFormatDescription::from_parameter_sets(swapped).is_err());
    }

    #[test]
    fn test_session_params_from_config() {
        let config = VideoConfig::new(640, 480, 500_000, 30);
        let params = VideoSessionParams::new(&config, 320, 240);
        assert_eq!((params.width, params.height), (320, 240));
        assert_eq!(params.max_keyframe_interval, 60);
    }
}
