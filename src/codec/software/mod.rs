//! # Software codec backend
//!
//! In-process sessions for hosts without a hardware codec: H.264 through
//! OpenH264 and AAC-LC through FDK-AAC. Both produce standard bitstreams.

mod audio;
mod video;

use crate::codec::session::{
    AudioCompressionSession, AudioDecompressionSession, CodecBackend, VideoCompressionSession,
    VideoDecompressionSession, VideoFormatDescription, VideoSessionParams,
};
use crate::config::AudioConfig;
use crate::error::{AvError, Result};

/// Widest picture the software sessions accept by default.
pub const MAX_WIDTH: u32 = 3840;
/// Tallest picture the software sessions accept by default.
pub const MAX_HEIGHT: u32 = 2160;

/// [`CodecBackend`] backed by the OpenH264 and FDK-AAC libraries.
#[derive(Debug, Clone)]
pub struct SoftwareBackend {
    max_width: u32,
    max_height: u32,
}

impl SoftwareBackend {
    /// Backend with the default size limits.
    pub fn new() -> Self {
        Self {
            max_width: MAX_WIDTH,
            max_height: MAX_HEIGHT,
        }
    }

    /// Limits session sizes; creating a larger session fails.
    pub fn with_max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.max_width = width;
        self.max_height = height;
        self
    }

    fn check_size(&self, width: u32, height: u32) -> Result<()> {
        if width > self.max_width || height > self.max_height {
            return Err(AvError::SessionCreation(format!(
                "{}x{} exceeds the {}x{} session limit",
                width, height, self.max_width, self.max_height
            )));
        }
        Ok(())
    }
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CodecBackend for SoftwareBackend {
    fn name(&self) -> &str {
        "software"
    }

    fn create_video_compression_session(
        &self,
        params: &VideoSessionParams,
    ) -> Result<Box<dyn VideoCompressionSession>> {
        self.check_size(params.width, params.height)?;
        Ok(Box::new(video::SoftwareVideoEncoder::new(params)?))
    }

    fn create_video_decompression_session(
        &self,
        format: &VideoFormatDescription,
    ) -> Result<Box<dyn VideoDecompressionSession>> {
        self.check_size(format.width(), format.height())?;
        Ok(Box::new(video::SoftwareVideoDecoder::new(format)?))
    }

    fn create_audio_compression_session(
        &self,
        config: &AudioConfig,
    ) -> Result<Box<dyn AudioCompressionSession>> {
        Ok(Box::new(audio::SoftwareAudioEncoder::new(config)?))
    }

    fn create_audio_decompression_session(
        &self,
        config: &AudioConfig,
    ) -> Result<Box<dyn AudioDecompressionSession>> {
        Ok(Box::new(audio::SoftwareAudioDecoder::new(config)?))
    }
}
