//! Immutable target parameters for the audio and video codecs.
//!
//! Each encoder or decoder is bound to exactly one config for its whole
//! lifetime. Changing parameters means dropping the instance and building a
//! new one, so the config types expose getters only.

use crate::codec::aac::{sample_rate_index, AACConfig, ProfileType};
use crate::error::{AvError, Result};

/// Samples per channel in one AAC access unit.
pub const AAC_FRAMES_PER_PACKET: usize = 1024;

/// Audio codec parameters.
///
/// ```
/// use avpipe::config::AudioConfig;
///
/// let config = AudioConfig::default();
/// assert_eq!(config.bitrate(), 96_000);
/// assert_eq!(config.channel_count(), 1);
/// assert_eq!(config.sample_rate(), 44_100);
/// assert_eq!(config.sample_size(), 16);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConfig {
    bitrate: u32,
    channel_count: u8,
    sample_rate: u32,
    sample_size: u8,
}

impl AudioConfig {
    /// Audio parameters, checked later by [`validate`](Self::validate).
    pub fn new(bitrate: u32, channel_count: u8, sample_rate: u32, sample_size: u8) -> Self {
        Self {
            bitrate,
            channel_count,
            sample_rate,
            sample_size,
        }
    }

    /// Builder starting from [`AudioConfig::default`].
    pub fn builder() -> AudioConfigBuilder {
        AudioConfigBuilder {
            config: Self::default(),
        }
    }

    /// Target bitrate in bits per second
    pub fn bitrate(&self) -> u32 {
        self.bitrate
    }

    /// Interleaved channels per frame.
    pub fn channel_count(&self) -> u8 {
        self.channel_count
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Bits per sample
    pub fn sample_size(&self) -> u8 {
        self.sample_size
    }

    /// Bytes per sample of one channel.
    pub fn bytes_per_sample(&self) -> usize {
        (self.sample_size as usize).div_ceil(8)
    }

    /// Bytes in one interleaved frame (one sample for every channel).
    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * self.channel_count as usize
    }

    /// Index into the MPEG-4 sampling frequency table, if the rate is listed there.
    pub fn sample_rate_index(&self) -> Option<u8> {
        sample_rate_index(self.sample_rate)
    }

    /// Checks that the AAC session can represent this configuration.
    pub fn validate(&self) -> Result<()> {
        if self.bitrate == 0 {
            return Err(AvError::InvalidConfig("audio bitrate must be non-zero".into()));
        }
        if self.sample_rate_index().is_none() {
            return Err(AvError::UnsupportedFormat(format!(
                "sample rate {} Hz is not an AAC sampling frequency",
                self.sample_rate
            )));
        }
        if !(1..=7).contains(&self.channel_count) {
            return Err(AvError::UnsupportedFormat(format!(
                "{} channels has no AAC channel configuration",
                self.channel_count
            )));
        }
        if !matches!(self.sample_size, 8 | 16 | 24 | 32) {
            return Err(AvError::UnsupportedFormat(format!(
                "{}-bit samples are not supported",
                self.sample_size
            )));
        }
        Ok(())
    }

    /// AAC-LC stream parameters matching this config.
    pub fn aac_config(&self) -> Result<AACConfig> {
        self.validate()?;
        Ok(AACConfig {
            profile: ProfileType::LC,
            sample_rate_index: self.sample_rate_index().unwrap_or(4),
            channel_configuration: self.channel_count,
            frame_length: AAC_FRAMES_PER_PACKET as u16,
        })
    }

    /// Two-byte MPEG-4 AudioSpecificConfig for AAC-LC.
    pub fn audio_specific_config(&self) -> Result<[u8; 2]> {
        Ok(self.aac_config()?.audio_specific_config())
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            bitrate: 96_000,
            channel_count: 1,
            sample_rate: 44_100,
            sample_size: 16,
        }
    }
}

/// Builder for [`AudioConfig`], starting from the defaults.
pub struct AudioConfigBuilder {
    config: AudioConfig,
}

impl AudioConfigBuilder {
    /// Target bits per second.
    pub fn bitrate(mut self, bitrate: u32) -> Self {
        self.config.bitrate = bitrate;
        self
    }

    /// Interleaved channels per frame.
    pub fn channel_count(mut self, channel_count: u8) -> Self {
        self.config.channel_count = channel_count;
        self
    }

    /// Sample rate in Hz.
    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.config.sample_rate = sample_rate;
        self
    }

    /// Bits per sample: 8, 16, 24 or 32.
    pub fn sample_size(mut self, sample_size: u8) -> Self {
        self.config.sample_size = sample_size;
        self
    }

    /// The config; call [`AudioConfig::validate`] to check it.
    pub fn build(self) -> AudioConfig {
        self.config
    }
}

/// Video codec parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConfig {
    width: u32,
    height: u32,
    bitrate: u32,
    fps: u32,
}

impl VideoConfig {
    /// Video parameters, checked later by [`validate`](Self::validate).
    pub fn new(width: u32, height: u32, bitrate: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            bitrate,
            fps,
        }
    }

    /// Builder starting from [`VideoConfig::default`].
    pub fn builder() -> VideoConfigBuilder {
        VideoConfigBuilder {
            config: Self::default(),
        }
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Target bitrate in bits per second
    pub fn bitrate(&self) -> u32 {
        self.bitrate
    }

    /// Frames per second.
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Longest run of frames between IDR pictures.
    pub fn max_keyframe_interval(&self) -> u32 {
        self.fps.saturating_mul(2).max(1)
    }

    /// Checks for even, non-zero dimensions and non-zero rates.
    pub fn validate(&self) -> Result<()> {
        validate_dimensions(self.width, self.height)?;
        if self.bitrate == 0 {
            return Err(AvError::InvalidConfig("video bitrate must be non-zero".into()));
        }
        if self.fps == 0 {
            return Err(AvError::InvalidConfig("fps must be non-zero".into()));
        }
        Ok(())
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 480,
            height: 640,
            bitrate: 640_000,
            fps: 25,
        }
    }
}

/// Builder for [`VideoConfig`], starting from the defaults.
pub struct VideoConfigBuilder {
    config: VideoConfig,
}

impl VideoConfigBuilder {
    /// Frame width in pixels.
    pub fn width(mut self, width: u32) -> Self {
        self.config.width = width;
        self
    }

    /// Frame height in pixels.
    pub fn height(mut self, height: u32) -> Self {
        self.config.height = height;
        self
    }

    /// Target bits per second.
    pub fn bitrate(mut self, bitrate: u32) -> Self {
        self.config.bitrate = bitrate;
        self
    }

    /// Frames per second.
    pub fn fps(mut self, fps: u32) -> Self {
        self.config.fps = fps;
        self
    }

    /// The config; call [`VideoConfig::validate`] to check it.
    pub fn build(self) -> VideoConfig {
        self.config
    }
}

/// 4:2:0 chroma subsampling needs even, non-zero dimensions.
pub(crate) fn validate_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(AvError::InvalidConfig(format!(
            "dimensions must be non-zero, got {}x{}",
            width, height
        )));
    }
    if width % 2 != 0 || height % 2 != 0 {
        return Err(AvError::InvalidConfig(format!(
            "dimensions must be even, got {}x{}",
            width, height
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_preset() {
        let config = VideoConfig::default();
        assert_eq!((config.width(), config.height()), (480, 640));
        assert_eq!(config.fps(), 25);
        assert_eq!(config.max_keyframe_interval(), 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_video_validation() {
        assert!(VideoConfig::new(641, 480, 500_000, 30).validate().is_err());
        assert!(VideoConfig::new(0, 480, 500_000, 30).validate().is_err());
        assert!(VideoConfig::new(640, 480, 500_000, 0).validate().is_err());
        assert!(VideoConfig::builder()
            .width(640)
            .height(480)
            .bitrate(500_000)
            .fps(30)
            .build()
            .validate()
            .is_ok());
    }

    #[test]
    fn test_audio_derived_values() {
        let config = AudioConfig::default();
        assert_eq!(config.bytes_per_frame(), 2);
        assert_eq!(config.sample_rate_index(), Some(4));
        // AAC-LC (2), index 4, mono: 00010 0100 0001 000
        assert_eq!(config.audio_specific_config().unwrap(), [0x12, 0x08]);

        let stereo = AudioConfig::builder().channel_count(2).sample_size(24).build();
        assert_eq!(stereo.bytes_per_frame(), 6);
    }

    #[test]
    fn test_audio_unsupported_formats() {
        let odd_rate = AudioConfig::builder().sample_rate(44_000).build();
        assert!(matches!(odd_rate.validate(), Err(AvError::UnsupportedFormat(_))));

        let odd_size = AudioConfig::builder().sample_size(12).build();
        assert!(matches!(odd_size.validate(), Err(AvError::UnsupportedFormat(_))));

        let no_channels = AudioConfig::builder().channel_count(0).build();
        assert!(matches!(no_channels.validate(), Err(AvError::UnsupportedFormat(_))));
    }
}
