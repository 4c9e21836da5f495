//! Glue between a capture source and the encoders.

use std::sync::Arc;

use crate::capture::{CaptureListener, CapturedSample};
use crate::codec::{AudioEncoder, MediaSession, VideoEncoder};
use crate::error::{AvError, Result};

/// Capture listener that hands each sample to the encoder for its stream.
///
/// Samples for a stream with no encoder attached are dropped. Submission
/// errors are logged on the capture thread; everything past submission is
/// reported through the encoders' own listeners.
#[derive(Default)]
pub struct EncoderRouter {
    video: Option<Arc<VideoEncoder>>,
    audio: Option<Arc<AudioEncoder>>,
}

impl EncoderRouter {
    /// A router with no encoders attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes video samples to `encoder`.
    pub fn with_video(mut self, encoder: Arc<VideoEncoder>) -> Self {
        self.video = Some(encoder);
        self
    }

    /// Routes audio samples to `encoder`.
    pub fn with_audio(mut self, encoder: Arc<AudioEncoder>) -> Self {
        self.audio = Some(encoder);
        self
    }

    /// Routes one sample, returning the submission result.
    pub fn route(&self, sample: CapturedSample) -> Result<()> {
        match sample {
            CapturedSample::Video(frame) => match &self.video {
                Some(encoder) => encoder.encode(frame),
                None => Ok(()),
            },
            CapturedSample::Audio(buffer) => match &self.audio {
                Some(encoder) => encoder.encode(buffer),
                None => Ok(()),
            },
        }
    }

    /// Flushes both encoders concurrently.
    pub async fn flush(&self) -> Result<()> {
        let video = async {
            match &self.video {
                Some(encoder) => encoder.flush().await,
                None => Ok(()),
            }
        };
        let audio = async {
            match &self.audio {
                Some(encoder) => encoder.flush().await,
                None => Ok(()),
            }
        };
        futures::future::try_join(video, audio).await.map(|_| ())
    }
}

impl CaptureListener for EncoderRouter {
    fn on_sample(&self, sample: CapturedSample) {
        let media = sample.media_type();
        let pts = sample.pts();
        if let Err(e) = self.route(sample) {
            log::warn!("{:?} sample at {} not submitted: {}", media, pts, e);
        }
    }

    fn on_error(&self, error: AvError) {
        log::error!("capture feeding the encoders: {}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::{RawAudioBuffer, RawVideoFrame};
    use crate::capture::color_bars;
    use crate::codec::listener::{audio_encoder_channel, AudioEncoderEvent};
    use crate::config::{AudioConfig, VideoConfig};

    #[tokio::test]
    async fn test_routes_by_media_type() {
        let audio = Arc::new(AudioEncoder::new(AudioConfig::default()).unwrap());
        let (listener, mut rx) = audio_encoder_channel();
        audio.set_listener(listener);
        let router = EncoderRouter::new().with_audio(audio.clone());

        let image = color_bars(32, 16, 0).unwrap();
        router
            .route(CapturedSample::Video(RawVideoFrame::new(image, 0)))
            .unwrap();
        router
            .route(CapturedSample::Audio(RawAudioBuffer::from_i16(&[3; 1024], 0)))
            .unwrap();
        router.flush().await.unwrap();

        assert!(matches!(
            rx.try_recv(),
            Ok(AudioEncoderEvent::EncodedPacket(_))
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stopped_encoder_rejects_routed_sample() {
        let video = Arc::new(VideoEncoder::new(VideoConfig::default()).unwrap());
        video.stop();
        let router = EncoderRouter::new().with_video(video);

        let image = color_bars(32, 16, 0).unwrap();
        let err = router
            .route(CapturedSample::Video(RawVideoFrame::new(image, 0)))
            .unwrap_err();
        assert!(matches!(err, AvError::Closed));
    }
}
