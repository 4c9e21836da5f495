use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::av::{MediaType, Packet, RawVideoFrame};
use crate::codec::h264::{length_prefixed_to_annexb, ParameterSets};
use crate::codec::listener::{ListenerSlot, VideoEncoderListener};
use crate::codec::session::{
    creation_error, CodecBackend, CompressedSample, VideoCompressionSession, VideoSessionParams,
};
use crate::codec::software::SoftwareBackend;
use crate::codec::worker::{Health, MediaSession, Worker, WorkerTask};
use crate::config::VideoConfig;
use crate::error::{AvError, Result};

const ROLE: &str = "video-encoder";

/// Compresses raw frames into Annex-B H.264.
///
/// The compression session is created lazily from the first frame's
/// dimensions and rebuilt (with fresh parameter sets) whenever a frame of a
/// different size arrives. Frames in NV12, I420 or BGRA are converted to
/// NV12 before submission.
///
/// Per-frame failures are reported and the encoder carries on; a session
/// that cannot be created makes it unusable.
pub struct VideoEncoder {
    config: VideoConfig,
    listener: Arc<ListenerSlot<dyn VideoEncoderListener>>,
    health: Arc<Health>,
    keyframe_requested: Arc<AtomicBool>,
    worker: Worker<RawVideoFrame>,
}

impl VideoEncoder {
    /// Creates an encoder on the software backend.
    pub fn new(config: VideoConfig) -> Result<Self> {
        Self::with_backend(config, Arc::new(SoftwareBackend::new()))
    }

    /// Creates an encoder whose sessions come from `backend`.
    pub fn with_backend(config: VideoConfig, backend: Arc<dyn CodecBackend>) -> Result<Self> {
        config.validate()?;

        let listener = Arc::new(ListenerSlot::new());
        let health = Arc::new(Health::default());
        let keyframe_requested = Arc::new(AtomicBool::new(false));
        let task = EncoderTask {
            backend,
            config,
            session: None,
            session_size: (0, 0),
            parameter_sets: None,
            listener: listener.clone(),
            health: health.clone(),
            keyframe_requested: keyframe_requested.clone(),
        };

        Ok(Self {
            config,
            listener,
            health,
            keyframe_requested,
            worker: Worker::spawn(ROLE, task)?,
        })
    }

    /// The configuration the encoder was built with.
    pub fn config(&self) -> &VideoConfig {
        &self.config
    }

    /// Replaces the listener. Takes effect before the next callback.
    pub fn set_listener(&self, listener: Arc<dyn VideoEncoderListener>) {
        self.listener.set(listener);
    }

    /// Detaches the listener; output is dropped until a new one is set.
    pub fn clear_listener(&self) {
        self.listener.clear();
    }

    /// Queues a frame. Errors here are synchronous only for an unusable or
    /// stopped encoder; per-frame failures arrive through `on_error`.
    pub fn encode(&self, frame: RawVideoFrame) -> Result<()> {
        self.health.check()?;
        self.worker.submit(frame)
    }

    /// Forces the next encoded frame to be an IDR picture.
    pub fn request_keyframe(&self) {
        self.keyframe_requested.store(true, Ordering::Release);
    }
}

#[async_trait]
impl MediaSession for VideoEncoder {
    fn role(&self) -> &'static str {
        self.worker.role()
    }

    async fn flush(&self) -> Result<()> {
        self.worker.flush().await
    }

    fn stop(&self) {
        self.worker.stop();
    }

    fn is_usable(&self) -> bool {
        !self.health.is_fatal() && !self.worker.is_stopped()
    }
}

struct EncoderTask {
    backend: Arc<dyn CodecBackend>,
    config: VideoConfig,
    session: Option<Box<dyn VideoCompressionSession>>,
    session_size: (u32, u32),
    parameter_sets: Option<ParameterSets>,
    listener: Arc<ListenerSlot<dyn VideoEncoderListener>>,
    health: Arc<Health>,
    keyframe_requested: Arc<AtomicBool>,
}

impl EncoderTask {
    /// Reports a per-frame error; the encoder stays usable.
    fn report(&self, error: AvError) {
        self.listener.report(ROLE, error, |l, e| l.on_error(e));
    }

    /// Reports an error that leaves the encoder unusable.
    fn fail(&self, error: AvError) {
        self.health.mark_fatal(&error);
        self.report(error);
    }

    fn ensure_session(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<&mut Box<dyn VideoCompressionSession>> {
        if self.session.is_some() && self.session_size != (width, height) {
            log::info!(
                "frame size changed from {}x{} to {}x{}, rebuilding session",
                self.session_size.0,
                self.session_size.1,
                width,
                height
            );
            self.drain();
            self.release();
        }

        if self.session.is_none() {
            let params = VideoSessionParams::new(&self.config, width, height);
            let session = self
                .backend
                .create_video_compression_session(&params)
                .map_err(creation_error)?;
            log::info!(
                "{} compression session created: {}x{} {} bps {} fps",
                self.backend.name(),
                width,
                height,
                params.bitrate,
                params.fps
            );
            self.session_size = (width, height);
            self.session = Some(session);
        }

        self.session
            .as_mut()
            .ok_or_else(|| AvError::SessionCreation("no session".into()))
    }

    fn deliver(&mut self, sample: CompressedSample) {
        let sets = sample.format.parameter_sets();
        if self.parameter_sets.as_ref() != Some(sets) {
            log::info!(
                "parameter sets changed ({}x{})",
                sample.format.width(),
                sample.format.height()
            );
            // unsent until a listener has them
            if self.listener.with(|l| l.on_parameter_sets(&sets.sps, &sets.pps)) {
                self.parameter_sets = Some(sets.clone());
            }
        }

        let data = match length_prefixed_to_annexb(&sample.data) {
            Ok(data) => data,
            Err(e) => return self.report(e),
        };
        let frame_duration = Duration::from_secs(1) / self.config.fps();
        let packet = Packet::new(MediaType::Video, data)
            .with_pts(sample.pts)
            .with_key_flag(sample.keyframe)
            .with_duration(frame_duration);
        log::debug!(
            "encoded {} frame: {} bytes",
            if packet.is_key { "key" } else { "delta" },
            packet.len()
        );
        self.listener.with(|l| l.on_encoded_frame(&packet));
    }

    fn drain(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match session.flush() {
            Ok(samples) => {
                for sample in samples {
                    self.deliver(sample);
                }
            }
            Err(e) => self.report(e),
        }
    }

    fn release(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.invalidate();
            log::info!("compression session released");
        }
    }
}

impl WorkerTask for EncoderTask {
    type Input = RawVideoFrame;

    fn process(&mut self, frame: RawVideoFrame) {
        if self.health.is_fatal() {
            log::warn!("dropping frame at {}: encoder unusable", frame.pts);
            return;
        }

        let image = match frame.image.to_nv12() {
            Ok(image) => image,
            Err(e) => return self.report(AvError::Submission(e.to_string())),
        };
        let force_keyframe = self.keyframe_requested.swap(false, Ordering::AcqRel);
        let session = match self.ensure_session(image.width(), image.height()) {
            Ok(session) => session,
            Err(e) => return self.fail(e),
        };
        match session.encode_frame(&image, frame.pts, force_keyframe) {
            Ok(Some(sample)) => self.deliver(sample),
            Ok(None) => {}
            Err(e) => {
                if force_keyframe {
                    self.keyframe_requested.store(true, Ordering::Release);
                }
                log::warn!("frame at {} not encoded: {}", frame.pts, e);
                self.report(e);
            }
        }
    }

    fn flush(&mut self) {
        self.drain();
    }

    fn shutdown(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::ImageBuffer;
    use crate::codec::listener::{video_encoder_channel, VideoEncoderEvent};
    use crate::codec::h264::split_annexb;

    fn frame(width: u32, height: u32, pts: i64) -> RawVideoFrame {
        let len = (width * height * 3 / 2) as usize;
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        RawVideoFrame::new(ImageBuffer::from_packed_nv12(width, height, data).unwrap(), pts)
    }

    fn drain(
        rx: &mut tokio::sync::mpsc::UnboundedReceiver<VideoEncoderEvent>,
    ) -> Vec<VideoEncoderEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_parameter_sets_before_frames() {
        let encoder = VideoEncoder::new(VideoConfig::new(64, 48, 500_000, 30)).unwrap();
        let (listener, mut rx) = video_encoder_channel();
        encoder.set_listener(listener);

        for pts in 0..3 {
            encoder.encode(frame(64, 48, pts)).unwrap();
        }
        encoder.flush().await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 4);
        match &events[0] {
            VideoEncoderEvent::ParameterSets { sps, pps } => {
                assert_eq!(sps[0] & 0x1F, 7);
                assert_eq!(pps[0] & 0x1F, 8);
            }
            other => panic!("expected parameter sets, got {:?}", other),
        }
        for (pts, event) in events[1..].iter().enumerate() {
            let VideoEncoderEvent::EncodedFrame(packet) = event else {
                panic!("expected a frame, got {:?}", event);
            };
            assert_eq!(&packet.data[..4], &[0, 0, 0, 1]);
            assert_eq!(packet.pts, Some(pts as i64));
            assert_eq!(packet.is_key, pts == 0);
        }
    }

    #[tokio::test]
    async fn test_resize_emits_new_parameter_sets() {
        let encoder = VideoEncoder::new(VideoConfig::new(64, 48, 500_000, 30)).unwrap();
        let (listener, mut rx) = video_encoder_channel();
        encoder.set_listener(listener);

        encoder.encode(frame(64, 48, 0)).unwrap();
        encoder.encode(frame(96, 64, 1)).unwrap();
        encoder.flush().await.unwrap();

        let kinds: Vec<&str> = drain(&mut rx)
            .iter()
            .map(|e| match e {
                VideoEncoderEvent::ParameterSets { .. } => "sets",
                VideoEncoderEvent::EncodedFrame(p) if p.is_key => "key",
                VideoEncoderEvent::EncodedFrame(_) => "delta",
                VideoEncoderEvent::Error(_) => "error",
            })
            .collect();
        assert_eq!(kinds, vec!["sets", "key", "sets", "key"]);
    }

    #[tokio::test]
    async fn test_request_keyframe() {
        let encoder = VideoEncoder::new(VideoConfig::new(64, 48, 100_000, 30)).unwrap();
        let (listener, mut rx) = video_encoder_channel();
        encoder.set_listener(listener);

        encoder.encode(frame(64, 48, 0)).unwrap();
        encoder.encode(frame(64, 48, 1)).unwrap();
        encoder.flush().await.unwrap();
        encoder.request_keyframe();
        encoder.encode(frame(64, 48, 2)).unwrap();
        encoder.flush().await.unwrap();

        let keys: Vec<bool> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                VideoEncoderEvent::EncodedFrame(p) => {
                    let nal_type = split_annexb(&p.data).unwrap()[0][0] & 0x1F;
                    assert_eq!(p.is_key, nal_type == 5);
                    Some(p.is_key)
                }
                _ => None,
            })
            .collect();
        assert_eq!(keys, vec![true, false, true]);
    }

    #[tokio::test]
    async fn test_session_failure_is_fatal() {
        let backend = Arc::new(SoftwareBackend::new().with_max_dimensions(16, 16));
        let encoder =
            VideoEncoder::with_backend(VideoConfig::new(64, 48, 500_000, 30), backend).unwrap();
        let (listener, mut rx) = video_encoder_channel();
        encoder.set_listener(listener);

        encoder.encode(frame(64, 48, 0)).unwrap();
        encoder.flush().await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            VideoEncoderEvent::Error(AvError::SessionCreation(_))
        ));
        assert!(!encoder.is_usable());
        assert!(matches!(
            encoder.encode(frame(64, 48, 1)),
            Err(AvError::Unusable(_))
        ));
    }

    #[tokio::test]
    async fn test_late_listener_gets_parameter_sets() {
        let encoder = VideoEncoder::new(VideoConfig::new(64, 48, 500_000, 30)).unwrap();
        encoder.encode(frame(64, 48, 0)).unwrap();
        encoder.flush().await.unwrap();

        let (listener, mut rx) = video_encoder_channel();
        encoder.set_listener(listener);
        encoder.encode(frame(64, 48, 1)).unwrap();
        encoder.encode(frame(64, 48, 2)).unwrap();
        encoder.flush().await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], VideoEncoderEvent::ParameterSets { .. }));
        assert!(events[1..]
            .iter()
            .all(|e| matches!(e, VideoEncoderEvent::EncodedFrame(_))));
    }

    #[tokio::test]
    async fn test_stop_rejects_new_frames() {
        let encoder = VideoEncoder::new(VideoConfig::default()).unwrap();
        encoder.stop();
        assert!(matches!(encoder.encode(frame(480, 640, 0)), Err(AvError::Closed)));
        assert!(encoder.flush().await.is_err());
        assert!(VideoEncoder::new(VideoConfig::new(0, 0, 1, 1)).is_err());
    }
}
