use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::av::ImageBuffer;
use crate::codec::h264::parser::unescape_rbsp;
use crate::codec::h264::{join_length_prefixed, split_annexb, H264Parser, NALUnitType, ParameterSets};
use crate::codec::listener::{ListenerSlot, VideoDecoderListener};
use crate::codec::session::{
    creation_error, CodecBackend, VideoDecompressionSession, VideoFormatDescription,
};
use crate::codec::software::SoftwareBackend;
use crate::codec::worker::{Health, MediaSession, Worker, WorkerTask};
use crate::config::VideoConfig;
use crate::error::{AvError, Result};
use crate::utils::BitReader;

const ROLE: &str = "video-decoder";

/// Decodes an Annex-B H.264 stream into images.
///
/// SPS and PPS units are stored as they arrive; the first slice after them
/// configures the decompression session. Repeating the active pair is a
/// no-op. When a slice finds a different pair in force, the old session is
/// drained (its pending images are delivered) and released before the new
/// one is built, so images of the old and new format never interleave.
///
/// Malformed or unsupported units are reported and skipped. Only a failure
/// to create a session makes the decoder unusable.
///
/// Slices that start a new picture (`first_mb_in_slice == 0`), access unit
/// delimiters and parameter sets close the picture being collected; each
/// picture becomes one length-prefixed sample.
pub struct VideoDecoder {
    config: VideoConfig,
    listener: Arc<ListenerSlot<dyn VideoDecoderListener>>,
    health: Arc<Health>,
    worker: Worker<Bytes>,
}

impl VideoDecoder {
    /// Decoder on the [`SoftwareBackend`].
    pub fn new(config: VideoConfig) -> Result<Self> {
        Self::with_backend(config, Arc::new(SoftwareBackend::new()))
    }

    /// Decoder whose sessions come from `backend`.
    pub fn with_backend(config: VideoConfig, backend: Arc<dyn CodecBackend>) -> Result<Self> {
        config.validate()?;

        let listener = Arc::new(ListenerSlot::new());
        let health = Arc::new(Health::default());
        let task = DecoderTask {
            backend,
            parser: H264Parser::new(),
            sps: None,
            pps: None,
            session: None,
            picture: Vec::new(),
            next_pts: 0,
            listener: listener.clone(),
            health: health.clone(),
        };

        Ok(Self {
            config,
            listener,
            health,
            worker: Worker::spawn(ROLE, task)?,
        })
    }

    /// The configuration the decoder was built with.
    pub fn config(&self) -> &VideoConfig {
        &self.config
    }

    /// Replaces the listener. Takes effect before the next callback.
    pub fn set_listener(&self, listener: Arc<dyn VideoDecoderListener>) {
        self.listener.set(listener);
    }

    /// Detaches the listener; errors are logged until a new one is set.
    pub fn clear_listener(&self) {
        self.listener.clear();
    }

    /// Queues a buffer of one or more start-code delimited NAL units.
    pub fn decode(&self, data: impl Into<Bytes>) -> Result<()> {
        self.health.check()?;
        self.worker.submit(data.into())
    }
}

#[async_trait]
impl MediaSession for VideoDecoder {
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

struct DecoderTask {
    backend: Arc<dyn CodecBackend>,
    parser: H264Parser,
    sps: Option<Bytes>,
    pps: Option<Bytes>,
    session: Option<Box<dyn VideoDecompressionSession>>,
    /// Slices of the picture being collected
    picture: Vec<Bytes>,
    next_pts: i64,
    listener: Arc<ListenerSlot<dyn VideoDecoderListener>>,
    health: Arc<Health>,
}

impl DecoderTask {
    /// Reports a per-unit error; the decoder stays usable.
    fn report(&self, error: AvError) {
        self.listener.report(ROLE, error, |l, e| l.on_error(e));
    }

    /// Reports an error that leaves the decoder unusable.
    fn fail(&self, error: AvError) {
        self.health.mark_fatal(&error);
        self.report(error);
    }

    fn deliver(&self, image: &ImageBuffer) {
        self.listener.with(|l| l.on_decoded_image(image));
    }

    /// Builds or rebuilds the session for the stored parameter sets. A no-op
    /// until both are known, and while they match the active session.
    fn configure(&mut self) {
        let (Some(sps), Some(pps)) = (&self.sps, &self.pps) else {
            return;
        };
        let sets = ParameterSets::new(sps.clone(), pps.clone());
        if let Some(session) = &self.session {
            if session.format().parameter_sets() == &sets {
                return;
            }
        }

        let format = match VideoFormatDescription::from_parameter_sets(sets) {
            Ok(format) => format,
            Err(e) => return self.report(e),
        };

        if self.session.is_some() {
            log::info!(
                "parameter sets changed, draining session before reconfiguring to {}x{}",
                format.width(),
                format.height()
            );
            self.drain();
            self.release();
        }

        match self
            .backend
            .create_video_decompression_session(&format)
            .map_err(creation_error)
        {
            Ok(session) => {
                log::info!(
                    "{} decompression session created: {}x{}",
                    self.backend.name(),
                    format.width(),
                    format.height()
                );
                self.session = Some(session);
            }
            Err(e) => self.fail(e),
        }
    }

    /// Submits the collected picture as one sample.
    fn submit_picture(&mut self) {
        if self.picture.is_empty() {
            return;
        }
        let slices = std::mem::take(&mut self.picture);

        let Some(session) = self.session.as_mut() else {
            log::warn!("dropping {} slice(s): no parameter sets yet", slices.len());
            return self.report(AvError::NotConfigured("slice received before SPS/PPS".into()));
        };

        let units: Vec<&[u8]> = slices.iter().map(|s| &s[..]).collect();
        let sample = join_length_prefixed(&units);
        let pts = self.next_pts;
        self.next_pts += 1;

        match session.decode_sample(&sample, pts) {
            Ok(Some(image)) => self.deliver(&image),
            Ok(None) => {}
            Err(e) => {
                log::warn!("picture {} dropped: {}", pts, e);
                self.report(e);
            }
        }
    }

    fn drain(&mut self) {
        self.submit_picture();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match session.flush() {
            Ok(images) => images.iter().for_each(|image| self.deliver(image)),
            Err(e) => self.report(e),
        }
    }

    fn release(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.invalidate();
            log::info!("decompression session released");
        }
    }

    fn handle_unit(&mut self, unit: Bytes) {
        let nalu = match self.parser.parse_nalu(&unit) {
            Ok(nalu) => nalu,
            Err(e) => {
                log::warn!("dropping NAL unit: {}", e);
                return self.report(e);
            }
        };

        match nalu.unit_type() {
            // stored only: the session follows the pair in force at the next slice
            NALUnitType::SPS => {
                self.submit_picture();
                self.sps = Some(unit);
            }
            NALUnitType::PPS => {
                self.submit_picture();
                self.pps = Some(unit);
            }
            NALUnitType::CodedSliceIDR | NALUnitType::CodedSliceNonIDR => {
                if starts_picture(&unit) {
                    self.submit_picture();
                }
                self.configure();
                self.picture.push(unit);
            }
            NALUnitType::AccessUnitDelimiter | NALUnitType::EndOfSequence => {
                self.submit_picture()
            }
            other => log::debug!("skipping {:?} NAL unit", other),
        }
    }
}

/// True when the slice's `first_mb_in_slice` is zero.
fn starts_picture(slice: &[u8]) -> bool {
    // ue(v) of a u32 fits in 8 bytes even with emulation prevention
    let head = unescape_rbsp(&slice[1..slice.len().min(9)]);
    let mut reader = BitReader::new(&head);
    matches!(reader.read_golomb(), Ok(0))
}

impl WorkerTask for DecoderTask {
    type Input = Bytes;

    fn process(&mut self, data: Bytes) {
        if self.health.is_fatal() {
            log::warn!("dropping {} bytes: decoder unusable", data.len());
            return;
        }

        let units = match split_annexb(&data) {
            Ok(units) => units,
            Err(e) => {
                log::warn!("dropping {}-byte buffer: {}", data.len(), e);
                return self.report(e);
            }
        };
        let units: Vec<Bytes> = units
            .into_iter()
            .map(|unit| data.slice_ref(unit))
            .collect();

        for unit in units {
            self.handle_unit(unit);
        }
        self.submit_picture();
    }

    fn flush(&mut self) {
        self.drain();
    }

    fn shutdown(&mut self) {
        self.release();
    }
}
