use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};

use crate::av::{MediaType, Packet, RawAudioBuffer};
use crate::codec::aac::AACConfig;
use crate::codec::listener::{AudioEncoderListener, ListenerSlot};
use crate::codec::session::{
    creation_error, AudioAccessUnit, AudioCompressionSession, CodecBackend,
};
use crate::codec::software::SoftwareBackend;
use crate::codec::worker::{Health, MediaSession, Worker, WorkerTask};
use crate::config::AudioConfig;
use crate::error::{AvError, Result};

const ROLE: &str = "audio-encoder";

/// Compresses interleaved PCM into AAC access units of 1024 frames.
///
/// The session is created on the first buffer. Input is regrouped into
/// whole access units; PCM left over when the encoder is flushed or stopped
/// goes out as a final short unit. Packet timestamps count PCM frames from
/// the first buffer's timestamp, so they do not drift.
pub struct AudioEncoder {
    config: AudioConfig,
    listener: Arc<ListenerSlot<dyn AudioEncoderListener>>,
    health: Arc<Health>,
    adts: Arc<AtomicBool>,
    worker: Worker<RawAudioBuffer>,
}

impl AudioEncoder {
    /// Creates an encoder on the software backend.
    pub fn new(config: AudioConfig) -> Result<Self> {
        Self::with_backend(config, Arc::new(SoftwareBackend::new()))
    }

    /// Fails with `UnsupportedFormat` for configs AAC cannot carry.
    pub fn with_backend(config: AudioConfig, backend: Arc<dyn CodecBackend>) -> Result<Self> {
        let aac = config.aac_config()?;

        let listener = Arc::new(ListenerSlot::new());
        let health = Arc::new(Health::default());
        let adts = Arc::new(AtomicBool::new(false));
        let task = EncoderTask {
            backend,
            config,
            aac,
            session: None,
            base_pts: None,
            frames_emitted: 0,
            listener: listener.clone(),
            health: health.clone(),
            adts: adts.clone(),
        };

        Ok(Self {
            config,
            listener,
            health,
            adts,
            worker: Worker::spawn(ROLE, task)?,
        })
    }

    /// Prefixes every packet with an ADTS header derived from the config.
    pub fn with_adts(self, enabled: bool) -> Self {
        self.adts.store(enabled, Ordering::Release);
        self
    }

    /// The configuration the encoder was built with.
    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Replaces the listener. Takes effect before the next callback.
    pub fn set_listener(&self, listener: Arc<dyn AudioEncoderListener>) {
        self.listener.set(listener);
    }

    /// Detaches the listener; output is dropped until a new one is set.
    pub fn clear_listener(&self) {
        self.listener.clear();
    }

    /// Queues interleaved PCM. Per-buffer failures arrive through `on_error`.
    pub fn encode(&self, buffer: RawAudioBuffer) -> Result<()> {
        self.health.check()?;
        self.worker.submit(buffer)
    }
}

#[async_trait]
impl MediaSession for AudioEncoder {
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
    config: AudioConfig,
    aac: AACConfig,
    session: Option<Box<dyn AudioCompressionSession>>,
    /// Timestamp of the first submitted frame
    base_pts: Option<i64>,
    /// PCM frames covered by the packets delivered so far
    frames_emitted: u64,
    listener: Arc<ListenerSlot<dyn AudioEncoderListener>>,
    health: Arc<Health>,
    adts: Arc<AtomicBool>,
}

impl EncoderTask {
    /// Reports a per-buffer error; the encoder stays usable.
    fn report(&self, error: AvError) {
        self.listener.report(ROLE, error, |l, e| l.on_error(e));
    }

    /// Reports an error that leaves the encoder unusable.
    fn fail(&self, error: AvError) {
        self.health.mark_fatal(&error);
        self.report(error);
    }

    /// Microseconds from the first submitted frame to frame `frames`.
    fn offset_us(&self, frames: u64) -> i64 {
        (frames * 1_000_000 / self.config.sample_rate() as u64) as i64
    }

    fn deliver(&mut self, units: Vec<AudioAccessUnit>) {
        let base = self.base_pts.unwrap_or(0);
        for unit in units {
            let start = self.offset_us(self.frames_emitted);
            self.frames_emitted += unit.frames as u64;
            let pts = base + start;
            let duration_us = self.offset_us(self.frames_emitted) - start;

            let data = if self.adts.load(Ordering::Acquire) {
                let header = self.aac.adts_header(unit.data.len());
                let mut framed = BytesMut::with_capacity(header.header_len() + unit.data.len());
                framed.put_slice(&header.to_bytes());
                framed.put_slice(&unit.data);
                framed.freeze()
            } else {
                unit.data
            };

            let packet = Packet::new(MediaType::Audio, data)
                .with_pts(pts)
                .with_key_flag(true)
                .with_duration(Duration::from_micros(duration_us as u64));
            log::debug!("encoded {} frames into {} bytes", unit.frames, packet.len());
            self.listener.with(|l| l.on_encoded_packet(&packet));
        }
    }
}

impl WorkerTask for EncoderTask {
    type Input = RawAudioBuffer;

    fn process(&mut self, buffer: RawAudioBuffer) {
        if self.health.is_fatal() {
            log::warn!("dropping audio at {}: encoder unusable", buffer.pts);
            return;
        }
        if let Err(e) = buffer.frame_count(&self.config) {
            return self.report(e);
        }

        if self.session.is_none() {
            match self
                .backend
                .create_audio_compression_session(&self.config)
                .map_err(creation_error)
            {
                Ok(session) => {
                    log::info!(
                        "{} AAC session created: {} Hz, {} ch, {}-bit, {} bps",
                        self.backend.name(),
                        self.config.sample_rate(),
                        self.config.channel_count(),
                        self.config.sample_size(),
                        self.config.bitrate()
                    );
                    self.session = Some(session);
                }
                Err(e) => return self.fail(e),
            }
        }

        if self.base_pts.is_none() {
            self.base_pts = Some(buffer.pts);
        }
        let result = match self.session.as_mut() {
            Some(session) => session.encode(&buffer.data),
            None => return,
        };
        match result {
            Ok(units) => self.deliver(units),
            Err(e) => {
                log::warn!("audio at {} not encoded: {}", buffer.pts, e);
                self.report(e);
            }
        }
    }

    fn flush(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match session.flush() {
            Ok(units) => self.deliver(units),
            Err(e) => self.report(e),
        }
    }

    fn shutdown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.invalidate();
            log::info!("AAC compression session released");
        }
    }
}
