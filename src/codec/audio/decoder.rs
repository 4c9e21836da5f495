use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::codec::aac::{AACConfig, AACParser};
use crate::codec::listener::{AudioDecoderListener, ListenerSlot};
use crate::codec::session::{creation_error, AudioDecompressionSession, CodecBackend};
use crate::codec::software::SoftwareBackend;
use crate::codec::worker::{Health, MediaSession, Worker, WorkerTask};
use crate::config::AudioConfig;
use crate::error::{AvError, Result};

const ROLE: &str = "audio-decoder";

/// Decodes AAC access units back into interleaved PCM.
///
/// The session is fixed by the config and built at construction. Input is
/// either one raw access unit or ADTS-framed data holding one or more
/// frames; each input buffer yields at most one PCM callback. A buffer that
/// cannot be decoded is reported and dropped.
pub struct AudioDecoder {
    config: AudioConfig,
    listener: Arc<ListenerSlot<dyn AudioDecoderListener>>,
    health: Arc<Health>,
    worker: Worker<Bytes>,
}

impl AudioDecoder {
    /// Creates a decoder on the software backend.
    pub fn new(config: AudioConfig) -> Result<Self> {
        Self::with_backend(config, Arc::new(SoftwareBackend::new()))
    }

    /// Fails with `UnsupportedFormat` for configs AAC cannot carry and with
    /// `SessionCreation` when `backend` cannot build the session.
    pub fn with_backend(config: AudioConfig, backend: Arc<dyn CodecBackend>) -> Result<Self> {
        let aac = config.aac_config()?;
        let session = backend
            .create_audio_decompression_session(&config)
            .map_err(creation_error)?;
        log::info!(
            "{} AAC decompression session created: {} Hz, {} ch",
            backend.name(),
            config.sample_rate(),
            config.channel_count()
        );

        let listener = Arc::new(ListenerSlot::new());
        let health = Arc::new(Health::default());
        let task = DecoderTask {
            aac,
            parser: AACParser::new(),
            session: Some(session),
            listener: listener.clone(),
        };

        Ok(Self {
            config,
            listener,
            health,
            worker: Worker::spawn(ROLE, task)?,
        })
    }

    /// The configuration the decoder was built with.
    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Replaces the listener. Takes effect before the next callback.
    pub fn set_listener(&self, listener: Arc<dyn AudioDecoderListener>) {
        self.listener.set(listener);
    }

    /// Detaches the listener; errors are logged until a new one is set.
    pub fn clear_listener(&self) {
        self.listener.clear();
    }

    /// Queues one raw access unit or a buffer of ADTS frames.
    pub fn decode(&self, data: impl Into<Bytes>) -> Result<()> {
        self.health.check()?;
        self.worker.submit(data.into())
    }
}

#[async_trait]
impl MediaSession for AudioDecoder {
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
    aac: AACConfig,
    parser: AACParser,
    session: Option<Box<dyn AudioDecompressionSession>>,
    listener: Arc<ListenerSlot<dyn AudioDecoderListener>>,
}

impl DecoderTask {
    /// Reports a per-buffer error. The session exists from construction on,
    /// so nothing past it makes the decoder unusable.
    fn report(&self, error: AvError) {
        self.listener.report(ROLE, error, |l, e| l.on_error(e));
    }

    /// Raw access units carried by `data`, checking ADTS headers against the config.
    fn access_units<'a>(&mut self, data: &'a [u8]) -> Result<Vec<&'a [u8]>> {
        if !AACParser::is_adts(data) {
            return Ok(vec![data]);
        }

        let frames = self.parser.split_frames(data)?;
        for frame in &frames {
            let header = &frame.header;
            if header.sample_rate_index != self.aac.sample_rate_index
                || header.channel_configuration != self.aac.channel_configuration
            {
                return Err(AvError::MalformedBitstream(format!(
                    "ADTS stream is {:?} Hz / {} ch, decoder is configured for {:?} Hz / {} ch",
                    header.sample_rate(),
                    header.channel_configuration,
                    self.aac.sample_rate(),
                    self.aac.channel_configuration
                )));
            }
        }
        Ok(frames.into_iter().map(|frame| frame.payload).collect())
    }

    fn decode_buffer(&mut self, data: &[u8]) -> Result<Option<Vec<u8>>> {
        let units = self.access_units(data)?;
        let session = self.session.as_mut().ok_or(AvError::Closed)?;

        let mut pcm = Vec::new();
        for unit in units {
            if let Some(decoded) = session.decode(unit)? {
                pcm.extend_from_slice(&decoded);
            }
        }
        Ok((!pcm.is_empty()).then_some(pcm))
    }
}

impl WorkerTask for DecoderTask {
    type Input = Bytes;

    fn process(&mut self, data: Bytes) {
        if data.is_empty() {
            return self.report(AvError::MalformedBitstream("empty AAC buffer".into()));
        }
        match self.decode_buffer(&data) {
            Ok(Some(pcm)) => {
                log::debug!("decoded {} bytes into {} PCM bytes", data.len(), pcm.len());
                self.listener.with(|l| l.on_decoded_pcm(&pcm));
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!("dropping {}-byte AAC buffer: {}", data.len(), e);
                self.report(e);
            }
        }
    }

    fn flush(&mut self) {}

    fn shutdown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.invalidate();
            log::info!("AAC decompression session released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::RawAudioBuffer;
    use crate::capture::sine_tone;
    use crate::codec::aac::ADTS_HEADER_SIZE;
    use crate::codec::audio::AudioEncoder;
    use crate::codec::listener::{
        audio_decoder_channel, audio_encoder_channel, AudioDecoderEvent, AudioEncoderEvent,
    };

    async fn encode(config: AudioConfig, adts: bool, frames: usize) -> Vec<Bytes> {
        let encoder = AudioEncoder::new(config).unwrap().with_adts(adts);
        let (listener, mut rx) = audio_encoder_channel();
        encoder.set_listener(listener);
        let pcm = sine_tone(&config, 440.0, 0, frames);
        encoder.encode(RawAudioBuffer::new(pcm, 0)).unwrap();
        encoder.flush().await.unwrap();

        let mut out = Vec::new();
        while let Ok(AudioEncoderEvent::EncodedPacket(packet)) = rx.try_recv() {
            out.push(packet.data);
        }
        out
    }

    #[tokio::test]
    async fn test_adts_buffers_concatenate() {
        let config = AudioConfig::default();
        let units = encode(config, true, 2048).await;
        assert_eq!(units.len(), 2);
        let stream: Vec<u8> = units.iter().flat_map(|u| u.to_vec()).collect();

        let decoder = AudioDecoder::new(config).unwrap();
        let (listener, mut rx) = audio_decoder_channel();
        decoder.set_listener(listener);
        decoder.decode(stream).unwrap();
        decoder.flush().await.unwrap();

        let Ok(AudioDecoderEvent::DecodedPcm(pcm)) = rx.try_recv() else {
            panic!("expected one PCM buffer");
        };
        assert_eq!(pcm.len(), 2048 * config.bytes_per_frame());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_mismatched_adts_is_rejected() {
        let stereo = AudioConfig::builder().channel_count(2).build();
        let units = encode(stereo, true, 2048).await;

        let decoder = AudioDecoder::new(AudioConfig::default()).unwrap();
        let (listener, mut rx) = audio_decoder_channel();
        decoder.set_listener(listener);
        decoder.decode(units[0].clone()).unwrap();
        decoder.decode(Bytes::new()).unwrap();
        decoder.flush().await.unwrap();

        for _ in 0..2 {
            assert!(matches!(
                rx.try_recv(),
                Ok(AudioDecoderEvent::Error(AvError::MalformedBitstream(_)))
            ));
        }
        assert!(decoder.is_usable());
    }

    #[tokio::test]
    async fn test_multi_block_adts_frame_is_skipped() {
        let config = AudioConfig::default();
        let units = encode(config, true, 1024).await;
        assert_eq!(units.len(), 1);

        let payload = &units[0][ADTS_HEADER_SIZE..];
        let mut header = config.aac_config().unwrap().adts_header(payload.len());
        header.number_of_raw_blocks = 1;
        let mut multi_block = header.to_bytes().to_vec();
        multi_block.extend_from_slice(payload);

        let decoder = AudioDecoder::new(config).unwrap();
        let (listener, mut rx) = audio_decoder_channel();
        decoder.set_listener(listener);
        decoder.decode(multi_block).unwrap();
        decoder.flush().await.unwrap();

        let Ok(AudioDecoderEvent::Error(err)) = rx.try_recv() else {
            panic!("expected an error");
        };
        assert!(matches!(err, AvError::UnsupportedFormat(_)));
        assert!(!err.is_fatal());
        assert!(decoder.is_usable());

        decoder.decode(units[0].clone()).unwrap();
        decoder.flush().await.unwrap();
        let Ok(AudioDecoderEvent::DecodedPcm(pcm)) = rx.try_recv() else {
            panic!("expected PCM after the skipped frame");
        };
        assert_eq!(pcm.len(), 1024 * config.bytes_per_frame());
        assert!(decoder.is_usable());
    }

    #[test]
    fn test_unsupported_config_fails_construction() {
        let config = AudioConfig::builder().channel_count(9).build();
        assert!(matches!(
            AudioDecoder::new(config),
            Err(AvError::UnsupportedFormat(_))
        ));
    }
}
