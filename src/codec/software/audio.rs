//! AAC-LC sessions on the Fraunhofer FDK library.
//!
//! Access units are raw (no ADTS header); framing is the front-end's job.
//! PCM of any configured sample size is narrowed to 16 bits on the way in
//! and widened again after decoding.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use fdk_aac::dec::{Decoder, Transport as DecoderTransport};
use fdk_aac::enc::{
    AudioObjectType, BitRate, ChannelMode, Encoder, EncoderParams, Transport as EncoderTransport,
};

use crate::codec::session::{AudioAccessUnit, AudioCompressionSession, AudioDecompressionSession};
use crate::config::{AudioConfig, AAC_FRAMES_PER_PACKET};
use crate::error::{AvError, Result};

/// Upper bound on one raw AAC-LC access unit: 6144 bits per channel.
const MAX_ACCESS_UNIT_BYTES: usize = 768 * 8;
/// Upper bound on the samples one access unit decodes to.
const MAX_DECODED_SAMPLES: usize = 2048 * 8;
/// Silent units fed on flush to push the encoder's delay line out.
const MAX_FLUSH_UNITS: usize = 8;

struct FdkEncoder(Encoder);

// SAFETY: the FDK handle is only touched through `&mut` from the one worker
// thread that owns the session.
unsafe impl Send for FdkEncoder {}

struct FdkDecoder(Decoder);

// SAFETY: as for `FdkEncoder`.
unsafe impl Send for FdkDecoder {}

fn channel_mode(config: &AudioConfig) -> Result<ChannelMode> {
    match config.channel_count() {
        1 => Ok(ChannelMode::Mono),
        2 => Ok(ChannelMode::Stereo),
        n => Err(AvError::UnsupportedFormat(format!(
            "the AAC session encodes mono or stereo, not {} channels",
            n
        ))),
    }
}

pub(super) struct SoftwareAudioEncoder {
    config: AudioConfig,
    encoder: FdkEncoder,
    pending: BytesMut,
    /// PCM frame counts of the units fed to FDK but not yet returned
    in_flight: VecDeque<usize>,
    scratch: Vec<u8>,
}

impl SoftwareAudioEncoder {
    pub(super) fn new(config: &AudioConfig) -> Result<Self> {
        config.validate()?;
        let params = EncoderParams {
            bit_rate: BitRate::Cbr(config.bitrate()),
            sample_rate: config.sample_rate(),
            transport: EncoderTransport::Raw,
            channels: channel_mode(config)?,
            audio_object_type: AudioObjectType::Mpeg4LowComplexity,
        };
        let encoder = Encoder::new(params)
            .map_err(|e| AvError::SessionCreation(format!("fdk-aac encoder: {:?}", e)))?;
        log::debug!(
            "fdk-aac encoder: {} Hz, {} ch, {} bps",
            config.sample_rate(),
            config.channel_count(),
            config.bitrate()
        );

        Ok(Self {
            config: *config,
            encoder: FdkEncoder(encoder),
            pending: BytesMut::new(),
            in_flight: VecDeque::new(),
            scratch: vec![0; MAX_ACCESS_UNIT_BYTES],
        })
    }

    fn unit_bytes(&self) -> usize {
        AAC_FRAMES_PER_PACKET * self.config.bytes_per_frame()
    }

    /// Encodes exactly one access unit's worth of samples. `frames` is `None`
    /// for padding that only drives the delay line.
    fn encode_unit(
        &mut self,
        samples: &[i16],
        frames: Option<usize>,
    ) -> Result<Option<AudioAccessUnit>> {
        if let Some(frames) = frames {
            self.in_flight.push_back(frames);
        }
        let info = self
            .encoder
            .0
            .encode(samples, &mut self.scratch)
            .map_err(|e| AvError::Submission(format!("fdk-aac encode: {:?}", e)))?;
        if info.output_size == 0 {
            return Ok(None);
        }
        let frames = self.in_flight.pop_front().unwrap_or(AAC_FRAMES_PER_PACKET);
        Ok(Some(AudioAccessUnit {
            data: Bytes::copy_from_slice(&self.scratch[..info.output_size]),
            frames,
        }))
    }

    fn to_samples(&self, pcm: &[u8]) -> Vec<i16> {
        let width = self.config.bytes_per_sample();
        let mut samples: Vec<i16> = pcm.chunks_exact(width).map(narrow).collect();
        samples.resize(AAC_FRAMES_PER_PACKET * self.config.channel_count() as usize, 0);
        samples
    }
}

impl AudioCompressionSession for SoftwareAudioEncoder {
    fn encode(&mut self, pcm: &[u8]) -> Result<Vec<AudioAccessUnit>> {
        if pcm.len() % self.config.bytes_per_frame() != 0 {
            return Err(AvError::Submission(format!(
                "{} PCM bytes is not a whole number of frames",
                pcm.len()
            )));
        }
        self.pending.extend_from_slice(pcm);

        let mut units = Vec::new();
        while self.pending.len() >= self.unit_bytes() {
            let chunk = self.pending.split_to(self.unit_bytes());
            let samples = self.to_samples(&chunk);
            units.extend(self.encode_unit(&samples, Some(AAC_FRAMES_PER_PACKET))?);
        }
        Ok(units)
    }

    fn flush(&mut self) -> Result<Vec<AudioAccessUnit>> {
        let mut units = Vec::new();
        if !self.pending.is_empty() {
            let chunk = self.pending.split();
            let frames = chunk.len() / self.config.bytes_per_frame();
            let samples = self.to_samples(&chunk);
            units.extend(self.encode_unit(&samples, Some(frames))?);
        }

        let silence = vec![0i16; AAC_FRAMES_PER_PACKET * self.config.channel_count() as usize];
        let mut fed = 0;
        while !self.in_flight.is_empty() && fed < MAX_FLUSH_UNITS {
            units.extend(self.encode_unit(&silence, None)?);
            fed += 1;
        }
        if !self.in_flight.is_empty() {
            log::warn!(
                "fdk-aac kept {} access units after flush",
                self.in_flight.len()
            );
            self.in_flight.clear();
        }
        Ok(units)
    }

    fn invalidate(&mut self) {
        self.pending.clear();
        self.in_flight.clear();
    }
}

pub(super) struct SoftwareAudioDecoder {
    config: AudioConfig,
    decoder: FdkDecoder,
    pcm: Vec<i16>,
}

impl SoftwareAudioDecoder {
    pub(super) fn new(config: &AudioConfig) -> Result<Self> {
        channel_mode(config)?;
        let asc = config.audio_specific_config()?;
        let mut decoder = Decoder::new(DecoderTransport::Raw);
        decoder
            .config_raw(&asc)
            .map_err(|e| AvError::SessionCreation(format!("fdk-aac decoder: {:?}", e)))?;

        Ok(Self {
            config: *config,
            decoder: FdkDecoder(decoder),
            pcm: vec![0; MAX_DECODED_SAMPLES],
        })
    }
}

impl AudioDecompressionSession for SoftwareAudioDecoder {
    fn decode(&mut self, access_unit: &[u8]) -> Result<Option<Bytes>> {
        if access_unit.is_empty() {
            return Ok(None);
        }
        let decoder = &mut self.decoder.0;
        let consumed = decoder
            .fill(access_unit)
            .map_err(|e| AvError::MalformedBitstream(format!("fdk-aac fill: {:?}", e)))?;
        if consumed != access_unit.len() {
            log::debug!(
                "fdk-aac took {} of {} access unit bytes",
                consumed,
                access_unit.len()
            );
        }
        decoder
            .decode_frame(&mut self.pcm)
            .map_err(|e| AvError::MalformedBitstream(format!("fdk-aac decode: {:?}", e)))?;

        let decoded = decoder.decoded_frame_size().min(self.pcm.len());
        if decoded == 0 {
            return Ok(None);
        }
        let width = self.config.bytes_per_sample();
        let mut out = Vec::with_capacity(decoded * width);
        for &sample in &self.pcm[..decoded] {
            widen(sample, width, &mut out);
        }
        Ok(Some(Bytes::from(out)))
    }
}

/// Reads one little-endian sample of 1 to 4 bytes as 16-bit.
fn narrow(bytes: &[u8]) -> i16 {
    let mut value = 0i32;
    for (i, &b) in bytes.iter().enumerate() {
        value |= (b as i32) << (8 * i);
    }
    let bits = 8 * bytes.len() as u32;
    let value = (value << (32 - bits)) >> (32 - bits);
    match bytes.len() {
        1 => (value << 8) as i16,
        n => (value >> (8 * (n - 2))) as i16,
    }
}

fn widen(sample: i16, width: usize, out: &mut Vec<u8>) {
    let value = sample as i32;
    let value = if width == 1 {
        value >> 8
    } else {
        value << (8 * (width - 2))
    };
    out.extend_from_slice(&value.to_le_bytes()[..width]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::pcm_to_i16;
    use crate::capture::sine_tone;
    use pretty_assertions::assert_eq;

    fn rms(samples: &[i16]) -> f64 {
        let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum / samples.len().max(1) as f64).sqrt()
    }

    #[test]
    fn test_units_cover_submitted_frames() {
        let config = AudioConfig::default();
        let mut encoder = SoftwareAudioEncoder::new(&config).unwrap();

        let mut units = encoder.encode(&sine_tone(&config, 440.0, 0, 1000)).unwrap();
        assert!(units.is_empty());
        units.extend(encoder.encode(&sine_tone(&config, 440.0, 1000, 2100)).unwrap());
        units.extend(encoder.flush().unwrap());

        let frames: Vec<usize> = units.iter().map(|u| u.frames).collect();
        assert_eq!(frames, vec![1024, 1024, 1024, 28]);
        assert!(units.iter().all(|u| !u.data.is_empty()));
        assert!(encoder.flush().unwrap().is_empty());
    }

    #[test]
    fn test_stereo_tone_survives() {
        let config = AudioConfig::builder().channel_count(2).build();
        let mut encoder = SoftwareAudioEncoder::new(&config).unwrap();
        let mut decoder = SoftwareAudioDecoder::new(&config).unwrap();

        let mut units = encoder.encode(&sine_tone(&config, 440.0, 0, 8 * 1024)).unwrap();
        units.extend(encoder.flush().unwrap());
        assert_eq!(units.len(), 8);

        let mut pcm = Vec::new();
        for unit in &units {
            if let Some(decoded) = decoder.decode(&unit.data).unwrap() {
                assert_eq!(decoded.len(), 1024 * 2 * 2);
                pcm.extend(pcm_to_i16(&decoded));
            }
        }
        // the tail holds the tone at its original level, give or take the codec
        let tail = &pcm[pcm.len() - 2048..];
        let level = rms(tail);
        assert!(level > 8_000.0 && level < 14_000.0, "rms {}", level);
    }

    #[test]
    fn test_sample_width_conversion() {
        assert_eq!(narrow(&[0xFF, 0xFF, 0x7F]), 0x7FFF);
        assert_eq!(narrow(&[0x00, 0x00, 0x80]), i16::MIN);
        assert_eq!(narrow(&[0x80]), i16::MIN);
        assert_eq!(narrow(&[0x34, 0x12]), 0x1234);

        let mut out = Vec::new();
        widen(0x1234, 3, &mut out);
        widen(-256, 1, &mut out);
        assert_eq!(out, vec![0x00, 0x34, 0x12, 0xFF]);
    }

    #[test]
    fn test_malformed_units() {
        let config = AudioConfig::default();
        let mut decoder = SoftwareAudioDecoder::new(&config).unwrap();
        assert_eq!(decoder.decode(&[]).unwrap(), None);

        let mut encoder = SoftwareAudioEncoder::new(&config).unwrap();
        assert!(matches!(encoder.encode(&[1, 2, 3]), Err(AvError::Submission(_))));
    }

    #[test]
    fn test_surround_is_unsupported() {
        let config = AudioConfig::builder().channel_count(6).build();
        assert!(matches!(
            SoftwareAudioEncoder::new(&config),
            Err(AvError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            SoftwareAudioDecoder::new(&config),
            Err(AvError::UnsupportedFormat(_))
        ));
    }
}
