//! H.264 sessions on OpenH264.
//!
//! The encoder produces a constrained-baseline stream. Each IDR access unit
//! OpenH264 emits carries SPS and PPS in-band; those are lifted into the
//! sample's format description and only the slices travel length-prefixed.
//! The decoder hands OpenH264 the format's parameter sets ahead of the first
//! picture and returns I420 images.

use bytes::Bytes;
use openh264::decoder::Decoder;
use openh264::encoder::{BitRate, Encoder, EncoderConfig, FrameRate, FrameType};
use openh264::formats::YUVSource;
use openh264::OpenH264API;

use crate::av::{ImageBuffer, PixelFormat, Plane};
use crate::codec::h264::{
    join_annexb, join_length_prefixed, length_prefixed_to_annexb, split_annexb, NALUnitType,
    ParameterSets,
};
use crate::codec::session::{
    CompressedSample, VideoCompressionSession, VideoDecompressionSession, VideoFormatDescription,
    VideoSessionParams,
};
use crate::error::{AvError, Result};

/// An NV12 picture split into the three planes OpenH264 reads.
struct I420Picture {
    width: usize,
    height: usize,
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
}

impl I420Picture {
    fn from_nv12(image: &ImageBuffer) -> Self {
        let width = image.width() as usize;
        let height = image.height() as usize;
        let mut y = image.to_packed_nv12();
        let chroma = y.split_off(width * height);

        Self {
            width,
            height,
            y,
            u: chroma.iter().step_by(2).copied().collect(),
            v: chroma.iter().skip(1).step_by(2).copied().collect(),
        }
    }
}

impl YUVSource for I420Picture {
    fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn strides(&self) -> (usize, usize, usize) {
        (self.width, self.width / 2, self.width / 2)
    }

    fn y(&self) -> &[u8] {
        &self.y
    }

    fn u(&self) -> &[u8] {
        &self.u
    }

    fn v(&self) -> &[u8] {
        &self.v
    }
}

pub(super) struct SoftwareVideoEncoder {
    params: VideoSessionParams,
    encoder: Encoder,
    format: Option<VideoFormatDescription>,
    frames_since_idr: u32,
}

impl SoftwareVideoEncoder {
    pub(super) fn new(params: &VideoSessionParams) -> Result<Self> {
        crate::config::validate_dimensions(params.width, params.height)
            .map_err(|e| AvError::SessionCreation(e.to_string()))?;

        let config = EncoderConfig::new()
            .bitrate(BitRate::from_bps(params.bitrate))
            .max_frame_rate(FrameRate::from_hz(params.fps as f32))
            .skip_frames(false);
        let encoder = Encoder::with_api_config(OpenH264API::from_source(), config)
            .map_err(|e| AvError::SessionCreation(format!("openh264 encoder: {}", e)))?;

        Ok(Self {
            params: *params,
            encoder,
            format: None,
            frames_since_idr: 0,
        })
    }

    /// Replaces the active format when the access unit carried a new SPS/PPS pair.
    fn update_format(&mut self, sps: Option<&[u8]>, pps: Option<&[u8]>) -> Result<()> {
        let (Some(sps), Some(pps)) = (sps, pps) else {
            return Ok(());
        };
        let sets = ParameterSets::new(Bytes::copy_from_slice(sps), Bytes::copy_from_slice(pps));
        if self.format.as_ref().map(|f| f.parameter_sets()) == Some(&sets) {
            return Ok(());
        }
        let format = VideoFormatDescription::from_parameter_sets(sets)
            .map_err(|e| AvError::Submission(format!("encoder parameter sets: {}", e)))?;
        log::debug!(
            "openh264 parameter sets: {}x{}",
            format.width(),
            format.height()
        );
        self.format = Some(format);
        Ok(())
    }
}

impl VideoCompressionSession for SoftwareVideoEncoder {
    fn encode_frame(
        &mut self,
        image: &ImageBuffer,
        pts: i64,
        force_keyframe: bool,
    ) -> Result<Option<CompressedSample>> {
        if image.format() != PixelFormat::Nv12 {
            return Err(AvError::Submission(format!(
                "session expects NV12, got {:?}",
                image.format()
            )));
        }
        if (image.width(), image.height()) != (self.params.width, self.params.height) {
            return Err(AvError::Submission(format!(
                "frame is {}x{}, session is {}x{}",
                image.width(),
                image.height(),
                self.params.width,
                self.params.height
            )));
        }

        if force_keyframe
            || self.format.is_none()
            || self.frames_since_idr >= self.params.max_keyframe_interval
        {
            self.encoder.force_intra_frame();
        }

        let picture = I420Picture::from_nv12(image);
        let (frame_type, annexb) = {
            let bitstream = self
                .encoder
                .encode(&picture)
                .map_err(|e| AvError::Submission(format!("openh264 encode: {}", e)))?;
            (bitstream.frame_type(), bitstream.to_vec())
        };
        if matches!(frame_type, FrameType::Skip) || annexb.is_empty() {
            log::debug!("openh264 skipped the frame at {}", pts);
            return Ok(None);
        }

        let mut sps = None;
        let mut pps = None;
        let mut slices = Vec::new();
        for unit in split_annexb(&annexb)? {
            match NALUnitType::from(unit[0] & 0x1F) {
                NALUnitType::SPS => sps = Some(unit),
                NALUnitType::PPS => pps = Some(unit),
                _ => slices.push(unit),
            }
        }
        self.update_format(sps, pps)?;
        if slices.is_empty() {
            return Ok(None);
        }
        let format = self.format.clone().ok_or_else(|| {
            AvError::Submission("openh264 produced slices before parameter sets".into())
        })?;

        let keyframe = matches!(frame_type, FrameType::IDR);
        self.frames_since_idr = if keyframe {
            1
        } else {
            self.frames_since_idr + 1
        };

        Ok(Some(CompressedSample {
            format,
            data: join_length_prefixed(&slices),
            pts,
            keyframe,
        }))
    }

    fn flush(&mut self) -> Result<Vec<CompressedSample>> {
        // no lookahead: every picture comes back from its own encode call
        Ok(Vec::new())
    }

    fn invalidate(&mut self) {
        self.format = None;
    }
}

pub(super) struct SoftwareVideoDecoder {
    format: VideoFormatDescription,
    decoder: Decoder,
    /// Set once OpenH264 has accepted the parameter sets
    primed: bool,
}

impl SoftwareVideoDecoder {
    pub(super) fn new(format: &VideoFormatDescription) -> Result<Self> {
        crate::config::validate_dimensions(format.width(), format.height())
            .map_err(|e| AvError::SessionCreation(e.to_string()))?;
        let decoder = Decoder::new()
            .map_err(|e| AvError::SessionCreation(format!("openh264 decoder: {}", e)))?;

        Ok(Self {
            format: format.clone(),
            decoder,
            primed: false,
        })
    }
}

impl VideoDecompressionSession for SoftwareVideoDecoder {
    fn format(&self) -> &VideoFormatDescription {
        &self.format
    }

    fn decode_sample(&mut self, sample: &[u8], pts: i64) -> Result<Option<ImageBuffer>> {
        let mut annexb = Vec::with_capacity(sample.len() + 64);
        if !self.primed {
            let sets = self.format.parameter_sets();
            annexb.extend_from_slice(&join_annexb(&[&sets.sps[..], &sets.pps[..]]));
        }
        annexb.extend_from_slice(&length_prefixed_to_annexb(sample)?);

        let image = match self.decoder.decode(&annexb) {
            Ok(Some(yuv)) => Some(decoded_image(&yuv)?),
            Ok(None) => None,
            Err(e) => {
                return Err(AvError::MalformedBitstream(format!(
                    "openh264 rejected picture {}: {}",
                    pts, e
                )))
            }
        };
        self.primed = true;
        Ok(image)
    }

    fn flush(&mut self) -> Result<Vec<ImageBuffer>> {
        Ok(Vec::new())
    }

    fn invalidate(&mut self) {
        self.primed = false;
    }
}

/// Copies a decoded picture out of OpenH264's buffers.
fn decoded_image(yuv: &impl YUVSource) -> Result<ImageBuffer> {
    let (width, height) = yuv.dimensions();
    let (y_stride, u_stride, v_stride) = yuv.strides();
    ImageBuffer::from_planes(
        width as u32,
        height as u32,
        PixelFormat::I420,
        vec![
            Plane::packed(Bytes::copy_from_slice(yuv.y()), y_stride),
            Plane::packed(Bytes::copy_from_slice(yuv.u()), u_stride),
            Plane::packed(Bytes::copy_from_slice(yuv.v()), v_stride),
        ],
    )
    .map_err(|e| AvError::MalformedBitstream(format!("decoded picture: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::color_bars;
    use crate::codec::h264::split_length_prefixed;
    use pretty_assertions::assert_eq;

    fn params(width: u32, height: u32) -> VideoSessionParams {
        VideoSessionParams {
            width,
            height,
            bitrate: 500_000,
            fps: 2,
            max_keyframe_interval: 4,
        }
    }

    fn slice_type_of(sample: &CompressedSample) -> u8 {
        split_length_prefixed(&sample.data).unwrap()[0][0] & 0x1F
    }

    /// Mean absolute luma difference between two images of the same size.
    fn luma_distance(a: &ImageBuffer, b: &ImageBuffer) -> f64 {
        let luma = (a.width() * a.height()) as usize;
        let (a, b) = (a.to_packed_nv12(), b.to_packed_nv12());
        let total: u64 = a[..luma]
            .iter()
            .zip(&b[..luma])
            .map(|(&x, &y)| (x as i32 - y as i32).unsigned_abs() as u64)
            .sum();
        total as f64 / luma as f64
    }

    #[test]
    fn test_keyframe_cadence() {
        let mut encoder = SoftwareVideoEncoder::new(&params(64, 48)).unwrap();
        let kinds: Vec<u8> = (0..6)
            .map(|pts| {
                let frame = color_bars(64, 48, pts as u32).unwrap();
                let sample = encoder.encode_frame(&frame, pts, pts == 5).unwrap().unwrap();
                assert_eq!(sample.keyframe, slice_type_of(&sample) == 5);
                slice_type_of(&sample)
            })
            .collect();
        assert_eq!(kinds, vec![5, 1, 1, 1, 5, 5]);
    }

    #[test]
    fn test_samples_carry_parameter_sets_out_of_band() {
        let mut encoder = SoftwareVideoEncoder::new(&params(64, 48)).unwrap();
        let frame = color_bars(64, 48, 0).unwrap();
        let sample = encoder.encode_frame(&frame, 0, false).unwrap().unwrap();

        assert_eq!((sample.format.width(), sample.format.height()), (64, 48));
        assert_eq!(sample.format.sps().profile_idc, 66);
        for unit in split_length_prefixed(&sample.data).unwrap() {
            assert!(!NALUnitType::from(unit[0] & 0x1F).is_parameter_set());
        }
    }

    #[test]
    fn test_round_trip_stays_close() {
        let mut encoder = SoftwareVideoEncoder::new(&params(96, 64)).unwrap();
        let mut decoder = None;

        for offset in [0u32, 4, 8, 12] {
            let frame = color_bars(96, 64, offset).unwrap();
            let sample = encoder.encode_frame(&frame, 0, false).unwrap().unwrap();
            let decoder = decoder
                .get_or_insert_with(|| SoftwareVideoDecoder::new(&sample.format).unwrap());
            let image = decoder.decode_sample(&sample.data, 0).unwrap().unwrap();
            assert_eq!((image.width(), image.height()), (96, 64));
            assert!(luma_distance(&image, &frame) < 12.0);
        }
    }

    #[test]
    fn test_garbage_slice_is_malformed() {
        let mut encoder = SoftwareVideoEncoder::new(&params(64, 48)).unwrap();
        let frame = color_bars(64, 48, 0).unwrap();
        let sample = encoder.encode_frame(&frame, 0, false).unwrap().unwrap();
        let mut decoder = SoftwareVideoDecoder::new(&sample.format).unwrap();

        assert!(decoder.decode_sample(&[0, 0, 0, 9], 0).is_err());
        let image = decoder.decode_sample(&sample.data, 1).unwrap();
        assert!(image.is_some());
    }

    #[test]
    fn test_rejects_mismatched_frames() {
        let mut encoder = SoftwareVideoEncoder::new(&params(64, 48)).unwrap();
        let err = encoder
            .encode_frame(&color_bars(96, 64, 0).unwrap(), 0, false)
            .unwrap_err();
        assert!(matches!(err, AvError::Submission(_)));

        assert!(SoftwareVideoEncoder::new(&params(0, 16)).is_err());
    }
}
