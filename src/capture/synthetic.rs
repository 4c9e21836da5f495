use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::av::{ImageBuffer, RawAudioBuffer, RawVideoFrame};
use crate::capture::{CaptureListener, CaptureSource, CaptureType, CapturedSample};
use crate::codec::listener::ListenerSlot;
use crate::config::{validate_dimensions, AudioConfig, VideoConfig};
use crate::error::{AvError, Result};

/// A fake input device: which tone it plays and how fast its bars scroll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticDevice {
    /// Device name
    pub name: &'static str,
    /// Frequency of the generated tone
    pub tone_hz: f32,
    /// Horizontal scroll per frame, in pixels
    pub bar_step: u32,
}

/// The devices [`SyntheticCapture`] cycles through on `switch_device`.
pub static DEVICES: [SyntheticDevice; 2] = [
    SyntheticDevice {
        name: "synthetic-front",
        tone_hz: 440.0,
        bar_step: 4,
    },
    SyntheticDevice {
        name: "synthetic-back",
        tone_hz: 660.0,
        bar_step: 8,
    },
];

/// BT.601 video-range (Y, Cb, Cr) of the eight classic bars.
const BARS: [(u8, u8, u8); 8] = [
    (235, 128, 128), // white
    (210, 16, 146),  // yellow
    (170, 166, 16),  // cyan
    (145, 54, 34),   // green
    (106, 202, 222), // magenta
    (81, 90, 240),   // red
    (41, 240, 110),  // blue
    (16, 128, 128),  // black
];

/// Renders vertical colour bars as NV12, scrolled left by `offset` pixels.
pub fn color_bars(width: u32, height: u32, offset: u32) -> Result<ImageBuffer> {
    validate_dimensions(width, height)?;
    let w = width as usize;
    let h = height as usize;
    let bar_at = |x: usize| BARS[((x + offset as usize) % w) * BARS.len() / w];

    let mut data = Vec::with_capacity(w * h * 3 / 2);
    let luma_row: Vec<u8> = (0..w).map(|x| bar_at(x).0).collect();
    for _ in 0..h {
        data.extend_from_slice(&luma_row);
    }
    let chroma_row: Vec<u8> = (0..w)
        .step_by(2)
        .flat_map(|x| {
            let (_, cb, cr) = bar_at(x);
            [cb, cr]
        })
        .collect();
    for _ in 0..h / 2 {
        data.extend_from_slice(&chroma_row);
    }
    ImageBuffer::from_packed_nv12(width, height, data)
}

/// Interleaved little-endian PCM of a half-scale sine, starting at frame `start`.
pub fn sine_tone(config: &AudioConfig, tone_hz: f32, start: u64, frames: usize) -> Vec<u8> {
    let bytes = config.bytes_per_sample();
    let channels = config.channel_count() as usize;
    let rate = config.sample_rate() as f64;
    let mut out = Vec::with_capacity(frames * config.bytes_per_frame());

    for n in start..start + frames as u64 {
        let phase = 2.0 * std::f64::consts::PI * tone_hz as f64 * n as f64 / rate;
        let sample = (phase.sin() * 16_383.0) as i32;
        // widen or narrow from 16 bits to the configured size
        let value = if bytes == 1 {
            sample >> 8
        } else {
            sample << (8 * (bytes - 2))
        };
        for _ in 0..channels {
            out.extend_from_slice(&value.to_le_bytes()[..bytes]);
        }
    }
    out
}

struct Shared {
    running: AtomicBool,
    device: AtomicUsize,
    listener: ListenerSlot<dyn CaptureListener>,
}

impl Shared {
    fn device(&self) -> &'static SyntheticDevice {
        &DEVICES[self.device.load(Ordering::Acquire) % DEVICES.len()]
    }
}

/// Test-pattern source: colour bars for video, a sine tone for audio.
///
/// Samples are produced in real time on an `avpipe-capture` thread, one
/// video frame and the matching span of audio per tick of the configured
/// frame rate.
pub struct SyntheticCapture {
    capture_type: CaptureType,
    video: VideoConfig,
    audio: AudioConfig,
    size: Option<(u32, u32)>,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl SyntheticCapture {
    /// Creates an unprepared source for `capture_type` at the given configs.
    pub fn new(capture_type: CaptureType, video: VideoConfig, audio: AudioConfig) -> Result<Self> {
        if capture_type.has_video() {
            video.validate()?;
        }
        if capture_type.has_audio() {
            audio.validate()?;
        }
        Ok(Self {
            capture_type,
            video,
            audio,
            size: None,
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                device: AtomicUsize::new(0),
                listener: ListenerSlot::new(),
            }),
            thread: None,
        })
    }

    /// The device currently producing samples.
    pub fn device(&self) -> &'static SyntheticDevice {
        self.shared.device()
    }

    /// True between `start` and `stop`.
    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    fn ensure_stopped(&self, action: &str) -> Result<()> {
        if self.is_running() {
            return Err(AvError::Capture(format!("cannot {} while running", action)));
        }
        Ok(())
    }
}

impl CaptureSource for SyntheticCapture {
    fn capture_type(&self) -> CaptureType {
        self.capture_type
    }

    fn set_listener(&self, listener: Arc<dyn CaptureListener>) {
        self.shared.listener.set(listener);
    }

    fn clear_listener(&self) {
        self.shared.listener.clear();
    }

    fn prepare(&mut self) -> Result<()> {
        self.ensure_stopped("prepare")?;
        let size = if self.capture_type.has_video() {
            (self.video.width(), self.video.height())
        } else {
            (0, 0)
        };
        self.size = Some(size);
        log::info!(
            "capture prepared on {}: {:?} {}x{}",
            self.device().name,
            self.capture_type,
            size.0,
            size.1
        );
        Ok(())
    }

    fn prepare_with_preview_size(&mut self, width: u32, height: u32) -> Result<()> {
        if !self.capture_type.has_video() {
            return Err(AvError::Capture(
                "preview size requested on an audio-only source".into(),
            ));
        }
        self.ensure_stopped("prepare")?;
        validate_dimensions(width, height)?;
        self.size = Some((width, height));
        log::info!(
            "capture prepared on {}: {:?} {}x{} (preview)",
            self.device().name,
            self.capture_type,
            width,
            height
        );
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let Some((width, height)) = self.size else {
            return Err(AvError::Capture("start called before prepare".into()));
        };
        if self.is_running() {
            log::debug!("capture already running");
            return Ok(());
        }

        let generator = Generator {
            capture_type: self.capture_type,
            width,
            height,
            fps: self.video.fps(),
            audio: self.audio,
        };
        let shared = self.shared.clone();
        shared.running.store(true, Ordering::Release);
        let thread = std::thread::Builder::new()
            .name("avpipe-capture".into())
            .spawn(move || generator.run(&shared))
            .map_err(|e| {
                self.shared.running.store(false, Ordering::Release);
                AvError::Capture(format!("failed to spawn capture thread: {}", e))
            })?;
        self.thread = Some(thread);
        log::info!("capture started");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        self.shared.running.store(false, Ordering::Release);
        thread
            .join()
            .map_err(|_| AvError::Capture("capture thread panicked".into()))?;
        log::info!("capture stopped");
        Ok(())
    }

    fn switch_device(&mut self) -> Result<()> {
        if self.size.is_none() {
            return Err(AvError::Capture("no device open; call prepare first".into()));
        }
        let next = (self.shared.device.load(Ordering::Acquire) + 1) % DEVICES.len();
        self.shared.device.store(next, Ordering::Release);
        log::info!("switched capture device to {}", DEVICES[next].name);
        Ok(())
    }

    fn width(&self) -> u32 {
        self.size.map_or(0, |(w, _)| w)
    }

    fn height(&self) -> u32 {
        self.size.map_or(0, |(_, h)| h)
    }
}

impl Drop for SyntheticCapture {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("{}", e);
        }
    }
}

struct Generator {
    capture_type: CaptureType,
    width: u32,
    height: u32,
    fps: u32,
    audio: AudioConfig,
}

impl Generator {
    fn run(self, shared: &Shared) {
        let fps = self.fps.max(1) as u64;
        let rate = self.audio.sample_rate() as u64;
        let interval = Duration::from_micros(1_000_000 / fps);
        let started = Instant::now();
        let mut tick: u64 = 0;
        let mut audio_frame: u64 = 0;

        while shared.running.load(Ordering::Acquire) {
            let device = shared.device();

            if self.capture_type.has_video() {
                let offset = (tick as u32).wrapping_mul(device.bar_step);
                match color_bars(self.width, self.height, offset) {
                    Ok(image) => {
                        let pts = (tick * 1_000_000 / fps) as i64;
                        let frame = RawVideoFrame::new(image, pts);
                        shared.listener.with(|l| l.on_sample(CapturedSample::Video(frame)));
                    }
                    Err(e) => {
                        shared.listener.report("capture", e, |l, e| l.on_error(e));
                        break;
                    }
                }
            }

            if self.capture_type.has_audio() {
                let end = (tick + 1) * rate / fps;
                let frames = (end - audio_frame) as usize;
                let pcm = sine_tone(&self.audio, device.tone_hz, audio_frame, frames);
                let pts = (audio_frame * 1_000_000 / rate) as i64;
                let buffer = RawAudioBuffer::new(pcm, pts);
                shared.listener.with(|l| l.on_sample(CapturedSample::Audio(buffer)));
                audio_frame = end;
            }

            tick += 1;
            let due = started + interval.mul_f64(tick as f64);
            if let Some(wait) = due.checked_duration_since(Instant::now()) {
                std::thread::sleep(wait);
            }
        }
        shared.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::{pcm_to_i16, MediaType};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Collect {
        samples: Mutex<Vec<CapturedSample>>,
    }

    impl CaptureListener for Collect {
        fn on_sample(&self, sample: CapturedSample) {
            self.samples.lock().push(sample);
        }
    }

    fn source(capture_type: CaptureType) -> SyntheticCapture {
        let video = VideoConfig::builder().width(32).height(16).fps(100).build();
        SyntheticCapture::new(capture_type, video, AudioConfig::default()).unwrap()
    }

    #[test]
    fn test_color_bars_layout() {
        let image = color_bars(16, 2, 0).unwrap();
        let nv12 = image.to_packed_nv12();
        assert_eq!(nv12.len(), 16 * 2 * 3 / 2);
        assert_eq!(nv12[0], 235);
        assert_eq!(nv12[2], 210);
        assert_eq!(nv12[15], 16);
        // first chroma pair is white's
        assert_eq!(&nv12[32..34], &[128, 128]);

        let scrolled = color_bars(16, 2, 2).unwrap().to_packed_nv12();
        assert_eq!(scrolled[0], 210);
        assert_eq!(scrolled[15], 235);
    }

    #[test]
    fn test_sine_tone() {
        let stereo = AudioConfig::builder().channel_count(2).build();
        let pcm = sine_tone(&stereo, 440.0, 0, 100);
        assert_eq!(pcm.len(), 100 * 4);
        let samples = pcm_to_i16(&pcm);
        assert_eq!(samples[0], 0);
        assert!(samples.chunks(2).all(|f| f[0] == f[1]));
        assert!(samples.iter().all(|s| s.abs() <= 16_383));

        let wide = AudioConfig::builder().sample_size(24).build();
        assert_eq!(sine_tone(&wide, 440.0, 10, 8).len(), 8 * 3);
    }

    #[test]
    fn test_lifecycle_errors() {
        let mut video = source(CaptureType::Video);
        assert!(matches!(video.start(), Err(AvError::Capture(_))));
        assert!(matches!(video.switch_device(), Err(AvError::Capture(_))));
        assert_eq!(video.width(), 0);

        video.prepare_with_preview_size(64, 48).unwrap();
        assert_eq!((video.width(), video.height()), (64, 48));

        let mut audio = source(CaptureType::Audio);
        assert!(matches!(
            audio.prepare_with_preview_size(64, 48),
            Err(AvError::Capture(_))
        ));
        audio.prepare().unwrap();
        assert_eq!((audio.width(), audio.height()), (0, 0));
    }

    #[test]
    fn test_switch_device_wraps() {
        let mut capture = source(CaptureType::Audio);
        capture.prepare().unwrap();
        assert_eq!(capture.device().name, "synthetic-front");
        capture.switch_device().unwrap();
        assert_eq!(capture.device().name, "synthetic-back");
        capture.switch_device().unwrap();
        assert_eq!(capture.device().name, "synthetic-front");
    }

    #[test]
    fn test_running_source_delivers_both_streams() {
        let mut capture = source(CaptureType::All);
        let listener = Arc::new(Collect::default());
        capture.set_listener(listener.clone());
        capture.prepare().unwrap();
        capture.start().unwrap();
        assert!(matches!(capture.prepare(), Err(AvError::Capture(_))));
        std::thread::sleep(Duration::from_millis(80));
        capture.stop().unwrap();
        assert!(!capture.is_running());

        let samples = listener.samples.lock();
        let count = samples.len();
        assert!(count >= 2);

        let video: Vec<&RawVideoFrame> = samples
            .iter()
            .filter_map(|s| match s {
                CapturedSample::Video(frame) => Some(frame),
                _ => None,
            })
            .collect();
        assert!(!video.is_empty());
        assert_eq!((video[0].width(), video[0].height()), (32, 16));
        assert!(video.windows(2).all(|w| w[1].pts > w[0].pts));

        // audio is contiguous: each buffer starts where the previous one ended
        let config = AudioConfig::default();
        let mut expected_frame = 0u64;
        for sample in samples.iter().filter(|s| s.media_type() == MediaType::Audio) {
            let CapturedSample::Audio(buffer) = sample else {
                unreachable!()
            };
            assert_eq!(buffer.pts, (expected_frame * 1_000_000 / 44_100) as i64);
            expected_frame += buffer.frame_count(&config).unwrap() as u64;
        }
        drop(samples);

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(listener.samples.lock().len(), count);
    }
}
