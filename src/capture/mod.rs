//! # Capture boundary
//!
//! A [`CaptureSource`] produces timestamped raw video frames and PCM buffers
//! and hands each one, by value, to a single [`CaptureListener`]. Real
//! camera and microphone backends live outside this crate; they plug in by
//! implementing the trait. [`SyntheticCapture`] is a built-in source that
//! generates a test pattern and a sine tone.

mod synthetic;

use std::sync::Arc;

use crate::av::{MediaType, RawAudioBuffer, RawVideoFrame};
use crate::error::{AvError, Result};

pub use synthetic::{color_bars, sine_tone, SyntheticCapture, SyntheticDevice, DEVICES};

/// Which streams a source produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureType {
    /// Frames only
    Video,
    /// PCM only
    Audio,
    /// Frames and PCM
    All,
}

impl CaptureType {
    /// True for sources that produce frames.
    pub fn has_video(self) -> bool {
        matches!(self, CaptureType::Video | CaptureType::All)
    }

    /// True for sources that produce PCM.
    pub fn has_audio(self) -> bool {
        matches!(self, CaptureType::Audio | CaptureType::All)
    }
}

/// One captured buffer, tagged with its stream type.
#[derive(Debug, Clone)]
pub enum CapturedSample {
    /// A raw video frame
    Video(RawVideoFrame),
    /// A PCM buffer
    Audio(RawAudioBuffer),
}

impl CapturedSample {
    /// Stream the sample belongs to.
    pub fn media_type(&self) -> MediaType {
        match self {
            CapturedSample::Video(_) => MediaType::Video,
            CapturedSample::Audio(_) => MediaType::Audio,
        }
    }

    /// Presentation time in microseconds.
    pub fn pts(&self) -> i64 {
        match self {
            CapturedSample::Video(frame) => frame.pts,
            CapturedSample::Audio(buffer) => buffer.pts,
        }
    }
}

/// Receives what a [`CaptureSource`] produces.
pub trait CaptureListener: Send + Sync {
    /// Called on the capture thread; ownership of the sample moves to the listener.
    fn on_sample(&self, sample: CapturedSample);

    /// Called when the source fails. Logs by default.
    fn on_error(&self, error: AvError) {
        log::error!("capture: {}", error);
    }
}

/// Lifecycle of a capture device: `prepare` (or `prepare_with_preview_size`),
/// then `start`/`stop` any number of times.
pub trait CaptureSource: Send {
    /// Which streams this source produces.
    fn capture_type(&self) -> CaptureType;

    /// Replaces the listener.
    fn set_listener(&self, listener: Arc<dyn CaptureListener>);

    /// Detaches the listener; samples are dropped until a new one is set.
    fn clear_listener(&self);

    /// Opens the devices at the configured size.
    fn prepare(&mut self) -> Result<()>;

    /// Prepares with a video size other than the default. Audio-only sources reject this.
    fn prepare_with_preview_size(&mut self, width: u32, height: u32) -> Result<()>;

    /// Starts delivering samples. Fails unless prepared.
    fn start(&mut self) -> Result<()>;

    /// Stops delivery; `start` may be called again.
    fn stop(&mut self) -> Result<()>;

    /// Moves to the next input device, wrapping around.
    fn switch_device(&mut self) -> Result<()>;

    /// Capture width in pixels, zero for audio-only sources.
    fn width(&self) -> u32;

    /// Capture height in pixels, zero for audio-only sources.
    fn height(&self) -> u32;
}
