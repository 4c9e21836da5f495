#![doc(html_root_url = "https://docs.rs/avpipe/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # avpipe - real-time audio/video encode and decode pipeline
//!
//! `avpipe` turns captured raw video and PCM into H.264 and AAC bitstreams
//! and turns those bitstreams back into images and PCM for presentation.
//!
//! ## Features
//!
//! - H.264 Annex-B output with SPS/PPS delivered ahead of the frames that
//!   need them, and Annex-B input with automatic decoder reconfiguration
//! - AAC access units, raw or ADTS framed
//! - One worker thread per codec instance; submission never blocks the
//!   capture or network thread, and callbacks arrive in submission order
//! - A pluggable [`CodecBackend`](codec::CodecBackend) seam with a software
//!   implementation on OpenH264 and FDK-AAC
//! - A double-buffered pixel renderer with explicit resize semantics
//!
//! ## Encoding
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use avpipe::capture::{CaptureSource, CaptureType, SyntheticCapture};
//! use avpipe::codec::{AudioEncoder, MediaSession, VideoEncoder};
//! use avpipe::config::{AudioConfig, VideoConfig};
//! use avpipe::pipeline::EncoderRouter;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let video = Arc::new(VideoEncoder::new(VideoConfig::new(640, 480, 500_000, 30))?);
//!     let audio = Arc::new(AudioEncoder::new(AudioConfig::default())?);
//!
//!     let mut capture = SyntheticCapture::new(
//!         CaptureType::All,
//!         *video.config(),
//!         *audio.config(),
//!     )?;
//!     let router = Arc::new(EncoderRouter::new().with_video(video).with_audio(audio));
//!     capture.set_listener(router.clone());
//!     capture.prepare()?;
//!     capture.start()?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(1)).await;
//!     capture.stop()?;
//!     router.flush().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `av`: images, raw audio buffers and compressed packets
//! - `codec`: H.264 and AAC bitstream handling, codec sessions and the
//!   encoder/decoder front-ends
//! - `render`: the presentation surface
//! - `capture`: the capture-source boundary and a synthetic source
//! - `pipeline`: routing captured samples into the encoders
//! - `config`: audio and video codec parameters
//! - `error`: the error taxonomy
//! - `utils`: bit-level readers and writers

/// Audio/video value types
pub mod av;

/// Capture-source boundary
pub mod capture;

/// Codec sessions and encoder/decoder front-ends
pub mod codec;

/// Codec configuration
pub mod config;

/// Error types and utilities
pub mod error;

/// Capture-to-encoder routing
pub mod pipeline;

/// Presentation surface
pub mod render;

/// Common utilities and helper functions
pub mod utils;

pub use error::{AvError, Result};
