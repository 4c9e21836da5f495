//! # Codecs
//!
//! Bitstream handling for H.264 ([`h264`]) and AAC ([`aac`]), the codec
//! session seam ([`session`]) with its software implementation
//! ([`software`]), and the four asynchronous front-ends built on top:
//! [`VideoEncoder`], [`VideoDecoder`], [`AudioEncoder`], [`AudioDecoder`].

/// AAC bitstream handling
pub mod aac;
/// Audio encoder and decoder front-ends
pub mod audio;
/// H.264 bitstream handling
pub mod h264;
/// Codec output listeners
pub mod listener;
/// Codec session seam
pub mod session;
/// OpenH264 and FDK-AAC sessions
pub mod software;
/// Video encoder and decoder front-ends
pub mod video;
mod worker;

pub use audio::{AudioDecoder, AudioEncoder};
pub use listener::{
    AudioDecoderListener, AudioEncoderListener, VideoDecoderListener, VideoEncoderListener,
};
pub use session::CodecBackend;
pub use software::SoftwareBackend;
pub use video::{VideoDecoder, VideoEncoder};
pub use worker::MediaSession;
