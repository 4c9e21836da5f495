//! # H.264 video encode and decode
//!
//! [`VideoEncoder`] turns raw frames into Annex-B access units and
//! announces the SPS/PPS pair before the first frame that needs it.
//! [`VideoDecoder`] accepts the same byte stream and emits images.
//!
//! ```rust
//! use avpipe::av::{ImageBuffer, RawVideoFrame};
//! use avpipe::codec::listener::{video_encoder_channel, VideoEncoderEvent};
//! use avpipe::codec::video::VideoEncoder;
//! use avpipe::codec::MediaSession;
//! use avpipe::config::VideoConfig;
//!
//! # #[tokio::main]
//! # async fn main() -> avpipe::Result<()> {
//! let encoder = VideoEncoder::new(VideoConfig::new(64, 48, 500_000, 30))?;
//! let (listener, mut events) = video_encoder_channel();
//! encoder.set_listener(listener);
//!
//! let image = ImageBuffer::from_packed_nv12(64, 48, vec![128u8; 64 * 48 * 3 / 2])?;
//! encoder.encode(RawVideoFrame::new(image, 0))?;
//! encoder.flush().await?;
//!
//! assert!(matches!(events.try_recv(), Ok(VideoEncoderEvent::ParameterSets { .. })));
//! assert!(matches!(events.try_recv(), Ok(VideoEncoderEvent::EncodedFrame(_))));
//! # Ok(())
//! # }
//! ```

mod decoder;
mod encoder;

pub use decoder::VideoDecoder;
pub use encoder::VideoEncoder;
