//! Media value types shared by capture, codecs and the renderer.

mod audio;
mod image;
mod packet;

pub use audio::*;
pub use image::*;
pub use packet::*;

/// Stream-type discriminator carried by captured samples and packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    /// Video stream
    Video,
    /// Audio stream
    Audio,
}

/// A raw frame from capture: the image plus its presentation time in microseconds.
#[derive(Debug, Clone)]
pub struct RawVideoFrame {
    /// The picture
    pub image: ImageBuffer,
    /// Presentation time in microseconds
    pub pts: i64,
}

impl RawVideoFrame {
    /// Pairs `image` with its presentation time.
    pub fn new(image: ImageBuffer, pts: i64) -> Self {
        Self { image, pts }
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Decoder output. Listeners borrow it for the duration of the callback and
/// clone it (cheaply, planes are reference counted) to keep it.
pub type DecodedImage = ImageBuffer;
