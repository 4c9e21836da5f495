//! # Presentation surface
//!
//! [`PixelRenderer`] keeps a double-buffered RGBA backing store sized to its
//! frame. Changing the frame size marks the store stale; it has to be
//! rebuilt with [`PixelRenderer::resize`] before the next present, and
//! presenting an image whose size differs from the store fails with
//! [`AvError::ResizeMismatch`].
//!
//! Producers on other threads hand images over through a [`FrameSlot`],
//! which keeps only the latest image. The presenting thread drains it with
//! [`PixelRenderer::render_pending`].

mod texture;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::av::ImageBuffer;
use crate::codec::listener::VideoDecoderListener;
use crate::config::validate_dimensions;
use crate::error::{AvError, Result};

pub use texture::{BackingStore, Texture};

/// Holds the most recent image; a newer image replaces an unpresented one.
#[derive(Debug, Default)]
pub struct FrameSlot {
    pending: Mutex<Option<ImageBuffer>>,
}

impl FrameSlot {
    /// An empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `image`, returning the unpresented image it replaced.
    pub fn put(&self, image: ImageBuffer) -> Option<ImageBuffer> {
        self.pending.lock().replace(image)
    }

    /// Removes and returns the pending image.
    pub fn take(&self) -> Option<ImageBuffer> {
        self.pending.lock().take()
    }

    /// True when no image is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_none()
    }
}

/// Decoder output can feed the slot directly.
impl VideoDecoderListener for FrameSlot {
    fn on_decoded_image(&self, image: &ImageBuffer) {
        if self.put(image.clone()).is_some() {
            log::debug!("replaced an unpresented frame");
        }
    }

    fn on_error(&self, error: AvError) {
        log::warn!("decoder feeding the renderer: {}", error);
    }
}

/// Presents decoded images into a double-buffered RGBA backing store.
pub struct PixelRenderer {
    frame: (u32, u32),
    store: BackingStore,
    stale: bool,
    slot: Arc<FrameSlot>,
    frames_presented: u64,
}

impl PixelRenderer {
    /// A renderer whose frame and backing store are `width` x `height`.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        validate_dimensions(width, height)?;
        Ok(Self {
            frame: (width, height),
            store: BackingStore::new(width, height),
            stale: false,
            slot: Arc::new(FrameSlot::new()),
            frames_presented: 0,
        })
    }

    /// The frame size the next [`resize`](Self::resize) builds storage for.
    pub fn frame_size(&self) -> (u32, u32) {
        self.frame
    }

    /// Changes the frame size. Storage is not rebuilt until [`resize`](Self::resize).
    pub fn set_frame(&mut self, width: u32, height: u32) -> Result<()> {
        validate_dimensions(width, height)?;
        if (width, height) != self.frame {
            self.frame = (width, height);
            self.stale = true;
        }
        Ok(())
    }

    /// Tears down the backing store and rebuilds it at the frame size.
    pub fn resize(&mut self) {
        let (width, height) = self.frame;
        self.store = BackingStore::new(width, height);
        self.stale = false;
        log::info!("backing store rebuilt at {}x{}", width, height);
    }

    /// Size of the current backing store.
    pub fn backing_size(&self) -> (u32, u32) {
        self.store.size()
    }

    /// Uploads `image` into the back buffer and swaps it to the front.
    pub fn present(&mut self, image: &ImageBuffer) -> Result<()> {
        let (store_width, store_height) = self.store.size();
        if self.stale || (image.width(), image.height()) != (store_width, store_height) {
            return Err(AvError::ResizeMismatch {
                image_width: image.width(),
                image_height: image.height(),
                store_width,
                store_height,
            });
        }

        self.store.back_mut().upload(image);
        self.store.swap();
        self.frames_presented += 1;
        Ok(())
    }

    /// Shared handle other threads use to submit images.
    pub fn frame_slot(&self) -> Arc<FrameSlot> {
        self.slot.clone()
    }

    /// Presents the latest submitted image, if any. Returns whether one was shown.
    pub fn render_pending(&mut self) -> Result<bool> {
        match self.slot.take() {
            Some(image) => self.present(&image).map(|()| true),
            None => Ok(false),
        }
    }

    /// RGBA contents of the front buffer.
    pub fn front_buffer(&self) -> &[u8] {
        self.store.front().pixels()
    }

    /// Images presented since creation.
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn grey(width: u32, height: u32, luma: u8) -> ImageBuffer {
        let luma_len = (width * height) as usize;
        let mut data = vec![luma; luma_len];
        data.resize(luma_len * 3 / 2, 128);
        ImageBuffer::from_packed_nv12(width, height, data).unwrap()
    }

    #[test]
    fn test_present_requires_matching_store() {
        let mut renderer = PixelRenderer::new(640, 480).unwrap();
        let small = grey(320, 240, 16);

        let err = renderer.present(&small).unwrap_err();
        assert!(matches!(
            err,
            AvError::ResizeMismatch {
                store_width: 640,
                store_height: 480,
                ..
            }
        ));

        renderer.set_frame(320, 240).unwrap();
        // stale until rebuilt
        assert!(renderer.present(&small).is_err());
        renderer.resize();
        renderer.present(&small).unwrap();
        assert_eq!(renderer.backing_size(), (320, 240));
        assert_eq!(renderer.frames_presented(), 1);
    }

    #[test]
    fn test_front_buffer_holds_latest_frame() {
        let mut renderer = PixelRenderer::new(4, 2).unwrap();
        renderer.present(&grey(4, 2, 235)).unwrap();
        assert_eq!(&renderer.front_buffer()[..4], &[255, 255, 255, 255]);
        renderer.present(&grey(4, 2, 16)).unwrap();
        assert_eq!(&renderer.front_buffer()[..4], &[0, 0, 0, 255]);
    }

    #[test]
    fn test_slot_replaces_pending_image() {
        let mut renderer = PixelRenderer::new(4, 2).unwrap();
        let slot = renderer.frame_slot();
        assert!(!renderer.render_pending().unwrap());

        assert!(slot.put(grey(4, 2, 16)).is_none());
        assert!(slot.put(grey(4, 2, 235)).is_some());
        assert!(renderer.render_pending().unwrap());
        assert!(slot.is_empty());
        assert_eq!(renderer.frames_presented(), 1);
        assert_eq!(renderer.front_buffer()[0], 255);
    }

    #[test]
    fn test_rejects_bad_frame_sizes() {
        assert!(PixelRenderer::new(0, 480).is_err());
        let mut renderer = PixelRenderer::new(2, 2).unwrap();
        assert!(renderer.set_frame(3, 2).is_err());
        assert_eq!(renderer.frame_size(), (2, 2));
    }
}
