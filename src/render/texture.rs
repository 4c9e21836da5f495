use crate::av::ImageBuffer;

/// An RGBA8 render target.
#[derive(Debug, Clone)]
pub struct Texture {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Texture {
    /// A black texture.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// RGBA8 rows, `width * 4` bytes each.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Uploads an image of the texture's size, converting it to RGBA.
    pub(crate) fn upload(&mut self, image: &ImageBuffer) {
        debug_assert_eq!((image.width(), image.height()), (self.width, self.height));
        self.pixels = image.to_rgba();
    }
}

/// Front and back textures of one size. Uploads go to the back texture,
/// which then swaps to the front.
#[derive(Debug)]
pub struct BackingStore {
    front: Texture,
    back: Texture,
}

impl BackingStore {
    /// Two black textures of `width` x `height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            front: Texture::new(width, height),
            back: Texture::new(width, height),
        }
    }

    /// Width and height of both textures.
    pub fn size(&self) -> (u32, u32) {
        (self.front.width, self.front.height)
    }

    /// The texture last swapped to the front.
    pub fn front(&self) -> &Texture {
        &self.front
    }

    pub(crate) fn back_mut(&mut self) -> &mut Texture {
        &mut self.back
    }

    pub(crate) fn swap(&mut self) {
        std::mem::swap(&mut self.front, &mut self.back);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_exposes_back_buffer() {
        let mut store = BackingStore::new(2, 2);
        let image = ImageBuffer::from_packed_bgra(2, 2, [10u8, 20, 30, 255].repeat(4)).unwrap();
        store.back_mut().upload(&image);
        assert!(store.front().pixels().iter().all(|&p| p == 0));

        store.swap();
        assert_eq!(&store.front().pixels()[..4], &[30, 20, 10, 255]);
        assert_eq!(store.size(), (2, 2));
    }
}
