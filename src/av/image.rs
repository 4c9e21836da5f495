use bytes::Bytes;

use crate::config::validate_dimensions;
use crate::error::{AvError, Result};

/// Pixel layouts a frame can arrive in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 4:2:0, luma plane then one interleaved CbCr plane
    Nv12,
    /// 4:2:0, three planes
    I420,
    /// Packed 8-bit B, G, R, A
    Bgra,
}

impl PixelFormat {
    /// Number of planes an image of this format carries.
    pub fn plane_count(self) -> usize {
        match self {
            PixelFormat::Nv12 => 2,
            PixelFormat::I420 => 3,
            PixelFormat::Bgra => 1,
        }
    }

    /// Bytes per row and row count of `plane` for a `width` x `height` image.
    fn plane_geometry(self, plane: usize, width: usize, height: usize) -> (usize, usize) {
        match (self, plane) {
            (PixelFormat::Bgra, _) => (width * 4, height),
            (_, 0) => (width, height),
            (PixelFormat::Nv12, _) => (width, height / 2),
            (PixelFormat::I420, _) => (width / 2, height / 2),
        }
    }
}

/// One image plane; rows are `stride` bytes apart.
#[derive(Debug, Clone)]
pub struct Plane {
    /// Plane bytes, `stride` per row
    pub data: Bytes,
    /// Distance between row starts, in bytes
    pub stride: usize,
}

impl Plane {
    /// A plane whose rows start every `stride` bytes of `data`.
    pub fn packed(data: impl Into<Bytes>, stride: usize) -> Self {
        Self {
            data: data.into(),
            stride,
        }
    }

    fn row(&self, y: usize, len: usize) -> &[u8] {
        let start = y * self.stride;
        &self.data[start..start + len]
    }
}

/// A platform-neutral image buffer: geometry, pixel format and planes.
#[derive(Debug, Clone)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    planes: Vec<Plane>,
}

impl ImageBuffer {
    /// Builds an image, checking plane count and that every plane covers its rows.
    pub fn from_planes(
        width: u32,
        height: u32,
        format: PixelFormat,
        planes: Vec<Plane>,
    ) -> Result<Self> {
        validate_dimensions(width, height)
            .map_err(|e| AvError::UnsupportedFormat(format!("image geometry: {}", e)))?;
        if planes.len() != format.plane_count() {
            return Err(AvError::UnsupportedFormat(format!(
                "{:?} needs {} planes, got {}",
                format,
                format.plane_count(),
                planes.len()
            )));
        }
        for (i, plane) in planes.iter().enumerate() {
            let (row_bytes, rows) = format.plane_geometry(i, width as usize, height as usize);
            let needed = plane.stride * (rows - 1) + row_bytes;
            if plane.stride < row_bytes || plane.data.len() < needed {
                return Err(AvError::Submission(format!(
                    "plane {} of {:?} {}x{} holds {} bytes with stride {}, needs {}",
                    i,
                    format,
                    width,
                    height,
                    plane.data.len(),
                    plane.stride,
                    needed
                )));
            }
        }
        Ok(Self {
            width,
            height,
            format,
            planes,
        })
    }

    /// Tightly packed NV12: `width * height` luma bytes then `width * height / 2` chroma bytes.
    pub fn from_packed_nv12(width: u32, height: u32, data: impl Into<Bytes>) -> Result<Self> {
        let data: Bytes = data.into();
        let luma = width as usize * height as usize;
        if data.len() != luma + luma / 2 {
            return Err(AvError::Submission(format!(
                "packed NV12 {}x{} needs {} bytes, got {}",
                width,
                height,
                luma + luma / 2,
                data.len()
            )));
        }
        Self::from_planes(
            width,
            height,
            PixelFormat::Nv12,
            vec![
                Plane::packed(data.slice(..luma), width as usize),
                Plane::packed(data.slice(luma..), width as usize),
            ],
        )
    }

    /// Tightly packed BGRA, four bytes per pixel.
    pub fn from_packed_bgra(width: u32, height: u32, data: impl Into<Bytes>) -> Result<Self> {
        Self::from_planes(
            width,
            height,
            PixelFormat::Bgra,
            vec![Plane::packed(data, width as usize * 4)],
        )
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel layout of the planes.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Planes in format order.
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Copies the image into tightly packed NV12, converting from other formats.
    pub fn to_packed_nv12(&self) -> Vec<u8> {
        let w = self.width as usize;
        let h = self.height as usize;
        let mut out = Vec::with_capacity(w * h * 3 / 2);

        match self.format {
            PixelFormat::Nv12 => {
                for y in 0..h {
                    out.extend_from_slice(self.planes[0].row(y, w));
                }
                for y in 0..h / 2 {
                    out.extend_from_slice(self.planes[1].row(y, w));
                }
            }
            PixelFormat::I420 => {
                for y in 0..h {
                    out.extend_from_slice(self.planes[0].row(y, w));
                }
                for y in 0..h / 2 {
                    let u = self.planes[1].row(y, w / 2);
                    let v = self.planes[2].row(y, w / 2);
                    for (&cb, &cr) in u.iter().zip(v) {
                        out.push(cb);
                        out.push(cr);
                    }
                }
            }
            PixelFormat::Bgra => bgra_to_nv12(&self.planes[0], w, h, &mut out),
        }
        out
    }

    /// Converts to NV12 unless already in that layout.
    pub fn to_nv12(&self) -> Result<ImageBuffer> {
        if self.format == PixelFormat::Nv12 {
            return Ok(self.clone());
        }
        Self::from_packed_nv12(self.width, self.height, self.to_packed_nv12())
    }

    /// Converts to packed RGBA, using BT.601 video range for YUV sources.
    pub fn to_rgba(&self) -> Vec<u8> {
        let w = self.width as usize;
        let h = self.height as usize;
        let mut out = Vec::with_capacity(w * h * 4);

        if self.format == PixelFormat::Bgra {
            for y in 0..h {
                for px in self.planes[0].row(y, w * 4).chunks_exact(4) {
                    out.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
                }
            }
            return out;
        }

        for y in 0..h {
            let luma = self.planes[0].row(y, w);
            for (x, &l) in luma.iter().enumerate() {
                let (cb, cr) = self.chroma_at(x, y);
                let [r, g, b] = yuv_to_rgb(l, cb, cr);
                out.extend_from_slice(&[r, g, b, 255]);
            }
        }
        out
    }

    fn chroma_at(&self, x: usize, y: usize) -> (u8, u8) {
        let row = y / 2;
        match self.format {
            PixelFormat::Nv12 => {
                let plane = &self.planes[1];
                let i = row * plane.stride + (x / 2) * 2;
                (plane.data[i], plane.data[i + 1])
            }
            _ => {
                let u = &self.planes[1];
                let v = &self.planes[2];
                (
                    u.data[row * u.stride + x / 2],
                    v.data[row * v.stride + x / 2],
                )
            }
        }
    }
}

fn bgra_to_nv12(plane: &Plane, w: usize, h: usize, out: &mut Vec<u8>) {
    let pixel = |x: usize, y: usize| {
        let row = plane.row(y, w * 4);
        (row[x * 4 + 2] as i32, row[x * 4 + 1] as i32, row[x * 4] as i32)
    };

    for y in 0..h {
        for x in 0..w {
            let (r, g, b) = pixel(x, y);
            out.push((((66 * r + 129 * g + 25 * b + 128) >> 8) + 16) as u8);
        }
    }
    for y in (0..h).step_by(2) {
        for x in (0..w).step_by(2) {
            let mut sum = (0, 0, 0);
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let (r, g, b) = pixel(x + dx, y + dy);
                sum = (sum.0 + r, sum.1 + g, sum.2 + b);
            }
            let (r, g, b) = (sum.0 / 4, sum.1 / 4, sum.2 / 4);
            out.push((((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128) as u8);
            out.push((((112 * r - 94 * g - 18 * b + 128) >> 8) + 128) as u8);
        }
    }
}

fn yuv_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = cb as i32 - 128;
    let e = cr as i32 - 128;
    let clip = |v: i32| v.clamp(0, 255) as u8;
    [
        clip((298 * c + 409 * e + 128) >> 8),
        clip((298 * c - 100 * d - 208 * e + 128) >> 8),
        clip((298 * c + 516 * d + 128) >> 8),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn i420(width: usize, height: usize) -> ImageBuffer {
        let y: Vec<u8> = (0..width * height).map(|i| i as u8).collect();
        let u = vec![100u8; width * height / 4];
        let v = vec![200u8; width * height / 4];
        ImageBuffer::from_planes(
            width as u32,
            height as u32,
            PixelFormat::I420,
            vec![
                Plane::packed(y, width),
                Plane::packed(u, width / 2),
                Plane::packed(v, width / 2),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_i420_to_nv12_interleaves_chroma() {
        let nv12 = i420(4, 2).to_nv12().unwrap();
        assert_eq!(nv12.format(), PixelFormat::Nv12);
        assert_eq!(
            nv12.to_packed_nv12(),
            vec![0, 1, 2, 3, 4, 5, 6, 7, 100, 200, 100, 200]
        );
    }

    #[test]
    fn test_strided_plane_is_packed() {
        // 2x2 NV12 with 4-byte strides
        let y = Plane::packed(vec![1, 2, 0, 0, 3, 4, 0, 0], 4);
        let uv = Plane::packed(vec![5, 6, 0, 0], 4);
        let image = ImageBuffer::from_planes(2, 2, PixelFormat::Nv12, vec![y, uv]).unwrap();
        assert_eq!(image.to_packed_nv12(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_geometry_validation() {
        assert!(ImageBuffer::from_packed_nv12(4, 4, vec![0u8; 23]).is_err());
        assert!(ImageBuffer::from_packed_nv12(3, 4, vec![0u8; 18]).is_err());
        let short = ImageBuffer::from_packed_bgra(2, 2, vec![0u8; 15]);
        assert!(matches!(short, Err(AvError::Submission(_))));
        let wrong_planes =
            ImageBuffer::from_planes(2, 2, PixelFormat::I420, vec![Plane::packed(vec![0u8; 4], 2)]);
        assert!(matches!(wrong_planes, Err(AvError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_bgra_round_trip_colours() {
        // Opaque red, 2x2
        let bgra = [0u8, 0, 255, 255].repeat(4);
        let image = ImageBuffer::from_packed_bgra(2, 2, bgra).unwrap();
        let nv12 = image.to_nv12().unwrap();
        let packed = nv12.to_packed_nv12();
        assert_eq!(&packed[..4], &[82, 82, 82, 82]);
        assert_eq!(&packed[4..], &[90, 240]);

        let rgba = nv12.to_rgba();
        assert!(rgba[0] >= 250 && rgba[1] <= 5 && rgba[2] <= 5);
        assert_eq!(rgba[3], 255);

        assert_eq!(&image.to_rgba()[..4], &[255, 0, 0, 255]);
    }
}
