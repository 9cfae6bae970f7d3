//! Decoded source image.

use std::sync::Arc;

use image::DynamicImage;
use tiny_skia::{IntSize, Pixmap};

use crate::error::{RasterError, Result};

/// The source raster an editor panel works on.
///
/// Immutable after load. When the upstream image changes the whole handle is
/// replaced, never mutated. The premultiplied pixmap is built once here so the
/// compositor can scale it every frame without converting again.
#[derive(Debug, Clone)]
pub struct ImageHandle {
    width: u32,
    height: u32,
    pixmap: Arc<Pixmap>,
}

impl ImageHandle {
    /// Decode encoded image bytes (PNG, JPEG, WebP).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes)?;
        Self::from_image(&image)
    }

    /// Build a handle from an already decoded image.
    pub fn from_image(image: &DynamicImage) -> Result<Self> {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Err(RasterError::EmptyImage { width, height });
        }

        let mut data = rgba.into_raw();
        premultiply(&mut data);

        let size = IntSize::from_wh(width, height).ok_or(RasterError::Allocation { width, height })?;
        let pixmap =
            Pixmap::from_vec(data, size).ok_or(RasterError::Allocation { width, height })?;

        log::debug!("Loaded source image {}x{}", width, height);

        Ok(Self {
            width,
            height,
            pixmap: Arc::new(pixmap),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Width divided by height.
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub(crate) fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }
}

/// Premultiply straight RGBA8 data in place.
pub(crate) fn premultiply(data: &mut [u8]) {
    for px in data.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 255 {
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    #[test]
    fn test_decode_png_dimensions() {
        let img = RgbaImage::from_pixel(40, 20, Rgba([10, 20, 30, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let handle = ImageHandle::decode(&bytes).unwrap();
        assert_eq!(handle.width(), 40);
        assert_eq!(handle.height(), 20);
        assert!((handle.aspect() - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(ImageHandle::decode(b"not an image").is_err());
    }

    #[test]
    fn test_premultiply() {
        let mut data = vec![200, 100, 50, 128, 9, 9, 9, 255, 255, 255, 255, 0];
        premultiply(&mut data);
        assert_eq!(&data[0..4], &[100, 50, 25, 128]);
        assert_eq!(&data[4..8], &[9, 9, 9, 255]);
        assert_eq!(&data[8..12], &[0, 0, 0, 0]);
    }
}
