//! The canonical image-resolution alpha mask.
//!
//! This is the single source of truth for persistence. It is either replaced
//! from the freehand [`StrokeBuffer`] or imported from a detection bitmap,
//! and it is exported as a gray+alpha PNG on a transparent background.

use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, GrayImage, ImageEncoder, Luma};

use crate::error::{RasterError, Result};
use crate::stroke::StrokeBuffer;

/// How mask coverage maps to PNG alpha on export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlphaPolarity {
    /// Masked pixels are opaque, background is transparent.
    #[default]
    Opaque,
    /// Masked pixels are transparent, background is opaque.
    Inverted,
}

/// Alpha mask at image pixel resolution. `0` = outside, `255` = inside.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalMask {
    alpha: GrayImage,
}

impl CanonicalMask {
    /// An empty mask of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            alpha: GrayImage::new(width.max(1), height.max(1)),
        }
    }

    pub fn width(&self) -> u32 {
        self.alpha.width()
    }

    pub fn height(&self) -> u32 {
        self.alpha.height()
    }

    pub fn alpha(&self) -> &GrayImage {
        &self.alpha
    }

    /// Whether any pixel has non-zero alpha.
    ///
    /// An empty mask is still uploaded (as a transparent placeholder); this
    /// only decides how the upload is labeled.
    pub fn is_empty(&self) -> bool {
        self.alpha.as_raw().iter().all(|&a| a == 0)
    }

    pub fn clear(&mut self) {
        self.alpha.as_mut().fill(0);
    }

    /// Replace the mask with the stroke buffer scaled to image resolution.
    ///
    /// Nearest-neighbour scaling keeps the hard brush edges binary.
    pub fn apply_stroke(&mut self, strokes: &StrokeBuffer) {
        let alpha = strokes.alpha_image();
        self.alpha = scale_to(&alpha, self.width(), self.height(), FilterType::Nearest);
    }

    /// Replace the mask from a detection probability bitmap.
    ///
    /// The bitmap is scaled to image resolution, then every pixel whose
    /// luminance (as a fraction of 255) is at or above `threshold` becomes
    /// fully opaque and everything else fully transparent. Pure in
    /// `(bitmap, threshold)`.
    pub fn import_detection(&mut self, bitmap: &DynamicImage, threshold: f32) {
        let luma = bitmap.to_luma8();
        let scaled = scale_to(&luma, self.width(), self.height(), FilterType::Triangle);
        self.alpha = threshold_alpha(&scaled, threshold);
    }

    /// Replace the mask from a previously stored mask image.
    ///
    /// Coverage is the brightest color channel weighted by alpha, which reads
    /// back both white-on-transparent and white-on-black exports.
    pub fn import_stored(&mut self, stored: &DynamicImage) {
        let coverage = coverage_of(stored);
        self.alpha = scale_to(&coverage, self.width(), self.height(), FilterType::Triangle);
    }

    /// Encode as an 8-bit gray+alpha PNG.
    pub fn encode_png(&self, polarity: AlphaPolarity) -> Result<Vec<u8>> {
        let (width, height) = self.alpha.dimensions();
        let mut raw = Vec::with_capacity((width * height * 2) as usize);
        for &a in self.alpha.as_raw() {
            let a = match polarity {
                AlphaPolarity::Opaque => a,
                AlphaPolarity::Inverted => 255 - a,
            };
            raw.push(255);
            raw.push(a);
        }

        let mut bytes = Vec::new();
        PngEncoder::new(&mut bytes)
            .write_image(&raw, width, height, ExtendedColorType::La8)
            .map_err(|e| RasterError::Encode(e.to_string()))?;
        Ok(bytes)
    }
}

fn scale_to(src: &GrayImage, width: u32, height: u32, filter: FilterType) -> GrayImage {
    if src.dimensions() == (width, height) {
        src.clone()
    } else {
        image::imageops::resize(src, width, height, filter)
    }
}

fn threshold_alpha(luma: &GrayImage, threshold: f32) -> GrayImage {
    let mut out = GrayImage::new(luma.width(), luma.height());
    for (dst, Luma([l])) in out.pixels_mut().zip(luma.pixels()) {
        let value = *l as f32 / 255.0;
        dst.0[0] = if value >= threshold { 255 } else { 0 };
    }
    out
}

fn coverage_of(stored: &DynamicImage) -> GrayImage {
    let rgba = stored.to_rgba8();
    let mut out = GrayImage::new(rgba.width(), rgba.height());
    for (dst, px) in out.pixels_mut().zip(rgba.pixels()) {
        let [r, g, b, a] = px.0;
        let lum = r.max(g).max(b) as u16;
        dst.0[0] = ((lum * a as u16 + 127) / 255) as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::{BrushOp, opaque_bounds};
    use image::{LumaA, Rgba, RgbaImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        let img = GrayImage::from_fn(width, height, |x, _| {
            Luma([((x * 255) / (width - 1)) as u8])
        });
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn test_new_mask_is_empty() {
        let mask = CanonicalMask::new(8, 4);
        assert!(mask.is_empty());
        assert_eq!((mask.width(), mask.height()), (8, 4));
    }

    #[test]
    fn test_import_detection_is_binary() {
        let mut mask = CanonicalMask::new(64, 8);
        mask.import_detection(&gradient(64, 8), 0.5);

        assert!(mask.alpha().as_raw().iter().all(|&a| a == 0 || a == 255));
        assert_eq!(mask.alpha().get_pixel(0, 0)[0], 0);
        assert_eq!(mask.alpha().get_pixel(63, 0)[0], 255);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let bitmap = DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([51])));
        let mut mask = CanonicalMask::new(4, 4);
        mask.import_detection(&bitmap, 0.2);
        assert!(mask.alpha().as_raw().iter().all(|&a| a == 255));

        mask.import_detection(&bitmap, 0.21);
        assert!(mask.is_empty());
    }

    #[test]
    fn test_import_detection_is_deterministic() {
        let bitmap = gradient(37, 23);
        let mut first = CanonicalMask::new(100, 60);
        let mut second = CanonicalMask::new(100, 60);
        first.import_detection(&bitmap, 0.7);
        second.import_detection(&bitmap, 0.7);
        second.import_detection(&bitmap, 0.7);
        assert_eq!(first, second);
    }

    #[test]
    fn test_import_detection_scales_low_resolution() {
        let mut small = GrayImage::new(10, 10);
        for y in 0..10 {
            for x in 0..5 {
                small.put_pixel(x, y, Luma([255]));
            }
        }
        let mut mask = CanonicalMask::new(100, 100);
        mask.import_detection(&DynamicImage::ImageLuma8(small), 0.5);

        assert_eq!(mask.alpha().get_pixel(10, 50)[0], 255);
        assert_eq!(mask.alpha().get_pixel(90, 50)[0], 0);
    }

    #[test]
    fn test_apply_stroke_replaces() {
        let mut strokes = StrokeBuffer::new(100, 100).unwrap();
        strokes.stamp(50.0, 50.0, 50.0, BrushOp::Paint);

        let mut mask = CanonicalMask::new(400, 400);
        mask.import_detection(
            &DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([255]))),
            0.5,
        );
        mask.apply_stroke(&strokes);

        // Corner was opaque from the detection import; the stroke replaces it.
        assert_eq!(mask.alpha().get_pixel(0, 0)[0], 0);
        assert_eq!(mask.alpha().get_pixel(200, 200)[0], 255);
    }

    #[test]
    fn test_scaled_stroke_bounds() {
        let mut strokes = StrokeBuffer::new(100, 100).unwrap();
        strokes.stamp(50.0, 50.0, 50.0, BrushOp::Paint);
        let (sx0, sy0, sx1, sy1) = opaque_bounds(&strokes.alpha_image()).unwrap();

        let mut mask = CanonicalMask::new(400, 400);
        mask.apply_stroke(&strokes);
        let (mx0, my0, mx1, my1) = opaque_bounds(mask.alpha()).unwrap();

        let near = |actual: u32, expected: u32| (actual as i64 - expected as i64).abs() <= 1;
        assert!(near(mx0, sx0 * 4), "{} vs {}", mx0, sx0 * 4);
        assert!(near(my0, sy0 * 4), "{} vs {}", my0, sy0 * 4);
        assert!(near(mx1, sx1 * 4 + 3), "{} vs {}", mx1, sx1 * 4 + 3);
        assert!(near(my1, sy1 * 4 + 3), "{} vs {}", my1, sy1 * 4 + 3);
    }

    #[test]
    fn test_import_stored_reads_alpha() {
        let mut stored = RgbaImage::new(20, 20);
        stored.put_pixel(5, 5, Rgba([255, 255, 255, 255]));
        stored.put_pixel(6, 5, Rgba([255, 255, 255, 0]));
        stored.put_pixel(7, 5, Rgba([0, 0, 0, 255]));

        let mut mask = CanonicalMask::new(20, 20);
        mask.import_stored(&DynamicImage::ImageRgba8(stored));
        assert_eq!(mask.alpha().get_pixel(5, 5)[0], 255);
        assert_eq!(mask.alpha().get_pixel(6, 5)[0], 0);
        assert_eq!(mask.alpha().get_pixel(7, 5)[0], 0);
    }

    #[test]
    fn test_encode_empty_mask_is_transparent() {
        let mask = CanonicalMask::new(12, 7);
        let bytes = mask.encode_png(AlphaPolarity::Opaque).unwrap();

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (12, 7));
        let la = decoded.to_luma_alpha8();
        assert!(la.pixels().all(|LumaA([_, a])| *a == 0));
    }

    #[test]
    fn test_encode_roundtrip_via_stored_import() {
        let mut mask = CanonicalMask::new(30, 30);
        mask.import_detection(&gradient(30, 30), 0.5);
        let bytes = mask.encode_png(AlphaPolarity::Opaque).unwrap();

        let mut restored = CanonicalMask::new(30, 30);
        restored.import_stored(&image::load_from_memory(&bytes).unwrap());
        assert_eq!(restored, mask);
    }

    #[test]
    fn test_encode_inverted_polarity() {
        let mut mask = CanonicalMask::new(2, 1);
        mask.import_detection(
            &DynamicImage::ImageLuma8(GrayImage::from_raw(2, 1, vec![255, 0]).unwrap()),
            0.5,
        );
        let bytes = mask.encode_png(AlphaPolarity::Inverted).unwrap();
        let la = image::load_from_memory(&bytes).unwrap().to_luma_alpha8();
        assert_eq!(la.get_pixel(0, 0)[1], 0);
        assert_eq!(la.get_pixel(1, 0)[1], 255);
    }
}
