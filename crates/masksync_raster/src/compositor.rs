//! Preview compositor.
//!
//! Draws, in order: black backdrop, base image scaled into the draw rect,
//! tinted (optionally blurred) mask overlay at the configured opacity, point
//! markers, and the brush cursor outline. Reads the mask, never writes it.

use image::imageops::FilterType;
use image::{Rgba, RgbaImage};
use tiny_skia::{
    Color, FillRule, FilterQuality, IntSize, Paint, PathBuilder, Pixmap, PixmapPaint, Stroke,
    Transform,
};

use crate::color::Rgb;
use crate::error::{RasterError, Result};
use crate::mask::CanonicalMask;
use crate::source::{ImageHandle, premultiply};

/// Radius of point markers, in preview pixels.
pub const MARKER_RADIUS: f32 = 4.0;

/// Blur values are scaled by this before use as the Gaussian sigma.
pub const PREVIEW_BLUR_FACTOR: f32 = 0.25;

/// How the mask overlay is tinted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    pub color: Rgb,
    /// 0.0 - 1.0
    pub opacity: f32,
    /// Blur amount before [`PREVIEW_BLUR_FACTOR`]; 0 disables.
    pub blur: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            color: Rgb::RED,
            opacity: 0.5,
            blur: 0.0,
        }
    }
}

/// A labeled point to draw, in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointMarker {
    pub x: f32,
    pub y: f32,
    pub color: Rgb,
}

/// Brush outline, in draw-rect-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrushCursor {
    pub x: f32,
    pub y: f32,
    pub diameter: f32,
    pub color: Rgb,
}

/// Everything the compositor reads for one frame.
pub struct PreviewScene<'a> {
    /// Draw rect size in whole pixels.
    pub width: u32,
    pub height: u32,
    pub image: Option<&'a ImageHandle>,
    pub mask: Option<&'a CanonicalMask>,
    pub overlay: OverlayStyle,
    pub markers: &'a [PointMarker],
    pub cursor: Option<BrushCursor>,
}

/// Render one preview frame of `scene.width` x `scene.height`.
pub fn render_preview(scene: &PreviewScene<'_>) -> Result<Pixmap> {
    let (width, height) = (scene.width.max(1), scene.height.max(1));
    let mut frame = Pixmap::new(width, height).ok_or(RasterError::Allocation { width, height })?;
    frame.fill(Color::BLACK);

    if let Some(image) = scene.image {
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        let transform = Transform::from_scale(
            width as f32 / image.width() as f32,
            height as f32 / image.height() as f32,
        );
        frame.draw_pixmap(0, 0, image.pixmap().as_ref(), &paint, transform, None);
    }

    if let Some(mask) = scene.mask.filter(|m| !m.is_empty()) {
        let tint = tinted_overlay(mask, width, height, &scene.overlay)?;
        let paint = PixmapPaint {
            opacity: scene.overlay.opacity.clamp(0.0, 1.0),
            quality: FilterQuality::Nearest,
            ..PixmapPaint::default()
        };
        frame.draw_pixmap(0, 0, tint.as_ref(), &paint, Transform::identity(), None);
    }

    if let Some(image) = scene.image {
        let sx = width as f32 / image.width() as f32;
        let sy = height as f32 / image.height() as f32;
        for marker in scene.markers {
            let Some(path) = PathBuilder::from_circle(marker.x * sx, marker.y * sy, MARKER_RADIUS)
            else {
                continue;
            };
            let mut paint = Paint::default();
            paint.set_color(marker.color.to_skia(255));
            paint.anti_alias = true;
            frame.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
        }
    }

    if let Some(cursor) = scene.cursor {
        if let Some(path) = PathBuilder::from_circle(cursor.x, cursor.y, (cursor.diameter / 2.0).max(0.5)) {
            let mut paint = Paint::default();
            paint.set_color(cursor.color.to_skia(230));
            paint.anti_alias = true;
            let stroke = Stroke {
                width: 1.0,
                ..Stroke::default()
            };
            frame.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
        }
    }

    Ok(frame)
}

/// Solid tint wherever the mask (scaled to the rect) has alpha.
fn tinted_overlay(
    mask: &CanonicalMask,
    width: u32,
    height: u32,
    style: &OverlayStyle,
) -> Result<Pixmap> {
    let alpha = if mask.alpha().dimensions() == (width, height) {
        mask.alpha().clone()
    } else {
        image::imageops::resize(mask.alpha(), width, height, FilterType::Triangle)
    };

    let Rgb { r, g, b } = style.color;
    let mut tint = RgbaImage::from_fn(width, height, |x, y| {
        let a = alpha.get_pixel(x, y)[0];
        Rgba([r, g, b, a])
    });

    let sigma = style.blur * PREVIEW_BLUR_FACTOR;
    if sigma > 0.0 {
        tint = image::imageops::blur(&tint, sigma);
    }

    let mut data = tint.into_raw();
    premultiply(&mut data);
    let size = IntSize::from_wh(width, height).ok_or(RasterError::Allocation { width, height })?;
    Pixmap::from_vec(data, size).ok_or(RasterError::Allocation { width, height })
}
