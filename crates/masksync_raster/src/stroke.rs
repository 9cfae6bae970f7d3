//! Freehand stroke buffer at draw-rect resolution.

use image::{GrayImage, Luma, imageops::FilterType};
use tiny_skia::{
    BlendMode, FillRule, FilterQuality, LineCap, LineJoin, Paint, PathBuilder, Pixmap,
    PixmapPaint, PremultipliedColorU8, Stroke, Transform,
};

use crate::error::{RasterError, Result};

/// How a brush dab combines with what is already in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrushOp {
    /// Set alpha to opaque white.
    Paint,
    /// Subtract alpha.
    Erase,
}

impl BrushOp {
    fn paint(self) -> Paint<'static> {
        let mut paint = Paint::default();
        paint.set_color_rgba8(255, 255, 255, 255);
        // Hard edges keep the exported mask binary.
        paint.anti_alias = false;
        paint.blend_mode = match self {
            BrushOp::Paint => BlendMode::SourceOver,
            BrushOp::Erase => BlendMode::DestinationOut,
        };
        paint
    }
}

/// Persistent raster of freehand edits, sized to the local draw rect.
///
/// The buffer always holds the full current state of freehand editing; the
/// canonical mask is replaced from it rather than blended.
pub struct StrokeBuffer {
    pixmap: Pixmap,
    last: Option<(f32, f32)>,
}

impl StrokeBuffer {
    /// Create an empty buffer. Zero dimensions are bumped to 1.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Ok(Self {
            pixmap: alloc(width, height)?,
            last: None,
        })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Whether a drag is in progress (a previous sample exists).
    pub fn is_stroking(&self) -> bool {
        self.last.is_some()
    }

    /// Composite one filled circle of `diameter` centered at `(x, y)` and start
    /// a new stroke there.
    pub fn stamp(&mut self, x: f32, y: f32, diameter: f32, op: BrushOp) {
        let radius = (diameter / 2.0).max(0.5);
        if let Some(path) = PathBuilder::from_circle(x, y, radius) {
            self.pixmap.fill_path(
                &path,
                &op.paint(),
                FillRule::Winding,
                Transform::identity(),
                None,
            );
        }
        self.last = Some((x, y));
    }

    /// Extend the current stroke to `(x, y)`.
    ///
    /// The segment is stroked with round caps and joins, which covers exactly
    /// the union of brush circles along the way. Without a previous sample this
    /// behaves like [`StrokeBuffer::stamp`].
    pub fn line_to(&mut self, x: f32, y: f32, diameter: f32, op: BrushOp) {
        let Some((lx, ly)) = self.last else {
            self.stamp(x, y, diameter, op);
            return;
        };
        if (lx - x).abs() < f32::EPSILON && (ly - y).abs() < f32::EPSILON {
            self.stamp(x, y, diameter, op);
            return;
        }

        let mut pb = PathBuilder::new();
        pb.move_to(lx, ly);
        pb.line_to(x, y);
        if let Some(path) = pb.finish() {
            let stroke = Stroke {
                width: diameter.max(1.0),
                line_cap: LineCap::Round,
                line_join: LineJoin::Round,
                ..Stroke::default()
            };
            self.pixmap
                .stroke_path(&path, &op.paint(), &stroke, Transform::identity(), None);
        }
        self.last = Some((x, y));
    }

    /// Finish the current drag.
    pub fn end_stroke(&mut self) {
        self.last = None;
    }

    /// Resize to a new draw rect, resampling the existing content.
    ///
    /// Returns `false` when the size was already correct.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<bool> {
        let (width, height) = (width.max(1), height.max(1));
        if width == self.width() && height == self.height() {
            return Ok(false);
        }

        let mut next = alloc(width, height)?;
        let sx = width as f32 / self.width() as f32;
        let sy = height as f32 / self.height() as f32;
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        next.draw_pixmap(
            0,
            0,
            self.pixmap.as_ref(),
            &paint,
            Transform::from_scale(sx, sy),
            None,
        );

        log::debug!(
            "Stroke buffer resized {}x{} -> {}x{}",
            self.width(),
            self.height(),
            width,
            height
        );
        self.pixmap = next;
        self.last = None;
        Ok(true)
    }

    /// Erase everything.
    pub fn clear(&mut self) {
        self.pixmap.fill(tiny_skia::Color::TRANSPARENT);
        self.last = None;
    }

    /// Whether no pixel has any alpha.
    pub fn is_blank(&self) -> bool {
        self.pixmap.pixels().iter().all(|p| p.alpha() == 0)
    }

    /// Copy the alpha channel out as a single-channel image.
    pub fn alpha_image(&self) -> GrayImage {
        let width = self.width();
        let alpha: Vec<u8> = self.pixmap.pixels().iter().map(|p| p.alpha()).collect();
        GrayImage::from_raw(width, self.height(), alpha)
            .unwrap_or_else(|| GrayImage::new(width, self.height()))
    }

    /// Replace the content with an alpha image of any size (scaled to fit).
    pub fn load_alpha(&mut self, alpha: &GrayImage) {
        let (width, height) = (self.width(), self.height());
        let scaled;
        let source = if alpha.dimensions() == (width, height) {
            alpha
        } else {
            scaled = image::imageops::resize(alpha, width, height, FilterType::Triangle);
            &scaled
        };

        for (dst, Luma([a])) in self.pixmap.pixels_mut().iter_mut().zip(source.pixels()) {
            *dst = PremultipliedColorU8::from_rgba(*a, *a, *a, *a)
                .unwrap_or(PremultipliedColorU8::TRANSPARENT);
        }
        self.last = None;
    }
}

fn alloc(width: u32, height: u32) -> Result<Pixmap> {
    let (width, height) = (width.max(1), height.max(1));
    Pixmap::new(width, height).ok_or(RasterError::Allocation { width, height })
}

/// Opaque-pixel bounding box `(min_x, min_y, max_x, max_y)`, inclusive.
pub fn opaque_bounds(alpha: &GrayImage) -> Option<(u32, u32, u32, u32)> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, Luma([a])) in alpha.enumerate_pixels() {
        if *a == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    bounds
}
