//! Coordinate spaces.
//!
//! Three spaces are involved when a pointer event lands on a panel:
//! - Host display space: pixels on the rendered host surface, affected by the
//!   host's pan/zoom ([`HostView`]).
//! - Local draw rect: the aspect-fit sub-region of the panel reserved for the
//!   image ([`Rect`], panel-local coordinates).
//! - Image pixel space: the fixed resolution of the source raster.
//!
//! Everything here is pure arithmetic so it can be tested without a host.

/// A width/height pair in panel-local units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Source image resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }
}

/// The local draw rect.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Inclusive on all edges.
    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px <= self.x + self.width && py >= self.y && py <= self.y + self.height
    }

    /// Size in whole pixels, for buffers that live at rect resolution.
    pub fn pixel_size(&self) -> (u32, u32) {
        (self.width.max(1.0) as u32, self.height.max(1.0) as u32)
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

/// Aspect-fit `image` into `available`, centered, never upscaling past 1:1.
///
/// The result is floored to whole pixels (at least 1x1). Calling this twice
/// with the same arguments gives a bit-identical rect, so dependent buffers
/// are only reallocated when the inputs really change.
pub fn compute_rect(available: Size, image: ImageSize) -> Rect {
    let avail_w = available.width;
    let avail_h = available.height;
    if avail_w <= 0.0 || avail_h <= 0.0 || image.width == 0 || image.height == 0 {
        return Rect::new(0.0, 0.0, avail_w.max(1.0), avail_h.max(1.0));
    }

    let iw = image.width as f32;
    let ih = image.height as f32;
    let scale = (avail_w / iw).min(avail_h / ih).min(1.0);
    let width = (iw * scale).floor().max(1.0);
    let height = (ih * scale).floor().max(1.0);

    Rect::new(
        (avail_w - width) / 2.0,
        (avail_h - height) / 2.0,
        width,
        height,
    )
}

/// Panel geometry: overall size plus the padding and header reserved above
/// the image area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanelLayout {
    pub width: f32,
    pub height: f32,
    pub padding: f32,
    pub header: f32,
}

impl PanelLayout {
    pub fn new(width: f32, height: f32, padding: f32, header: f32) -> Self {
        Self {
            width,
            height,
            padding,
            header,
        }
    }

    /// Top-left of the image area in panel-local coordinates.
    pub fn origin(&self) -> (f32, f32) {
        (self.padding, self.padding + self.header)
    }

    /// The area the draw rect is fitted into.
    pub fn available(&self) -> Size {
        let (_, top) = self.origin();
        Size::new(
            self.width - self.padding * 2.0,
            self.height - top - self.padding,
        )
    }

    /// Whether a panel-local position is anywhere over the panel.
    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= 0.0 && px <= self.width && py >= 0.0 && py <= self.height
    }

    /// The draw rect for an image of `image` size, in panel-local coordinates.
    pub fn draw_rect(&self, image: Option<ImageSize>) -> Rect {
        let (ox, oy) = self.origin();
        let available = self.available();
        match image {
            Some(image) => compute_rect(available, image).translate(ox, oy),
            None => Rect::new(
                ox,
                oy,
                available.width.max(1.0),
                available.height.max(1.0),
            ),
        }
    }
}

impl Default for PanelLayout {
    fn default() -> Self {
        Self::new(340.0, 420.0, 8.0, 40.0)
    }
}

/// Host pan/zoom state plus where the panel sits on the host surface.
///
/// `display = (panel + origin) * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostView {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    /// Panel position in host canvas units.
    pub origin_x: f32,
    pub origin_y: f32,
}

impl HostView {
    pub fn new(scale: f32, offset_x: f32, offset_y: f32, origin_x: f32, origin_y: f32) -> Self {
        Self {
            scale,
            offset_x,
            offset_y,
            origin_x,
            origin_y,
        }
    }

    /// Identity view: panel-local equals display.
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0, 0.0)
    }

    /// Host display position -> panel-local position.
    pub fn to_panel(&self, x: f32, y: f32) -> (f32, f32) {
        let scale = if self.scale > 0.0 { self.scale } else { 1.0 };
        (
            (x - self.offset_x) / scale - self.origin_x,
            (y - self.offset_y) / scale - self.origin_y,
        )
    }

    /// Panel-local position -> host display position.
    pub fn to_display(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x + self.origin_x) * self.scale + self.offset_x,
            (y + self.origin_y) * self.scale + self.offset_y,
        )
    }
}

impl Default for HostView {
    fn default() -> Self {
        Self::identity()
    }
}

/// Maps between the draw rect and image pixels for one image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpaceMapper {
    rect: Rect,
    image: ImageSize,
}

impl SpaceMapper {
    pub fn new(rect: Rect, image: ImageSize) -> Self {
        Self { rect, image }
    }

    /// Panel-local position -> image pixel.
    ///
    /// The position is clamped to the rect, scaled by `image / rect` per axis
    /// and rounded to the nearest pixel. The far edges of the rect land on the
    /// last image pixel, so any position inside the rect is a valid pixel.
    pub fn to_image(&self, px: f32, py: f32) -> (i32, i32) {
        let rx = (px - self.rect.x).clamp(0.0, self.rect.width.max(0.0));
        let ry = (py - self.rect.y).clamp(0.0, self.rect.height.max(0.0));
        let sx = self.image.width as f32 / self.rect.width.max(1.0);
        let sy = self.image.height as f32 / self.rect.height.max(1.0);
        let max_x = self.image.width.saturating_sub(1) as i32;
        let max_y = self.image.height.saturating_sub(1) as i32;
        (
            ((rx * sx).round() as i32).min(max_x),
            ((ry * sy).round() as i32).min(max_y),
        )
    }

    /// Image pixel -> panel-local position (inverse scale).
    pub fn to_local(&self, x: f32, y: f32) -> (f32, f32) {
        let sx = self.rect.width / self.image.width.max(1) as f32;
        let sy = self.rect.height / self.image.height.max(1) as f32;
        (self.rect.x + x * sx, self.rect.y + y * sy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 0.0001;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    #[test]
    fn test_compute_rect_fits_and_centers() {
        let rect = compute_rect(Size::new(300.0, 200.0), ImageSize::new(1000, 500));
        // Limited by width: scale 0.3 -> 300x150, centered vertically.
        assert_eq!(rect.width, 300.0);
        assert_eq!(rect.height, 150.0);
        assert_eq!(rect.x, 0.0);
        assert_eq!(rect.y, 25.0);
    }

    #[test]
    fn test_compute_rect_never_upscales() {
        let rect = compute_rect(Size::new(500.0, 500.0), ImageSize::new(100, 50));
        assert_eq!(rect.width, 100.0);
        assert_eq!(rect.height, 50.0);
        assert_eq!(rect.x, 200.0);
        assert_eq!(rect.y, 225.0);
    }

    #[test]
    fn test_compute_rect_is_idempotent() {
        let cases = [
            (Size::new(324.0, 352.0), ImageSize::new(1920, 1080)),
            (Size::new(123.7, 99.3), ImageSize::new(777, 333)),
            (Size::new(1.0, 1.0), ImageSize::new(4096, 4096)),
        ];
        for (available, image) in cases {
            let a = compute_rect(available, image);
            let b = compute_rect(available, image);
            assert_eq!(a.x.to_bits(), b.x.to_bits());
            assert_eq!(a.y.to_bits(), b.y.to_bits());
            assert_eq!(a.width.to_bits(), b.width.to_bits());
            assert_eq!(a.height.to_bits(), b.height.to_bits());
        }
    }

    #[test]
    fn test_compute_rect_degenerate_inputs() {
        let rect = compute_rect(Size::new(-5.0, 0.0), ImageSize::new(10, 10));
        assert_eq!(rect.width, 1.0);
        assert_eq!(rect.height, 1.0);

        let rect = compute_rect(Size::new(10.0, 10.0), ImageSize::new(10_000, 1));
        assert_eq!(rect.height, 1.0);
    }

    #[test]
    fn test_layout_draw_rect_offsets_origin() {
        let layout = PanelLayout::new(216.0, 264.0, 8.0, 40.0);
        let available = layout.available();
        assert_eq!(available, Size::new(200.0, 208.0));

        let rect = layout.draw_rect(Some(ImageSize::new(400, 400)));
        assert_eq!(rect.width, 200.0);
        assert_eq!(rect.height, 200.0);
        assert_eq!(rect.x, 8.0);
        assert_eq!(rect.y, 52.0);
    }

    #[test]
    fn test_to_image_clamps_and_rounds() {
        let mapper = SpaceMapper::new(Rect::new(10.0, 20.0, 100.0, 50.0), ImageSize::new(400, 200));

        assert_eq!(mapper.to_image(10.0, 20.0), (0, 0));
        assert_eq!(mapper.to_image(60.0, 45.0), (200, 100));
        assert_eq!(mapper.to_image(10.3, 20.0), (1, 0));
        // Outside the rect clamps to its edges, and the far edges to the last pixel.
        assert_eq!(mapper.to_image(-50.0, 500.0), (0, 199));
        assert_eq!(mapper.to_image(1000.0, 0.0), (399, 0));
        assert_eq!(mapper.to_image(110.0, 70.0), (399, 199));
        assert_eq!(mapper.to_image(109.9, 69.9), (399, 199));
    }

    #[test]
    fn test_coordinate_roundtrip_within_half_pixel() {
        let mapper = SpaceMapper::new(Rect::new(8.0, 48.0, 324.0, 182.0), ImageSize::new(1920, 1080));
        for y in (0..1080).step_by(37) {
            for x in (0..1920).step_by(41) {
                let (lx, ly) = mapper.to_local(x as f32, y as f32);
                let (ix, iy) = mapper.to_image(lx, ly);
                assert_eq!(ix, x);
                assert_eq!(iy, y);
            }
        }
    }

    #[test]
    fn test_host_view_roundtrip() {
        let view = HostView::new(2.0, 30.0, -10.0, 100.0, 50.0);
        let (px, py) = view.to_panel(430.0, 190.0);
        assert!(approx_eq(px, 100.0));
        assert!(approx_eq(py, 50.0));

        let (dx, dy) = view.to_display(px, py);
        assert!(approx_eq(dx, 430.0));
        assert!(approx_eq(dy, 190.0));
    }

    #[test]
    fn test_host_view_identity() {
        let view = HostView::identity();
        assert_eq!(view.to_panel(12.5, 7.0), (12.5, 7.0));
    }

    #[test]
    fn test_rect_contains_is_inclusive() {
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(rect.contains(0.0, 0.0));
        assert!(rect.contains(10.0, 10.0));
        assert!(!rect.contains(10.1, 5.0));
    }
}
