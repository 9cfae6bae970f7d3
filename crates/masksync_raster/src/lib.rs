//! masksync_raster - pixel storage and rendering for the mask editor.
//!
//! Holds the decoded source image, the freehand stroke buffer, the canonical
//! image-resolution alpha mask and the preview compositor. Vector work (brush
//! circles, round-capped segments, scaled draws) goes through `tiny-skia`;
//! resampling, blurring and PNG encoding go through `image`.

pub mod color;
pub mod compositor;
pub mod error;
pub mod mask;
pub mod source;
pub mod stroke;

pub use color::Rgb;
pub use compositor::{BrushCursor, OverlayStyle, PointMarker, PreviewScene, render_preview};
pub use error::{RasterError, Result};
pub use mask::{AlphaPolarity, CanonicalMask};
pub use source::ImageHandle;
pub use stroke::{BrushOp, StrokeBuffer, opaque_bounds};

/// Preview frames are plain premultiplied RGBA pixmaps.
pub use tiny_skia::Pixmap;
