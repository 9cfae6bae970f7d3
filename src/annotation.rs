//! Annotation data model.
//!
//! A panel edits in one of two modes, chosen when it is created:
//! - Point mode: an ordered list of labeled points in image pixel space,
//!   resent in full with every detect request.
//! - Stroke mode: a [`StrokeBuffer`] at draw-rect resolution that holds the
//!   whole freehand state.

use masksync_raster::{BrushOp, Rgb, StrokeBuffer};
use serde::{Deserialize, Serialize};

use crate::constants::{MAX_BRUSH_DIAMETER, MIN_BRUSH_DIAMETER};

// ============================================================================
// Points
// ============================================================================

/// Whether a point marks foreground or background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointLabel {
    #[default]
    Positive,
    Negative,
}

impl PointLabel {
    /// Marker color: blue for positive, red for negative.
    pub fn color(self) -> Rgb {
        match self {
            PointLabel::Positive => Rgb::new(0, 128, 255),
            PointLabel::Negative => Rgb::new(255, 48, 48),
        }
    }

    pub fn symbol(self) -> char {
        match self {
            PointLabel::Positive => '+',
            PointLabel::Negative => '-',
        }
    }
}

/// A labeled point in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
    pub label: PointLabel,
}

impl Point {
    pub fn new(x: i32, y: i32, label: PointLabel) -> Self {
        Self { x, y, label }
    }

    pub fn positive(x: i32, y: i32) -> Self {
        Self::new(x, y, PointLabel::Positive)
    }

    pub fn negative(x: i32, y: i32) -> Self {
        Self::new(x, y, PointLabel::Negative)
    }

    /// Squared Euclidean distance to `(x, y)`.
    pub fn distance_sq(&self, x: i32, y: i32) -> i64 {
        let dx = (self.x - x) as i64;
        let dy = (self.y - y) as i64;
        dx * dx + dy * dy
    }
}

/// Ordered point list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointSet {
    points: Vec<Point>,
}

impl PointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, point: Point) {
        self.points.push(point);
    }

    /// Remove the point closest to `(x, y)`. On ties the earliest-inserted
    /// point goes.
    pub fn remove_nearest(&mut self, x: i32, y: i32) -> Option<Point> {
        let index = self
            .points
            .iter()
            .enumerate()
            .min_by_key(|(i, p)| (p.distance_sq(x, y), *i))
            .map(|(i, _)| i)?;
        Some(self.points.remove(index))
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Point> {
        self.points.iter()
    }

    /// Coordinates of one label, in insertion order.
    pub fn coords(&self, label: PointLabel) -> Vec<[i32; 2]> {
        self.points
            .iter()
            .filter(|p| p.label == label)
            .map(|p| [p.x, p.y])
            .collect()
    }

    pub fn positives(&self) -> Vec<[i32; 2]> {
        self.coords(PointLabel::Positive)
    }

    pub fn negatives(&self) -> Vec<[i32; 2]> {
        self.coords(PointLabel::Negative)
    }
}

// ============================================================================
// Brush
// ============================================================================

/// Brush diameter plus wheel step sizes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrushSettings {
    diameter: f32,
    step: f32,
    coarse_step: f32,
}

impl BrushSettings {
    pub fn new(diameter: f32, step: f32, coarse_step: f32) -> Self {
        Self {
            diameter: clamp_diameter(diameter),
            step,
            coarse_step,
        }
    }

    pub fn diameter(&self) -> f32 {
        self.diameter
    }

    pub fn set_diameter(&mut self, diameter: f32) {
        self.diameter = clamp_diameter(diameter);
    }

    /// Apply one wheel event. Positive `delta` grows the brush. Returns the
    /// new diameter.
    pub fn adjust(&mut self, delta: f32, coarse: bool) -> f32 {
        if delta == 0.0 {
            return self.diameter;
        }
        let step = if coarse { self.coarse_step } else { self.step };
        self.set_diameter(self.diameter + step * delta.signum());
        self.diameter
    }
}

fn clamp_diameter(diameter: f32) -> f32 {
    if diameter.is_finite() {
        diameter.clamp(MIN_BRUSH_DIAMETER, MAX_BRUSH_DIAMETER)
    } else {
        MIN_BRUSH_DIAMETER
    }
}

// ============================================================================
// Store
// ============================================================================

/// Which editing mode a panel uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelMode {
    Points,
    Strokes,
}

/// The current user input for one panel.
pub enum AnnotationStore {
    Points {
        points: PointSet,
        /// Label for the next point added.
        polarity: PointLabel,
    },
    Strokes(StrokeBuffer),
}

impl AnnotationStore {
    pub fn points() -> Self {
        AnnotationStore::Points {
            points: PointSet::new(),
            polarity: PointLabel::Positive,
        }
    }

    pub fn strokes(width: u32, height: u32) -> masksync_raster::Result<Self> {
        Ok(AnnotationStore::Strokes(StrokeBuffer::new(width, height)?))
    }

    pub fn mode(&self) -> PanelMode {
        match self {
            AnnotationStore::Points { .. } => PanelMode::Points,
            AnnotationStore::Strokes(_) => PanelMode::Strokes,
        }
    }

    pub fn point_set(&self) -> Option<&PointSet> {
        match self {
            AnnotationStore::Points { points, .. } => Some(points),
            AnnotationStore::Strokes(_) => None,
        }
    }

    pub fn stroke_buffer(&self) -> Option<&StrokeBuffer> {
        match self {
            AnnotationStore::Strokes(buffer) => Some(buffer),
            AnnotationStore::Points { .. } => None,
        }
    }

    pub fn stroke_buffer_mut(&mut self) -> Option<&mut StrokeBuffer> {
        match self {
            AnnotationStore::Strokes(buffer) => Some(buffer),
            AnnotationStore::Points { .. } => None,
        }
    }

    /// Drop all points or erase the whole stroke buffer.
    pub fn clear(&mut self) {
        match self {
            AnnotationStore::Points { points, .. } => points.clear(),
            AnnotationStore::Strokes(buffer) => buffer.clear(),
        }
    }
}

/// Pick the brush operation from live pointer state.
pub fn brush_op(erase_button: bool, erase_modifier: bool) -> BrushOp {
    if erase_button || erase_modifier {
        BrushOp::Erase
    } else {
        BrushOp::Paint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_nearest() {
        let mut set = PointSet::new();
        set.push(Point::positive(10, 10));
        set.push(Point::positive(50, 50));
        set.push(Point::negative(30, 30));

        assert_eq!(set.remove_nearest(28, 33), Some(Point::negative(30, 30)));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_remove_nearest_tie_takes_first() {
        let mut set = PointSet::new();
        set.push(Point::positive(0, 10));
        set.push(Point::negative(10, 0));
        set.push(Point::positive(0, 10));

        // (0,10) and (10,0) are both 50 away from (5,5).
        assert_eq!(set.remove_nearest(5, 5), Some(Point::positive(0, 10)));
        assert_eq!(set.iter().next(), Some(&Point::negative(10, 0)));
    }

    #[test]
    fn test_remove_from_empty() {
        let mut set = PointSet::new();
        assert_eq!(set.remove_nearest(0, 0), None);
    }

    #[test]
    fn test_split_by_label_keeps_order() {
        let mut set = PointSet::new();
        set.push(Point::positive(1, 1));
        set.push(Point::negative(2, 2));
        set.push(Point::positive(3, 3));

        assert_eq!(set.positives(), vec![[1, 1], [3, 3]]);
        assert_eq!(set.negatives(), vec![[2, 2]]);
    }

    #[test]
    fn test_brush_adjust_clamps() {
        let mut brush = BrushSettings::new(50.0, 5.0, 10.0);
        assert_eq!(brush.adjust(1.0, false), 55.0);
        assert_eq!(brush.adjust(-3.0, true), 45.0);

        brush.set_diameter(198.0);
        assert_eq!(brush.adjust(1.0, true), 200.0);

        brush.set_diameter(3.0);
        assert_eq!(brush.adjust(-1.0, false), 1.0);
        assert_eq!(brush.adjust(0.0, false), 1.0);
    }

    #[test]
    fn test_brush_rejects_nan() {
        let brush = BrushSettings::new(f32::NAN, 5.0, 10.0);
        assert_eq!(brush.diameter(), 1.0);
    }

    #[test]
    fn test_point_label_serde() {
        let json = serde_json::to_string(&Point::negative(4, 5)).unwrap();
        assert_eq!(json, r#"{"x":4,"y":5,"label":"negative"}"#);
    }

    #[test]
    fn test_store_clear() {
        let mut store = AnnotationStore::points();
        if let AnnotationStore::Points { points, .. } = &mut store {
            points.push(Point::positive(1, 1));
        }
        store.clear();
        assert!(store.point_set().unwrap().is_empty());
        assert_eq!(store.mode(), PanelMode::Points);
    }

    #[test]
    fn test_brush_op_selection() {
        assert_eq!(brush_op(false, false), BrushOp::Paint);
        assert_eq!(brush_op(true, false), BrushOp::Erase);
        assert_eq!(brush_op(false, true), BrushOp::Erase);
    }
}
