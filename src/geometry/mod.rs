//! Detection boxes and overlap measures.

pub mod affine;

pub use affine::AffineMatrix;

/// One decoded detection in corner form.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    /// Class score multiplied by objectness.
    pub confidence: f32,
    /// Index of the winning class.
    pub label: usize,
}

impl DetectionBox {
    /// Builds a box from center-form geometry.
    pub fn from_center(
        cx: f32,
        cy: f32,
        width: f32,
        height: f32,
        confidence: f32,
        label: usize,
    ) -> Self {
        Self {
            left: cx - width * 0.5,
            top: cy - height * 0.5,
            right: cx + width * 0.5,
            bottom: cy + height * 0.5,
            confidence,
            label,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Area, treating inverted extents as empty.
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }
}

/// Intersection-over-union of two axis-aligned boxes.
///
/// Returns 0 for disjoint boxes and whenever the union is empty, so
/// degenerate boxes never divide by zero.
pub fn iou(a: &DetectionBox, b: &DetectionBox) -> f32 {
    let inter_w = (a.right.min(b.right) - a.left.max(b.left)).max(0.0);
    let inter_h = (a.bottom.min(b.bottom) - a.top.max(b.top)).max(0.0);
    let inter = inter_w * inter_h;
    if inter <= 0.0 {
        return 0.0;
    }
    let union = a.area() + b.area() - inter;
    if union <= 0.0 {
        return 0.0;
    }
    inter / union
}
