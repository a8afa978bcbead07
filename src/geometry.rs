//! Axis-aligned box geometry.
//!
//! Boxes are stored in normalized `[y1, x1, y2, x2]` corner form with all
//! coordinates in `0..=1`. IoU is the only similarity measure the pipeline
//! uses; it is a pure function with no failure mode. Degenerate boxes
//! (zero or negative area) compare as non-overlapping.

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box, normalized corner form.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub y1: f32,
    pub x1: f32,
    pub y2: f32,
    pub x2: f32,
}

impl BoundingBox {
    pub fn new(y1: f32, x1: f32, y2: f32, x2: f32) -> Self {
        Self { y1, x1, y2, x2 }
    }

    /// Box area. Degenerate boxes (inverted corners) have zero area.
    pub fn area(&self) -> f32 {
        let h = (self.y2 - self.y1).max(0.0);
        let w = (self.x2 - self.x1).max(0.0);
        h * w
    }

    /// Center point as `(cy, cx)`.
    pub fn center(&self) -> (f32, f32) {
        ((self.y1 + self.y2) / 2.0, (self.x1 + self.x2) / 2.0)
    }

    pub fn intersection_area(&self, other: &BoundingBox) -> f32 {
        let y1 = self.y1.max(other.y1);
        let x1 = self.x1.max(other.x1);
        let y2 = self.y2.min(other.y2);
        let x2 = self.x2.min(other.x2);
        (y2 - y1).max(0.0) * (x2 - x1).max(0.0)
    }

    /// Intersection-over-union with another box.
    ///
    /// Returns 0.0 when either box is degenerate or the union is empty,
    /// never an error.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let intersection = self.intersection_area(other);
        if intersection <= 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            return 0.0;
        }
        intersection / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = BoundingBox::new(0.1, 0.2, 0.5, 0.6);
        assert!((b.iou(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BoundingBox::new(0.0, 0.0, 0.2, 0.2);
        let b = BoundingBox::new(0.5, 0.5, 0.9, 0.9);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_of_half_overlapping_boxes() {
        // Two unit-height boxes sharing half their width.
        let a = BoundingBox::new(0.0, 0.0, 1.0, 0.5);
        let b = BoundingBox::new(0.0, 0.25, 1.0, 0.75);
        // intersection 0.25, union 0.75
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_box_yields_zero_iou() {
        let degenerate = BoundingBox::new(0.5, 0.5, 0.5, 0.5);
        let b = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(degenerate.iou(&b), 0.0);
        assert_eq!(degenerate.iou(&degenerate), 0.0);
    }

    #[test]
    fn inverted_corners_have_zero_area() {
        let inverted = BoundingBox::new(0.8, 0.8, 0.2, 0.2);
        assert_eq!(inverted.area(), 0.0);
    }
}
