use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::category::WasteCategory;

/// Axis-aligned box in frame pixel space (top-left origin).
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);
        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// One classifier output for a single frame. Never persisted directly.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Detection {
    pub id: String,
    pub bbox: BoundingBox,
    pub category: WasteCategory,
    /// 0..=1
    pub confidence: f32,
    pub label: String,
}

impl Detection {
    /// Build a detection with a fresh id and the category's default label.
    pub fn new(category: WasteCategory, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            bbox,
            category,
            confidence,
            label: category.label().to_string(),
        }
    }

    /// Overlay caption, e.g. `Bottle 91%`.
    pub fn caption(&self) -> String {
        format!("{} {}%", self.label, (self.confidence * 100.0).round() as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
        };
        let b = BoundingBox {
            x: 20.0,
            y: 20.0,
            width: 5.0,
            height: 5.0,
        };
        assert!((a.iou(&a) - 1.0).abs() < f32::EPSILON);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn caption_rounds_confidence() {
        let det = Detection::new(WasteCategory::PlasticBag, 0.876, BoundingBox::default());
        assert_eq!(det.caption(), "Plastic Bag 88%");
    }
}
