//! Builder for creating tracker detections from various box formats.

use ndarray::Array1;

use crate::tracker::{Detection, Rect};

/// Builder for [`Detection`] values.
#[derive(Debug, Clone, Default)]
pub struct DetectionBuilder {
    rect: Rect,
    confidence: f32,
    class_label: String,
    feature: Option<Array1<f32>>,
}

impl DetectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bounding box in TLBR format (x1, y1, x2, y2).
    pub fn tlbr(mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        self.rect = Rect::from_tlbr(x1, y1, x2, y2);
        self
    }

    /// Set bounding box in XYWH format (center_x, center_y, width, height).
    pub fn xywh(mut self, cx: f32, cy: f32, w: f32, h: f32) -> Self {
        self.rect = Rect::new(cx - w / 2.0, cy - h / 2.0, w, h);
        self
    }

    /// Set bounding box in TLWH format (left, top, width, height).
    pub fn tlwh(mut self, l: f32, t: f32, w: f32, h: f32) -> Self {
        self.rect = Rect::new(l, t, w, h);
        self
    }

    pub fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn class_label(mut self, class_label: impl Into<String>) -> Self {
        self.class_label = class_label.into();
        self
    }

    pub fn feature(mut self, feature: impl Into<Array1<f32>>) -> Self {
        self.feature = Some(feature.into());
        self
    }

    /// Build the final `Detection`. A missing descriptor becomes an empty one.
    pub fn build(self) -> Detection {
        Detection::new(
            self.rect,
            self.confidence,
            self.class_label,
            self.feature.unwrap_or_else(|| Array1::zeros(0)),
        )
    }
}
