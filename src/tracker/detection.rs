use ndarray::Array1;

use crate::tracker::rect::Rect;

/// One object observation in a single frame, with its appearance descriptor.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Bounding box in TLWH format (left, top, width, height)
    pub tlwh: Rect,
    /// Detector confidence score
    pub confidence: f32,
    pub class_label: String,
    /// Appearance descriptor
    pub feature: Array1<f32>,
}

impl Detection {
    pub fn new(
        tlwh: Rect,
        confidence: f32,
        class_label: impl Into<String>,
        feature: Array1<f32>,
    ) -> Self {
        Self {
            tlwh,
            confidence,
            class_label: class_label.into(),
            feature,
        }
    }

    /// Box as the motion model's measurement `(cx, cy, a, h)`.
    pub fn to_xyah(&self) -> [f64; 4] {
        self.tlwh.to_xyah()
    }

    pub fn to_tlbr(&self) -> [f32; 4] {
        self.tlwh.to_tlbr()
    }
}
