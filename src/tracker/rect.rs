use ndarray::Array2;

/// Axis aligned bounding box in image pixel coordinates.
///
/// Stored as TLWH (left, top, width, height). Conversions:
/// - TLBR: left, top, right, bottom
/// - XYAH: center x, center y, aspect ratio (w/h), height, the observation
///   space of the motion model
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    /// Left edge
    pub x: f32,
    /// Top edge
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    /// Create a new Rect from left/top coordinates and dimensions (TLWH format).
    #[inline]
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn from_tlwh(tlwh: [f32; 4]) -> Self {
        Self::new(tlwh[0], tlwh[1], tlwh[2], tlwh[3])
    }

    /// Create a Rect from TLBR format (left, top, right, bottom).
    #[inline]
    pub fn from_tlbr(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        }
    }

    /// Create a Rect from XYAH format (center x, center y, aspect ratio, height).
    #[inline]
    pub fn from_xyah(cx: f32, cy: f32, aspect_ratio: f32, height: f32) -> Self {
        let width = aspect_ratio * height;
        Self {
            x: cx - width / 2.0,
            y: cy - height / 2.0,
            width,
            height,
        }
    }

    #[inline]
    pub fn to_tlbr(&self) -> [f32; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }

    #[inline]
    pub fn to_tlwh(&self) -> [f32; 4] {
        [self.x, self.y, self.width, self.height]
    }

    /// Measurement vector for the motion model, widened to `f64`.
    #[inline]
    pub fn to_xyah(&self) -> [f64; 4] {
        let cx = self.x as f64 + self.width as f64 / 2.0;
        let cy = self.y as f64 + self.height as f64 / 2.0;
        let aspect_ratio = if self.height > 0.0 {
            self.width as f64 / self.height as f64
        } else {
            0.0
        };
        [cx, cy, aspect_ratio, self.height as f64]
    }

    /// Finite corner with width and height strictly positive and finite.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Pixel window `(top, bottom, left, right)` of this box clamped to an
    /// image of the given size. The window may be empty.
    pub fn clamped_window(
        &self,
        image_height: usize,
        image_width: usize,
    ) -> (usize, usize, usize, usize) {
        // Truncate first, the same way integer pixel boxes are produced upstream.
        let l = self.x.trunc() as i64;
        let t = self.y.trunc() as i64;
        let r = l + self.width.trunc() as i64;
        let b = t + self.height.trunc() as i64;

        let clamp = |v: i64, hi: usize| v.clamp(0, hi as i64) as usize;
        let left = clamp(l, image_width);
        let right = clamp(r, image_width).max(left);
        let top = clamp(t, image_height);
        let bottom = clamp(b, image_height).max(top);
        (top, bottom, left, right)
    }

    /// Intersection over union with another box, 0 when the union is empty.
    pub fn iou(&self, other: &Rect) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union_area = self.area() + other.area() - inter_area;

        if union_area > 0.0 {
            inter_area / union_area
        } else {
            0.0
        }
    }
}

/// IoU matrix of shape (M, N) between `boxes_a` (M) and `boxes_b` (N).
pub fn iou_batch(boxes_a: &[Rect], boxes_b: &[Rect]) -> Array2<f32> {
    let mut ious = Array2::zeros((boxes_a.len(), boxes_b.len()));
    for (i, a) in boxes_a.iter().enumerate() {
        for (j, b) in boxes_b.iter().enumerate() {
            ious[[i, j]] = a.iou(b);
        }
    }
    ious
}
