//! Appearance gallery and nearest neighbor cosine distance.

use std::collections::VecDeque;

use ndarray::{Array1, ArrayView1};

/// Cosine distance assigned when either vector has zero norm.
const ZERO_NORM_DISTANCE: f32 = 1.0;

/// Scale `v` to unit length. Zero (or non-finite) vectors are returned as zeros.
pub fn l2_normalize(v: ArrayView1<'_, f32>) -> Array1<f32> {
    let norm = v.dot(&v).sqrt();
    if norm > f32::EPSILON && norm.is_finite() {
        v.mapv(|x| x / norm)
    } else {
        Array1::zeros(v.len())
    }
}

/// `1 - cos(a, b)`, in `[0, 2]` and independent of magnitude.
pub fn cosine_distance(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    let a = l2_normalize(a);
    let b = l2_normalize(b);
    normalized_cosine_distance(a.view(), b.view())
}

fn normalized_cosine_distance(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    if a.iter().all(|x| *x == 0.0) || b.iter().all(|x| *x == 0.0) {
        return ZERO_NORM_DISTANCE;
    }
    (1.0 - a.dot(&b)).clamp(0.0, 2.0)
}

/// Bounded history of the most recent descriptors of one track.
///
/// Descriptors are copied in and stored L2-normalized. With a budget the
/// oldest entry is evicted first; without one the gallery grows unbounded.
#[derive(Debug, Clone, Default)]
pub struct FeatureGallery {
    samples: VecDeque<Array1<f32>>,
    budget: Option<usize>,
}

impl FeatureGallery {
    pub fn new(budget: Option<usize>) -> Self {
        Self {
            samples: VecDeque::new(),
            budget,
        }
    }

    pub fn push(&mut self, descriptor: ArrayView1<'_, f32>) {
        self.samples.push_back(l2_normalize(descriptor));
        if let Some(budget) = self.budget {
            while self.samples.len() > budget {
                self.samples.pop_front();
            }
        }
    }

    /// Smallest cosine distance between `query` and any stored sample, `None`
    /// for an empty gallery.
    pub fn distance(&self, query: ArrayView1<'_, f32>) -> Option<f32> {
        let query = l2_normalize(query);
        self.samples
            .iter()
            .map(|sample| normalized_cosine_distance(sample.view(), query.view()))
            .reduce(f32::min)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn budget(&self) -> Option<usize> {
        self.budget
    }

    /// Stored samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &Array1<f32>> {
        self.samples.iter()
    }
}
