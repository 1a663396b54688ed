//! Per-frame front end: box sanitizing, descriptors, NMS, then the tracker.

use ndarray::{Array1, ArrayView3};
use tracing::{debug, info};

use crate::error::TrackerError;
use crate::integration::embedder::{Embedder, NoEmbedder, generate_embeds};
use crate::integration::nms::non_max_suppression;
use crate::tracker::{Clock, Detection, Rect, Track, TrackLike, Tracker, TrackerConfig};

/// Detector output for one object: `([left, top, width, height], confidence, class)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub tlwh: [f32; 4],
    pub confidence: f32,
    pub class_label: String,
}

impl RawDetection {
    pub fn new(tlwh: [f32; 4], confidence: f32, class_label: impl Into<String>) -> Self {
        Self {
            tlwh,
            confidence,
            class_label: class_label.into(),
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::from_tlwh(self.tlwh)
    }
}

/// Where the appearance descriptors of a frame come from.
#[derive(Debug, Clone, Copy)]
pub enum Appearance<'a> {
    /// One precomputed descriptor per raw detection, same order
    Descriptors(&'a [Array1<f32>]),
    /// `H x W x C` frame to crop and embed with the configured embedder
    Frame(ArrayView3<'a, u8>),
}

/// Deep SORT tracker with its collaborators: optional embedder and NMS.
pub struct DeepSort<E: Embedder = NoEmbedder, T: TrackLike = Track> {
    tracker: Tracker<T>,
    embedder: Option<E>,
}

impl DeepSort<NoEmbedder, Track> {
    /// Tracker fed with precomputed descriptors.
    pub fn without_embedder(config: TrackerConfig) -> Result<Self, TrackerError> {
        Self::new(config, None)
    }
}

impl<E: Embedder> DeepSort<E, Track> {
    pub fn with_embedder(config: TrackerConfig, embedder: E) -> Result<Self, TrackerError> {
        Self::new(config, Some(embedder))
    }
}

impl<E: Embedder, T: TrackLike> DeepSort<E, T> {
    pub fn new(config: TrackerConfig, embedder: Option<E>) -> Result<Self, TrackerError> {
        let tracker = Tracker::new(config)?;
        info!(
            embedder = embedder.is_some(),
            track_type = std::any::type_name::<T>(),
            "deep sort initialised"
        );
        Ok(Self { tracker, embedder })
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.tracker = self.tracker.with_clock(clock);
        self
    }

    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    pub fn tracker(&self) -> &Tracker<T> {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut Tracker<T> {
        &mut self.tracker
    }

    pub fn embedder_mut(&mut self) -> Option<&mut E> {
        self.embedder.as_mut()
    }

    pub fn delete_all_tracks(&mut self) {
        self.tracker.delete_all_tracks();
    }

    /// Run the tracker on one frame of detections.
    ///
    /// Boxes with non-positive width or height are discarded before anything
    /// else. Errors are reported before the tracker is touched.
    pub fn update_tracks(
        &mut self,
        raw_detections: &[RawDetection],
        appearance: Appearance<'_>,
    ) -> Result<&[T], TrackerError> {
        let valid: Vec<usize> = raw_detections
            .iter()
            .enumerate()
            .filter(|(_, d)| d.rect().is_valid())
            .map(|(i, _)| i)
            .collect();

        let embeds: Vec<Array1<f32>> = match appearance {
            Appearance::Descriptors(descriptors) => {
                if descriptors.len() != raw_detections.len() {
                    return Err(TrackerError::DescriptorCountMismatch {
                        expected: raw_detections.len(),
                        got: descriptors.len(),
                    });
                }
                valid.iter().map(|&i| descriptors[i].clone()).collect()
            }
            Appearance::Frame(frame) => {
                let embedder = self.embedder.as_mut().ok_or(TrackerError::MissingEmbedder)?;
                let boxes: Vec<Rect> = valid.iter().map(|&i| raw_detections[i].rect()).collect();
                generate_embeds(embedder, &frame, &boxes)?
            }
        };

        let detections: Vec<Detection> = valid
            .iter()
            .zip(embeds)
            .map(|(&i, feature)| {
                let raw = &raw_detections[i];
                Detection::new(raw.rect(), raw.confidence, raw.class_label.clone(), feature)
            })
            .collect();

        let config = self.tracker.config();
        let selection: Vec<usize> = if config.nms_enabled() {
            let boxes: Vec<Rect> = detections.iter().map(|d| d.tlwh).collect();
            let scores: Vec<f32> = detections.iter().map(|d| d.confidence).collect();
            non_max_suppression(&boxes, config.nms_max_overlap, Some(&scores))
        } else {
            (0..detections.len()).collect()
        };

        debug!(
            raw = raw_detections.len(),
            valid = detections.len(),
            kept = selection.len(),
            "frame detections prepared"
        );
        self.tracker.update_selected(&detections, &selection)
    }
}
