//! Single object track and the capability set the tracker relies on.

use tracing::warn;

use crate::tracker::detection::Detection;
use crate::tracker::kalman_filter::{KalmanFilter, MotionState};
use crate::tracker::nn_matching::FeatureGallery;
use crate::tracker::rect::Rect;
use crate::tracker::track_id::TrackId;
use crate::tracker::track_state::TrackState;

/// Everything needed to start a track from an unmatched detection.
#[derive(Debug)]
pub struct TrackSeed<'a> {
    pub track_id: TrackId,
    /// Initial motion state: the detection box, zero velocity, wide covariance
    pub motion: MotionState,
    pub detection: &'a Detection,
    /// Consecutive hits needed for confirmation
    pub n_init: u32,
    /// Misses tolerated by a confirmed track
    pub max_age: u32,
    /// Appearance gallery capacity
    pub nn_budget: Option<usize>,
}

/// Per-track bookkeeping the tracker drives every frame.
///
/// [`Track`] is the stock implementation. A custom track type implements this
/// trait directly, typically by embedding a `Track` and delegating to it while
/// keeping its own extra state.
pub trait TrackLike {
    fn spawn(seed: TrackSeed<'_>) -> Self
    where
        Self: Sized;

    fn track_id(&self) -> TrackId;

    fn state(&self) -> TrackState;

    fn motion(&self) -> &MotionState;

    fn gallery(&self) -> &FeatureGallery;

    /// Consecutive matched frames since creation.
    fn hits(&self) -> u32;

    /// Consecutive frames without a match.
    fn time_since_update(&self) -> u32;

    /// Propagate the motion state one frame ahead.
    fn predict(&mut self, kf: &KalmanFilter);

    /// Correct with an associated detection.
    fn update(&mut self, kf: &KalmanFilter, detection: &Detection);

    /// Record a frame without association.
    fn mark_missed(&mut self);

    fn is_tentative(&self) -> bool {
        self.state() == TrackState::Tentative
    }

    fn is_confirmed(&self) -> bool {
        self.state() == TrackState::Confirmed
    }

    fn is_deleted(&self) -> bool {
        self.state() == TrackState::Deleted
    }

    /// Current box estimate (TLWH).
    fn to_tlwh(&self) -> Rect {
        self.motion().to_rect()
    }
}

/// Stock track: Kalman state, appearance gallery and lifecycle counters.
#[derive(Debug, Clone)]
pub struct Track {
    track_id: TrackId,
    state: TrackState,
    motion: MotionState,
    gallery: FeatureGallery,
    hits: u32,
    age: u32,
    time_since_update: u32,
    n_init: u32,
    max_age: u32,
    class_label: String,
    det_confidence: Option<f32>,
    original_tlwh: Rect,
}

impl Track {
    /// Total frames since the track was created.
    pub fn age(&self) -> u32 {
        self.age
    }

    /// Class of the most recently associated detection.
    pub fn class_label(&self) -> &str {
        &self.class_label
    }

    /// Confidence of the detection matched in the current frame, `None` when
    /// the track was not matched this frame.
    pub fn det_confidence(&self) -> Option<f32> {
        self.det_confidence
    }

    /// Raw detection box last associated with this track, before filtering.
    pub fn original_tlwh(&self) -> Rect {
        self.original_tlwh
    }

    pub fn to_tlbr(&self) -> [f32; 4] {
        self.to_tlwh().to_tlbr()
    }
}

impl TrackLike for Track {
    fn spawn(seed: TrackSeed<'_>) -> Self {
        let mut gallery = FeatureGallery::new(seed.nn_budget);
        gallery.push(seed.detection.feature.view());

        let state = if seed.n_init <= 1 {
            TrackState::Confirmed
        } else {
            TrackState::Tentative
        };

        Self {
            track_id: seed.track_id,
            state,
            motion: seed.motion,
            gallery,
            hits: 1,
            age: 1,
            time_since_update: 0,
            n_init: seed.n_init,
            max_age: seed.max_age,
            class_label: seed.detection.class_label.clone(),
            det_confidence: Some(seed.detection.confidence),
            original_tlwh: seed.detection.tlwh,
        }
    }

    fn track_id(&self) -> TrackId {
        self.track_id
    }

    fn state(&self) -> TrackState {
        self.state
    }

    fn motion(&self) -> &MotionState {
        &self.motion
    }

    fn gallery(&self) -> &FeatureGallery {
        &self.gallery
    }

    fn hits(&self) -> u32 {
        self.hits
    }

    fn time_since_update(&self) -> u32 {
        self.time_since_update
    }

    fn predict(&mut self, kf: &KalmanFilter) {
        self.motion = kf.predict(&self.motion);
        self.age += 1;
        self.det_confidence = None;
    }

    fn update(&mut self, kf: &KalmanFilter, detection: &Detection) {
        match kf.update(&self.motion, detection.to_xyah()) {
            Ok(motion) => self.motion = motion,
            // Keep the prediction, the association itself still counts.
            Err(err) => warn!(track_id = %self.track_id, %err, "kalman correction skipped"),
        }
        self.gallery.push(detection.feature.view());

        self.hits += 1;
        self.time_since_update = 0;
        self.class_label.clone_from(&detection.class_label);
        self.det_confidence = Some(detection.confidence);
        self.original_tlwh = detection.tlwh;

        if self.state == TrackState::Tentative && self.hits >= self.n_init {
            self.state = TrackState::Confirmed;
        }
    }

    fn mark_missed(&mut self) {
        self.time_since_update += 1;
        match self.state {
            TrackState::Tentative => self.state = TrackState::Deleted,
            _ if self.time_since_update > self.max_age => self.state = TrackState::Deleted,
            _ => {}
        }
    }
}
