//! Track lifecycle manager: predict, associate, update, age, spawn, collect.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::TrackerError;
use crate::tracker::detection::Detection;
use crate::tracker::kalman_filter::KalmanFilter;
use crate::tracker::matching::{self, AssignmentResult, AssociationParams, CascadePolicy};
use crate::tracker::rect::Rect;
use crate::tracker::track::{Track, TrackLike, TrackSeed};
use crate::tracker::track_id::{Clock, IdAllocator};
use crate::tracker::track_state::TrackState;

/// Configuration for the [`Tracker`], fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Misses tolerated before a confirmed track is deleted
    pub max_age: u32,
    /// Consecutive hits before a track is confirmed
    pub n_init: u32,
    /// Appearance gate (cosine distance)
    pub max_cosine_distance: f32,
    /// IoU gate of the fallback stage, as `1 - IoU`
    pub max_iou_distance: f32,
    /// Descriptors kept per track, `None` for unbounded
    pub nn_budget: Option<usize>,
    /// Maximum detection overlap before suppression; 1.0 disables NMS
    pub nms_max_overlap: f32,
    pub cascade_policy: CascadePolicy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_age: 30,
            n_init: 3,
            max_cosine_distance: 0.2,
            max_iou_distance: 0.7,
            nn_budget: None,
            nms_max_overlap: 1.0,
            cascade_policy: CascadePolicy::RecencyFirst,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.n_init == 0 {
            return Err(TrackerError::InvalidConfig("n_init must be at least 1".into()));
        }
        if !self.max_cosine_distance.is_finite() || self.max_cosine_distance < 0.0 {
            return Err(TrackerError::InvalidConfig(format!(
                "max_cosine_distance must be a finite non-negative number, got {}",
                self.max_cosine_distance
            )));
        }
        if !(0.0..=1.0).contains(&self.max_iou_distance) {
            return Err(TrackerError::InvalidConfig(format!(
                "max_iou_distance must lie in [0, 1], got {}",
                self.max_iou_distance
            )));
        }
        if self.nms_max_overlap == 0.0 || !(0.0..=1.0).contains(&self.nms_max_overlap) {
            return Err(TrackerError::InvalidConfig(format!(
                "nms_max_overlap must lie in (0, 1], got {}",
                self.nms_max_overlap
            )));
        }
        if self.nn_budget == Some(0) {
            return Err(TrackerError::InvalidConfig("nn_budget must be positive when set".into()));
        }
        Ok(())
    }

    /// NMS is skipped entirely at the neutral threshold.
    pub fn nms_enabled(&self) -> bool {
        self.nms_max_overlap < 1.0
    }
}

/// Multi-target tracker owning the live set of tracks.
///
/// Each call to [`Tracker::update`] runs one whole frame. Input is validated
/// before any track is touched, so a rejected frame leaves the tracker as it
/// was.
pub struct Tracker<T: TrackLike = Track> {
    tracks: Vec<T>,
    config: TrackerConfig,
    kalman_filter: KalmanFilter,
    ids: IdAllocator,
    feature_dim: Option<usize>,
    frame_id: u64,
}

impl<T: TrackLike> Tracker<T> {
    pub fn new(config: TrackerConfig) -> Result<Self, TrackerError> {
        config.validate()?;
        let tracker = Self {
            tracks: Vec::new(),
            config,
            kalman_filter: KalmanFilter::default(),
            ids: IdAllocator::new(),
            feature_dim: None,
            frame_id: 0,
        };
        tracker.probe_track_type()?;

        info!(
            max_age = tracker.config.max_age,
            n_init = tracker.config.n_init,
            appearance_threshold = tracker.config.max_cosine_distance,
            nms_threshold = %nms_label(&tracker.config),
            nn_budget = ?tracker.config.nn_budget,
            cascade_policy = ?tracker.config.cascade_policy,
            "tracker initialised"
        );
        Ok(tracker)
    }

    /// Use `clock` to restart identifier sequences on day boundaries.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.ids.set_clock(clock);
        info!("track id clock attached");
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn has_clock(&self) -> bool {
        self.ids.has_clock()
    }

    /// Live tracks, Tentative and Confirmed.
    pub fn tracks(&self) -> &[T] {
        &self.tracks
    }

    /// Live tracks that are confirmed.
    pub fn confirmed_tracks(&self) -> impl Iterator<Item = &T> {
        self.tracks.iter().filter(|t| t.is_confirmed())
    }

    /// Number of frames processed so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_id
    }

    /// Drop every live track. Identifiers keep counting from where they were.
    pub fn delete_all_tracks(&mut self) {
        debug!(dropped = self.tracks.len(), "deleting all tracks");
        self.tracks.clear();
    }

    /// Run one frame and return the live set.
    ///
    /// Detections with non-positive width or height are ignored. All
    /// descriptors must share one length, the same as previous frames.
    pub fn update(&mut self, detections: &[Detection]) -> Result<&[T], TrackerError> {
        let all: Vec<usize> = (0..detections.len()).collect();
        self.update_selected(detections, &all)
    }

    /// Like [`Tracker::update`], restricted to the detections at `selection`
    /// (for instance the survivors of NMS). Indices out of range are ignored.
    pub fn update_selected(
        &mut self,
        detections: &[Detection],
        selection: &[usize],
    ) -> Result<&[T], TrackerError> {
        let mut detection_indices: Vec<usize> = selection
            .iter()
            .copied()
            .filter(|&i| detections.get(i).is_some_and(|d| d.tlwh.is_valid()))
            .collect();
        detection_indices.sort_unstable();
        detection_indices.dedup();
        let feature_dim = self.check_descriptors(detections, &detection_indices)?;

        self.frame_id += 1;
        self.feature_dim = feature_dim.or(self.feature_dim);

        for track in self.tracks.iter_mut() {
            track.predict(&self.kalman_filter);
        }

        let AssignmentResult {
            matches,
            unmatched_tracks,
            unmatched_detections,
        } = matching::associate(
            &self.kalman_filter,
            &self.association_params(),
            &self.tracks,
            detections,
            &detection_indices,
        );

        for &(track_idx, det_idx) in &matches {
            self.tracks[track_idx].update(&self.kalman_filter, &detections[det_idx]);
        }
        for &track_idx in &unmatched_tracks {
            self.tracks[track_idx].mark_missed();
        }
        for &det_idx in &unmatched_detections {
            let track = self.spawn(&detections[det_idx]);
            self.tracks.push(track);
        }

        let before = self.tracks.len();
        self.tracks.retain(|t| !t.is_deleted());

        debug!(
            frame = self.frame_id,
            detections = detection_indices.len(),
            matched = matches.len(),
            spawned = unmatched_detections.len(),
            deleted = before - self.tracks.len(),
            live = self.tracks.len(),
            "frame processed"
        );
        Ok(&self.tracks)
    }

    fn association_params(&self) -> AssociationParams {
        AssociationParams {
            max_cosine_distance: self.config.max_cosine_distance,
            max_iou_distance: self.config.max_iou_distance,
            cascade_depth: self.config.max_age + 1,
            policy: self.config.cascade_policy,
        }
    }

    fn spawn(&mut self, detection: &Detection) -> T {
        T::spawn(TrackSeed {
            track_id: self.ids.next_id(),
            motion: self.kalman_filter.initiate(detection.to_xyah()),
            detection,
            n_init: self.config.n_init,
            max_age: self.config.max_age,
            nn_budget: self.config.nn_budget,
        })
    }

    /// Descriptor length shared by the selected detections.
    fn check_descriptors(
        &self,
        detections: &[Detection],
        detection_indices: &[usize],
    ) -> Result<Option<usize>, TrackerError> {
        let mut expected = self.feature_dim;
        for &i in detection_indices {
            let got = detections[i].feature.len();
            match expected {
                Some(expected) if expected != got => {
                    return Err(TrackerError::DescriptorDimMismatch { expected, got });
                }
                _ => expected = Some(got),
            }
        }
        Ok(expected)
    }

    /// Spawn a throwaway track to catch custom types that ignore their seed.
    fn probe_track_type(&self) -> Result<(), TrackerError> {
        let probe = Detection::new(Rect::new(0.0, 0.0, 1.0, 1.0), 1.0, "", Array1::zeros(1));
        let track_id = self.ids.peek();
        let track = T::spawn(TrackSeed {
            track_id,
            motion: self.kalman_filter.initiate(probe.to_xyah()),
            detection: &probe,
            n_init: self.config.n_init,
            max_age: self.config.max_age,
            nn_budget: self.config.nn_budget,
        });

        if track.track_id() != track_id {
            return Err(TrackerError::MalformedTrackType(format!(
                "spawned track reports id {} instead of {}",
                track.track_id(),
                track_id
            )));
        }
        if track.state() == TrackState::Deleted {
            return Err(TrackerError::MalformedTrackType("spawned track is already deleted".into()));
        }
        if track.hits() != 1 || track.time_since_update() != 0 {
            return Err(TrackerError::MalformedTrackType(format!(
                "spawned track has hits={} time_since_update={}, expected 1 and 0",
                track.hits(),
                track.time_since_update()
            )));
        }
        if track.motion().mean.len() != 8 || track.motion().covariance.dim() != (8, 8) {
            return Err(TrackerError::MalformedTrackType(
                "motion state must be 8-dimensional".into(),
            ));
        }
        Ok(())
    }
}

fn nms_label(config: &TrackerConfig) -> String {
    if config.nms_enabled() {
        config.nms_max_overlap.to_string()
    } else {
        "OFF".to_string()
    }
}
