//! Frame-to-frame data association: gated appearance cascade followed by an
//! IoU pass over whatever is left.
//!
//! All indices handed in and out are positions in the caller's track and
//! detection slices, so a frame's detections are selected by index and never
//! copied or reordered.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::tracker::detection::Detection;
use crate::tracker::kalman_filter::{CHI2INV95_2DOF, CHI2INV95_4DOF, KalmanFilter};
use crate::tracker::rect::{Rect, iou_batch};
use crate::tracker::track::TrackLike;

/// Cost given to pairs rejected by a gate.
pub const INFTY_COST: f32 = 1e5;

/// Cost of the dummy rows/columns used to square the matrix for the solver.
const PADDING_COST: f64 = 1e6;

/// Order in which tracks compete for detections in the appearance stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CascadePolicy {
    /// Tracks are bucketed by time since update and buckets are solved
    /// youngest first. A detection taken by a younger bucket is never
    /// revisited.
    #[default]
    RecencyFirst,
    /// All tracks are solved in one assignment, so an older track can win a
    /// detection it matches better than a recently seen one.
    Global,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentResult {
    /// `(track index, detection index)` pairs
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// Solve a rectangular assignment and drop pairs costing more than `thresh`.
///
/// Indices in the result are row/column positions of `cost_matrix`.
pub fn linear_assignment(cost_matrix: &Array2<f32>, thresh: f32) -> AssignmentResult {
    let (num_rows, num_cols) = cost_matrix.dim();

    if num_rows == 0 || num_cols == 0 {
        return AssignmentResult {
            matches: vec![],
            unmatched_tracks: (0..num_rows).collect(),
            unmatched_detections: (0..num_cols).collect(),
        };
    }

    let size = num_rows.max(num_cols);
    let mut padded = Array2::<f64>::from_elem((size, size), PADDING_COST);
    for ((i, j), &cost) in cost_matrix.indexed_iter() {
        padded[[i, j]] = cost as f64;
    }

    let mut matches = vec![];
    let mut unmatched_tracks = vec![];
    let mut unmatched_detections_mask = vec![true; num_cols];

    match lapjv::lapjv(&padded) {
        Ok((row_to_col, _)) => {
            for (row_idx, &col_idx) in row_to_col.iter().enumerate().take(num_rows) {
                if col_idx < num_cols && cost_matrix[[row_idx, col_idx]] <= thresh {
                    matches.push((row_idx, col_idx));
                    unmatched_detections_mask[col_idx] = false;
                } else {
                    unmatched_tracks.push(row_idx);
                }
            }
        }
        Err(err) => {
            warn!(
                ?err,
                rows = num_rows,
                cols = num_cols,
                "linear assignment failed, leaving all unmatched"
            );
            unmatched_tracks = (0..num_rows).collect();
        }
    }

    let unmatched_detections = unmatched_detections_mask
        .iter()
        .enumerate()
        .filter_map(|(i, &u)| u.then_some(i))
        .collect();

    AssignmentResult {
        matches,
        unmatched_tracks,
        unmatched_detections,
    }
}

/// Minimum cost matching over a cost matrix built for the given tracks (rows)
/// and detections (columns). Entries above `max_distance` are clipped just
/// above it before solving, so they can never be kept.
///
/// Indices in the result are taken from `track_indices` / `detection_indices`.
/// A matrix whose shape disagrees with the index lists matches nothing.
pub fn min_cost_matching(
    cost_matrix: &Array2<f32>,
    max_distance: f32,
    track_indices: &[usize],
    detection_indices: &[usize],
) -> AssignmentResult {
    let shape = (track_indices.len(), detection_indices.len());
    if cost_matrix.dim() != shape {
        warn!(
            matrix = ?cost_matrix.dim(),
            expected = ?shape,
            "cost matrix shape mismatch, leaving all unmatched"
        );
    }
    if track_indices.is_empty() || detection_indices.is_empty() || cost_matrix.dim() != shape {
        return AssignmentResult {
            matches: vec![],
            unmatched_tracks: track_indices.to_vec(),
            unmatched_detections: detection_indices.to_vec(),
        };
    }

    let clipped = cost_matrix.mapv(|c| {
        if c > max_distance || c.is_nan() {
            max_distance + 1e-5
        } else {
            c
        }
    });
    let local = linear_assignment(&clipped, max_distance);

    AssignmentResult {
        matches: local
            .matches
            .into_iter()
            .map(|(row, col)| (track_indices[row], detection_indices[col]))
            .collect(),
        unmatched_tracks: local
            .unmatched_tracks
            .into_iter()
            .map(|row| track_indices[row])
            .collect(),
        unmatched_detections: local
            .unmatched_detections
            .into_iter()
            .map(|col| detection_indices[col])
            .collect(),
    }
}

/// Nearest neighbor cosine distance between each track's gallery and each
/// detection's descriptor. Tracks with an empty gallery, and indices out of
/// range, get `INFTY_COST`.
pub fn appearance_cost<T: TrackLike>(
    tracks: &[T],
    detections: &[Detection],
    track_indices: &[usize],
    detection_indices: &[usize],
) -> Array2<f32> {
    Array2::from_shape_fn(
        (track_indices.len(), detection_indices.len()),
        |(row, col)| {
            let track = tracks.get(track_indices[row]);
            let detection = detections.get(detection_indices[col]);
            match (track, detection) {
                (Some(track), Some(detection)) => track
                    .gallery()
                    .distance(detection.feature.view())
                    .unwrap_or(INFTY_COST),
                _ => INFTY_COST,
            }
        },
    )
}

/// Veto pairs whose detection lies outside the track's 95% motion gate by
/// setting their cost to `INFTY_COST`. A track whose covariance cannot be
/// factorized fails the gate for every detection, and so do indices out of
/// range. Cells outside `cost_matrix` are left alone.
pub fn gate_cost_matrix<T: TrackLike>(
    kf: &KalmanFilter,
    cost_matrix: &mut Array2<f32>,
    tracks: &[T],
    detections: &[Detection],
    track_indices: &[usize],
    detection_indices: &[usize],
    only_position: bool,
) {
    let gating_threshold = if only_position {
        CHI2INV95_2DOF
    } else {
        CHI2INV95_4DOF
    };
    // Out of range detections gate as NaN, which always fails.
    let measurements: Vec<[f64; 4]> = detection_indices
        .iter()
        .map(|&i| detections.get(i).map_or([f64::NAN; 4], Detection::to_xyah))
        .collect();

    for (row, &track_idx) in track_indices.iter().enumerate() {
        if row >= cost_matrix.nrows() {
            break;
        }
        let Some(track) = tracks.get(track_idx) else {
            cost_matrix.row_mut(row).fill(INFTY_COST);
            continue;
        };
        match kf.gating_distance(track.motion(), &measurements, only_position) {
            Ok(distances) => {
                let mut cost_row = cost_matrix.row_mut(row);
                for (cost, distance) in cost_row.iter_mut().zip(distances) {
                    if distance.is_nan() || distance > gating_threshold {
                        *cost = INFTY_COST;
                    }
                }
            }
            Err(err) => {
                warn!(
                    track_id = %track.track_id(),
                    %err,
                    "motion gate failed for every detection"
                );
                cost_matrix.row_mut(row).fill(INFTY_COST);
            }
        }
    }
}

/// `1 - IoU` between predicted track boxes and detection boxes, with the
/// motion gate applied on top so a box overlap never overrides it.
pub fn iou_cost<T: TrackLike>(
    kf: &KalmanFilter,
    tracks: &[T],
    detections: &[Detection],
    track_indices: &[usize],
    detection_indices: &[usize],
) -> Array2<f32> {
    // Missing entries become empty boxes, which overlap nothing.
    let empty = Rect::default();
    let track_boxes: Vec<Rect> = track_indices
        .iter()
        .map(|&i| tracks.get(i).map_or(empty, |t| t.to_tlwh()))
        .collect();
    let det_boxes: Vec<Rect> = detection_indices
        .iter()
        .map(|&i| detections.get(i).map_or(empty, |d| d.tlwh))
        .collect();

    let mut cost = iou_batch(&track_boxes, &det_boxes).mapv(|iou| 1.0 - iou);
    gate_cost_matrix(kf, &mut cost, tracks, detections, track_indices, detection_indices, false);
    cost
}

/// Appearance matching cascade.
///
/// With [`CascadePolicy::RecencyFirst`] tracks are processed in buckets of
/// equal time since update, `0..cascade_depth`, each bucket matching only the
/// detections still free. Tracks older than the deepest level stay unmatched.
#[allow(clippy::too_many_arguments)]
pub fn matching_cascade<T: TrackLike>(
    kf: &KalmanFilter,
    max_distance: f32,
    cascade_depth: u32,
    policy: CascadePolicy,
    tracks: &[T],
    detections: &[Detection],
    track_indices: &[usize],
    detection_indices: &[usize],
) -> AssignmentResult {
    let buckets: Vec<Vec<usize>> = match policy {
        CascadePolicy::RecencyFirst => (0..cascade_depth)
            .map(|level| {
                track_indices
                    .iter()
                    .copied()
                    .filter(|&i| tracks[i].time_since_update() == level)
                    .collect()
            })
            .collect(),
        CascadePolicy::Global => vec![track_indices.to_vec()],
    };

    let mut unmatched_detections = detection_indices.to_vec();
    let mut matches = Vec::new();

    for (level, bucket) in buckets.iter().enumerate() {
        if unmatched_detections.is_empty() {
            break;
        }
        if bucket.is_empty() {
            continue;
        }

        let mut cost = appearance_cost(tracks, detections, bucket, &unmatched_detections);
        gate_cost_matrix(kf, &mut cost, tracks, detections, bucket, &unmatched_detections, false);

        let result = min_cost_matching(&cost, max_distance, bucket, &unmatched_detections);
        debug!(level, tracks = bucket.len(), matched = result.matches.len(), "cascade level");
        matches.extend(result.matches);
        unmatched_detections = result.unmatched_detections;
    }

    let unmatched_tracks = track_indices
        .iter()
        .copied()
        .filter(|i| !matches.iter().any(|(t, _)| t == i))
        .collect();

    AssignmentResult {
        matches,
        unmatched_tracks,
        unmatched_detections,
    }
}

/// Thresholds used by [`associate`].
#[derive(Debug, Clone, Copy)]
pub struct AssociationParams {
    pub max_cosine_distance: f32,
    pub max_iou_distance: f32,
    pub cascade_depth: u32,
    pub policy: CascadePolicy,
}

/// Full association of one frame: appearance cascade, then IoU matching of
/// the leftover tracks and detections.
pub fn associate<T: TrackLike>(
    kf: &KalmanFilter,
    params: &AssociationParams,
    tracks: &[T],
    detections: &[Detection],
    detection_indices: &[usize],
) -> AssignmentResult {
    let track_indices: Vec<usize> = (0..tracks.len()).collect();
    if track_indices.is_empty() || detection_indices.is_empty() {
        return AssignmentResult {
            matches: vec![],
            unmatched_tracks: track_indices,
            unmatched_detections: detection_indices.to_vec(),
        };
    }

    let cascade = matching_cascade(
        kf,
        params.max_cosine_distance,
        params.cascade_depth,
        params.policy,
        tracks,
        detections,
        &track_indices,
        detection_indices,
    );

    let cost = iou_cost(
        kf,
        tracks,
        detections,
        &cascade.unmatched_tracks,
        &cascade.unmatched_detections,
    );
    let by_iou = min_cost_matching(
        &cost,
        params.max_iou_distance,
        &cascade.unmatched_tracks,
        &cascade.unmatched_detections,
    );

    let mut matches = cascade.matches;
    matches.extend(by_iou.matches);

    let mut unmatched_tracks = by_iou.unmatched_tracks;
    unmatched_tracks.sort_unstable();
    let mut unmatched_detections = by_iou.unmatched_detections;
    unmatched_detections.sort_unstable();

    AssignmentResult {
        matches,
        unmatched_tracks,
        unmatched_detections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::track::{Track, TrackSeed};
    use crate::tracker::track_id::TrackId;
    use ndarray::{Array1, array};

    fn detection(x: f32, y: f32, feature: Array1<f32>) -> Detection {
        Detection::new(Rect::new(x, y, 40.0, 80.0), 0.9, "person", feature)
    }

    fn track(kf: &KalmanFilter, seq: u64, det: &Detection) -> Track {
        let mut t = Track::spawn(TrackSeed {
            track_id: TrackId { day: None, seq },
            motion: kf.initiate(det.to_xyah()),
            detection: det,
            n_init: 3,
            max_age: 30,
            nn_budget: None,
        });
        t.predict(kf);
        t
    }

    fn params(policy: CascadePolicy) -> AssociationParams {
        AssociationParams {
            max_cosine_distance: 0.2,
            max_iou_distance: 0.7,
            cascade_depth: 31,
            policy,
        }
    }

    fn recency_first() -> AssociationParams {
        params(CascadePolicy::RecencyFirst)
    }

    #[test]
    fn test_linear_assignment_threshold() {
        let cost = array![[0.1f32, 0.9], [0.8, 0.95]];
        let result = linear_assignment(&cost, 0.5);
        assert_eq!(result.matches, vec![(0, 0)]);
        assert_eq!(result.unmatched_tracks, vec![1]);
        assert_eq!(result.unmatched_detections, vec![1]);
    }

    #[test]
    fn test_linear_assignment_rectangular() {
        let cost = array![[0.5f32, 0.1, 0.9]];
        let result = linear_assignment(&cost, 1.0);
        assert_eq!(result.matches, vec![(0, 1)]);
        assert_eq!(result.unmatched_detections, vec![0, 2]);
    }

    #[test]
    fn test_min_cost_matching_empty_short_circuits() {
        let cost = Array2::<f32>::zeros((0, 2));
        let result = min_cost_matching(&cost, 0.5, &[], &[3, 4]);
        assert!(result.matches.is_empty());
        assert_eq!(result.unmatched_detections, vec![3, 4]);
    }

    #[test]
    fn test_min_cost_matching_maps_indices() {
        let cost = array![[0.9f32, 0.1], [0.2, 0.9]];
        let result = min_cost_matching(&cost, 0.5, &[4, 7], &[1, 3]);
        assert_eq!(result.matches, vec![(4, 3), (7, 1)]);
    }

    #[test]
    fn test_gate_vetoes_far_detection_despite_identical_appearance() {
        let kf = KalmanFilter::new();
        let feature = array![1.0f32, 0.0, 0.0];
        let near = detection(100.0, 100.0, feature.clone());
        let far = detection(600.0, 100.0, feature.clone());
        let tracks = vec![track(&kf, 1, &near)];
        let dets = vec![far, near];

        let mut cost = appearance_cost(&tracks, &dets, &[0], &[0, 1]);
        assert!(cost[[0, 0]] < 1e-5);
        gate_cost_matrix(&kf, &mut cost, &tracks, &dets, &[0], &[0, 1], false);
        assert_eq!(cost[[0, 0]], INFTY_COST);
        assert!(cost[[0, 1]] < 1e-5);

        let result = associate(&kf, &recency_first(), &tracks, &dets, &[0, 1]);
        assert_eq!(result.matches, vec![(0, 1)]);
        assert_eq!(result.unmatched_detections, vec![0]);
    }

    #[test]
    fn test_degenerate_covariance_fails_every_gate() {
        let kf = KalmanFilter::new();
        let feature = array![1.0f32, 0.0];
        let seen = detection(100.0, 100.0, feature.clone());
        let mut motion = kf.initiate(seen.to_xyah());
        motion.covariance[[0, 0]] = -1e6;
        let mut broken = Track::spawn(TrackSeed {
            track_id: TrackId { day: None, seq: 1 },
            motion,
            detection: &seen,
            n_init: 3,
            max_age: 30,
            nn_budget: None,
        });
        broken.predict(&kf);
        let other = track(&kf, 2, &detection(400.0, 100.0, feature.clone()));
        let tracks = vec![broken, other];
        let dets = vec![seen.clone(), detection(400.0, 100.0, feature)];

        let mut cost = appearance_cost(&tracks, &dets, &[0, 1], &[0, 1]);
        gate_cost_matrix(&kf, &mut cost, &tracks, &dets, &[0, 1], &[0, 1], false);
        assert!(cost.row(0).iter().all(|&c| c == INFTY_COST));
        assert_eq!(cost[[1, 0]], INFTY_COST);
        assert!(cost[[1, 1]] < 1e-5);

        let iou = iou_cost(&kf, &tracks, &dets, &[0, 1], &[0, 1]);
        assert!(iou.row(0).iter().all(|&c| c == INFTY_COST));

        let result = associate(&kf, &recency_first(), &tracks, &dets, &[0, 1]);
        assert_eq!(result.matches, vec![(1, 1)]);
        assert_eq!(result.unmatched_tracks, vec![0]);
        assert_eq!(result.unmatched_detections, vec![0]);
    }

    #[test]
    fn test_out_of_range_indices_are_vetoed() {
        let kf = KalmanFilter::new();
        let seen = detection(100.0, 100.0, array![1.0f32, 0.0]);
        let tracks = vec![track(&kf, 1, &seen)];
        let dets = vec![seen];

        let mut cost = appearance_cost(&tracks, &dets, &[0, 5], &[0, 9]);
        assert!(cost[[0, 0]] < 1e-5);
        assert_eq!(cost[[0, 1]], INFTY_COST);
        assert_eq!(cost[[1, 0]], INFTY_COST);

        gate_cost_matrix(&kf, &mut cost, &tracks, &dets, &[0, 5], &[0, 9], false);
        assert!(cost[[0, 0]] < 1e-5);
        assert!(cost.row(1).iter().all(|&c| c == INFTY_COST));
        assert_eq!(cost[[0, 1]], INFTY_COST);

        let iou = iou_cost(&kf, &tracks, &dets, &[0, 5], &[0, 9]);
        assert!(iou[[0, 0]] < 1e-5);
        assert!(iou[[0, 1]] >= 1.0);
        assert!(iou[[1, 0]] >= 1.0);
    }

    #[test]
    fn test_min_cost_matching_rejects_mismatched_shape() {
        let cost = array![[0.1f32, 0.2]];
        let result = min_cost_matching(&cost, 0.5, &[0, 1], &[0, 1]);
        assert!(result.matches.is_empty());
        assert_eq!(result.unmatched_tracks, vec![0, 1]);
        assert_eq!(result.unmatched_detections, vec![0, 1]);
    }

    #[test]
    fn test_iou_fallback_matches_changed_appearance() {
        let kf = KalmanFilter::new();
        let seen = detection(100.0, 100.0, array![1.0f32, 0.0]);
        let tracks = vec![track(&kf, 1, &seen)];
        let dets = vec![detection(102.0, 101.0, array![0.0f32, 1.0])];

        let result = associate(&kf, &recency_first(), &tracks, &dets, &[0]);
        assert_eq!(result.matches, vec![(0, 0)]);
    }

    #[test]
    fn test_iou_gate_rejects_disjoint_boxes() {
        let kf = KalmanFilter::new();
        let seen = detection(100.0, 100.0, array![1.0f32, 0.0]);
        let tracks = vec![track(&kf, 1, &seen)];
        let dets = vec![detection(300.0, 100.0, array![0.0f32, 1.0])];

        let result = associate(&kf, &recency_first(), &tracks, &dets, &[0]);
        assert!(result.matches.is_empty());
        assert_eq!(result.unmatched_tracks, vec![0]);
        assert_eq!(result.unmatched_detections, vec![0]);
    }

    #[test]
    fn test_cascade_prefers_recent_tracks() {
        let kf = KalmanFilter::new();
        let det = detection(100.0, 100.0, array![1.0f32, 0.0]);
        let fresh = track(&kf, 1, &det);
        let mut stale = track(&kf, 2, &detection(101.0, 100.0, array![1.0f32, 0.0]));
        // Confirm then age the stale track so it lives in bucket 2.
        stale.update(&kf, &det);
        stale.update(&kf, &det);
        stale.mark_missed();
        stale.mark_missed();
        assert_eq!(stale.time_since_update(), 2);

        let tracks = vec![stale, fresh];
        let dets = vec![det];
        let result = associate(&kf, &recency_first(), &tracks, &dets, &[0]);
        assert_eq!(result.matches, vec![(1, 0)]);
        assert_eq!(result.unmatched_tracks, vec![0]);
    }

    #[test]
    fn test_global_policy_lets_older_track_win() {
        let kf = KalmanFilter::new();
        // cos distance to [1, 0] is 0.15, still inside the gate.
        let feature = array![0.85f32, (1.0f32 - 0.85 * 0.85).sqrt()];
        let det = detection(100.0, 100.0, feature.clone());

        let recent = track(&kf, 1, &detection(100.0, 100.0, array![1.0f32, 0.0]));
        let older = {
            // Confirmed, then missed once.
            let mut t = track(&kf, 2, &det);
            t.update(&kf, &det);
            t.update(&kf, &det);
            t.mark_missed();
            t
        };
        assert_eq!(older.time_since_update(), 1);

        let tracks = vec![recent, older];
        let dets = vec![det];

        let recency = associate(&kf, &recency_first(), &tracks, &dets, &[0]);
        assert_eq!(recency.matches, vec![(0, 0)]);

        let global = associate(&kf, &params(CascadePolicy::Global), &tracks, &dets, &[0]);
        assert_eq!(global.matches, vec![(1, 0)]);
    }

    #[test]
    fn test_deterministic() {
        let kf = KalmanFilter::new();
        let dets: Vec<Detection> = (0..6)
            .map(|i| detection(60.0 * i as f32, 50.0, array![1.0f32, i as f32 * 0.01]))
            .collect();
        let tracks: Vec<Track> = dets
            .iter()
            .enumerate()
            .map(|(i, d)| track(&kf, i as u64, d))
            .collect();
        let indices: Vec<usize> = (0..dets.len()).collect();
        let params = recency_first();

        let first = associate(&kf, &params, &tracks, &dets, &indices);
        for _ in 0..5 {
            let again = associate(&kf, &params, &tracks, &dets, &indices);
            assert_eq!(first, again);
        }
        assert_eq!(first.matches.len(), 6);
        assert!(first.matches.iter().all(|(t, d)| t == d));
    }
}
