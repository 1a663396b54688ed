mod deep_tracker;
mod detection;
mod kalman_filter;
mod matching;
mod nn_matching;
mod rect;
mod track;
mod track_id;
mod track_state;

pub use deep_tracker::{Tracker, TrackerConfig};
pub use detection::Detection;
pub use kalman_filter::{CHI2INV95_2DOF, CHI2INV95_4DOF, KalmanFilter, MotionState};
pub use matching::{
    AssignmentResult, AssociationParams, CascadePolicy, INFTY_COST, appearance_cost, associate,
    gate_cost_matrix, iou_cost, linear_assignment, matching_cascade, min_cost_matching,
};
pub use nn_matching::{FeatureGallery, cosine_distance, l2_normalize};
pub use rect::{Rect, iou_batch};
pub use track::{Track, TrackLike, TrackSeed};
pub use track_id::{Clock, SystemClock, TrackId};
pub use track_state::TrackState;
