use serde::{Deserialize, Serialize};

/// Lifecycle state of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TrackState {
    /// Newly created, not yet matched often enough to be trusted
    #[default]
    Tentative,
    /// Matched for enough consecutive frames
    Confirmed,
    /// Retired; removed from the live set at the end of the frame
    Deleted,
}
