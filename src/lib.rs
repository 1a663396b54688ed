//! Deep SORT multi-object tracking.
//!
//! Tracks keep a constant velocity Kalman state and a gallery of appearance
//! descriptors. Every frame the tracker predicts all tracks, matches them to
//! detections through a recency ordered appearance cascade gated by the
//! motion model, falls back to IoU matching for the rest, then confirms,
//! ages, spawns and deletes tracks.
//!
//! ```
//! use deepsort_rt::{Appearance, DeepSort, RawDetection, TrackLike, TrackerConfig};
//! use ndarray::array;
//!
//! let mut tracker = DeepSort::without_embedder(TrackerConfig::default())?;
//! let detections = [RawDetection::new([10.0, 20.0, 50.0, 100.0], 0.9, "person")];
//! let embeds = [array![0.1f32, 0.7, 0.2]];
//!
//! let tracks = tracker.update_tracks(&detections, Appearance::Descriptors(&embeds))?;
//! assert_eq!(tracks.len(), 1);
//! assert!(tracks[0].is_tentative());
//! # Ok::<(), deepsort_rt::TrackerError>(())
//! ```

pub mod error;
pub mod integration;
pub mod tracker;

pub use error::TrackerError;
pub use integration::*;
pub use tracker::*;
