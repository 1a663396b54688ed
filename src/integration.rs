//! Collaborators around the tracking core.
//!
//! This module provides the appearance embedder contract, the NMS pre-filter
//! and the `DeepSort` front end that turns raw detector output into tracker
//! input, plus an optional Burn embedder.

mod builder;
mod deep_sort;
mod embedder;
mod nms;

pub use builder::DetectionBuilder;
pub use deep_sort::{Appearance, DeepSort, RawDetection};
pub use embedder::{Embedder, NoEmbedder, crop_detections};
pub use nms::non_max_suppression;

#[cfg(feature = "burn-backend")]
mod burn_backend;

#[cfg(feature = "burn-backend")]
pub use burn_backend::{BurnEmbedder, BurnEmbedderError, BurnModel};
