use thiserror::Error;

/// Errors reported by the tracker and its front end.
///
/// Configuration errors are raised at construction (or on the first call that
/// needs the missing piece), input errors are raised per call before any track
/// is touched.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("invalid tracker configuration: {0}")]
    InvalidConfig(String),
    #[error("custom track type is malformed: {0}")]
    MalformedTrackType(String),
    #[error("no embedder configured, appearance descriptors must be given with every frame")]
    MissingEmbedder,
    #[error("got {got} descriptors for {expected} detections")]
    DescriptorCountMismatch { expected: usize, got: usize },
    #[error("descriptor has length {got}, expected {expected}")]
    DescriptorDimMismatch { expected: usize, got: usize },
    #[error("frame of shape {height}x{width}x{channels} is empty, cannot crop detections")]
    EmptyFrame {
        height: usize,
        width: usize,
        channels: usize,
    },
    #[error("embedder returned {got} descriptors for {expected} crops")]
    EmbedderCountMismatch { expected: usize, got: usize },
    #[error("embedder failed: {0}")]
    Embedding(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("covariance is not positive definite")]
    DegenerateCovariance,
}
