//! Appearance embedding provider contract.

use ndarray::{Array1, ArrayView3, s};

use crate::error::TrackerError;
use crate::tracker::Rect;

/// Maps image crops to fixed-length appearance descriptors.
///
/// Implement this trait to plug an appearance network into [`DeepSort`].
/// Implementations may batch or parallelize internally; the tracker waits for
/// the whole batch.
///
/// # Example
///
/// ```ignore
/// use deepsort_rt::Embedder;
/// use ndarray::{Array1, ArrayView3, Axis};
///
/// struct ColorSum;
///
/// impl Embedder for ColorSum {
///     type Error = std::convert::Infallible;
///
///     fn embed(
///         &mut self,
///         crops: &[ArrayView3<'_, u8>],
///     ) -> Result<Vec<Array1<f32>>, Self::Error> {
///         Ok(crops
///             .iter()
///             .map(|c| c.mapv(f32::from).sum_axis(Axis(0)).sum_axis(Axis(0)))
///             .collect())
///     }
/// }
/// ```
///
/// [`DeepSort`]: crate::integration::DeepSort
pub trait Embedder {
    type Error: std::error::Error + Send + Sync + 'static;

    /// One descriptor per crop, same order. Crops are `H x W x C` views and
    /// may be empty when a box lies outside the frame.
    fn embed(&mut self, crops: &[ArrayView3<'_, u8>]) -> Result<Vec<Array1<f32>>, Self::Error>;
}

/// Placeholder for trackers fed with precomputed descriptors only.
#[derive(Debug, Clone, Copy)]
pub enum NoEmbedder {}

impl Embedder for NoEmbedder {
    type Error = std::convert::Infallible;

    fn embed(&mut self, _crops: &[ArrayView3<'_, u8>]) -> Result<Vec<Array1<f32>>, Self::Error> {
        match *self {}
    }
}

/// Cut one crop per box out of an `H x W x C` frame, clamped to the frame.
pub fn crop_detections<'a>(
    frame: &ArrayView3<'a, u8>,
    boxes: &[Rect],
) -> Result<Vec<ArrayView3<'a, u8>>, TrackerError> {
    let (height, width, channels) = frame.dim();
    if height == 0 || width == 0 || channels == 0 {
        return Err(TrackerError::EmptyFrame {
            height,
            width,
            channels,
        });
    }

    Ok(boxes
        .iter()
        .map(|rect| {
            let (top, bottom, left, right) = rect.clamped_window(height, width);
            frame.clone().slice_move(s![top..bottom, left..right, ..])
        })
        .collect())
}

/// Run `embedder` over the crops of `boxes` and check it answered for each.
pub(crate) fn generate_embeds<E: Embedder>(
    embedder: &mut E,
    frame: &ArrayView3<'_, u8>,
    boxes: &[Rect],
) -> Result<Vec<Array1<f32>>, TrackerError> {
    if boxes.is_empty() {
        return Ok(Vec::new());
    }

    let crops = crop_detections(frame, boxes)?;
    let embeds = embedder
        .embed(&crops)
        .map_err(|err| TrackerError::Embedding(Box::new(err)))?;

    if embeds.len() != crops.len() {
        return Err(TrackerError::EmbedderCountMismatch {
            expected: crops.len(),
            got: embeds.len(),
        });
    }
    Ok(embeds)
}
