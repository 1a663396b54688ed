//! Burn inference backend for appearance embeddings.
//!
//! This module provides a `BurnEmbedder` that implements `Embedder` for
//! re-identification networks built with the Burn framework.
//!
//! # Example
//!
//! ```ignore
//! use deepsort_rt::{BurnEmbedder, BurnModel, DeepSort, TrackerConfig};
//! use burn::backend::NdArray;
//! use burn::tensor::Tensor;
//!
//! // Implement BurnModel for your appearance network
//! struct MyReidModel { /* ... */ }
//!
//! impl BurnModel<NdArray> for MyReidModel {
//!     fn forward(&self, input: Tensor<NdArray, 4>) -> Tensor<NdArray, 2> {
//!         // Run inference
//!     }
//! }
//!
//! let embedder = BurnEmbedder::new(MyReidModel::load("reid.bin"), Default::default());
//! let tracker = DeepSort::with_embedder(TrackerConfig::default(), embedder)?;
//! ```

use burn::prelude::*;
use burn::tensor::Tensor;
use ndarray::{Array1, ArrayView3};
use thiserror::Error;

use super::Embedder;

/// Error type for Burn embedding failures.
#[derive(Debug, Clone, Error)]
pub enum BurnEmbedderError {
    /// Crop has a channel count the model does not accept.
    #[error("crop has {got} channels, model expects {expected}")]
    ChannelMismatch { expected: usize, got: usize },
    /// Model output could not be read back.
    #[error("could not read model output: {0}")]
    OutputError(String),
    /// Model output has the wrong shape.
    #[error("model returned shape {got:?} for a batch of {batch}")]
    OutputShape { batch: usize, got: [usize; 2] },
}

/// Trait for Burn-based appearance models.
///
/// Implement this trait for your specific model architecture.
pub trait BurnModel<B: Backend>: Send + Sync {
    /// Run forward pass on a batch of crops.
    ///
    /// # Arguments
    /// * `input` - Input tensor of shape [batch, channels, height, width], values in [0, 1]
    ///
    /// # Returns
    /// Descriptor tensor of shape [batch, dim].
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Get the expected input size (channels, height, width).
    fn input_size(&self) -> (usize, usize, usize) {
        (3, 128, 64) // Default person re-id crop size
    }

    /// Largest batch passed to `forward` at once.
    fn max_batch_size(&self) -> usize {
        16
    }
}

/// Burn-based appearance embedder implementing `Embedder`.
pub struct BurnEmbedder<B: Backend, M: BurnModel<B>> {
    model: M,
    device: B::Device,
    /// Reverse the channel order of incoming crops (BGR frames into an RGB model).
    bgr: bool,
}

impl<B: Backend, M: BurnModel<B>> BurnEmbedder<B, M> {
    /// Create a new Burn embedder with the given model and device.
    pub fn new(model: M, device: B::Device) -> Self {
        Self {
            model,
            device,
            bgr: true,
        }
    }

    /// Set whether incoming frames are BGR (the default) or RGB.
    pub fn with_bgr(mut self, bgr: bool) -> Self {
        self.bgr = bgr;
        self
    }

    /// Resize crops to the model input with nearest neighbour sampling and
    /// pack them as a normalized CHW batch.
    fn preprocess(&self, crops: &[ArrayView3<'_, u8>]) -> Result<Tensor<B, 4>, BurnEmbedderError> {
        let (channels, target_h, target_w) = self.model.input_size();
        let mut data = Vec::with_capacity(crops.len() * channels * target_h * target_w);

        for crop in crops {
            let (h, w, c) = crop.dim();
            if c != channels {
                return Err(BurnEmbedderError::ChannelMismatch {
                    expected: channels,
                    got: c,
                });
            }
            for ch in 0..channels {
                let src_ch = if self.bgr { channels - 1 - ch } else { ch };
                for y in 0..target_h {
                    for x in 0..target_w {
                        // Empty crops feed zeros.
                        let value = if h == 0 || w == 0 {
                            0.0
                        } else {
                            let sy = y * h / target_h;
                            let sx = x * w / target_w;
                            crop[[sy, sx, src_ch]] as f32 / 255.0
                        };
                        data.push(value);
                    }
                }
            }
        }

        Ok(Tensor::<B, 1>::from_floats(data.as_slice(), &self.device).reshape([
            crops.len(),
            channels,
            target_h,
            target_w,
        ]))
    }

    fn postprocess(
        &self,
        output: Tensor<B, 2>,
        batch: usize,
    ) -> Result<Vec<Array1<f32>>, BurnEmbedderError> {
        let [rows, dim] = output.dims();
        if rows != batch {
            return Err(BurnEmbedderError::OutputShape {
                batch,
                got: [rows, dim],
            });
        }
        let values = output
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| BurnEmbedderError::OutputError(format!("{e:?}")))?;

        Ok(values
            .chunks(dim.max(1))
            .take(rows)
            .map(|row| Array1::from_vec(row.to_vec()))
            .collect())
    }
}

impl<B: Backend, M: BurnModel<B>> Embedder for BurnEmbedder<B, M> {
    type Error = BurnEmbedderError;

    fn embed(&mut self, crops: &[ArrayView3<'_, u8>]) -> Result<Vec<Array1<f32>>, Self::Error> {
        let mut descriptors = Vec::with_capacity(crops.len());
        for batch in crops.chunks(self.model.max_batch_size().max(1)) {
            let input = self.preprocess(batch)?;
            let output = self.model.forward(input);
            descriptors.extend(self.postprocess(output, batch.len())?);
        }
        Ok(descriptors)
    }
}
