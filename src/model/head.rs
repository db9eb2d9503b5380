//! Classifier head
//!
//! Concatenates the group features, applies the final affine layer and
//! turns the logits into log-probabilities.

use super::layer::SharedLinear;
use crate::error::{PatchNetError, PatchNetResult};
use crate::ops;

/// Predicted class with the full log-probability vector
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Index of the largest log-probability, lowest index on ties
    pub class: usize,
    /// Log-probabilities over all classes
    pub log_probs: Vec<f32>,
}

impl Prediction {
    /// Derive the class from log-probabilities
    #[must_use]
    pub fn from_log_probs(log_probs: Vec<f32>) -> Self {
        Self {
            class: ops::argmax(&log_probs),
            log_probs,
        }
    }

    /// Probability of the predicted class
    #[must_use]
    pub fn confidence(&self) -> f32 {
        self.log_probs.get(self.class).map_or(0.0, |lp| lp.exp())
    }
}

/// Final layer plus log-softmax
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierHead {
    layer: SharedLinear,
}

impl ClassifierHead {
    /// Wrap the final layer
    #[must_use]
    pub const fn new(layer: SharedLinear) -> Self {
        Self { layer }
    }

    /// Number of output classes
    #[must_use]
    pub const fn num_classes(&self) -> usize {
        self.layer.out_features()
    }

    /// Raw scores for the concatenated group features
    ///
    /// # Errors
    ///
    /// Returns a shape error if the concatenation does not match the layer's
    /// input width, and [`PatchNetError::NonFinite`] if the arithmetic
    /// overflowed to an infinite or NaN score.
    pub fn logits(&self, group_features: &[Vec<f32>]) -> PatchNetResult<Vec<f32>> {
        let input = group_features.concat();
        let logits = self.layer.forward(&input)?;
        match logits.iter().position(|v| !v.is_finite()) {
            Some(i) => Err(PatchNetError::NonFinite(format!("logit {i}"))),
            None => Ok(logits),
        }
    }

    /// Log-probabilities for the concatenated group features
    ///
    /// # Errors
    ///
    /// Same as [`ClassifierHead::logits`].
    pub fn forward(&self, group_features: &[Vec<f32>]) -> PatchNetResult<Vec<f32>> {
        Ok(ops::log_softmax(&self.logits(group_features)?))
    }

    /// Log-probabilities and the argmax class
    ///
    /// # Errors
    ///
    /// Same as [`ClassifierHead::logits`].
    pub fn predict(&self, group_features: &[Vec<f32>]) -> PatchNetResult<Prediction> {
        Ok(Prediction::from_log_probs(self.forward(group_features)?))
    }
}
