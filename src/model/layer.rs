//! Shared-weight affine layer
//!
//! One weight matrix and bias applied independently to many inputs. The
//! patch layer runs 16 times per image and the group layer 4 times, always
//! with the same [`SharedLinear`] value, so every position sees identical
//! parameters.

use serde::{Deserialize, Serialize};

use super::{LayerParameters, LayerShape};
use crate::error::{PatchNetError, PatchNetResult};
use crate::ops;

/// Post-affine activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// `max(0, v)`
    Relu,
    /// Raw affine output
    #[default]
    Identity,
}

impl Activation {
    /// Apply to one value
    #[inline]
    #[must_use]
    pub fn apply(self, v: f32) -> f32 {
        match self {
            Self::Relu => ops::relu(v),
            Self::Identity => v,
        }
    }
}

impl core::fmt::Display for Activation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Relu => write!(f, "relu"),
            Self::Identity => write!(f, "identity"),
        }
    }
}

/// Affine transform plus activation: `y[i] = act(b[i] + sum_j W[i][j] * x[j])`
#[derive(Debug, Clone, PartialEq)]
pub struct SharedLinear {
    /// Weight matrix (out_features x in_features) row-major
    weight: Vec<f32>,
    /// Bias vector (out_features)
    bias: Vec<f32>,
    in_features: usize,
    out_features: usize,
    activation: Activation,
}

impl SharedLinear {
    /// Build from raw weight and bias values
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::Shape`] if `weight` is not
    /// `out_features * in_features` long or `bias` is not `out_features` long.
    pub fn new(
        weight: Vec<f32>,
        bias: Vec<f32>,
        shape: LayerShape,
        activation: Activation,
    ) -> PatchNetResult<Self> {
        if weight.len() != shape.out_features * shape.in_features {
            return Err(PatchNetError::Shape(format!(
                "weight has {} values, expected {}x{}",
                weight.len(),
                shape.out_features,
                shape.in_features
            )));
        }
        if bias.len() != shape.out_features {
            return Err(PatchNetError::Shape(format!(
                "bias has {} values, expected {}",
                bias.len(),
                shape.out_features
            )));
        }
        Ok(Self {
            weight,
            bias,
            in_features: shape.in_features,
            out_features: shape.out_features,
            activation,
        })
    }

    /// Build from a layer's parameters after checking their declared shape
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::Shape`] or [`PatchNetError::NonFinite`] if
    /// the parameters do not match `shape`.
    pub fn from_parameters(
        name: &str,
        params: &LayerParameters,
        shape: LayerShape,
        activation: Activation,
    ) -> PatchNetResult<Self> {
        params.validate(name, shape)?;
        Self::new(
            params.weight.data.clone(),
            params.bias.data.clone(),
            shape,
            activation,
        )
    }

    /// Input width
    #[must_use]
    pub const fn in_features(&self) -> usize {
        self.in_features
    }

    /// Output width
    #[must_use]
    pub const fn out_features(&self) -> usize {
        self.out_features
    }

    /// Activation applied after the affine transform
    #[must_use]
    pub const fn activation(&self) -> Activation {
        self.activation
    }

    /// Weight row for one output
    #[must_use]
    pub fn weight_row(&self, out: usize) -> &[f32] {
        let start = out * self.in_features;
        &self.weight[start..start + self.in_features]
    }

    /// Apply to one input vector
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::Shape`] if `input.len() != in_features`.
    pub fn forward(&self, input: &[f32]) -> PatchNetResult<Vec<f32>> {
        if input.len() != self.in_features {
            return Err(PatchNetError::Shape(format!(
                "layer input has {} values, expected {}",
                input.len(),
                self.in_features
            )));
        }

        let output = (0..self.out_features)
            .map(|o| {
                let acc = self.bias[o] + ops::dot(self.weight_row(o), input);
                self.activation.apply(acc)
            })
            .collect();

        Ok(output)
    }

    /// Apply independently to each input, reusing the same parameters
    ///
    /// # Errors
    ///
    /// Fails on the first input with the wrong width.
    pub fn forward_each(&self, inputs: &[Vec<f32>]) -> PatchNetResult<Vec<Vec<f32>>> {
        inputs.iter().map(|x| self.forward(x)).collect()
    }
}
