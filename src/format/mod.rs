//! JSON parameter and sample files
//!
//! Parameter file layout, one key per tensor in training order:
//!
//! ```text
//! {
//!   "concat_order": "row_major",
//!   "fc1_weight": [[49 floats] x 32],  "fc1_bias": [32 floats],
//!   "fc2_weight": [[128 floats] x 16], "fc2_bias": [16 floats],
//!   "fc3_weight": [[64 floats] x 10],  "fc3_bias": [10 floats]
//! }
//! ```
//!
//! `concat_order` records the group concatenation contract the weights were
//! trained with. A missing key means `row_major` (version 1).

mod samples;

pub use samples::{load_samples, parse_samples, save_samples, SampleRecord};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PatchNetError, PatchNetResult};
use crate::model::{ConcatOrder, LayerParameters, NetworkConfig, ParameterSet, ParameterTensor};

/// On-disk form of a [`ParameterSet`]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterFile {
    /// Concatenation contract of the stored weights
    #[serde(default)]
    pub concat_order: ConcatOrder,
    /// Patch layer weight, `[out][in]`
    pub fc1_weight: Vec<Vec<f32>>,
    /// Patch layer bias
    pub fc1_bias: Vec<f32>,
    /// Group layer weight, `[out][in]`
    pub fc2_weight: Vec<Vec<f32>>,
    /// Group layer bias
    pub fc2_bias: Vec<f32>,
    /// Classifier weight, `[out][in]`
    pub fc3_weight: Vec<Vec<f32>>,
    /// Classifier bias
    pub fc3_bias: Vec<f32>,
}

impl ParameterFile {
    /// Capture a parameter set under a concatenation order
    #[must_use]
    pub fn from_parameters(params: &ParameterSet, concat_order: ConcatOrder) -> Self {
        Self {
            concat_order,
            fc1_weight: params.patch.weight.to_rows(),
            fc1_bias: params.patch.bias.data.clone(),
            fc2_weight: params.group.weight.to_rows(),
            fc2_bias: params.group.bias.data.clone(),
            fc3_weight: params.head.weight.to_rows(),
            fc3_bias: params.head.bias.data.clone(),
        }
    }

    /// Convert to a [`ParameterSet`]
    ///
    /// Shapes are taken from the nested arrays; checking them against a
    /// configuration is left to [`ParameterSet::validate`].
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::Shape`] for ragged weight matrices.
    pub fn to_parameters(&self) -> PatchNetResult<ParameterSet> {
        let layer = |name: &str, weight: &[Vec<f32>], bias: &[f32]| {
            let weight = ParameterTensor::from_rows(weight)
                .map_err(|e| PatchNetError::Shape(format!("{name}_weight: {e}")))?;
            Ok::<_, PatchNetError>(LayerParameters {
                weight,
                bias: ParameterTensor::vector(bias.to_vec()),
            })
        };
        Ok(ParameterSet {
            patch: layer("fc1", &self.fc1_weight, &self.fc1_bias)?,
            group: layer("fc2", &self.fc2_weight, &self.fc2_bias)?,
            head: layer("fc3", &self.fc3_weight, &self.fc3_bias)?,
        })
    }

    /// Apply the file's concatenation order to a configuration
    #[must_use]
    pub fn configure(&self, config: NetworkConfig) -> NetworkConfig {
        config.with_concat_order(self.concat_order)
    }

    /// Check the file's concatenation order against a configuration
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::Config`] when the orders differ, since the
    /// weights would be applied to permuted inputs.
    pub fn check_order(&self, config: &NetworkConfig) -> PatchNetResult<()> {
        if self.concat_order != config.concat_order {
            return Err(PatchNetError::Config(format!(
                "parameters were trained with {} concatenation, configuration uses {}",
                self.concat_order, config.concat_order
            )));
        }
        Ok(())
    }
}

/// Parse a parameter file from JSON text
///
/// # Errors
///
/// Returns [`PatchNetError::Format`] for malformed JSON or unknown keys.
pub fn parse_parameters(json: &str) -> PatchNetResult<ParameterFile> {
    Ok(serde_json::from_str(json)?)
}

/// Read a parameter file from disk
///
/// # Errors
///
/// Returns [`PatchNetError::Io`] if the file cannot be read, otherwise as
/// [`parse_parameters`].
pub fn load_parameters(path: impl AsRef<Path>) -> PatchNetResult<ParameterFile> {
    let text = std::fs::read_to_string(path)?;
    parse_parameters(&text)
}

/// Serialize a parameter file to pretty-printed JSON
///
/// # Errors
///
/// Returns [`PatchNetError::Format`] if serialization fails.
pub fn parameters_to_json(file: &ParameterFile) -> PatchNetResult<String> {
    Ok(serde_json::to_string_pretty(file)?)
}

/// Write a parameter file to disk
///
/// # Errors
///
/// Returns [`PatchNetError::Io`] or [`PatchNetError::Format`].
pub fn save_parameters(path: impl AsRef<Path>, file: &ParameterFile) -> PatchNetResult<()> {
    std::fs::write(path, parameters_to_json(file)?)?;
    Ok(())
}
