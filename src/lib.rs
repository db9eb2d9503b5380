//! # patchnet
//!
//! Quantized, framework-free inference for a small patch-based digit
//! classifier.
//!
//! ## Overview
//!
//! A trained three-layer network is fake-quantized to a 16-level grid and
//! evaluated with plain scalar loops: the 28x28 image is tiled into sixteen
//! 7x7 patches, a shared layer maps each patch to 32 features, 2x2 blocks of
//! patches are concatenated and mapped by a second shared layer to 16
//! features, and a final layer produces ten class log-probabilities.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use patchnet::{format, NetworkConfig, PatchNet};
//!
//! let net = PatchNet::load("params.json", NetworkConfig::default())?;
//! let samples = format::load_samples("test.json", 28)?;
//! let report = net.evaluate(&samples, &mut |p| eprintln!("{}", p.display_message()))?;
//! println!("{report}");
//! ```
//!
//! ## Features
//!
//! - `parallel` (default): evaluate images on a rayon pool
//! - `cli` (default): the `patchnet-cli` binary
//! - `tracing`: DEBUG spans and events via `tracing`

#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod eval;
pub mod format;
pub mod model;
pub mod ops;
pub mod parallel;
pub mod progress;
#[macro_use]
pub mod trace;

/// CLI module for the native command-line interface
#[cfg(feature = "cli")]
pub mod cli;

use std::path::Path;

pub use error::{PatchNetError, PatchNetResult};
pub use eval::{EvalReport, Evaluator, LabeledImage, ParityReport};
pub use model::{
    Activation, ConcatOrder, Image, NetworkConfig, ParameterSet, ParameterTensor, Prediction,
    QuantizationScheme, QuantizedParameterSet, RawInferenceEngine, RoundingMode,
};
pub use progress::{Progress, ProgressCallback};

/// A trained network with its quantized inference engine
#[derive(Debug, Clone)]
pub struct PatchNet {
    config: NetworkConfig,
    parameters: ParameterSet,
    quantized: QuantizedParameterSet,
    engine: RawInferenceEngine,
}

impl PatchNet {
    /// Quantize `parameters` with the configuration's scheme and build the
    /// engine
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the parameters do
    /// not match it.
    pub fn new(config: NetworkConfig, parameters: ParameterSet) -> PatchNetResult<Self> {
        config.validate()?;
        parameters.validate(&config)?;
        let quantized = parameters.quantize(&config.quantization);
        let engine = RawInferenceEngine::from_quantized(config, &quantized)?;
        Ok(Self {
            config,
            parameters,
            quantized,
            engine,
        })
    }

    /// Load a JSON parameter file
    ///
    /// The file's recorded concatenation order replaces the one in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::Io`] / [`PatchNetError::Format`] for an
    /// unreadable file, otherwise as [`PatchNet::new`].
    pub fn load(path: impl AsRef<Path>, config: NetworkConfig) -> PatchNetResult<Self> {
        let file = format::load_parameters(path)?;
        Self::new(file.configure(config), file.to_parameters()?)
    }

    /// Configuration in use
    #[must_use]
    pub const fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Unquantized parameters
    #[must_use]
    pub const fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    /// Quantized parameters
    #[must_use]
    pub const fn quantized(&self) -> &QuantizedParameterSet {
        &self.quantized
    }

    /// Engine running on quantized parameters
    #[must_use]
    pub const fn engine(&self) -> &RawInferenceEngine {
        &self.engine
    }

    /// Engine running on the unquantized parameters
    ///
    /// # Errors
    ///
    /// Never fails for parameters accepted by [`PatchNet::new`]; the result
    /// mirrors [`RawInferenceEngine::from_parameters`].
    pub fn reference_engine(&self) -> PatchNetResult<RawInferenceEngine> {
        RawInferenceEngine::from_parameters(self.config, &self.parameters)
    }

    /// Log-probabilities and class of one image
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::Shape`] for an image of the wrong side.
    pub fn predict(&self, image: &Image) -> PatchNetResult<Prediction> {
        self.engine.predict(image)
    }

    /// Accuracy of the quantized engine
    ///
    /// # Errors
    ///
    /// See [`Evaluator::evaluate`].
    pub fn evaluate(
        &self,
        samples: &[LabeledImage],
        progress: ProgressCallback<'_>,
    ) -> PatchNetResult<EvalReport> {
        Evaluator::new(&self.engine).evaluate(samples, progress)
    }

    /// Compare the quantized engine against the unquantized reference
    ///
    /// # Errors
    ///
    /// See [`ParityReport::compare`].
    pub fn parity(&self, samples: &[LabeledImage]) -> PatchNetResult<ParityReport> {
        ParityReport::compare(&self.reference_engine()?, &self.engine, samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net_with_bias(class: usize) -> PatchNet {
        let config = NetworkConfig::default();
        let mut params = ParameterSet::zeros(&config);
        params.head.bias.data[class] = 0.5;
        PatchNet::new(config, params).map_or_else(|e| panic!("{e}"), |n| n)
    }

    #[test]
    fn test_new_quantizes_parameters() {
        let config = NetworkConfig::default();
        let mut params = ParameterSet::zeros(&config);
        params.head.bias.data[2] = 0.3;
        let net = PatchNet::new(config, params).map_or_else(|e| panic!("{e}"), |n| n);
        assert_eq!(net.parameters().head.bias.data[2], 0.3);
        // 0.3 * 8 + 8 = 10.4 -> code 10 -> 0.25
        assert_eq!(net.quantized().dequantize().head.bias.data[2], 0.25);
    }

    #[test]
    fn test_new_rejects_mismatch() {
        let config = NetworkConfig::default();
        let params = ParameterSet::zeros(&config.with_layer_widths([16, 16, 10]));
        assert!(PatchNet::new(config, params).is_err());
    }

    #[test]
    fn test_predict_and_evaluate() {
        let net = net_with_bias(6);
        let p = net
            .predict(&Image::zeros(28))
            .map_or_else(|e| panic!("{e}"), |p| p);
        assert_eq!(p.class, 6);

        let samples = vec![
            LabeledImage::new(Image::zeros(28), 6),
            LabeledImage::new(Image::zeros(28), 1),
        ];
        let report = net
            .evaluate(&samples, &mut progress::null_callback)
            .map_or_else(|e| panic!("{e}"), |r| r);
        assert_eq!(report, EvalReport { correct: 1, total: 2 });

        let parity = net.parity(&samples).map_or_else(|e| panic!("{e}"), |p| p);
        assert_eq!(parity.agree, 2);
        assert!(parity.within(0.0));
    }

    #[test]
    fn test_load_uses_file_order() {
        let config = NetworkConfig::default();
        let file = format::ParameterFile::from_parameters(
            &ParameterSet::zeros(&config),
            ConcatOrder::ColumnMajor,
        );
        let dir = tempfile::tempdir().map_or_else(|e| panic!("{e}"), |d| d);
        let path = dir.path().join("params.json");
        format::save_parameters(&path, &file).map_or_else(|e| panic!("{e}"), |()| ());

        let net = PatchNet::load(&path, config).map_or_else(|e| panic!("{e}"), |n| n);
        assert_eq!(net.config().concat_order, ConcatOrder::ColumnMajor);
    }
}
