//! Raw inference engine
//!
//! Runs the full forward pass for one image with scalar loops only:
//! patch extraction, the shared patch layer, hierarchical aggregation and
//! the classifier head. The engine is immutable after construction, so a
//! single instance can be shared by reference across worker threads.

use super::aggregate::HierarchicalAggregator;
use super::head::{ClassifierHead, Prediction};
use super::layer::{Activation, SharedLinear};
use super::patch::{Image, PatchGrid};
use super::{NetworkConfig, ParameterSet, QuantizedParameterSet, LAYER_NAMES};
use crate::error::{PatchNetError, PatchNetResult};
use crate::{trace_enter, trace_event};

/// Forward pass over plain arrays
#[derive(Debug, Clone)]
pub struct RawInferenceEngine {
    config: NetworkConfig,
    grid: PatchGrid,
    patch_layer: SharedLinear,
    aggregator: HierarchicalAggregator,
    group_layer: SharedLinear,
    head: ClassifierHead,
}

impl RawInferenceEngine {
    /// Build from floating-point parameters, without quantization
    ///
    /// This is the reference path that quantized results are compared to.
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::Config`] for an invalid configuration and
    /// [`PatchNetError::Shape`] / [`PatchNetError::NonFinite`] if any
    /// parameter tensor disagrees with the declared layer shapes.
    pub fn from_parameters(config: NetworkConfig, params: &ParameterSet) -> PatchNetResult<Self> {
        config.validate()?;
        params.validate(&config)?;

        let [patch_shape, group_shape, head_shape] = config.layer_shapes();
        let patch_layer =
            SharedLinear::from_parameters(LAYER_NAMES[0], &params.patch, patch_shape, Activation::Relu)?;
        let group_layer =
            SharedLinear::from_parameters(LAYER_NAMES[1], &params.group, group_shape, Activation::Relu)?;
        let head_layer = SharedLinear::from_parameters(
            LAYER_NAMES[2],
            &params.head,
            head_shape,
            config.head_activation,
        )?;

        trace_event!(
            parameters = params.parameter_count(),
            "built raw inference engine"
        );

        Ok(Self {
            config,
            grid: PatchGrid::new(config.image_side, config.patch_size)?,
            patch_layer,
            aggregator: HierarchicalAggregator::new(
                config.patches_per_side(),
                config.group_side,
                config.concat_order,
            )?,
            group_layer,
            head: ClassifierHead::new(head_layer),
        })
    }

    /// Build from a quantized parameter set, using its dequantized values
    ///
    /// # Errors
    ///
    /// Same as [`RawInferenceEngine::from_parameters`].
    pub fn from_quantized(
        config: NetworkConfig,
        params: &QuantizedParameterSet,
    ) -> PatchNetResult<Self> {
        Self::from_parameters(config, &params.dequantize())
    }

    /// Quantize with the configuration's scheme, then build
    ///
    /// # Errors
    ///
    /// Same as [`RawInferenceEngine::from_parameters`].
    pub fn quantized(config: NetworkConfig, params: &ParameterSet) -> PatchNetResult<Self> {
        config.validate()?;
        params.validate(&config)?;
        Self::from_quantized(config, &params.quantize(&config.quantization))
    }

    /// Configuration the engine was built with
    #[must_use]
    pub const fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Number of output classes
    #[must_use]
    pub const fn num_classes(&self) -> usize {
        self.head.num_classes()
    }

    /// Patch layer outputs, one vector per patch in grid order
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::Shape`] if the image side does not match the
    /// configuration.
    pub fn patch_features(&self, image: &Image) -> PatchNetResult<Vec<Vec<f32>>> {
        let patches = self.grid.extract_all(image)?;
        self.patch_layer.forward_each(&patches)
    }

    /// Group layer outputs, in concatenation order
    ///
    /// # Errors
    ///
    /// Same as [`RawInferenceEngine::patch_features`].
    pub fn group_features(&self, image: &Image) -> PatchNetResult<Vec<Vec<f32>>> {
        let patch_features = self.patch_features(image)?;
        self.aggregator.aggregate(&patch_features, &self.group_layer)
    }

    /// Log-probabilities over all classes
    ///
    /// # Errors
    ///
    /// Same as [`RawInferenceEngine::patch_features`], plus
    /// [`PatchNetError::NonFinite`] when an extreme image overflows the
    /// logits.
    pub fn forward(&self, image: &Image) -> PatchNetResult<Vec<f32>> {
        let _guard = trace_enter!("raw_forward");
        let group_features = self.group_features(image)?;
        self.head.forward(&group_features)
    }

    /// Log-probabilities and predicted class
    ///
    /// # Errors
    ///
    /// Same as [`RawInferenceEngine::patch_features`].
    pub fn predict(&self, image: &Image) -> PatchNetResult<Prediction> {
        Ok(Prediction::from_log_probs(self.forward(image)?))
    }

    /// Predicted class only
    ///
    /// # Errors
    ///
    /// Same as [`RawInferenceEngine::patch_features`].
    pub fn classify(&self, image: &Image) -> PatchNetResult<usize> {
        self.predict(image).map(|p| p.class)
    }

    /// Check that `label` is a valid class index
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::Label`] otherwise.
    pub fn check_label(&self, label: usize) -> PatchNetResult<()> {
        if label >= self.num_classes() {
            return Err(PatchNetError::Label {
                label,
                num_classes: self.num_classes(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConcatOrder, ParameterTensor};

    fn zero_engine() -> RawInferenceEngine {
        let config = NetworkConfig::default();
        RawInferenceEngine::quantized(config, &ParameterSet::zeros(&config))
            .map_or_else(|e| panic!("{e}"), |e| e)
    }

    #[test]
    fn test_all_zero_model_is_uniform() {
        let engine = zero_engine();
        let p = engine
            .predict(&Image::zeros(28))
            .map_or_else(|e| panic!("{e}"), |p| p);
        assert_eq!(p.class, 0);
        assert_eq!(p.log_probs.len(), 10);
        let expected = (0.1_f32).ln();
        for lp in &p.log_probs {
            assert!((lp - expected).abs() < 1e-6, "{lp}");
        }
    }

    #[test]
    fn test_intermediate_shapes() {
        let engine = zero_engine();
        let img = Image::zeros(28);
        let patches = engine.patch_features(&img).map_or_else(|e| panic!("{e}"), |p| p);
        assert_eq!(patches.len(), 16);
        assert!(patches.iter().all(|p| p.len() == 32));
        let groups = engine.group_features(&img).map_or_else(|e| panic!("{e}"), |g| g);
        assert_eq!(groups.len(), 4);
        assert!(groups.iter().all(|g| g.len() == 16));
    }

    #[test]
    fn test_rejects_wrong_image_side() {
        let engine = zero_engine();
        assert!(matches!(
            engine.forward(&Image::zeros(27)),
            Err(PatchNetError::Shape(_))
        ));
    }

    #[test]
    fn test_rejects_mismatched_parameters() {
        let config = NetworkConfig::default();
        let mut params = ParameterSet::zeros(&config);
        params.head.weight = ParameterTensor::zeros(vec![10, 63]);
        assert!(matches!(
            RawInferenceEngine::from_parameters(config, &params),
            Err(PatchNetError::Shape(_))
        ));
        assert!(RawInferenceEngine::quantized(config, &params).is_err());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = NetworkConfig::default();
        config.patch_size = 6;
        let params = ParameterSet::zeros(&NetworkConfig::default());
        assert!(matches!(
            RawInferenceEngine::from_parameters(config, &params),
            Err(PatchNetError::Config(_))
        ));
    }

    #[test]
    fn test_bias_only_head_selects_class() {
        let config = NetworkConfig::default();
        let mut params = ParameterSet::zeros(&config);
        params.head.bias.data[7] = 0.5;
        let engine = RawInferenceEngine::quantized(config, &params)
            .map_or_else(|e| panic!("{e}"), |e| e);
        assert_eq!(engine.classify(&Image::zeros(28)).ok(), Some(7));
    }

    #[test]
    fn test_head_activation_relu_clips_negative_logits() {
        let config = NetworkConfig::default();
        let mut params = ParameterSet::zeros(&config);
        params.head.bias.data = vec![-0.5, -0.25, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];

        let identity = RawInferenceEngine::from_parameters(config, &params)
            .map_or_else(|e| panic!("{e}"), |e| e);
        let rectified = RawInferenceEngine::from_parameters(
            config.with_head_activation(Activation::Relu),
            &params,
        )
        .map_or_else(|e| panic!("{e}"), |e| e);

        let img = Image::zeros(28);
        assert_eq!(identity.classify(&img).ok(), Some(2));
        // every logit clipped to 0 -> uniform -> class 0
        assert_eq!(rectified.classify(&img).ok(), Some(0));
    }

    #[test]
    fn test_single_pixel_routes_through_matching_patch() {
        // fc1 feature 0 copies the top-left pixel of every patch; fc2 feature 0
        // copies the first input of its group; fc3 class g reads group g.
        let config = NetworkConfig::default();
        let mut params = ParameterSet::zeros(&config);
        params.patch.weight.data[0] = 0.5;
        params.group.weight.data[0] = 0.5;
        for g in 0..4 {
            params.head.weight.data[g * 64 + g * 16] = 0.5;
        }

        for order in [ConcatOrder::RowMajor, ConcatOrder::ColumnMajor] {
            let engine = RawInferenceEngine::quantized(config.with_concat_order(order), &params)
                .map_or_else(|e| panic!("{e}"), |e| e);

            // top-left pixel of patch 2 (x0 = 14, y0 = 0), first member of
            // group (0, 1)
            let mut pixels = vec![0.0; 784];
            pixels[14] = 1.0;
            let img = Image::new(28, pixels).map_or_else(|e| panic!("{e}"), |i| i);

            let expected = match order {
                ConcatOrder::RowMajor => 1,
                ConcatOrder::ColumnMajor => 2,
            };
            assert_eq!(engine.classify(&img).ok(), Some(expected), "{order}");
        }
    }

    #[test]
    fn test_check_label() {
        let engine = zero_engine();
        assert!(engine.check_label(9).is_ok());
        assert!(matches!(
            engine.check_label(10),
            Err(PatchNetError::Label { label: 10, num_classes: 10 })
        ));
    }
}
