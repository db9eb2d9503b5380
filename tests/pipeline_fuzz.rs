//! Pipeline Fuzz Tests
//!
//! Property-based tests for the quantize -> forward pipeline under random
//! parameters and images.

use proptest::prelude::*;
use patchnet::model::{
    Activation, ConcatOrder, Image, NetworkConfig, ParameterSet, QuantizationScheme,
    RawInferenceEngine,
};

// ============================================================================
// Fuzz Test Helpers
// ============================================================================

/// Parameters drawn from a sin pattern, scaled so some values saturate
fn patterned_parameters(config: &NetworkConfig, phase: f32, scale: f32) -> ParameterSet {
    let mut params = ParameterSet::zeros(config);
    for layer in [&mut params.patch, &mut params.group, &mut params.head] {
        for (i, w) in layer.weight.data.iter_mut().enumerate() {
            *w = (i as f32 * 0.173 + phase).sin() * scale;
        }
        for (i, b) in layer.bias.data.iter_mut().enumerate() {
            *b = (i as f32 * 0.71 - phase).cos() * scale * 0.5;
        }
    }
    params
}

fn image_strategy() -> impl Strategy<Value = Image> {
    prop::collection::vec(0.0f32..=1.0, 784)
        .prop_map(|pixels| Image::new(28, pixels).unwrap_or_else(|e| panic!("{e}")))
}

fn order_strategy() -> impl Strategy<Value = ConcatOrder> {
    prop_oneof![Just(ConcatOrder::RowMajor), Just(ConcatOrder::ColumnMajor)]
}

fn activation_strategy() -> impl Strategy<Value = Activation> {
    prop_oneof![Just(Activation::Identity), Just(Activation::Relu)]
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Log-probabilities are finite, non-positive and exponentiate to 1
    #[test]
    fn fuzz_log_probs_normalized(
        image in image_strategy(),
        phase in -3.0f32..3.0,
        scale in 0.05f32..2.0,
        order in order_strategy(),
        head in activation_strategy(),
    ) {
        let config = NetworkConfig::default()
            .with_concat_order(order)
            .with_head_activation(head);
        let params = patterned_parameters(&config, phase, scale);
        let engine = RawInferenceEngine::quantized(config, &params)
            .unwrap_or_else(|e| panic!("{e}"));

        let prediction = engine.predict(&image).unwrap_or_else(|e| panic!("{e}"));
        prop_assert_eq!(prediction.log_probs.len(), 10);
        prop_assert!(prediction.class < 10);
        prop_assert!(prediction.log_probs.iter().all(|v| v.is_finite() && *v <= 1e-6));

        let total: f64 = prediction.log_probs.iter().map(|&v| f64::from(v).exp()).sum();
        prop_assert!((total - 1.0).abs() < 1e-4, "sum of probabilities {}", total);

        let best = prediction.log_probs[prediction.class];
        prop_assert!(prediction.log_probs.iter().all(|&v| v <= best));
        prop_assert!(prediction.log_probs[..prediction.class].iter().all(|&v| v < best));
    }

    /// The forward pass is a pure function of its inputs
    #[test]
    fn fuzz_forward_deterministic(image in image_strategy(), phase in -3.0f32..3.0) {
        let config = NetworkConfig::default();
        let params = patterned_parameters(&config, phase, 0.8);
        let engine = RawInferenceEngine::quantized(config, &params)
            .unwrap_or_else(|e| panic!("{e}"));
        let first = engine.forward(&image).unwrap_or_else(|e| panic!("{e}"));
        let clone = engine.clone();
        let second = clone.forward(&image).unwrap_or_else(|e| panic!("{e}"));
        prop_assert_eq!(first, second);
    }

    /// Every quantized parameter lies on the scheme's grid
    #[test]
    fn fuzz_quantized_parameters_on_grid(
        phase in -3.0f32..3.0,
        scale in 0.05f32..4.0,
        levels in 2u32..=64,
        range in 0.25f32..8.0,
    ) {
        let scheme = QuantizationScheme::new(levels, range).unwrap_or_else(|e| panic!("{e}"));
        let config = NetworkConfig::default().with_quantization(scheme);
        let params = patterned_parameters(&config, phase, scale);
        let grid = scheme.grid();

        let dequantized = params.quantize(&scheme).dequantize();
        for (name, tensor) in dequantized.tensors() {
            for &v in &tensor.data {
                prop_assert!(grid.contains(&v), "{} value {} is off-grid", name, v);
            }
        }
        prop_assert_eq!(dequantized.parameter_count(), 4314);
    }

    /// Patch features are non-negative after the shared ReLU layers
    #[test]
    fn fuzz_hidden_features_non_negative(image in image_strategy(), phase in -3.0f32..3.0) {
        let config = NetworkConfig::default();
        let params = patterned_parameters(&config, phase, 1.0);
        let engine = RawInferenceEngine::quantized(config, &params)
            .unwrap_or_else(|e| panic!("{e}"));

        let patches = engine.patch_features(&image).unwrap_or_else(|e| panic!("{e}"));
        prop_assert_eq!(patches.len(), 16);
        prop_assert!(patches.iter().flatten().all(|&v| v >= 0.0));

        let groups = engine.group_features(&image).unwrap_or_else(|e| panic!("{e}"));
        prop_assert_eq!(groups.len(), 4);
        prop_assert!(groups.iter().flatten().all(|&v| v >= 0.0));
    }
}
