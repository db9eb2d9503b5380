//! Network definition and parameters
//!
//! The classifier looks at a 28x28 image through 16 non-overlapping 7x7
//! patches. One shared layer turns every patch into 32 features, a second
//! shared layer turns every 2x2 block of patches into 16 features, and a
//! final layer maps the four block vectors to 10 class log-probabilities.
//!
//! ```text
//! image 28x28 ──► 16 patches (7x7=49) ──► fc1 (shared) ──► 16 x 32
//!                                                            │
//!            4 groups of 2x2 patches (4x32=128) ◄────────────┘
//!                         │
//!                         ▼
//!                   fc2 (shared) ──► 4 x 16 ──► concat (64) ──► fc3 ──► log-softmax (10)
//! ```

mod aggregate;
mod engine;
mod head;
mod layer;
mod patch;
pub mod quantized;

pub use aggregate::HierarchicalAggregator;
pub use engine::RawInferenceEngine;
pub use head::{ClassifierHead, Prediction};
pub use layer::{Activation, SharedLinear};
pub use patch::{extract_patch, Image, PatchGrid};
pub use quantized::{QuantizationScheme, QuantizationStats, QuantizedTensor, RoundingMode};

use serde::{Deserialize, Serialize};

use crate::error::{PatchNetError, PatchNetResult};

/// Order in which patch features are concatenated into groups, and group
/// features into the classifier input
///
/// The layer-2 and layer-3 weights are positional, so this must match the
/// order the parameters were trained with. Each variant carries a version
/// number that parameter files record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcatOrder {
    /// Top-left, top-right, bottom-left, bottom-right (rows outer)
    #[default]
    RowMajor,
    /// Top-left, bottom-left, top-right, bottom-right (columns outer)
    ColumnMajor,
}

impl ConcatOrder {
    /// Version recorded alongside parameters
    #[must_use]
    pub const fn version(self) -> u32 {
        match self {
            Self::RowMajor => 1,
            Self::ColumnMajor => 2,
        }
    }

    /// Look up an order by its version number
    #[must_use]
    pub const fn from_version(version: u32) -> Option<Self> {
        match version {
            1 => Some(Self::RowMajor),
            2 => Some(Self::ColumnMajor),
            _ => None,
        }
    }

    /// `(row, col)` cells of a `side x side` block in concatenation order
    #[must_use]
    pub fn cells(self, side: usize) -> Vec<(usize, usize)> {
        let mut cells = Vec::with_capacity(side * side);
        for outer in 0..side {
            for inner in 0..side {
                cells.push(match self {
                    Self::RowMajor => (outer, inner),
                    Self::ColumnMajor => (inner, outer),
                });
            }
        }
        cells
    }
}

impl core::fmt::Display for ConcatOrder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::RowMajor => write!(f, "row-major (v1)"),
            Self::ColumnMajor => write!(f, "column-major (v2)"),
        }
    }
}

/// Declared `(out_features, in_features)` of one layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerShape {
    /// Output width
    pub out_features: usize,
    /// Input width
    pub in_features: usize,
}

impl LayerShape {
    /// Expected weight tensor shape
    #[must_use]
    pub fn weight_shape(&self) -> Vec<usize> {
        vec![self.out_features, self.in_features]
    }

    /// Expected bias tensor shape
    #[must_use]
    pub fn bias_shape(&self) -> Vec<usize> {
        vec![self.out_features]
    }

    /// Weight plus bias element count
    #[must_use]
    pub const fn parameter_count(&self) -> usize {
        self.out_features * self.in_features + self.out_features
    }
}

/// Network geometry, layer widths and quantization settings
///
/// Every component is built from one of these so that patch size, widths
/// and grid settings cannot drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Input image side length
    pub image_side: usize,
    /// Patch side length
    pub patch_size: usize,
    /// Side of the square block of patches aggregated by layer 2
    pub group_side: usize,
    /// Patch features, group features, output classes
    pub layer_widths: [usize; 3],
    /// Weight quantization grid
    pub quantization: QuantizationScheme,
    /// Activation applied to the final layer before log-softmax
    pub head_activation: Activation,
    /// Patch and group concatenation order
    pub concat_order: ConcatOrder,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            image_side: 28,
            patch_size: 7,
            group_side: 2,
            layer_widths: [32, 16, 10],
            quantization: QuantizationScheme::four_bit(),
            head_activation: Activation::Identity,
            concat_order: ConcatOrder::RowMajor,
        }
    }
}

impl NetworkConfig {
    /// Set the quantization scheme
    #[must_use]
    pub fn with_quantization(mut self, quantization: QuantizationScheme) -> Self {
        self.quantization = quantization;
        self
    }

    /// Set the head activation
    #[must_use]
    pub fn with_head_activation(mut self, activation: Activation) -> Self {
        self.head_activation = activation;
        self
    }

    /// Set the concatenation order
    #[must_use]
    pub fn with_concat_order(mut self, order: ConcatOrder) -> Self {
        self.concat_order = order;
        self
    }

    /// Set the layer widths
    #[must_use]
    pub fn with_layer_widths(mut self, widths: [usize; 3]) -> Self {
        self.layer_widths = widths;
        self
    }

    /// Patches along one image side
    #[must_use]
    pub const fn patches_per_side(&self) -> usize {
        self.image_side / self.patch_size
    }

    /// Total patch count
    #[must_use]
    pub const fn num_patches(&self) -> usize {
        self.patches_per_side() * self.patches_per_side()
    }

    /// Groups along one side of the patch grid
    #[must_use]
    pub const fn groups_per_side(&self) -> usize {
        self.patches_per_side() / self.group_side
    }

    /// Total group count
    #[must_use]
    pub const fn num_groups(&self) -> usize {
        self.groups_per_side() * self.groups_per_side()
    }

    /// Number of output classes
    #[must_use]
    pub const fn num_classes(&self) -> usize {
        self.layer_widths[2]
    }

    /// Declared shapes of the patch, group and head layers
    #[must_use]
    pub const fn layer_shapes(&self) -> [LayerShape; 3] {
        let [patch_width, group_width, classes] = self.layer_widths;
        [
            LayerShape {
                out_features: patch_width,
                in_features: self.patch_size * self.patch_size,
            },
            LayerShape {
                out_features: group_width,
                in_features: patch_width * self.group_side * self.group_side,
            },
            LayerShape {
                out_features: classes,
                in_features: group_width * self.num_groups(),
            },
        ]
    }

    /// Total weights and biases
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.layer_shapes().iter().map(LayerShape::parameter_count).sum()
    }

    /// Check tiling and width invariants
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::Config`] if the image does not tile into
    /// patches, the patch grid does not tile into groups, a width is zero,
    /// or the quantization scheme is invalid.
    pub fn validate(&self) -> PatchNetResult<()> {
        if self.patch_size == 0 || self.image_side == 0 {
            return Err(PatchNetError::Config(
                "image side and patch size must be non-zero".into(),
            ));
        }
        if self.image_side % self.patch_size != 0 {
            return Err(PatchNetError::Config(format!(
                "image side {} is not divisible by patch size {}",
                self.image_side, self.patch_size
            )));
        }
        if self.group_side == 0 || self.patches_per_side() % self.group_side != 0 {
            return Err(PatchNetError::Config(format!(
                "patch grid {}x{} does not tile into {}x{} groups",
                self.patches_per_side(),
                self.patches_per_side(),
                self.group_side,
                self.group_side
            )));
        }
        if self.layer_widths.contains(&0) {
            return Err(PatchNetError::Config(format!(
                "layer widths must be non-zero, got {:?}",
                self.layer_widths
            )));
        }
        self.quantization.validate()
    }
}

/// A flat sequence of scalars with a logical shape
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterTensor {
    /// Values in row-major order
    pub data: Vec<f32>,
    /// Logical dimensions
    pub shape: Vec<usize>,
}

impl ParameterTensor {
    /// Wrap flat data with a shape
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::Shape`] if the shape's product differs from
    /// the data length.
    pub fn from_vec(data: Vec<f32>, shape: Vec<usize>) -> PatchNetResult<Self> {
        let numel: usize = shape.iter().product();
        if numel != data.len() {
            return Err(PatchNetError::Shape(format!(
                "shape {shape:?} holds {numel} values, got {}",
                data.len()
            )));
        }
        Ok(Self { data, shape })
    }

    /// 1-D tensor
    #[must_use]
    pub fn vector(data: Vec<f32>) -> Self {
        let shape = vec![data.len()];
        Self { data, shape }
    }

    /// 2-D tensor from nested rows
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::Shape`] for ragged rows.
    pub fn from_rows(rows: &[Vec<f32>]) -> PatchNetResult<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(PatchNetError::Shape(format!(
                    "ragged matrix: row {i} has {} values, expected {cols}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            data,
            shape: vec![rows.len(), cols],
        })
    }

    /// Zero-filled tensor
    #[must_use]
    pub fn zeros(shape: Vec<usize>) -> Self {
        let numel = shape.iter().product();
        Self {
            data: vec![0.0; numel],
            shape,
        }
    }

    /// Nested rows along the first dimension
    #[must_use]
    pub fn to_rows(&self) -> Vec<Vec<f32>> {
        let cols = match self.shape.as_slice() {
            [] => return vec![],
            [_] => return vec![self.data.clone()],
            [_, rest @ ..] => rest.iter().product::<usize>(),
        };
        if cols == 0 {
            return vec![Vec::new(); self.shape[0]];
        }
        self.data.chunks(cols).map(<[f32]>::to_vec).collect()
    }

    /// Get the number of elements
    #[must_use]
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Check that the tensor has exactly `expected` dimensions
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::Shape`] naming the tensor on mismatch.
    pub fn expect_shape(&self, name: &str, expected: &[usize]) -> PatchNetResult<()> {
        if self.shape != expected || self.data.len() != expected.iter().product::<usize>() {
            return Err(PatchNetError::Shape(format!(
                "{name} expected {expected:?}, got {:?} ({} values)",
                self.shape,
                self.data.len()
            )));
        }
        Ok(())
    }

    /// Check every value is finite
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::NonFinite`] naming the tensor and index.
    pub fn expect_finite(&self, name: &str) -> PatchNetResult<()> {
        match self.data.iter().position(|v| !v.is_finite()) {
            Some(i) => Err(PatchNetError::NonFinite(format!("{name}[{i}]"))),
            None => Ok(()),
        }
    }
}

/// Weight and bias of one layer
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayerParameters {
    /// `(out_features, in_features)` weight matrix
    pub weight: ParameterTensor,
    /// `(out_features,)` bias
    pub bias: ParameterTensor,
}

impl LayerParameters {
    /// Zero weight and bias for a layer shape
    #[must_use]
    pub fn zeros(shape: LayerShape) -> Self {
        Self {
            weight: ParameterTensor::zeros(shape.weight_shape()),
            bias: ParameterTensor::zeros(shape.bias_shape()),
        }
    }

    /// Check shapes and finiteness against a declared layer shape
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::Shape`] or [`PatchNetError::NonFinite`].
    pub fn validate(&self, name: &str, shape: LayerShape) -> PatchNetResult<()> {
        let weight_name = format!("{name}.weight");
        let bias_name = format!("{name}.bias");
        self.weight.expect_shape(&weight_name, &shape.weight_shape())?;
        self.bias.expect_shape(&bias_name, &shape.bias_shape())?;
        self.weight.expect_finite(&weight_name)?;
        self.bias.expect_finite(&bias_name)
    }

    fn quantize(&self, scheme: QuantizationScheme) -> QuantizedLayer {
        QuantizedLayer {
            weight: QuantizedTensor::from_tensor(&self.weight, scheme),
            bias: QuantizedTensor::from_tensor(&self.bias, scheme),
        }
    }
}

/// Layer names in parameter order
pub const LAYER_NAMES: [&str; 3] = ["fc1", "fc2", "fc3"];

/// Floating-point parameters of the three layers, as supplied by training
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterSet {
    /// Patch layer (fc1)
    pub patch: LayerParameters,
    /// Group layer (fc2)
    pub group: LayerParameters,
    /// Classifier layer (fc3)
    pub head: LayerParameters,
}

impl ParameterSet {
    /// Build from the six tensors in training order
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::Shape`] if `tensors` does not hold six entries.
    pub fn from_tensors(tensors: Vec<ParameterTensor>) -> PatchNetResult<Self> {
        let count = tensors.len();
        let Ok([w1, b1, w2, b2, w3, b3]) = <[ParameterTensor; 6]>::try_from(tensors) else {
            return Err(PatchNetError::Shape(format!(
                "expected 6 parameter tensors, got {count}"
            )));
        };
        Ok(Self {
            patch: LayerParameters { weight: w1, bias: b1 },
            group: LayerParameters { weight: w2, bias: b2 },
            head: LayerParameters { weight: w3, bias: b3 },
        })
    }

    /// All-zero parameters matching a configuration
    #[must_use]
    pub fn zeros(config: &NetworkConfig) -> Self {
        let [patch, group, head] = config.layer_shapes();
        Self {
            patch: LayerParameters::zeros(patch),
            group: LayerParameters::zeros(group),
            head: LayerParameters::zeros(head),
        }
    }

    /// Layers in order with their names
    #[must_use]
    pub fn layers(&self) -> [(&'static str, &LayerParameters); 3] {
        [
            (LAYER_NAMES[0], &self.patch),
            (LAYER_NAMES[1], &self.group),
            (LAYER_NAMES[2], &self.head),
        ]
    }

    /// The six tensors in training order with their names
    #[must_use]
    pub fn tensors(&self) -> Vec<(String, &ParameterTensor)> {
        self.layers()
            .into_iter()
            .flat_map(|(name, layer)| {
                [
                    (format!("{name}.weight"), &layer.weight),
                    (format!("{name}.bias"), &layer.bias),
                ]
            })
            .collect()
    }

    /// Total scalar count
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.tensors().iter().map(|(_, t)| t.numel()).sum()
    }

    /// Check every tensor against the configuration's declared shapes
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::Shape`] on the first mismatched tensor, or
    /// [`PatchNetError::NonFinite`] for NaN/infinite values.
    pub fn validate(&self, config: &NetworkConfig) -> PatchNetResult<()> {
        for ((name, layer), shape) in self.layers().into_iter().zip(config.layer_shapes()) {
            layer.validate(name, shape)?;
        }
        Ok(())
    }

    /// Quantize every tensor independently under one scheme
    #[must_use]
    pub fn quantize(&self, scheme: &QuantizationScheme) -> QuantizedParameterSet {
        QuantizedParameterSet {
            scheme: *scheme,
            patch: self.patch.quantize(*scheme),
            group: self.group.quantize(*scheme),
            head: self.head.quantize(*scheme),
        }
    }

    /// Per-tensor quantization error under a scheme
    #[must_use]
    pub fn quantization_stats(
        &self,
        scheme: &QuantizationScheme,
    ) -> Vec<(String, QuantizationStats)> {
        self.tensors()
            .into_iter()
            .map(|(name, t)| (name, QuantizationStats::measure(t, scheme)))
            .collect()
    }
}

/// Quantized weight and bias of one layer
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedLayer {
    /// Quantized weight matrix
    pub weight: QuantizedTensor,
    /// Quantized bias
    pub bias: QuantizedTensor,
}

impl QuantizedLayer {
    fn dequantize(&self) -> LayerParameters {
        LayerParameters {
            weight: self.weight.dequantize(),
            bias: self.bias.dequantize(),
        }
    }
}

/// The six tensors, each quantized under the same scheme
///
/// Built once per trained snapshot and only read afterwards; inference
/// borrows it immutably, so it can be shared across worker threads.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedParameterSet {
    /// Scheme shared by all tensors
    pub scheme: QuantizationScheme,
    /// Patch layer (fc1)
    pub patch: QuantizedLayer,
    /// Group layer (fc2)
    pub group: QuantizedLayer,
    /// Classifier layer (fc3)
    pub head: QuantizedLayer,
}

impl QuantizedParameterSet {
    /// Dequantized values, on the scheme's grid
    #[must_use]
    pub fn dequantize(&self) -> ParameterSet {
        ParameterSet {
            patch: self.patch.dequantize(),
            group: self.group.dequantize(),
            head: self.head.dequantize(),
        }
    }

    /// Storage in bytes if codes were bit-packed
    #[must_use]
    pub fn packed_bytes(&self) -> usize {
        [&self.patch, &self.group, &self.head]
            .iter()
            .map(|l| l.weight.packed_bytes() + l.bias.packed_bytes())
            .sum()
    }
}
