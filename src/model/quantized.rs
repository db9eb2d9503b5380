//! Fake quantization of parameter tensors
//!
//! Maps each weight onto a symmetric grid of `levels` values spanning `range`
//! and back to `f32`. Forward passes stay in floating point; only the
//! precision loss is simulated.
//!
//! # Quantization Scheme
//!
//! - Level: `code = round(w * levels / range + levels / 2)`
//! - Saturate: `code = clamp(code, 0, levels - 1)`
//! - Dequantize: `w' = (code - levels / 2) * range / levels`
//!
//! With `levels = 16` and `range = 2.0` the grid is `{-1.0, -0.875, ..., 0.875}`.
//!
//! # Example
//!
//! ```rust
//! use patchnet::model::quantized::QuantizationScheme;
//!
//! let scheme = QuantizationScheme::four_bit();
//! assert_eq!(scheme.fake_quantize(0.3), 0.25);
//! assert_eq!(scheme.fake_quantize(5.0), 0.875);
//! ```

use serde::{Deserialize, Serialize};

use super::ParameterTensor;
use crate::error::{PatchNetError, PatchNetResult};

/// Default number of quantization levels (4-bit)
pub const DEFAULT_LEVELS: u32 = 16;

/// Default symmetric span covered by the levels
pub const DEFAULT_RANGE: f32 = 2.0;

/// Largest supported level count (codes are stored as `u16`)
pub const MAX_LEVELS: u32 = 1 << 16;

/// Tie-breaking rule for values exactly between two levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingMode {
    /// 2.5 -> 3, -2.5 -> -3
    #[default]
    HalfAwayFromZero,
    /// 2.5 -> 2, 3.5 -> 4 (banker's rounding)
    HalfToEven,
}

impl RoundingMode {
    /// Round a real-valued level index
    #[inline]
    #[must_use]
    pub fn round(self, x: f64) -> f64 {
        match self {
            Self::HalfAwayFromZero => x.round(),
            Self::HalfToEven => x.round_ties_even(),
        }
    }
}

impl core::fmt::Display for RoundingMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::HalfAwayFromZero => write!(f, "half-away-from-zero"),
            Self::HalfToEven => write!(f, "half-to-even"),
        }
    }
}

/// Level count and span of the quantization grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantizationScheme {
    /// Number of representable values
    pub levels: u32,
    /// Symmetric span covered by the levels, centered at 0
    pub range: f32,
    /// Midpoint rounding rule
    #[serde(default)]
    pub rounding: RoundingMode,
}

impl Default for QuantizationScheme {
    fn default() -> Self {
        Self::four_bit()
    }
}

impl QuantizationScheme {
    /// Create a validated scheme
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::Config`] unless `2 <= levels <= 65536` and
    /// `range` is finite and positive.
    pub fn new(levels: u32, range: f32) -> PatchNetResult<Self> {
        let scheme = Self {
            levels,
            range,
            rounding: RoundingMode::default(),
        };
        scheme.validate()?;
        Ok(scheme)
    }

    /// 16 levels over `[-1.0, 1.0)`
    #[must_use]
    pub const fn four_bit() -> Self {
        Self {
            levels: DEFAULT_LEVELS,
            range: DEFAULT_RANGE,
            rounding: RoundingMode::HalfAwayFromZero,
        }
    }

    /// Set the rounding rule
    #[must_use]
    pub fn with_rounding(mut self, rounding: RoundingMode) -> Self {
        self.rounding = rounding;
        self
    }

    /// Check `levels >= 2` and `range > 0`
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::Config`] describing the violated bound.
    pub fn validate(&self) -> PatchNetResult<()> {
        if self.levels < 2 || self.levels > MAX_LEVELS {
            return Err(PatchNetError::Config(format!(
                "quantization levels must be in [2, {MAX_LEVELS}], got {}",
                self.levels
            )));
        }
        if !(self.range.is_finite() && self.range > 0.0) {
            return Err(PatchNetError::Config(format!(
                "quantization range must be finite and positive, got {}",
                self.range
            )));
        }
        Ok(())
    }

    /// Spacing between adjacent grid values
    #[must_use]
    pub fn step(&self) -> f32 {
        (f64::from(self.range) / f64::from(self.levels)) as f32
    }

    /// Number of bits needed to store one code
    #[must_use]
    pub fn bits(&self) -> u32 {
        (self.levels - 1).max(1).ilog2() + 1
    }

    /// Saturated level code for a weight
    ///
    /// NaN maps to code 0; callers reject non-finite parameters beforehand.
    #[must_use]
    pub fn code_of(&self, w: f32) -> u16 {
        let levels = f64::from(self.levels);
        let level = self
            .rounding
            .round(f64::from(w) * levels / f64::from(self.range) + levels / 2.0);
        // Saturating float-to-int cast, after the explicit clamp
        level.clamp(0.0, levels - 1.0) as u16
    }

    /// Grid value for a level code
    #[must_use]
    pub fn value_of(&self, code: u16) -> f32 {
        let levels = f64::from(self.levels);
        ((f64::from(code) - levels / 2.0) * f64::from(self.range) / levels) as f32
    }

    /// Quantize then dequantize a single weight
    #[must_use]
    pub fn fake_quantize(&self, w: f32) -> f32 {
        self.value_of(self.code_of(w))
    }

    /// Whether `w` would hit the top or bottom level without being on it
    #[must_use]
    pub fn saturates(&self, w: f32) -> bool {
        let levels = f64::from(self.levels);
        let level = f64::from(w) * levels / f64::from(self.range) + levels / 2.0;
        level < -0.5 || level > levels - 0.5
    }

    /// All representable values in ascending order
    #[must_use]
    pub fn grid(&self) -> Vec<f32> {
        (0..self.levels).map(|c| self.value_of(c as u16)).collect()
    }
}

/// Tensor of level codes with its scheme and original shape
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedTensor {
    /// Level codes in `0..levels`, flat in the source tensor's order
    pub codes: Vec<u16>,
    /// Scheme the codes were produced with
    pub scheme: QuantizationScheme,
    /// Original shape dimensions
    pub shape: Vec<usize>,
}

impl QuantizedTensor {
    /// Quantize a parameter tensor, treating it as a flat sequence
    #[must_use]
    pub fn from_tensor(tensor: &ParameterTensor, scheme: QuantizationScheme) -> Self {
        Self {
            codes: tensor.data.iter().map(|&w| scheme.code_of(w)).collect(),
            scheme,
            shape: tensor.shape.clone(),
        }
    }

    /// Dequantize back to a tensor of identical shape
    #[must_use]
    pub fn dequantize(&self) -> ParameterTensor {
        ParameterTensor {
            data: self.codes.iter().map(|&c| self.scheme.value_of(c)).collect(),
            shape: self.shape.clone(),
        }
    }

    /// Get the number of elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Storage in bytes if codes were bit-packed
    #[must_use]
    pub fn packed_bytes(&self) -> usize {
        (self.codes.len() * self.scheme.bits() as usize).div_ceil(8)
    }
}

/// Quantize-then-dequantize a tensor under a scheme
#[must_use]
pub fn quantize_tensor(tensor: &ParameterTensor, scheme: &QuantizationScheme) -> ParameterTensor {
    ParameterTensor {
        data: tensor.data.iter().map(|&w| scheme.fake_quantize(w)).collect(),
        shape: tensor.shape.clone(),
    }
}

/// Error statistics for one quantized tensor
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuantizationStats {
    /// Mean squared error between original and dequantized values
    pub mse: f32,
    /// Largest absolute deviation
    pub max_abs_error: f32,
    /// Values clipped to the first or last level
    pub saturated: usize,
    /// Signal-to-quantization-noise ratio in dB
    pub sqnr_db: f32,
}

impl QuantizationStats {
    /// Compare an original tensor against its quantized form
    #[must_use]
    pub fn measure(original: &ParameterTensor, scheme: &QuantizationScheme) -> Self {
        let n = original.data.len();
        if n == 0 {
            return Self {
                mse: 0.0,
                max_abs_error: 0.0,
                saturated: 0,
                sqnr_db: f32::INFINITY,
            };
        }

        let mut noise = 0.0_f64;
        let mut signal = 0.0_f64;
        let mut max_abs_error = 0.0_f32;
        let mut saturated = 0;

        for &w in &original.data {
            let err = (w - scheme.fake_quantize(w)).abs();
            noise += f64::from(err).powi(2);
            signal += f64::from(w).powi(2);
            max_abs_error = max_abs_error.max(err);
            if scheme.saturates(w) {
                saturated += 1;
            }
        }

        let sqnr_db = if noise < 1e-20 {
            f32::INFINITY
        } else {
            (10.0 * (signal / noise).log10()) as f32
        };

        Self {
            mse: (noise / n as f64) as f32,
            max_abs_error,
            saturated,
            sqnr_db,
        }
    }
}
