//! Scalar kernels for raw inference
//!
//! Plain loops over slices. Nothing here depends on a tensor runtime, so the
//! forward pass can be checked line by line against the network definition.
//!
//! # Operations
//!
//! - Dot product (`dot`)
//! - Rectification (`relu`)
//! - Log-softmax with max subtraction (`log_softmax`)
//! - First-maximum argmax (`argmax`)

/// Dot product of two equal-length slices
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "dot product requires equal lengths");
    a.iter().zip(b).map(|(&x, &y)| x * y).sum()
}

/// Rectified linear unit
#[inline]
#[must_use]
pub fn relu(x: f32) -> f32 {
    x.max(0.0)
}

/// Largest element, `NEG_INFINITY` for an empty slice
#[must_use]
pub fn max(a: &[f32]) -> f32 {
    a.iter().copied().fold(f32::NEG_INFINITY, f32::max)
}

/// Index of the maximum element
///
/// Ties resolve to the lowest index. Returns 0 for an empty slice.
#[must_use]
pub fn argmax(a: &[f32]) -> usize {
    let mut best_idx = 0;
    let mut best_val = f32::NEG_INFINITY;

    for (idx, &val) in a.iter().enumerate() {
        if val > best_val {
            best_val = val;
            best_idx = idx;
        }
    }

    best_idx
}

/// Log-softmax with numerical stability
///
/// Computes `x_i - max - ln(sum_j exp(x_j - max))`. The shifted exponentials
/// are at most 1 and at least one equals 1, so the sum lies in `[1, n]` and
/// the output is finite for any finite input. Accumulation runs in `f64`;
/// results below `f32::MIN` saturate there instead of narrowing to `-inf`.
#[must_use]
pub fn log_softmax(x: &[f32]) -> Vec<f32> {
    if x.is_empty() {
        return vec![];
    }

    let max_val = f64::from(max(x));
    let sum_exp: f64 = x.iter().map(|&v| (f64::from(v) - max_val).exp()).sum();
    let log_sum_exp = sum_exp.ln();

    x.iter()
        .map(|&v| (f64::from(v) - max_val - log_sum_exp).max(f64::from(f32::MIN)) as f32)
        .collect()
}
