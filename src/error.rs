//! Error types for patchnet

use thiserror::Error;

/// Result type alias for patchnet operations
pub type PatchNetResult<T> = Result<T, PatchNetError>;

/// Errors that can occur while quantizing parameters or running inference
#[derive(Debug, Error)]
pub enum PatchNetError {
    /// Tensor dimensions disagree with the declared layer widths
    #[error("shape error: {0}")]
    Shape(String),

    /// Invalid network or quantization configuration
    #[error("config error: {0}")]
    Config(String),

    /// Patch offset falls outside the image
    #[error("patch out of bounds: offset ({x0}, {y0}) with size {size} exceeds image side {side}")]
    PatchBounds {
        /// Column of the patch's top-left corner
        x0: usize,
        /// Row of the patch's top-left corner
        y0: usize,
        /// Patch side length
        size: usize,
        /// Image side length
        side: usize,
    },

    /// A parameter or pixel value is NaN or infinite
    #[error("non-finite value in {0}")]
    NonFinite(String),

    /// Sample label is not a valid class index
    #[error("label {label} outside [0, {num_classes})")]
    Label {
        /// Offending label
        label: usize,
        /// Number of output classes
        num_classes: usize,
    },

    /// Malformed parameter or sample file
    #[error("format error: {0}")]
    Format(String),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for PatchNetError {
    fn from(err: serde_json::Error) -> Self {
        Self::Format(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PatchNetError::Shape("fc1.weight expected [32, 49], got [32, 48]".into());
        assert_eq!(
            err.to_string(),
            "shape error: fc1.weight expected [32, 49], got [32, 48]"
        );
    }

    #[test]
    fn test_patch_bounds_display() {
        let err = PatchNetError::PatchBounds {
            x0: 24,
            y0: 0,
            size: 7,
            side: 28,
        };
        assert_eq!(
            err.to_string(),
            "patch out of bounds: offset (24, 0) with size 7 exceeds image side 28"
        );
    }

    #[test]
    fn test_label_display() {
        let err = PatchNetError::Label {
            label: 12,
            num_classes: 10,
        };
        assert_eq!(err.to_string(), "label 12 outside [0, 10)");
    }

    #[test]
    fn test_json_error_maps_to_format() {
        let Err(json_err) = serde_json::from_str::<Vec<f32>>("[1.0,") else {
            panic!("truncated JSON should not parse");
        };
        let err = PatchNetError::from(json_err);
        assert!(matches!(err, PatchNetError::Format(_)));
    }

    #[test]
    fn test_io_error_from() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: PatchNetError = io.into();
        assert!(matches!(err, PatchNetError::Io(_)));
        assert!(err.to_string().starts_with("io error:"));
    }
}
