//! Labelled sample files: `[{"pixels": [784 floats], "label": 3}, ...]`

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PatchNetError, PatchNetResult};
use crate::eval::LabeledImage;
use crate::model::Image;

/// One sample as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    /// Row-major pixel intensities
    pub pixels: Vec<f32>,
    /// Ground-truth class
    pub label: usize,
}

impl SampleRecord {
    /// Capture a labelled image
    #[must_use]
    pub fn from_labeled(sample: &LabeledImage) -> Self {
        Self {
            pixels: sample.image.pixels().to_vec(),
            label: sample.label,
        }
    }

    /// Build a labelled image of side `image_side`
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::Shape`] if the pixel count is not
    /// `image_side^2`, or [`PatchNetError::NonFinite`].
    pub fn into_labeled(self, image_side: usize) -> PatchNetResult<LabeledImage> {
        Ok(LabeledImage::new(Image::new(image_side, self.pixels)?, self.label))
    }
}

/// Parse labelled samples from JSON text
///
/// Label range is checked at evaluation time against the engine's class
/// count.
///
/// # Errors
///
/// Returns [`PatchNetError::Format`] for malformed JSON, or the error of the
/// first malformed sample with its index.
pub fn parse_samples(json: &str, image_side: usize) -> PatchNetResult<Vec<LabeledImage>> {
    let records: Vec<SampleRecord> = serde_json::from_str(json)?;
    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            record.into_labeled(image_side).map_err(|e| match e {
                PatchNetError::Shape(msg) => PatchNetError::Shape(format!("sample {i}: {msg}")),
                PatchNetError::NonFinite(what) => {
                    PatchNetError::NonFinite(format!("sample {i} {what}"))
                }
                other => other,
            })
        })
        .collect()
}

/// Read labelled samples from disk
///
/// # Errors
///
/// Returns [`PatchNetError::Io`] if the file cannot be read, otherwise as
/// [`parse_samples`].
pub fn load_samples(path: impl AsRef<Path>, image_side: usize) -> PatchNetResult<Vec<LabeledImage>> {
    let text = std::fs::read_to_string(path)?;
    parse_samples(&text, image_side)
}

/// Write labelled samples to disk
///
/// # Errors
///
/// Returns [`PatchNetError::Io`] or [`PatchNetError::Format`].
pub fn save_samples(path: impl AsRef<Path>, samples: &[LabeledImage]) -> PatchNetResult<()> {
    let records: Vec<SampleRecord> = samples.iter().map(SampleRecord::from_labeled).collect();
    std::fs::write(path, serde_json::to_string(&records)?)?;
    Ok(())
}
