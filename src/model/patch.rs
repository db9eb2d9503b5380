//! Images and patch extraction
//!
//! A patch is the `size x size` sub-grid whose top-left corner sits at
//! `(x0, y0)`, flattened row-major: local index `j` maps to
//! `row = y0 + j / size`, `col = x0 + j % size`.

use crate::error::{PatchNetError, PatchNetResult};

/// Square grayscale image, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    side: usize,
    pixels: Vec<f32>,
}

impl Image {
    /// Wrap `side * side` pixel intensities
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::Shape`] on a length mismatch and
    /// [`PatchNetError::NonFinite`] for NaN/infinite pixels.
    pub fn new(side: usize, pixels: Vec<f32>) -> PatchNetResult<Self> {
        if pixels.len() != side * side {
            return Err(PatchNetError::Shape(format!(
                "image expected {side}x{side}={} pixels, got {}",
                side * side,
                pixels.len()
            )));
        }
        if let Some(i) = pixels.iter().position(|p| !p.is_finite()) {
            return Err(PatchNetError::NonFinite(format!("pixel {i}")));
        }
        Ok(Self { side, pixels })
    }

    /// Build from nested rows
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::Shape`] unless every row is as long as there
    /// are rows.
    pub fn from_rows(rows: &[Vec<f32>]) -> PatchNetResult<Self> {
        let side = rows.len();
        if let Some(row) = rows.iter().find(|r| r.len() != side) {
            return Err(PatchNetError::Shape(format!(
                "image rows must have {side} pixels, found one with {}",
                row.len()
            )));
        }
        Self::new(side, rows.concat())
    }

    /// All-zero image
    #[must_use]
    pub fn zeros(side: usize) -> Self {
        Self {
            side,
            pixels: vec![0.0; side * side],
        }
    }

    /// Side length
    #[must_use]
    pub const fn side(&self) -> usize {
        self.side
    }

    /// Pixel intensities, row-major
    #[must_use]
    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    /// Pixel at `(row, col)`
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        (row < self.side && col < self.side).then(|| self.pixels[row * self.side + col])
    }
}

/// Flatten the `size x size` patch with top-left corner `(x0, y0)`
///
/// # Errors
///
/// Returns [`PatchNetError::PatchBounds`] if the patch extends past the image.
pub fn extract_patch(image: &Image, size: usize, x0: usize, y0: usize) -> PatchNetResult<Vec<f32>> {
    let side = image.side();
    if x0 + size > side || y0 + size > side {
        return Err(PatchNetError::PatchBounds { x0, y0, size, side });
    }

    let pixels = image.pixels();
    let patch = (0..size * size)
        .map(|j| {
            let row = y0 + j / size;
            let col = x0 + j % size;
            pixels[row * side + col]
        })
        .collect();

    Ok(patch)
}

/// Regular non-overlapping tiling of an image into patches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchGrid {
    image_side: usize,
    patch_size: usize,
}

impl PatchGrid {
    /// Create a grid
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::Config`] unless `patch_size` divides
    /// `image_side` exactly.
    pub fn new(image_side: usize, patch_size: usize) -> PatchNetResult<Self> {
        if patch_size == 0 || image_side % patch_size != 0 {
            return Err(PatchNetError::Config(format!(
                "image side {image_side} is not divisible by patch size {patch_size}"
            )));
        }
        Ok(Self {
            image_side,
            patch_size,
        })
    }

    /// Patch side length
    #[must_use]
    pub const fn patch_size(&self) -> usize {
        self.patch_size
    }

    /// Patches along one side
    #[must_use]
    pub const fn per_side(&self) -> usize {
        self.image_side / self.patch_size
    }

    /// Total patches
    #[must_use]
    pub const fn len(&self) -> usize {
        self.per_side() * self.per_side()
    }

    /// Check if the grid has no patches
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(x0, y0)` of patch `index`, counting row-major over the grid
    #[must_use]
    pub const fn offset(&self, index: usize) -> (usize, usize) {
        let per_side = self.per_side();
        (
            (index % per_side) * self.patch_size,
            (index / per_side) * self.patch_size,
        )
    }

    /// Offsets of every patch: `(0,0), (7,0), (14,0), (21,0), (0,7), ...`
    #[must_use]
    pub fn offsets(&self) -> Vec<(usize, usize)> {
        (0..self.len()).map(|i| self.offset(i)).collect()
    }

    /// Extract every patch in offset order
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::Shape`] if the image side differs from the
    /// grid's.
    pub fn extract_all(&self, image: &Image) -> PatchNetResult<Vec<Vec<f32>>> {
        if image.side() != self.image_side {
            return Err(PatchNetError::Shape(format!(
                "image side {} does not match grid side {}",
                image.side(),
                self.image_side
            )));
        }
        self.offsets()
            .into_iter()
            .map(|(x0, y0)| extract_patch(image, self.patch_size, x0, y0))
            .collect()
    }
}
