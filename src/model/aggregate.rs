//! Hierarchical aggregation of patch features into group features
//!
//! The patch grid is split into non-overlapping `group_side x group_side`
//! blocks. Each block's patch vectors are concatenated in [`ConcatOrder`]
//! and passed through the shared group layer. Blocks themselves are emitted
//! in the same order, which is the order the classifier head concatenates.

use super::layer::SharedLinear;
use super::ConcatOrder;
use crate::error::{PatchNetError, PatchNetResult};

/// Groups patch features and applies the shared group layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchicalAggregator {
    patches_per_side: usize,
    group_side: usize,
    order: ConcatOrder,
    /// Patch indices of each group, both levels already in concat order
    groups: Vec<Vec<usize>>,
}

impl HierarchicalAggregator {
    /// Build the grouping for a `patches_per_side` square patch grid
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::Config`] unless `group_side` divides
    /// `patches_per_side`.
    pub fn new(
        patches_per_side: usize,
        group_side: usize,
        order: ConcatOrder,
    ) -> PatchNetResult<Self> {
        if group_side == 0 || patches_per_side % group_side != 0 {
            return Err(PatchNetError::Config(format!(
                "patch grid side {patches_per_side} is not divisible by group side {group_side}"
            )));
        }

        let groups_per_side = patches_per_side / group_side;
        let groups = order
            .cells(groups_per_side)
            .into_iter()
            .map(|(gy, gx)| {
                order
                    .cells(group_side)
                    .into_iter()
                    .map(|(dy, dx)| {
                        let row = gy * group_side + dy;
                        let col = gx * group_side + dx;
                        row * patches_per_side + col
                    })
                    .collect()
            })
            .collect();

        Ok(Self {
            patches_per_side,
            group_side,
            order,
            groups,
        })
    }

    /// Concatenation order
    #[must_use]
    pub const fn order(&self) -> ConcatOrder {
        self.order
    }

    /// Number of groups produced
    #[must_use]
    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    /// Patch indices (row-major over the patch grid) making up each group
    #[must_use]
    pub fn groups(&self) -> &[Vec<usize>] {
        &self.groups
    }

    /// Concatenate the patch features of every group
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::Shape`] if the number of patch vectors is not
    /// `patches_per_side^2`.
    pub fn concat_groups(&self, patch_features: &[Vec<f32>]) -> PatchNetResult<Vec<Vec<f32>>> {
        let expected = self.patches_per_side * self.patches_per_side;
        if patch_features.len() != expected {
            return Err(PatchNetError::Shape(format!(
                "aggregator expected {expected} patch vectors, got {}",
                patch_features.len()
            )));
        }

        Ok(self
            .groups
            .iter()
            .map(|members| {
                members
                    .iter()
                    .flat_map(|&p| patch_features[p].iter().copied())
                    .collect()
            })
            .collect())
    }

    /// Group feature vectors: the group layer applied to each concatenation
    ///
    /// # Errors
    ///
    /// Returns [`PatchNetError::Shape`] if the patch count is wrong or a
    /// concatenation does not match the layer's input width.
    pub fn aggregate(
        &self,
        patch_features: &[Vec<f32>],
        group_layer: &SharedLinear,
    ) -> PatchNetResult<Vec<Vec<f32>>> {
        let concatenated = self.concat_groups(patch_features)?;
        group_layer.forward_each(&concatenated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Activation, LayerShape};

    fn aggregator(order: ConcatOrder) -> HierarchicalAggregator {
        HierarchicalAggregator::new(4, 2, order).map_or_else(|e| panic!("{e}"), |a| a)
    }

    #[test]
    fn test_row_major_groups_match_quadrants() {
        // x11 x12 x21 x22 | x13 x14 x23 x24 | x31 x32 x41 x42 | x33 x34 x43 x44
        let agg = aggregator(ConcatOrder::RowMajor);
        assert_eq!(
            agg.groups(),
            &[
                vec![0, 1, 4, 5],
                vec![2, 3, 6, 7],
                vec![8, 9, 12, 13],
                vec![10, 11, 14, 15],
            ]
        );
    }

    #[test]
    fn test_column_major_groups() {
        let agg = aggregator(ConcatOrder::ColumnMajor);
        assert_eq!(
            agg.groups(),
            &[
                vec![0, 4, 1, 5],
                vec![8, 12, 9, 13],
                vec![2, 6, 3, 7],
                vec![10, 14, 11, 15],
            ]
        );
    }

    #[test]
    fn test_groups_partition_patches() {
        for order in [ConcatOrder::RowMajor, ConcatOrder::ColumnMajor] {
            let mut seen: Vec<usize> = aggregator(order).groups().concat();
            seen.sort_unstable();
            assert_eq!(seen, (0..16).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_concat_groups_order() {
        let agg = aggregator(ConcatOrder::RowMajor);
        let features: Vec<Vec<f32>> = (0..16).map(|i| vec![i as f32, -(i as f32)]).collect();
        let groups = agg
            .concat_groups(&features)
            .map_or_else(|e| panic!("{e}"), |g| g);
        assert_eq!(groups.len(), 4);
        assert_eq!(groups[1], vec![2.0, -2.0, 3.0, -3.0, 6.0, -6.0, 7.0, -7.0]);
    }

    #[test]
    fn test_concat_groups_rejects_wrong_count() {
        let agg = aggregator(ConcatOrder::RowMajor);
        assert!(matches!(
            agg.concat_groups(&vec![vec![0.0]; 15]),
            Err(PatchNetError::Shape(_))
        ));
    }

    #[test]
    fn test_aggregate_applies_shared_layer() {
        let agg = aggregator(ConcatOrder::RowMajor);
        // Sums its 4 one-wide inputs
        let layer = SharedLinear::new(
            vec![1.0; 4],
            vec![-10.0],
            LayerShape {
                out_features: 1,
                in_features: 4,
            },
            Activation::Relu,
        )
        .map_or_else(|e| panic!("{e}"), |l| l);
        let features: Vec<Vec<f32>> = (0..16).map(|i| vec![i as f32]).collect();
        let out = agg
            .aggregate(&features, &layer)
            .map_or_else(|e| panic!("{e}"), |o| o);
        // sums 10, 18, 42, 50 minus 10
        assert_eq!(out, vec![vec![0.0], vec![8.0], vec![32.0], vec![40.0]]);
    }

    #[test]
    fn test_new_rejects_uneven_groups() {
        assert!(HierarchicalAggregator::new(4, 3, ConcatOrder::RowMajor).is_err());
        assert!(HierarchicalAggregator::new(4, 0, ConcatOrder::RowMajor).is_err());
    }
}
