use std::collections::BTreeMap;

use sprs::{CsMat, CsVecView, TriMat};

/// Row-major sparse matrix of span features.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    inner: CsMat<f32>,
}

impl FeatureMatrix {
    /// Build from per-row `column -> value` maps. Columns past `n_features` are dropped.
    pub fn from_rows(n_features: usize, rows: &[BTreeMap<usize, f32>]) -> Self {
        let mut triplets = TriMat::new((rows.len(), n_features));
        for (row_idx, row) in rows.iter().enumerate() {
            for (&col, &value) in row.range(..n_features) {
                if value != 0.0 {
                    triplets.add_triplet(row_idx, col, value);
                }
            }
        }
        Self {
            inner: triplets.to_csr(),
        }
    }

    pub fn n_rows(&self) -> usize {
        self.inner.rows()
    }

    pub fn n_features(&self) -> usize {
        self.inner.cols()
    }

    pub fn nnz(&self) -> usize {
        self.inner.nnz()
    }

    pub fn rows(&self) -> impl Iterator<Item = CsVecView<'_, f32>> + '_ {
        self.inner.outer_iterator()
    }

    pub fn row(&self, index: usize) -> Option<CsVecView<'_, f32>> {
        self.inner.outer_view(index)
    }

    /// Non-zero entries as `(row, column, value)`, row-major.
    pub fn entries(&self) -> Vec<(usize, usize, f32)> {
        self.rows()
            .enumerate()
            .flat_map(|(row_idx, row)| {
                row.iter()
                    .map(move |(col, value)| (row_idx, col, *value))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

/// Dot product of a sparse row against dense weights; out-of-range columns count as zero.
pub fn sparse_dot(row: &CsVecView<'_, f32>, weights: impl Fn(usize) -> Option<f32>) -> f32 {
    row.iter()
        .map(|(col, value)| weights(col).map_or(0.0, |w| w * value))
        .sum()
}

/// Squared L2 norm of a sparse row.
pub fn squared_norm(row: &CsVecView<'_, f32>) -> f32 {
    row.iter().map(|(_, value)| value * value).sum()
}

/// Scale the values of `row` restricted to `cols >= offset` to unit L2 norm.
pub(super) fn l2_normalize_from(row: &mut BTreeMap<usize, f32>, offset: usize) {
    let norm: f32 = row
        .range(offset..)
        .map(|(_, value)| value * value)
        .sum::<f32>()
        .sqrt();
    if norm > 0.0 {
        for (_, value) in row.range_mut(offset..) {
            *value /= norm;
        }
    }
}
