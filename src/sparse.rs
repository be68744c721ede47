use crate::error::{RapmError, RapmResult};

/// Sparse vector over a fixed universe `[0, dim)`.
///
/// Indices are strictly increasing and every stored value is finite.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseVector {
    dim: usize,
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl SparseVector {
    /// Build from `(index, value)` pairs in any order.
    ///
    /// Duplicate indices are summed and explicit zeros are dropped.
    pub fn new(dim: usize, entries: impl IntoIterator<Item = (usize, f64)>) -> RapmResult<Self> {
        let mut entries: Vec<(usize, f64)> = entries.into_iter().collect();
        entries.sort_by_key(|(idx, _)| *idx);

        let mut indices = Vec::with_capacity(entries.len());
        let mut values: Vec<f64> = Vec::with_capacity(entries.len());
        for (idx, value) in entries {
            if idx >= dim {
                return Err(RapmError::DimensionMismatch { index: idx, dim });
            }
            if !value.is_finite() {
                return Err(RapmError::invalid(format!(
                    "non-finite feature value at index {idx}"
                )));
            }
            if indices.last() == Some(&idx) {
                if let Some(last) = values.last_mut() {
                    *last += value;
                }
            } else {
                indices.push(idx);
                values.push(value);
            }
        }

        let mut out = Self {
            dim,
            indices,
            values,
        };
        out.drop_zeros();
        Ok(out)
    }

    pub fn from_dense(values: &[f64]) -> RapmResult<Self> {
        Self::new(values.len(), values.iter().copied().enumerate())
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn is_zero(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    /// Dot product with a dense vector. Only nonzero coordinates are touched.
    pub fn dot(&self, dense: &[f64]) -> f64 {
        let mut out = 0.0;
        for (idx, value) in self.iter() {
            out += dense[idx] * value;
        }
        out
    }

    pub fn squared_norm(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum()
    }

    fn drop_zeros(&mut self) {
        let mut keep = 0;
        for i in 0..self.indices.len() {
            if self.values[i] != 0.0 {
                self.indices[keep] = self.indices[i];
                self.values[keep] = self.values[i];
                keep += 1;
            }
        }
        self.indices.truncate(keep);
        self.values.truncate(keep);
    }
}

/// One labeled observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Example {
    pub features: SparseVector,
    pub label: f64,
}

impl Example {
    pub fn new(features: SparseVector, label: f64) -> Self {
        Self { features, label }
    }

    pub fn dense(values: &[f64], label: f64) -> RapmResult<Self> {
        Ok(Self::new(SparseVector::from_dense(values)?, label))
    }

    pub fn residual(&self, weights: &[f64]) -> f64 {
        self.features.dot(weights) - self.label
    }
}
