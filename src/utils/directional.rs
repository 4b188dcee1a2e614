use crate::error::{Error, Result};
use crate::utils::mat::Matrix;
use rayon::prelude::*;

/// A batch of direction vectors, shape `(batch, features, directions)`.
///
/// Stored sample-major: each sample is a `features x directions` row-major
/// block, so `sample(b)[i * directions + c]` is entry `[b, i, c]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalMatrix {
    data: Vec<f32>,
    batch: usize,
    features: usize,
    directions: usize,
}

impl DirectionalMatrix {
    pub fn new(batch: usize, features: usize, directions: usize) -> Self {
        Self {
            data: vec![0.0; batch * features * directions],
            batch,
            features,
            directions,
        }
    }

    pub fn from_vec(
        batch: usize,
        features: usize,
        directions: usize,
        data: Vec<f32>,
    ) -> Result<Self> {
        if data.len() != batch * features * directions {
            return Err(Error::ShapeMismatch {
                op: "DirectionalMatrix::from_vec",
                expected: vec![batch * features * directions],
                got: vec![data.len()],
            });
        }
        Ok(Self {
            data,
            batch,
            features,
            directions,
        })
    }

    /// One `features x features` block per sample with `diag` on its
    /// diagonal, so that `S Sᵀ = diag(diag²)`.
    pub fn from_diagonal(diag: &Matrix) -> Self {
        let (batch, features) = diag.shape();
        let mut ret = Self::new(batch, features, features);
        for b in 0..batch {
            for (i, &v) in diag.row(b).iter().enumerate() {
                ret.set(b, i, i, v);
            }
        }
        ret
    }

    /// One identity block per sample; pushing it backward yields the full
    /// transposed Jacobian.
    pub fn identity(batch: usize, features: usize) -> Self {
        let mut ret = Self::new(batch, features, features);
        for b in 0..batch {
            for i in 0..features {
                ret.set(b, i, i, 1.0);
            }
        }
        ret
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.batch, self.features, self.directions)
    }

    pub fn sample_len(&self) -> usize {
        self.features * self.directions
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn at(&self, b: usize, i: usize, c: usize) -> f32 {
        self.data[(b * self.features + i) * self.directions + c]
    }

    pub fn set(&mut self, b: usize, i: usize, c: usize, val: f32) {
        self.data[(b * self.features + i) * self.directions + c] = val;
    }

    /// Diagonal of `S Sᵀ` per sample: `out[b, i] = sum_c self[b, i, c]^2`.
    pub fn gram_diagonal(&self) -> Result<Matrix> {
        if self.directions == 0 {
            return Ok(Matrix::new(self.batch, self.features));
        }
        let data: Vec<f32> = self
            .data
            .par_chunks(self.directions)
            .map(|row| row.iter().map(|v| v * v).sum::<f32>())
            .collect();
        Matrix::from_vec(self.batch, self.features, data)
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexing_layout() {
        let m = DirectionalMatrix::from_vec(2, 2, 3, (0..12).map(|v| v as f32).collect()).unwrap();
        assert_eq!(m.at(0, 1, 2), 5.0);
        assert_eq!(m.at(1, 0, 0), 6.0);
        assert_eq!(m.at(1, 1, 2), 11.0);
        assert_eq!(m.sample_len(), 6);
    }

    #[test]
    fn test_identity() {
        let m = DirectionalMatrix::identity(2, 3);
        assert_eq!(m.shape(), (2, 3, 3));
        assert_eq!(m.at(1, 2, 2), 1.0);
        assert_eq!(m.at(1, 2, 1), 0.0);
    }

    #[test]
    fn test_from_diagonal() {
        let diag = Matrix::from_rows(&[vec![3.0, -2.0]]).unwrap();
        let m = DirectionalMatrix::from_diagonal(&diag);
        assert_eq!(m.shape(), (1, 2, 2));
        assert_eq!(m.as_slice(), &[3.0, 0.0, 0.0, -2.0]);
        assert_eq!(m.gram_diagonal().unwrap().as_slice(), &[9.0, 4.0]);
    }

    #[test]
    fn test_gram_diagonal_sums_squares_over_directions() {
        let m = DirectionalMatrix::from_vec(2, 1, 3, vec![1.0, 2.0, 2.0, 0.0, -3.0, 4.0]).unwrap();
        let g = m.gram_diagonal().unwrap();
        assert_eq!(g.shape(), (2, 1));
        assert_eq!(g.as_slice(), &[9.0, 25.0]);

        let empty = DirectionalMatrix::new(2, 3, 0);
        assert_eq!(empty.gram_diagonal().unwrap(), Matrix::new(2, 3));
    }
}
