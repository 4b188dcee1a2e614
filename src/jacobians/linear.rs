use crate::error::{Error, Result};
use crate::jacobians::Jacobian;
use crate::utils::directional::DirectionalMatrix;
use crate::utils::mat::Matrix;
use crate::utils::nn_trait::{LayerKind, LayerState};
use rayon::prelude::*;
use tracing::trace;

/// Strategy for the affine layer. Its Jacobian is the weight matrix at every
/// operating point, so only the weight is read.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearJacobian;

impl LinearJacobian {
    fn check_features(
        op: &'static str,
        weight: &Matrix,
        batch: usize,
        features: usize,
        directions: usize,
    ) -> Result<()> {
        let (out_dim, _) = weight.shape();
        if features != out_dim {
            return Err(Error::ShapeMismatch {
                op,
                expected: vec![batch, out_dim, directions],
                got: vec![batch, features, directions],
            });
        }
        Ok(())
    }
}

impl Jacobian for LinearJacobian {
    fn kind(&self) -> LayerKind {
        LayerKind::Linear
    }

    /// `out[b, :, c] = weightᵀ · mat[b, :, c]`; batch and direction axes are
    /// carried through untouched.
    fn jac_mat_prod(
        &self,
        state: &LayerState<'_>,
        mat: &DirectionalMatrix,
    ) -> Result<DirectionalMatrix> {
        let weight = state.weight()?;
        let (batch, features, directions) = mat.shape();
        Self::check_features("linear jac_mat_prod", weight, batch, features, directions)?;
        trace!(shape = ?mat.shape(), "linear jac_mat_prod");

        let (out_dim, in_dim) = weight.shape();
        let mut ret = DirectionalMatrix::new(batch, in_dim, directions);
        let (src_len, dst_len) = (mat.sample_len(), ret.sample_len());
        if src_len == 0 || dst_len == 0 {
            return Ok(ret);
        }
        ret.as_mut_slice()
            .par_chunks_mut(dst_len)
            .zip(mat.as_slice().par_chunks(src_len))
            .for_each(|(dst, src)| {
                for i in 0..out_dim {
                    let w = weight.row(i);
                    let v = &src[i * directions..(i + 1) * directions];
                    for (j, &wij) in w.iter().enumerate() {
                        let out = &mut dst[j * directions..(j + 1) * directions];
                        for (o, x) in out.iter_mut().zip(v) {
                            *o += wij * x;
                        }
                    }
                }
            });
        Ok(ret)
    }

    /// Always zero; only validates the seed width.
    fn hessian_diagonal(&self, state: &LayerState<'_>, mat: &Matrix) -> Result<Matrix> {
        let weight = state.weight()?;
        let (batch, features) = mat.shape();
        Self::check_features("linear hessian_diagonal", weight, batch, features, 1)?;
        Ok(Matrix::new(batch, weight.shape().1))
    }

    fn hessian_is_zero(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagonal_weight_scenario() {
        let weight = Matrix::from_rows(&[vec![1.0, 0.0], vec![0.0, 2.0]]).unwrap();
        let state = LayerState::new(LayerKind::Linear).with_weight(&weight);
        let mat = DirectionalMatrix::from_vec(1, 2, 1, vec![3.0, 4.0]).unwrap();
        let out = LinearJacobian.jac_mat_prod(&state, &mat).unwrap();
        assert_eq!(out.shape(), (1, 2, 1));
        assert_eq!(out.as_slice(), &[3.0, 8.0]);
    }

    #[test]
    fn test_maps_out_dim_to_in_dim() {
        // out_dim = 2, in_dim = 3
        let weight = Matrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![-1.0, 0.0, 1.0]]).unwrap();
        let state = LayerState::new(LayerKind::Linear).with_weight(&weight);
        let mat = DirectionalMatrix::from_vec(
            2,
            2,
            2,
            vec![1.0, 0.0, 0.0, 1.0, 2.0, 1.0, 1.0, -1.0],
        )
        .unwrap();
        let out = LinearJacobian.jac_mat_prod(&state, &mat).unwrap();
        assert_eq!(out.shape(), (2, 3, 2));

        let wt = weight.T();
        for b in 0..2 {
            for c in 0..2 {
                for j in 0..3 {
                    let expected: f32 = (0..2).map(|i| wt.at(j, i) * mat.at(b, i, c)).sum();
                    assert_eq!(out.at(b, j, c), expected);
                }
            }
        }
    }

    #[test]
    fn test_ignores_gradients() {
        let weight = Matrix::from_rows(&[vec![0.5, -1.0], vec![2.0, 1.0]]).unwrap();
        let grad_a = Matrix::from_rows(&[vec![1.0, 2.0]]).unwrap();
        let grad_b = Matrix::from_rows(&[vec![-9.0, 7.0]]).unwrap();
        let mat = DirectionalMatrix::from_vec(1, 2, 1, vec![1.0, 3.0]).unwrap();

        let plain = LayerState::new(LayerKind::Linear).with_weight(&weight);
        let with_a = plain.with_grad_input(&grad_a).with_grad_output(&grad_a);
        let with_b = plain.with_grad_input(&grad_b).with_grad_output(&grad_b);

        let out = LinearJacobian.jac_mat_prod(&plain, &mat).unwrap();
        assert_eq!(out, LinearJacobian.jac_mat_prod(&with_a, &mat).unwrap());
        assert_eq!(out, LinearJacobian.jac_mat_prod(&with_b, &mat).unwrap());
    }

    #[test]
    fn test_shape_mismatch() {
        let weight = Matrix::new(2, 3);
        let state = LayerState::new(LayerKind::Linear).with_weight(&weight);
        let mat = DirectionalMatrix::new(1, 3, 1);
        assert!(matches!(
            LinearJacobian.jac_mat_prod(&state, &mat),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_weight() {
        let state = LayerState::new(LayerKind::Linear);
        let mat = DirectionalMatrix::new(1, 2, 1);
        assert!(matches!(
            LinearJacobian.jac_mat_prod(&state, &mat),
            Err(Error::MissingState { .. })
        ));
    }

    #[test]
    fn test_hessian_is_zero() {
        assert!(LinearJacobian.hessian_is_zero());
        let weight = Matrix::new(2, 3);
        let state = LayerState::new(LayerKind::Linear).with_weight(&weight);
        let h = LinearJacobian.hessian_diagonal(&state, &Matrix::new(4, 2)).unwrap();
        assert_eq!(h.shape(), (4, 3));
        assert!(h.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_hessian_diagonal_rejects_wrong_seed_width() {
        let weight = Matrix::new(2, 3);
        let state = LayerState::new(LayerKind::Linear).with_weight(&weight);
        assert!(matches!(
            LinearJacobian.hessian_diagonal(&state, &Matrix::new(4, 3)),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
