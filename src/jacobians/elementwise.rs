use crate::error::{Error, Result};
use crate::jacobians::Jacobian;
use crate::utils::activation::Activation;
use crate::utils::directional::DirectionalMatrix;
use crate::utils::mat::Matrix;
use crate::utils::nn_trait::{LayerKind, LayerState};
use rayon::prelude::*;
use tracing::trace;

/// Scales every direction by the local derivative: `out[b, i, c] = df[b, i] * mat[b, i, c]`.
///
/// The Jacobian of a coordinate-wise map is diagonal, so no features mix.
pub fn jac_mat_prod(df: &Matrix, mat: &DirectionalMatrix) -> Result<DirectionalMatrix> {
    let (batch, features, directions) = mat.shape();
    if df.shape() != (batch, features) {
        return Err(Error::ShapeMismatch {
            op: "elementwise jac_mat_prod",
            expected: vec![batch, features],
            got: vec![df.shape().0, df.shape().1],
        });
    }
    let mut ret = DirectionalMatrix::new(batch, features, directions);
    let len = mat.sample_len();
    if len == 0 {
        return Ok(ret);
    }
    ret.as_mut_slice()
        .par_chunks_mut(len)
        .zip(mat.as_slice().par_chunks(len))
        .enumerate()
        .for_each(|(b, (dst, src))| {
            let d = df.row(b);
            for i in 0..features {
                let range = i * directions..(i + 1) * directions;
                for (o, v) in dst[range.clone()].iter_mut().zip(&src[range]) {
                    *o = d[i] * v;
                }
            }
        });
    Ok(ret)
}

/// Element-wise product of the local second derivative with one output-side
/// vector, both `(batch, features)`.
///
/// Nothing is clipped; non-finite values pass straight through.
pub fn hessian_diagonal(ddf: &Matrix, mat: &Matrix) -> Result<Matrix> {
    ddf.zip_map(mat, "elementwise hessian_diagonal", |a, b| a * b)
}

/// Strategy shared by all coordinate-wise nonlinearities.
#[derive(Debug, Clone, Copy)]
pub struct ElementwiseJacobian {
    activation: Activation,
}

impl ElementwiseJacobian {
    pub fn new(activation: Activation) -> Self {
        Self { activation }
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn first_derivative(&self, state: &LayerState<'_>) -> Result<Matrix> {
        let activation = self.activation;
        state.input()?.zip_map(state.output()?, "elementwise derivative", |x, y| {
            activation.derivative(x, y)
        })
    }

    pub fn second_derivative(&self, state: &LayerState<'_>) -> Result<Matrix> {
        let activation = self.activation;
        state.input()?.zip_map(state.output()?, "elementwise derivative", |x, y| {
            activation.second_derivative(x, y)
        })
    }
}

impl Jacobian for ElementwiseJacobian {
    fn kind(&self) -> LayerKind {
        self.activation.kind()
    }

    fn jac_mat_prod(
        &self,
        state: &LayerState<'_>,
        mat: &DirectionalMatrix,
    ) -> Result<DirectionalMatrix> {
        trace!(kind = %self.kind(), shape = ?mat.shape(), "elementwise jac_mat_prod");
        let df = self.first_derivative(state)?;
        jac_mat_prod(&df, mat)
    }

    fn hessian_diagonal(&self, state: &LayerState<'_>, mat: &Matrix) -> Result<Matrix> {
        trace!(kind = %self.kind(), shape = ?mat.shape(), "elementwise hessian_diagonal");
        let ddf = self.second_derivative(state)?;
        hessian_diagonal(&ddf, mat)
    }

    fn hessian_is_zero(&self) -> bool {
        self.activation == Activation::Relu
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_for<'a>(
        activation: Activation,
        input: &'a Matrix,
        output: &'a Matrix,
    ) -> LayerState<'a> {
        LayerState::new(activation.kind())
            .with_input(input)
            .with_output(output)
    }

    #[test]
    fn test_jac_mat_prod_scales_single_direction() {
        let df = Matrix::from_rows(&[vec![2.0, 0.5]]).unwrap();
        let mat = DirectionalMatrix::from_vec(1, 2, 1, vec![1.0, 1.0]).unwrap();
        let out = jac_mat_prod(&df, &mat).unwrap();
        assert_eq!(out.shape(), (1, 2, 1));
        assert_eq!(out.as_slice(), &[2.0, 0.5]);
    }

    #[test]
    fn test_jac_mat_prod_no_cross_feature_mixing() {
        let df = Matrix::from_rows(&[vec![1.0, -2.0, 3.0], vec![0.5, 0.0, 4.0]]).unwrap();
        let data: Vec<f32> = (0..2 * 3 * 4).map(|v| v as f32 - 7.0).collect();
        let mat = DirectionalMatrix::from_vec(2, 3, 4, data).unwrap();
        let out = jac_mat_prod(&df, &mat).unwrap();
        assert_eq!(out.shape(), mat.shape());
        for b in 0..2 {
            for i in 0..3 {
                for c in 0..4 {
                    assert_eq!(out.at(b, i, c), df.at(b, i) * mat.at(b, i, c));
                }
            }
        }
    }

    #[test]
    fn test_jac_mat_prod_shape_mismatch() {
        let df = Matrix::new(1, 3);
        let mat = DirectionalMatrix::new(1, 2, 1);
        assert!(matches!(
            jac_mat_prod(&df, &mat),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_hessian_diagonal_propagates_non_finite() {
        let ddf = Matrix::from_rows(&[vec![f32::INFINITY, 2.0]]).unwrap();
        let mat = Matrix::from_rows(&[vec![1.0, 3.0]]).unwrap();
        let out = hessian_diagonal(&ddf, &mat).unwrap();
        assert!(out.at(0, 0).is_infinite());
        assert_eq!(out.at(0, 1), 6.0);
    }

    #[test]
    fn test_strategy_uses_cached_activations() {
        let input = Matrix::from_rows(&[vec![-1.0, 2.0]]).unwrap();
        let output = input.map(|x| Activation::Relu.apply(x));
        let state = state_for(Activation::Relu, &input, &output);
        let strategy = ElementwiseJacobian::new(Activation::Relu);

        let mat = DirectionalMatrix::from_vec(1, 2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let out = strategy.jac_mat_prod(&state, &mat).unwrap();
        assert_eq!(out.as_slice(), &[0.0, 0.0, 3.0, 4.0]);
        assert!(strategy.hessian_is_zero());
    }

    #[test]
    fn test_sigmoid_hessian_diagonal() {
        let input = Matrix::from_rows(&[vec![0.0, 1.0]]).unwrap();
        let output = input.map(|x| Activation::Sigmoid.apply(x));
        let state = state_for(Activation::Sigmoid, &input, &output);
        let strategy = ElementwiseJacobian::new(Activation::Sigmoid);
        assert!(!strategy.hessian_is_zero());

        let grad_output = Matrix::from_rows(&[vec![1.0, 1.0]]).unwrap();
        let out = strategy.hessian_diagonal(&state, &grad_output).unwrap();
        let s = output.at(0, 1);
        assert_eq!(out.at(0, 0), 0.0);
        assert!((out.at(0, 1) - s * (1.0 - s) * (1.0 - 2.0 * s)).abs() < 1e-7);
    }

    #[test]
    fn test_missing_cache_is_reported() {
        let strategy = ElementwiseJacobian::new(Activation::Tanh);
        let state = LayerState::new(LayerKind::Tanh);
        let mat = DirectionalMatrix::new(1, 1, 1);
        assert!(matches!(
            strategy.jac_mat_prod(&state, &mat),
            Err(Error::MissingState { .. })
        ));
    }

    #[test]
    fn test_hessian_diagonal_rejects_wrong_seed_width() {
        let input = Matrix::from_rows(&[vec![0.5, -0.5]]).unwrap();
        let output = input.map(|x| Activation::Tanh.apply(x));
        let state = state_for(Activation::Tanh, &input, &output);
        let strategy = ElementwiseJacobian::new(Activation::Tanh);
        let seed = Matrix::new(1, 3);
        assert!(matches!(
            strategy.hessian_diagonal(&state, &seed),
            Err(Error::ShapeMismatch { .. })
        ));
        assert!(matches!(
            hessian_diagonal(&Matrix::new(1, 2), &seed),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
