use crate::error::{Error, Result};
use crate::utils::mat::Matrix;
use crate::utils::nn_trait::{self, LayerKind, LayerState};

/// Affine layer `output = input · weightᵀ + bias`, weight shaped `(out, in)`.
pub struct LinearLayer {
    last_input: Option<Matrix>,
    last_output: Option<Matrix>,
    grad_input: Option<Matrix>,
    grad_output: Option<Matrix>,
    pub weight: Matrix,
    pub bias: Matrix,
}

impl LinearLayer {
    pub fn new(in_channels: usize, out_channels: usize, seed: u32) -> Self {
        let mut weight = Matrix::new(out_channels, in_channels);
        let mut bias = Matrix::new(1, out_channels);
        weight.normal_init(seed);
        bias.normal_init(seed.wrapping_add(1));
        Self::with_cache(weight, bias)
    }

    pub fn from_parts(weight: Matrix, bias: Matrix) -> Result<Self> {
        let (out_channels, _) = weight.shape();
        if bias.shape() != (1, out_channels) {
            return Err(Error::ShapeMismatch {
                op: "LinearLayer::from_parts",
                expected: vec![1, out_channels],
                got: vec![bias.shape().0, bias.shape().1],
            });
        }
        Ok(Self::with_cache(weight, bias))
    }

    fn with_cache(weight: Matrix, bias: Matrix) -> Self {
        Self {
            last_input: None,
            last_output: None,
            grad_input: None,
            grad_output: None,
            weight,
            bias,
        }
    }

    pub fn in_features(&self) -> usize {
        self.weight.shape().1
    }

    pub fn out_features(&self) -> usize {
        self.weight.shape().0
    }
}

impl nn_trait::Layer for LinearLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Linear
    }

    fn forward(&mut self, input: Matrix) -> Result<Matrix> {
        let (batch, features) = input.shape();
        if features != self.in_features() {
            return Err(Error::ShapeMismatch {
                op: "linear forward",
                expected: vec![batch, self.in_features()],
                got: vec![batch, features],
            });
        }
        let now = input.mul(&self.weight.T())?.add_with_vector(&self.bias)?;
        self.last_input = Some(input);
        self.last_output = Some(now.clone());
        Ok(now)
    }

    fn backward(&mut self, d_loss: Matrix) -> Result<Matrix> {
        let (batch, features) = d_loss.shape();
        if features != self.out_features() {
            return Err(Error::ShapeMismatch {
                op: "linear backward",
                expected: vec![batch, self.out_features()],
                got: vec![batch, features],
            });
        }
        let grad_input = d_loss.mul(&self.weight)?;
        self.grad_output = Some(d_loss);
        self.grad_input = Some(grad_input.clone());
        Ok(grad_input)
    }

    fn state(&self) -> LayerState<'_> {
        LayerState {
            kind: LayerKind::Linear,
            weight: Some(&self.weight),
            input: self.last_input.as_ref(),
            output: self.last_output.as_ref(),
            grad_input: self.grad_input.as_ref(),
            grad_output: self.grad_output.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::nn_trait::Layer;

    #[test]
    fn test_forward_backward() {
        let weight = Matrix::from_rows(&[vec![1.0, 2.0], vec![0.0, 1.0], vec![3.0, 0.0]]).unwrap();
        let bias = Matrix::from_rows(&[vec![1.0, 0.0, -1.0]]).unwrap();
        let mut layer = LinearLayer::from_parts(weight, bias).unwrap();
        assert_eq!((layer.in_features(), layer.out_features()), (2, 3));

        let x = Matrix::from_rows(&[vec![1.0, 1.0]]).unwrap();
        let y = layer.forward(x).unwrap();
        assert_eq!(y.as_slice(), &[4.0, 1.0, 2.0]);

        let g = Matrix::from_rows(&[vec![1.0, 1.0, 1.0]]).unwrap();
        let dx = layer.backward(g).unwrap();
        assert_eq!(dx.as_slice(), &[4.0, 3.0]);

        let state = layer.state();
        assert!(state.input.is_some() && state.grad_output.is_some());
    }

    #[test]
    fn test_forward_rejects_wrong_width() {
        let mut layer = LinearLayer::new(4, 2, 1);
        assert!(matches!(
            layer.forward(Matrix::new(1, 3)),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_from_parts_checks_bias() {
        assert!(LinearLayer::from_parts(Matrix::new(3, 2), Matrix::new(1, 2)).is_err());
    }
}
