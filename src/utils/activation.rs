use crate::error::{Error, Result};
use crate::utils::mat::Matrix;
use crate::utils::nn_trait::{self, LayerKind, LayerState};
use serde::{Deserialize, Serialize};

/// Coordinate-wise nonlinearities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Relu,
    Sigmoid,
    Tanh,
}

impl Activation {
    pub fn kind(&self) -> LayerKind {
        match self {
            Activation::Relu => LayerKind::Relu,
            Activation::Sigmoid => LayerKind::Sigmoid,
            Activation::Tanh => LayerKind::Tanh,
        }
    }

    pub fn apply(&self, x: f32) -> f32 {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Tanh => x.tanh(),
        }
    }

    /// First derivative at input `x` with output `y = apply(x)`.
    pub fn derivative(&self, x: f32, y: f32) -> f32 {
        match self {
            Activation::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Sigmoid => y * (1.0 - y),
            Activation::Tanh => 1.0 - y * y,
        }
    }

    /// Second derivative at input `x` with output `y = apply(x)`.
    pub fn second_derivative(&self, _x: f32, y: f32) -> f32 {
        match self {
            Activation::Relu => 0.0,
            Activation::Sigmoid => y * (1.0 - y) * (1.0 - 2.0 * y),
            Activation::Tanh => -2.0 * y * (1.0 - y * y),
        }
    }
}

/// Layer applying an [`Activation`] to every coordinate.
pub struct ElementwiseLayer {
    activation: Activation,
    last_input: Option<Matrix>,
    last_output: Option<Matrix>,
    grad_input: Option<Matrix>,
    grad_output: Option<Matrix>,
}

impl ElementwiseLayer {
    pub fn new(activation: Activation) -> Self {
        Self {
            activation,
            last_input: None,
            last_output: None,
            grad_input: None,
            grad_output: None,
        }
    }

    pub fn relu() -> Self {
        Self::new(Activation::Relu)
    }

    pub fn sigmoid() -> Self {
        Self::new(Activation::Sigmoid)
    }

    pub fn tanh() -> Self {
        Self::new(Activation::Tanh)
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }
}

impl nn_trait::Layer for ElementwiseLayer {
    fn kind(&self) -> LayerKind {
        self.activation.kind()
    }

    fn forward(&mut self, input: Matrix) -> Result<Matrix> {
        let activation = self.activation;
        let output = input.map(|x| activation.apply(x));
        self.last_input = Some(input);
        self.last_output = Some(output.clone());
        Ok(output)
    }

    fn backward(&mut self, d_loss: Matrix) -> Result<Matrix> {
        let (input, output) = match (&self.last_input, &self.last_output) {
            (Some(input), Some(output)) => (input, output),
            _ => {
                return Err(Error::MissingState {
                    owner: format!("{} layer", self.activation.kind()),
                    what: "input",
                })
            }
        };
        let activation = self.activation;
        let df = input.zip_map(output, "elementwise backward", |x, y| {
            activation.derivative(x, y)
        })?;
        let grad_input = d_loss.hadamard(&df)?;
        self.grad_output = Some(d_loss);
        self.grad_input = Some(grad_input.clone());
        Ok(grad_input)
    }

    fn state(&self) -> LayerState<'_> {
        LayerState {
            kind: self.activation.kind(),
            weight: None,
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
    fn test_relu_forward_backward() {
        let mut layer = ElementwiseLayer::relu();
        let x = Matrix::from_rows(&[vec![-1.0, 0.0, 2.0]]).unwrap();
        let y = layer.forward(x).unwrap();
        assert_eq!(y.as_slice(), &[0.0, 0.0, 2.0]);

        let g = Matrix::from_rows(&[vec![5.0, 5.0, 5.0]]).unwrap();
        let dx = layer.backward(g).unwrap();
        assert_eq!(dx.as_slice(), &[0.0, 0.0, 5.0]);
    }

    #[test]
    fn test_backward_before_forward() {
        let mut layer = ElementwiseLayer::tanh();
        assert!(matches!(
            layer.backward(Matrix::new(1, 1)),
            Err(Error::MissingState { .. })
        ));
    }

    #[test]
    fn test_sigmoid_derivatives_at_zero() {
        let s = Activation::Sigmoid;
        let y = s.apply(0.0);
        assert_eq!(y, 0.5);
        assert_eq!(s.derivative(0.0, y), 0.25);
        assert_eq!(s.second_derivative(0.0, y), 0.0);
    }

    #[test]
    fn test_derivatives_match_finite_differences() {
        let h = 1e-3f32;
        for activation in [Activation::Sigmoid, Activation::Tanh] {
            for &x in &[-1.5f32, -0.3, 0.4, 1.2] {
                let y = activation.apply(x);
                let fd = (activation.apply(x + h) - activation.apply(x - h)) / (2.0 * h);
                assert!((fd - activation.derivative(x, y)).abs() < 1e-3);

                let d_plus = activation.derivative(x + h, activation.apply(x + h));
                let d_minus = activation.derivative(x - h, activation.apply(x - h));
                let fd2 = (d_plus - d_minus) / (2.0 * h);
                assert!((fd2 - activation.second_derivative(x, y)).abs() < 1e-2);
            }
        }
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(ElementwiseLayer::relu().kind(), LayerKind::Relu);
        assert_eq!(ElementwiseLayer::sigmoid().kind(), LayerKind::Sigmoid);
        assert_eq!(ElementwiseLayer::tanh().kind(), LayerKind::Tanh);
    }
}
