use crate::error::{Error, Result};
use crate::utils::directional::DirectionalMatrix;
use crate::utils::mat::Matrix;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag used to look up a layer's Jacobian strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Linear,
    Relu,
    Sigmoid,
    Tanh,
}

impl LayerKind {
    pub const ALL: [LayerKind; 4] = [
        LayerKind::Linear,
        LayerKind::Relu,
        LayerKind::Sigmoid,
        LayerKind::Tanh,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LayerKind::Linear => "linear",
            LayerKind::Relu => "relu",
            LayerKind::Sigmoid => "sigmoid",
            LayerKind::Tanh => "tanh",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a Jacobian strategy may read from a layer.
///
/// Tensors are borrowed from the layer's caches for the current batch.
/// `weight` has shape `(out_dim, in_dim)`.
#[derive(Debug, Clone, Copy)]
pub struct LayerState<'a> {
    pub kind: LayerKind,
    pub weight: Option<&'a Matrix>,
    pub input: Option<&'a Matrix>,
    pub output: Option<&'a Matrix>,
    pub grad_input: Option<&'a Matrix>,
    pub grad_output: Option<&'a Matrix>,
}

impl<'a> LayerState<'a> {
    pub fn new(kind: LayerKind) -> Self {
        Self {
            kind,
            weight: None,
            input: None,
            output: None,
            grad_input: None,
            grad_output: None,
        }
    }

    pub fn with_weight(mut self, weight: &'a Matrix) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_input(mut self, input: &'a Matrix) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_output(mut self, output: &'a Matrix) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_grad_input(mut self, grad_input: &'a Matrix) -> Self {
        self.grad_input = Some(grad_input);
        self
    }

    pub fn with_grad_output(mut self, grad_output: &'a Matrix) -> Self {
        self.grad_output = Some(grad_output);
        self
    }

    fn require(&self, tensor: Option<&'a Matrix>, what: &'static str) -> Result<&'a Matrix> {
        tensor.ok_or_else(|| Error::MissingState {
            owner: format!("{} layer", self.kind),
            what,
        })
    }

    pub fn weight(&self) -> Result<&'a Matrix> {
        self.require(self.weight, "weight")
    }

    pub fn input(&self) -> Result<&'a Matrix> {
        self.require(self.input, "input")
    }

    pub fn output(&self) -> Result<&'a Matrix> {
        self.require(self.output, "output")
    }

    pub fn grad_output(&self) -> Result<&'a Matrix> {
        self.require(self.grad_output, "grad_output")
    }
}

pub trait Layer: Send + Sync {
    fn kind(&self) -> LayerKind;
    fn forward(&mut self, input: Matrix) -> Result<Matrix>;
    /// Takes the loss gradient w.r.t. the output, returns it w.r.t. the input.
    fn backward(&mut self, d_loss: Matrix) -> Result<Matrix>;
    fn state(&self) -> LayerState<'_>;
}

pub trait Head: Send + Sync {
    /// Per-sample loss, shape `(batch, 1)`.
    fn forward(&mut self, input: Matrix, target: Matrix) -> Result<Matrix>;
    /// Loss gradient w.r.t. the network output from the last `forward`.
    fn backward(&self) -> Result<Matrix>;
    /// Per-sample factor `S` of the loss Hessian w.r.t. the network output,
    /// `H = S Sᵀ`, shaped `(batch, out_features, k)`.
    fn sqrt_hessian(&self) -> Result<DirectionalMatrix>;
}
