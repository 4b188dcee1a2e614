use crate::config::SecondOrderConfig;
use crate::error::{Error, Result};
use crate::jacobians::{default_registry, Jacobian, JacobianRegistry};
use crate::utils::activation::ElementwiseLayer;
use crate::utils::directional::DirectionalMatrix;
use crate::utils::linear::LinearLayer;
use crate::utils::mat::Matrix;
use crate::utils::nn_trait::{Head, Layer, LayerState};
use tracing::debug;

/// A layer sequence plus loss head, with reverse walks for first- and
/// second-order quantities.
pub struct Network<'r> {
    layers: Vec<Box<dyn Layer>>,
    loss_fn: Box<dyn Head>,
    registry: &'r JacobianRegistry,
}

impl Network<'static> {
    pub fn new(layers: Vec<Box<dyn Layer>>, loss_fn: Box<dyn Head>) -> Self {
        Self::with_registry(layers, loss_fn, default_registry())
    }

    /// `Linear -> activation` for every hidden width, then a final `Linear`.
    pub fn from_config(config: &SecondOrderConfig) -> Result<Self> {
        config.validate()?;
        let mut layers: Vec<Box<dyn Layer>> = Vec::with_capacity(2 * config.hidden.len() + 1);
        let mut width = config.in_features;
        let mut seed = config.seed;
        for &hidden in &config.hidden {
            layers.push(Box::new(LinearLayer::new(width, hidden, seed)));
            layers.push(Box::new(ElementwiseLayer::new(config.activation)));
            width = hidden;
            seed = seed.wrapping_add(2);
        }
        layers.push(Box::new(LinearLayer::new(width, config.out_features, seed)));
        Ok(Self::new(layers, config.loss.head()))
    }
}

impl<'r> Network<'r> {
    pub fn with_registry(
        layers: Vec<Box<dyn Layer>>,
        loss_fn: Box<dyn Head>,
        registry: &'r JacobianRegistry,
    ) -> Self {
        Self {
            layers,
            loss_fn,
            registry,
        }
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    pub fn forward(&mut self, mut x: Matrix) -> Result<Matrix> {
        for layer in self.layers.iter_mut() {
            x = layer.forward(x)?;
        }
        Ok(x)
    }

    pub fn calc_loss(&mut self, pred: Matrix, target: Matrix) -> Result<Matrix> {
        self.loss_fn.forward(pred, target)
    }

    /// First-order pass; every layer caches its input and output gradients.
    pub fn backward(&mut self) -> Result<Matrix> {
        let mut x = self.loss_fn.backward()?;
        for layer in self.layers.iter_mut().rev() {
            x = layer.backward(x)?;
        }
        Ok(x)
    }

    /// Factor of the loss Hessian at the network output.
    pub fn output_sqrt_hessian(&self) -> Result<DirectionalMatrix> {
        self.loss_fn.sqrt_hessian()
    }

    /// Pushes `mat`, shaped `(batch, out_features, directions)`, back to the
    /// network input through every layer's Jacobian.
    pub fn jac_mat_prod_backward(&self, mut mat: DirectionalMatrix) -> Result<DirectionalMatrix> {
        for (idx, layer) in self.layers.iter().enumerate().rev() {
            let strategy = self.registry.resolve(layer.as_ref())?;
            mat = strategy.jac_mat_prod(&layer.state(), &mat)?;
            debug!(layer = idx, kind = %layer.kind(), shape = ?mat.shape(), "jac_mat_prod");
        }
        Ok(mat)
    }

    /// Diagonal of the per-sample loss Hessian w.r.t. every layer input,
    /// given a factor `S` of the Hessian at the output (`H = S Sᵀ`).
    ///
    /// Entry `k` of the result belongs to the input of layer `k`. The factors
    /// travel upstream through `jac_mat_prod`; each layer whose strategy
    /// reports a non-zero Hessian adds its `hessian_diagonal(grad_output)`
    /// term as extra factors, which needs the gradients cached by
    /// [`Network::backward`].
    pub fn diag_hessian_backward(&self, sqrt_hessian: DirectionalMatrix) -> Result<Vec<Matrix>> {
        let mut factors = HessianFactors::new(sqrt_hessian);
        let mut diagonals = Vec::with_capacity(self.layers.len());
        for (idx, layer) in self.layers.iter().enumerate().rev() {
            let strategy = self.registry.resolve(layer.as_ref())?;
            let state = layer.state();
            factors = factors.jac_mat_prod(strategy, &state)?;
            if !strategy.hessian_is_zero() {
                let residual = strategy.hessian_diagonal(&state, state.grad_output()?)?;
                factors.add_residual(&residual);
            }
            let diag = factors.diagonal()?;
            debug!(
                layer = idx,
                kind = %layer.kind(),
                factors = factors.len(),
                mean = diag.mean(),
                "diag_hessian"
            );
            diagonals.push(diag);
        }
        diagonals.reverse();
        Ok(diagonals)
    }

    /// Diagonal pass seeded from the loss head.
    pub fn diag_hessian(&self) -> Result<Vec<Matrix>> {
        self.diag_hessian_backward(self.output_sqrt_hessian()?)
    }

    /// Number of output features, read from the last linear layer's cache.
    pub fn output_width(&self) -> Result<usize> {
        let last = self.layers.last().ok_or_else(|| Error::MissingState {
            owner: "network".into(),
            what: "layers",
        })?;
        let state = last.state();
        match state.weight {
            Some(weight) => Ok(weight.shape().0),
            None => Ok(state.output()?.shape().1),
        }
    }
}

/// Signed factorisation `H = S Sᵀ + Σ P Pᵀ - Σ N Nᵀ` of one layer's Hessian.
///
/// Second-derivative terms may be negative, so each one is split into a
/// positive and a negative diagonal factor.
struct HessianFactors {
    root: DirectionalMatrix,
    positive: Vec<DirectionalMatrix>,
    negative: Vec<DirectionalMatrix>,
}

impl HessianFactors {
    fn new(root: DirectionalMatrix) -> Self {
        Self {
            root,
            positive: Vec::new(),
            negative: Vec::new(),
        }
    }

    fn len(&self) -> usize {
        1 + self.positive.len() + self.negative.len()
    }

    fn jac_mat_prod(self, strategy: &dyn Jacobian, state: &LayerState<'_>) -> Result<Self> {
        let push = |factors: Vec<DirectionalMatrix>| -> Result<Vec<DirectionalMatrix>> {
            factors
                .iter()
                .map(|f| strategy.jac_mat_prod(state, f))
                .collect()
        };
        Ok(Self {
            root: strategy.jac_mat_prod(state, &self.root)?,
            positive: push(self.positive)?,
            negative: push(self.negative)?,
        })
    }

    fn add_residual(&mut self, residual: &Matrix) {
        // NaN fails both comparisons and lands in both factors
        let pos = residual.map(|r| if r < 0.0 { 0.0 } else { r.sqrt() });
        let neg = residual.map(|r| if r > 0.0 { 0.0 } else { (-r).sqrt() });
        if pos.as_slice().iter().any(|&v| v != 0.0) {
            self.positive.push(DirectionalMatrix::from_diagonal(&pos));
        }
        if neg.as_slice().iter().any(|&v| v != 0.0) {
            self.negative.push(DirectionalMatrix::from_diagonal(&neg));
        }
    }

    fn diagonal(&self) -> Result<Matrix> {
        let mut ret = self.root.gram_diagonal()?;
        for f in &self.positive {
            ret = ret.add(&f.gram_diagonal()?)?;
        }
        for f in &self.negative {
            ret = ret.zip_map(&f.gram_diagonal()?, "hessian factor diagonal", |a, b| a - b)?;
        }
        Ok(ret)
    }
}
