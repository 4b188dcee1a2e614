use crate::error::{Error, Result};
use crate::utils::directional::DirectionalMatrix;
use crate::utils::mat::Matrix;
use crate::utils::nn_trait;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossKind {
    CrossEntropy,
    MeanSquaredError,
}

impl LossKind {
    pub fn head(&self) -> Box<dyn nn_trait::Head> {
        match self {
            LossKind::CrossEntropy => Box::new(SoftMaxCrossEntropy::new()),
            LossKind::MeanSquaredError => Box::new(MeanSquaredError::new()),
        }
    }
}

fn missing(owner: &str, what: &'static str) -> Error {
    Error::MissingState {
        owner: owner.to_string(),
        what,
    }
}

/// Softmax followed by cross-entropy against one-hot targets.
#[derive(Default)]
pub struct SoftMaxCrossEntropy {
    probs: Option<Matrix>,
    grad: Option<Matrix>,
}

impl SoftMaxCrossEntropy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl nn_trait::Head for SoftMaxCrossEntropy {
    fn forward(&mut self, input: Matrix, target: Matrix) -> Result<Matrix> {
        if input.shape() != target.shape() {
            return Err(Error::ShapeMismatch {
                op: "cross entropy forward",
                expected: vec![input.shape().0, input.shape().1],
                got: vec![target.shape().0, target.shape().1],
            });
        }
        let (h, w) = input.shape();
        let mut probs = input;
        let mut ret = Matrix::new(h, 1);
        if w > 0 {
            probs.par_rows_mut().for_each(|row| {
                let max_val = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                let mut sum = 0.0;
                for v in row.iter_mut() {
                    *v = (*v - max_val).exp();
                    sum += *v;
                }
                for v in row.iter_mut() {
                    *v /= sum;
                }
            });
        }
        for idx in 0..h {
            let mut loss = 0f32;
            for (&pred, &t) in probs.row(idx).iter().zip(target.row(idx)) {
                loss -= t * pred.max(1e-7).ln();
            }
            ret.set(idx, 0, loss);
        }
        self.grad = Some(probs.zip_map(&target, "cross entropy grad", |p, t| p - t)?);
        self.probs = Some(probs);
        Ok(ret)
    }

    fn backward(&self) -> Result<Matrix> {
        self.grad
            .clone()
            .ok_or_else(|| missing("softmax cross entropy", "grad"))
    }

    /// The Hessian w.r.t. the logits is `diag(p) - p pᵀ`. Its factor is
    /// `S[i, c] = (δ_ic - p_i) sqrt(p_c)`, which relies on `p` summing to one.
    fn sqrt_hessian(&self) -> Result<DirectionalMatrix> {
        let probs = self
            .probs
            .as_ref()
            .ok_or_else(|| missing("softmax cross entropy", "probabilities"))?;
        let (batch, classes) = probs.shape();
        let mut ret = DirectionalMatrix::new(batch, classes, classes);
        let len = ret.sample_len();
        if len == 0 {
            return Ok(ret);
        }
        ret.as_mut_slice()
            .par_chunks_mut(len)
            .enumerate()
            .for_each(|(b, dst)| {
                let p = probs.row(b);
                for i in 0..classes {
                    for c in 0..classes {
                        let delta = if i == c { 1.0 } else { 0.0 };
                        dst[i * classes + c] = (delta - p[i]) * p[c].sqrt();
                    }
                }
            });
        Ok(ret)
    }
}

/// Mean over features of the squared error, per sample.
#[derive(Default)]
pub struct MeanSquaredError {
    residual: Option<Matrix>,
}

impl MeanSquaredError {
    pub fn new() -> Self {
        Self::default()
    }
}

impl nn_trait::Head for MeanSquaredError {
    fn forward(&mut self, input: Matrix, target: Matrix) -> Result<Matrix> {
        let residual = input.zip_map(&target, "mse forward", |x, y| x - y)?;
        let (h, w) = residual.shape();
        let mut ret = Matrix::new(h, 1);
        for idx in 0..h {
            let sq: f32 = residual.row(idx).iter().map(|r| r * r).sum();
            ret.set(idx, 0, if w > 0 { sq / w as f32 } else { 0.0 });
        }
        self.residual = Some(residual);
        Ok(ret)
    }

    fn backward(&self) -> Result<Matrix> {
        let residual = self
            .residual
            .as_ref()
            .ok_or_else(|| missing("mean squared error", "residual"))?;
        let scale = 2.0 / residual.shape().1.max(1) as f32;
        Ok(residual.mul_with_numeric(scale))
    }

    /// `sqrt(2 / F)` times the identity.
    fn sqrt_hessian(&self) -> Result<DirectionalMatrix> {
        let residual = self
            .residual
            .as_ref()
            .ok_or_else(|| missing("mean squared error", "residual"))?;
        let scale = (2.0 / residual.shape().1.max(1) as f32).sqrt();
        Ok(DirectionalMatrix::from_diagonal(&residual.map(|_| scale)))
    }
}
