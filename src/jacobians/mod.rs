//! Per-layer second-order propagation.
//!
//! Each layer kind has one [`Jacobian`] strategy that pushes a batch of
//! direction vectors from the layer's output side to its input side and
//! reports the layer's own second-derivative term. Strategies are stateless; everything they
//! read arrives through a [`LayerState`].

pub mod elementwise;
pub mod linear;
pub mod registry;

pub use elementwise::ElementwiseJacobian;
pub use linear::LinearJacobian;
pub use registry::{default_registry, JacobianRegistry, RegistryBuilder};

use crate::error::Result;
use crate::utils::directional::DirectionalMatrix;
use crate::utils::mat::Matrix;
use crate::utils::nn_trait::{LayerKind, LayerState};

pub trait Jacobian: Send + Sync {
    /// The single layer kind this strategy applies to.
    fn kind(&self) -> LayerKind;

    /// Multiplies the transposed local Jacobian onto every direction of
    /// `mat`, mapping `(batch, out_dim, directions)` to
    /// `(batch, in_dim, directions)`.
    fn jac_mat_prod(&self, state: &LayerState<'_>, mat: &DirectionalMatrix)
        -> Result<DirectionalMatrix>;

    /// The layer's own curvature contribution at its input, given one
    /// output-side vector of shape `(batch, out_dim)`.
    fn hessian_diagonal(&self, state: &LayerState<'_>, mat: &Matrix) -> Result<Matrix>;

    /// True when the layer's second derivative vanishes, so callers may skip
    /// [`Jacobian::hessian_diagonal`].
    fn hessian_is_zero(&self) -> bool {
        false
    }
}
