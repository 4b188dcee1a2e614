//! Second-order extensions to a dense network's backward pass.
//!
//! For every supported layer kind a [`jacobians::Jacobian`] strategy pushes a
//! batch of direction vectors through the layer's local Jacobian and reports
//! the layer's own second-derivative term, without materialising the full
//! Jacobian. [`Network`] composes them into the diagonal of the loss Hessian
//! at every layer input. Strategies are looked up by [`LayerKind`] in a
//! [`JacobianRegistry`].

pub mod config;
pub mod error;
pub mod jacobians;
pub mod utils;

pub use config::SecondOrderConfig;
pub use error::{Error, Result};
pub use jacobians::{
    default_registry, ElementwiseJacobian, Jacobian, JacobianRegistry, LinearJacobian,
    RegistryBuilder,
};
pub use utils::activation::{Activation, ElementwiseLayer};
pub use utils::directional::DirectionalMatrix;
pub use utils::head::{LossKind, MeanSquaredError, SoftMaxCrossEntropy};
pub use utils::linear::LinearLayer;
pub use utils::mat::Matrix;
pub use utils::network::Network;
pub use utils::nn_trait::{Head, Layer, LayerKind, LayerState};
