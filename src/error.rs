//! Error types for second-order propagation.

use crate::utils::nn_trait::LayerKind;
use thiserror::Error;

/// Result type alias using the crate's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by layers, strategies and the registry.
///
/// None of these are recoverable; all of them surface a caller bug or a
/// missing registration.
#[derive(Error, Debug)]
pub enum Error {
    /// No Jacobian strategy registered for a layer's kind
    #[error("no Jacobian strategy registered for layer kind '{kind}'")]
    UnsupportedLayerKind { kind: LayerKind },

    /// Tensor dimensions inconsistent with the operation
    #[error("shape mismatch in {op}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        op: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// Two strategies claim the same layer kind
    #[error("duplicate Jacobian strategy registered for layer kind '{kind}'")]
    DuplicateRegistration { kind: LayerKind },

    /// A cached tensor was not available when needed
    #[error("{owner} has no cached {what}; run the forward/backward pass first")]
    MissingState { owner: String, what: &'static str },

    /// Invalid configuration parameter
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
