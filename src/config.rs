//! Configuration for building a network and running one second-order pass.

use crate::error::{Error, Result};
use crate::utils::activation::Activation;
use crate::utils::head::LossKind;
use serde::{Deserialize, Serialize};

/// Network shape and batch settings.
///
/// # Example
///
/// ```
/// use secondorder::SecondOrderConfig;
///
/// let config = SecondOrderConfig::default()
///     .with_batch_size(8)
///     .with_hidden(vec![16, 16]);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecondOrderConfig {
    pub batch_size: usize,
    /// Number of direction vectors pushed through `jac_mat_prod`.
    pub num_directions: usize,
    pub seed: u32,
    pub in_features: usize,
    /// Widths of the hidden linear layers, each followed by `activation`.
    pub hidden: Vec<usize>,
    pub out_features: usize,
    pub activation: Activation,
    pub loss: LossKind,
}

impl Default for SecondOrderConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            num_directions: 4,
            seed: 0,
            in_features: 10,
            hidden: vec![7],
            out_features: 5,
            activation: Activation::Relu,
            loss: LossKind::CrossEntropy,
        }
    }
}

impl SecondOrderConfig {
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_num_directions(mut self, num_directions: usize) -> Self {
        self.num_directions = num_directions;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_features(mut self, in_features: usize, out_features: usize) -> Self {
        self.in_features = in_features;
        self.out_features = out_features;
        self
    }

    #[must_use]
    pub fn with_hidden(mut self, hidden: Vec<usize>) -> Self {
        self.hidden = hidden;
        self
    }

    #[must_use]
    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    #[must_use]
    pub fn with_loss(mut self, loss: LossKind) -> Self {
        self.loss = loss;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be positive".into()));
        }
        if self.num_directions == 0 {
            return Err(Error::InvalidConfig("num_directions must be positive".into()));
        }
        if self.in_features == 0 || self.out_features == 0 {
            return Err(Error::InvalidConfig(
                "in_features and out_features must be positive".into(),
            ));
        }
        if let Some(idx) = self.hidden.iter().position(|&w| w == 0) {
            return Err(Error::InvalidConfig(format!(
                "hidden layer {idx} has zero width"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SecondOrderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hidden, vec![7]);
        assert_eq!(config.activation, Activation::Relu);
    }

    #[test]
    fn test_builder() {
        let config = SecondOrderConfig::default()
            .with_batch_size(16)
            .with_num_directions(2)
            .with_seed(9)
            .with_features(4, 3)
            .with_activation(Activation::Tanh)
            .with_loss(LossKind::MeanSquaredError);
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.num_directions, 2);
        assert_eq!((config.in_features, config.out_features), (4, 3));
        assert_eq!(config.loss, LossKind::MeanSquaredError);
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        assert!(SecondOrderConfig::default().with_batch_size(0).validate().is_err());
        assert!(SecondOrderConfig::default().with_num_directions(0).validate().is_err());
        assert!(SecondOrderConfig::default().with_features(0, 1).validate().is_err());
        assert!(matches!(
            SecondOrderConfig::default().with_hidden(vec![4, 0]).validate(),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SecondOrderConfig =
            serde_json::from_str(r#"{"activation": "sigmoid", "loss": "mean_squared_error"}"#)
                .unwrap();
        assert_eq!(config.activation, Activation::Sigmoid);
        assert_eq!(config.loss, LossKind::MeanSquaredError);
        assert_eq!(config.batch_size, 3);
    }
}
