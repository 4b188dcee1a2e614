use crate::error::{Error, Result};
use crate::jacobians::{ElementwiseJacobian, Jacobian, LinearJacobian};
use crate::utils::activation::Activation;
use crate::utils::nn_trait::{Layer, LayerKind};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Read-only map from layer kind to its Jacobian strategy.
pub struct JacobianRegistry {
    strategies: HashMap<LayerKind, Arc<dyn Jacobian>>,
}

/// Collects strategies; duplicates are rejected by [`RegistryBuilder::build`].
#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<Arc<dyn Jacobian>>,
}

impl RegistryBuilder {
    pub fn register<J: Jacobian + 'static>(self, strategy: J) -> Self {
        self.register_shared(Arc::new(strategy))
    }

    pub fn register_shared(mut self, strategy: Arc<dyn Jacobian>) -> Self {
        self.entries.push(strategy);
        self
    }

    pub fn build(self) -> Result<JacobianRegistry> {
        let mut strategies = HashMap::with_capacity(self.entries.len());
        for strategy in self.entries {
            match strategies.entry(strategy.kind()) {
                Entry::Occupied(entry) => {
                    return Err(Error::DuplicateRegistration { kind: *entry.key() })
                }
                Entry::Vacant(entry) => {
                    entry.insert(strategy);
                }
            }
        }
        debug!(kinds = strategies.len(), "built jacobian registry");
        Ok(JacobianRegistry { strategies })
    }
}

impl JacobianRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registry covering every [`LayerKind`].
    pub fn standard() -> Self {
        let strategies = LayerKind::ALL
            .iter()
            .map(|&kind| (kind, Self::standard_strategy(kind)))
            .collect();
        Self { strategies }
    }

    fn standard_strategy(kind: LayerKind) -> Arc<dyn Jacobian> {
        match kind {
            LayerKind::Linear => Arc::new(LinearJacobian),
            LayerKind::Relu => Arc::new(ElementwiseJacobian::new(Activation::Relu)),
            LayerKind::Sigmoid => Arc::new(ElementwiseJacobian::new(Activation::Sigmoid)),
            LayerKind::Tanh => Arc::new(ElementwiseJacobian::new(Activation::Tanh)),
        }
    }

    pub fn resolve(&self, layer: &dyn Layer) -> Result<&dyn Jacobian> {
        self.get(layer.kind())
    }

    pub fn get(&self, kind: LayerKind) -> Result<&dyn Jacobian> {
        self.strategies
            .get(&kind)
            .map(|strategy| strategy.as_ref())
            .ok_or(Error::UnsupportedLayerKind { kind })
    }

    pub fn contains(&self, kind: LayerKind) -> bool {
        self.strategies.contains_key(&kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<LayerKind> {
        let mut kinds: Vec<_> = self.strategies.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

/// Process-wide standard registry, built on first use.
pub fn default_registry() -> &'static JacobianRegistry {
    static REGISTRY: OnceLock<JacobianRegistry> = OnceLock::new();
    REGISTRY.get_or_init(JacobianRegistry::standard)
}
