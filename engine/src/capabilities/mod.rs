pub mod clarify;
pub mod respond;

pub use clarify::ClarifyCapability;
pub use respond::RespondCapability;

use sdk::capability::Capability;
use sdk::errors::EngineError;
use sdk::types::RetryPolicy;
use std::sync::Arc;
use tracing::debug;

use crate::llm::Completer;

/// Registry of capabilities the conductor can place in a plan.
///
/// Order of registration is preserved and is the order the classifier reports
/// active capabilities in.
#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: Vec<Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding only the built-in `respond` and `clarify` capabilities.
    pub fn with_builtins(
        completer: Arc<dyn Completer>,
        retry: RetryPolicy,
    ) -> Result<Self, EngineError> {
        let mut registry = Self::new();
        registry.register(Arc::new(RespondCapability::new(completer, retry)))?;
        registry.register(Arc::new(ClarifyCapability::new()))?;
        Ok(registry)
    }

    /// Add a capability, rejecting duplicate names and capabilities that
    /// provide nothing without being terminal.
    pub fn register(&mut self, capability: Arc<dyn Capability>) -> Result<(), EngineError> {
        let name = capability.name().to_string();

        if name.trim().is_empty() {
            return Err(EngineError::InvalidCapability {
                name,
                reason: "name must not be empty".to_string(),
            });
        }

        if self.get(&name).is_some() {
            return Err(EngineError::DuplicateCapability(name));
        }

        if capability.provides().is_empty() && !capability.is_terminal() {
            return Err(EngineError::InvalidCapability {
                name,
                reason: "non-terminal capabilities must provide at least one context type"
                    .to_string(),
            });
        }

        debug!(
            capability = %name,
            provides = ?capability.provides(),
            terminal = capability.is_terminal(),
            "Registered capability"
        );
        self.capabilities.push(capability);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities
            .iter()
            .find(|c| c.name() == name)
            .map(Arc::clone)
    }

    /// Like [`get`](Self::get) but fails with `UnknownCapability`.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Capability>, EngineError> {
        self.get(name)
            .ok_or_else(|| EngineError::UnknownCapability(name.to_string()))
    }

    /// Capabilities in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Capability>> {
        self.capabilities.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.capabilities
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}
