//! Callable capabilities ("tools").
//!
//! A capability takes JSON input and returns JSON output or a typed error.
//! Side-effecting capabilities may only be invoked while the run is in `act`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use agentrun_core::State;

/// Errors a capability can return.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("Capability not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Capability failed: {0}")]
    Failed(String),
}

/// A named operation the engine can invoke on a planner's behalf.
#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;

    /// Whether invoking this capability changes the outside world.
    fn side_effects(&self) -> bool {
        true
    }

    async fn invoke(&self, input: Value) -> Result<Value, CapabilityError>;
}

/// Capabilities available to a worker, indexed by name.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to add a capability. A later registration replaces an earlier one.
    pub fn with(mut self, capability: Arc<dyn Capability>) -> Self {
        self.register(capability);
        self
    }

    pub fn register(&mut self, capability: Arc<dyn Capability>) {
        self.capabilities
            .insert(capability.name().to_string(), capability);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Capability>> {
        self.capabilities.get(name)
    }

    /// Names the planner may call in `state`: everything in `act`, read-only
    /// capabilities elsewhere.
    pub fn allowed_for(&self, state: State) -> Vec<String> {
        let mut names: Vec<String> = self
            .capabilities
            .values()
            .filter(|c| state.allows_side_effects() || !c.side_effects())
            .map(|c| c.name().to_string())
            .collect();
        names.sort();
        names
    }
}

/// Read-only capability that returns its input.
pub struct EchoCapability;

#[async_trait]
impl Capability for EchoCapability {
    fn name(&self) -> &str {
        "echo"
    }

    fn side_effects(&self) -> bool {
        false
    }

    async fn invoke(&self, input: Value) -> Result<Value, CapabilityError> {
        Ok(json!({ "echo": input }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Write;

    #[async_trait]
    impl Capability for Write {
        fn name(&self) -> &str {
            "write_file"
        }

        async fn invoke(&self, _input: Value) -> Result<Value, CapabilityError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_allowed_for_filters_side_effects_outside_act() {
        let registry = CapabilityRegistry::new()
            .with(Arc::new(EchoCapability))
            .with(Arc::new(Write));

        assert_eq!(registry.allowed_for(State::Act), vec!["echo", "write_file"]);
        assert_eq!(registry.allowed_for(State::Explore), vec!["echo"]);
        assert_eq!(registry.allowed_for(State::Validate), vec!["echo"]);
    }

    #[tokio::test]
    async fn test_echo() {
        let out = EchoCapability.invoke(json!({"x": 1})).await.unwrap();
        assert_eq!(out, json!({"echo": {"x": 1}}));
    }
}
