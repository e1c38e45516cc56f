use std::collections::HashMap;
use std::sync::Arc;

use crate::agent::Agent;
use crate::builtin::{BranchingAgent, DefaultAgent, EchoAgent, FailureAgent, SuccessAgent};
use crate::error::EngineError;

/// Builds a fresh agent.
pub type AgentConstructor = Arc<dyn Fn() -> Arc<dyn Agent> + Send + Sync>;

/// Maps agent implementation ids to constructors.
#[derive(Clone, Default)]
pub struct AgentFactory {
  constructors: HashMap<String, AgentConstructor>,
}

impl AgentFactory {
  pub fn new() -> Self {
    Self::default()
  }

  /// A factory with the built-in agents under `builtin.<type>`.
  pub fn with_builtins() -> Self {
    let mut factory = Self::new();
    factory.register("builtin.default", || Arc::new(DefaultAgent) as Arc<dyn Agent>);
    factory.register("builtin.echo", || Arc::new(EchoAgent) as Arc<dyn Agent>);
    factory.register("builtin.success", || Arc::new(SuccessAgent) as Arc<dyn Agent>);
    factory.register("builtin.failure", || Arc::new(FailureAgent) as Arc<dyn Agent>);
    factory.register("builtin.branching", || Arc::new(BranchingAgent) as Arc<dyn Agent>);
    factory
  }

  pub fn register<F>(&mut self, implementation: impl Into<String>, constructor: F)
  where
    F: Fn() -> Arc<dyn Agent> + Send + Sync + 'static,
  {
    self
      .constructors
      .insert(implementation.into(), Arc::new(constructor));
  }

  pub fn contains(&self, implementation: &str) -> bool {
    self.constructors.contains_key(implementation)
  }

  pub fn create(&self, implementation: &str) -> Result<Arc<dyn Agent>, EngineError> {
    self
      .constructors
      .get(implementation)
      .map(|constructor| constructor())
      .ok_or_else(|| EngineError::UnknownImplementation {
        kind: "agent",
        implementation: implementation.to_string(),
      })
  }
}
