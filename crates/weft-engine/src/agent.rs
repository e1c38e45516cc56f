//! The agent seam.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use weft_workflow::NodeContext;

use crate::services::ServiceContainer;

/// What a node's agent produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum AgentOutcome {
  Success(Value),
  Failure(String),
}

impl AgentOutcome {
  pub fn is_success(&self) -> bool {
    matches!(self, AgentOutcome::Success(_))
  }
}

/// Everything an agent sees when it runs.
pub struct AgentInput<'a> {
  pub node: &'a str,
  pub agent_type: &'a str,
  /// State values named by the node's input fields.
  pub inputs: &'a Map<String, Value>,
  /// The node prompt rendered against `inputs`.
  pub prompt: Option<&'a str>,
  pub context: &'a NodeContext,
  pub services: &'a ServiceContainer,
}

/// A processing step implementation.
#[async_trait]
pub trait Agent: Send + Sync {
  async fn run(&self, input: AgentInput<'_>) -> AgentOutcome;
}

/// A live agent bound to a node, stored in the node's runtime slot.
#[derive(Clone)]
pub struct AgentInstance {
  pub agent_type: String,
  pub implementation: String,
  pub agent: Arc<dyn Agent>,
  pub services: Arc<ServiceContainer>,
}

impl std::fmt::Debug for AgentInstance {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AgentInstance")
      .field("agent_type", &self.agent_type)
      .field("implementation", &self.implementation)
      .field("services", &self.services.names())
      .finish()
  }
}
