//! Engine errors.

/// Errors that can occur while binding or executing a graph.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  /// An agent type has no declaration in the registry.
  #[error("no declaration for agent type '{agent_type}'")]
  MissingDeclaration { agent_type: String },

  /// No constructor is registered for an implementation id.
  #[error("no {kind} implementation registered for '{implementation}'")]
  UnknownImplementation {
    kind: &'static str,
    implementation: String,
  },

  /// A service could not be constructed.
  #[error("failed to create service '{service}': {message}")]
  ServiceCreation { service: String, message: String },

  /// An agent requires a service that was not created.
  #[error("service '{service}' required by agent type '{agent_type}' is unavailable")]
  ServiceUnavailable { service: String, agent_type: String },

  /// Service declarations could not be ordered.
  #[error(transparent)]
  Registry(#[from] weft_registry::RegistryError),

  /// The graph has no usable entry point.
  #[error("graph '{graph}' has no entry point")]
  NoEntryPoint { graph: String },

  /// An edge points at a node that does not exist.
  #[error("node '{node}' not found in graph '{graph}'")]
  NodeNotFound { graph: String, node: String },

  /// A node has no bound agent instance.
  #[error("node '{node}' has no agent instance bound")]
  NotInstantiated { node: String },

  /// An edge references a routing function that is not registered.
  #[error("unknown routing function '{function}'")]
  UnknownRouteFunction { function: String },

  /// The step limit was hit, usually because of a cycle.
  #[error("graph '{graph}' exceeded the limit of {max_steps} steps")]
  MaxStepsExceeded { graph: String, max_steps: usize },
}
