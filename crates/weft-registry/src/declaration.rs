use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where a declaration came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclarationSource {
  Builtin,
  #[default]
  Custom,
}

/// Declares an agent type and the capabilities it needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDeclaration {
  pub agent_type: String,

  /// Opaque implementation id, resolved through the agent factory.
  pub implementation: String,

  #[serde(default)]
  pub source: DeclarationSource,

  /// Services the agent requires.
  #[serde(default)]
  pub services: BTreeSet<String>,

  /// Protocols the agent implements.
  #[serde(default)]
  pub protocols: BTreeSet<String>,

  /// Location of a custom agent's source, if known.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source_path: Option<PathBuf>,
}

impl AgentDeclaration {
  pub fn builtin(agent_type: impl Into<String>, implementation: impl Into<String>) -> Self {
    Self {
      agent_type: agent_type.into(),
      implementation: implementation.into(),
      source: DeclarationSource::Builtin,
      services: BTreeSet::new(),
      protocols: BTreeSet::new(),
      source_path: None,
    }
  }

  pub fn custom(agent_type: impl Into<String>, implementation: impl Into<String>) -> Self {
    Self {
      source: DeclarationSource::Custom,
      ..Self::builtin(agent_type, implementation)
    }
  }

  pub fn with_service(mut self, service: impl Into<String>) -> Self {
    self.services.insert(service.into());
    self
  }

  pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
    self.protocols.insert(protocol.into());
    self
  }

  pub fn is_custom(&self) -> bool {
    self.source == DeclarationSource::Custom
  }
}

/// Declares a service and the services it depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDeclaration {
  pub name: String,
  pub implementation: String,
  #[serde(default)]
  pub source: DeclarationSource,
  #[serde(default)]
  pub depends_on: BTreeSet<String>,
}

impl ServiceDeclaration {
  pub fn new(name: impl Into<String>, implementation: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      implementation: implementation.into(),
      source: DeclarationSource::Custom,
      depends_on: BTreeSet::new(),
    }
  }

  pub fn depends_on(mut self, service: impl Into<String>) -> Self {
    self.depends_on.insert(service.into());
    self
  }
}
