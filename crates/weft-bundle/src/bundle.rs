use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use weft_registry::DeclarationRegistry;
use weft_workflow::{Graph, Node};

/// Current on-disk bundle format.
pub const BUNDLE_FORMAT: u32 = 1;

/// The persisted compilation of one workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphBundle {
  pub graph_name: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub entry_point: Option<String>,

  /// Nodes with all runtime state removed.
  pub nodes: BTreeMap<String, Node>,

  /// Agent types used by the nodes.
  pub required_agents: BTreeSet<String>,

  /// Declared services the agents need, transitively.
  pub required_services: BTreeSet<String>,

  /// Custom agent type to implementation id.
  #[serde(default)]
  pub agent_mappings: BTreeMap<String, String>,

  /// Agent types the registry had no declaration for.
  #[serde(default)]
  pub missing_declarations: BTreeSet<String>,

  #[serde(default)]
  pub custom_agents: BTreeSet<String>,

  /// Inline routing function name to implementation id.
  #[serde(default)]
  pub function_mappings: BTreeMap<String, String>,

  #[serde(default)]
  pub protocols: BTreeSet<String>,

  pub csv_hash: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version_hash: Option<String>,

  /// `required_services` ordered so dependencies come first.
  #[serde(default)]
  pub service_load_order: Vec<String>,

  pub created_at: DateTime<Utc>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_updated: Option<DateTime<Utc>>,

  #[serde(default = "default_format")]
  pub bundle_format: u32,
}

fn default_format() -> u32 {
  BUNDLE_FORMAT
}

impl GraphBundle {
  /// Rebuild the executable graph from the bundle.
  pub fn to_graph(&self) -> Graph {
    Graph {
      name: self.graph_name.clone(),
      entry_point: self.entry_point.clone(),
      nodes: self.nodes.clone(),
    }
  }

  /// Check the bundle's structural invariants against a registry.
  ///
  /// Returns a description of every violation found.
  pub fn invariant_violations(&self, registry: &DeclarationRegistry) -> Vec<String> {
    let mut violations = Vec::new();

    for agent_type in self.agent_mappings.keys() {
      if !self.required_agents.contains(agent_type) {
        violations.push(format!("mapped agent '{}' is not required", agent_type));
      }
      if self.missing_declarations.contains(agent_type) {
        violations.push(format!("agent '{}' is both mapped and missing", agent_type));
      }
    }

    let listed: BTreeSet<&String> = self.service_load_order.iter().collect();
    let required: BTreeSet<&String> = self.required_services.iter().collect();
    if listed != required || listed.len() != self.service_load_order.len() {
      violations.push(format!(
        "service load order {:?} does not cover required services {:?}",
        self.service_load_order, self.required_services
      ));
    }

    for (position, service) in self.service_load_order.iter().enumerate() {
      let Some(declaration) = registry.get_service_declaration(service) else {
        continue;
      };
      for dependency in &declaration.depends_on {
        let dependency_position = self.service_load_order.iter().position(|s| s == dependency);
        if let Some(dependency_position) = dependency_position
          && dependency_position > position
        {
          violations.push(format!(
            "service '{}' is loaded before its dependency '{}'",
            service, dependency
          ));
        }
      }
    }

    for node in self.nodes.values() {
      if node.context.has_runtime() {
        violations.push(format!("node '{}' carries runtime state", node.name));
      }
    }

    violations
  }
}
