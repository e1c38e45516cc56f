use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::edge::{EdgeLabel, EdgeTarget};
use crate::error::WorkflowError;
use crate::node::Node;

/// A resolved workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub entry_point: Option<String>,
  pub nodes: BTreeMap<String, Node>,
}

impl Graph {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      entry_point: None,
      nodes: BTreeMap::new(),
    }
  }

  /// Insert a node, replacing any node with the same name.
  pub fn add_node(&mut self, node: Node) {
    self.nodes.insert(node.name.clone(), node);
  }

  /// Get a node by name.
  pub fn get_node(&self, name: &str) -> Option<&Node> {
    self.nodes.get(name)
  }

  pub fn get_node_mut(&mut self, name: &str) -> Option<&mut Node> {
    self.nodes.get_mut(name)
  }

  /// Get a node by name or fail.
  pub fn node(&self, name: &str) -> Result<&Node, WorkflowError> {
    self
      .get_node(name)
      .ok_or_else(|| WorkflowError::NodeNotFound(name.to_string()))
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  /// Distinct agent types used by the graph.
  pub fn agent_types(&self) -> BTreeSet<String> {
    self.nodes.values().map(|n| n.agent_type.clone()).collect()
  }

  /// Node destinations reachable in one step from `name`.
  ///
  /// Routing-function edges are not included since their destination is
  /// only known at run time.
  pub fn downstream(&self, name: &str) -> Vec<(EdgeLabel, &str)> {
    self
      .get_node(name)
      .map(|node| {
        node
          .edges
          .iter()
          .filter_map(|(label, target)| match EdgeTarget::parse(target) {
            EdgeTarget::Node(to) => Some((*label, to)),
            EdgeTarget::Function(_) => None,
          })
          .collect()
      })
      .unwrap_or_default()
  }

  /// Nodes with an edge pointing at `name`.
  pub fn upstream(&self, name: &str) -> Vec<&str> {
    self
      .nodes
      .values()
      .filter(|n| {
        n.edges
          .values()
          .any(|target| EdgeTarget::parse(target) == EdgeTarget::Node(name))
      })
      .map(|n| n.name.as_str())
      .collect()
  }

  /// Names of inline routing functions referenced by any edge.
  pub fn function_names(&self) -> BTreeSet<String> {
    self
      .nodes
      .values()
      .flat_map(|n| n.edges.values())
      .filter_map(|target| match EdgeTarget::parse(target) {
        EdgeTarget::Function(name) => Some(name.to_string()),
        EdgeTarget::Node(_) => None,
      })
      .collect()
  }

  /// A deep copy with every node's runtime state removed.
  pub fn stripped(&self) -> Self {
    Self {
      name: self.name.clone(),
      entry_point: self.entry_point.clone(),
      nodes: self
        .nodes
        .iter()
        .map(|(name, node)| (name.clone(), node.stripped()))
        .collect(),
    }
  }
}
