use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use weft_config::NodeSpec;

use crate::context::NodeContext;
use crate::edge::EdgeLabel;

/// A single processing step of a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
  pub name: String,
  pub agent_type: String,
  #[serde(default)]
  pub context: NodeContext,
  #[serde(default)]
  pub inputs: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub prompt: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default)]
  pub edges: BTreeMap<EdgeLabel, String>,
}

impl Node {
  pub fn new(name: impl Into<String>, agent_type: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      agent_type: agent_type.into(),
      context: NodeContext::default(),
      inputs: Vec::new(),
      output: None,
      prompt: None,
      description: None,
      edges: BTreeMap::new(),
    }
  }

  /// Convert a table row, wiring whichever edge references it carries.
  pub fn from_spec(spec: &NodeSpec) -> Self {
    let mut edges = BTreeMap::new();
    if let Some(next) = &spec.next_node {
      edges.insert(EdgeLabel::Default, next.clone());
    }
    if let Some(next) = &spec.success_next {
      edges.insert(EdgeLabel::Success, next.clone());
    }
    if let Some(next) = &spec.failure_next {
      edges.insert(EdgeLabel::Failure, next.clone());
    }

    Self {
      name: spec.name.clone(),
      agent_type: spec.agent_type.clone(),
      context: NodeContext::new(spec.context.clone()),
      inputs: spec.input_fields.clone(),
      output: spec.output_field.clone(),
      prompt: spec.prompt.clone(),
      description: spec.description.clone(),
      edges,
    }
  }

  pub fn with_edge(mut self, label: EdgeLabel, target: impl Into<String>) -> Self {
    self.edges.insert(label, target.into());
    self
  }

  pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.inputs = inputs.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_output(mut self, output: impl Into<String>) -> Self {
    self.output = Some(output.into());
    self
  }

  pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
    self.prompt = Some(prompt.into());
    self
  }

  pub fn edge(&self, label: EdgeLabel) -> Option<&str> {
    self.edges.get(&label).map(String::as_str)
  }

  /// The edge taken after the node finishes.
  ///
  /// A dedicated success or failure edge wins; otherwise the unconditional
  /// edge is followed.
  pub fn next_edge(&self, success: bool) -> Option<(EdgeLabel, &str)> {
    let label = if success {
      EdgeLabel::Success
    } else {
      EdgeLabel::Failure
    };
    self
      .edge(label)
      .map(|target| (label, target))
      .or_else(|| self.edge(EdgeLabel::Default).map(|t| (EdgeLabel::Default, t)))
  }

  /// A deep copy with runtime state removed, safe to persist.
  pub fn stripped(&self) -> Self {
    Self {
      context: self.context.stripped(),
      ..self.clone()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_from_spec_wires_all_edges() {
    let mut spec = NodeSpec::new("flow", "a", 2);
    spec.next_node = Some("c".to_string());
    spec.success_next = Some("b".to_string());
    spec.failure_next = Some("err".to_string());

    let node = Node::from_spec(&spec);
    assert_eq!(node.edge(EdgeLabel::Default), Some("c"));
    assert_eq!(node.edge(EdgeLabel::Success), Some("b"));
    assert_eq!(node.edge(EdgeLabel::Failure), Some("err"));
  }

  #[test]
  fn test_next_edge_falls_back_to_default() {
    let node = Node::new("a", "echo")
      .with_edge(EdgeLabel::Success, "b")
      .with_edge(EdgeLabel::Default, "c");

    assert_eq!(node.next_edge(true), Some((EdgeLabel::Success, "b")));
    assert_eq!(node.next_edge(false), Some((EdgeLabel::Default, "c")));
    assert_eq!(Node::new("z", "echo").next_edge(true), None);
  }
}
