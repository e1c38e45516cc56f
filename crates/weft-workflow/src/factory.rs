//! Graph construction from table rows.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use weft_config::{GraphSpec, NodeSpec};

use crate::edge::{EdgeLabel, EdgeTarget};
use crate::error::WorkflowError;
use crate::graph::Graph;
use crate::node::Node;

/// A structural problem found while validating a graph.
///
/// Warnings never stop a graph from being built or compiled; a graph with
/// warnings may still fail at run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuralWarning {
  EmptyGraph,
  MissingEntryPoint,
  UnknownEntryPoint {
    entry_point: String,
  },
  DanglingEdge {
    from: String,
    label: EdgeLabel,
    to: String,
  },
}

impl fmt::Display for StructuralWarning {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StructuralWarning::EmptyGraph => f.write_str("graph has no nodes"),
      StructuralWarning::MissingEntryPoint => f.write_str("graph has no entry point"),
      StructuralWarning::UnknownEntryPoint { entry_point } => {
        write!(f, "entry point '{}' is not a node of the graph", entry_point)
      }
      StructuralWarning::DanglingEdge { from, label, to } => {
        write!(f, "edge {} -[{}]-> {} points to an unknown node", from, label, to)
      }
    }
  }
}

/// Builds [`Graph`]s from parsed table rows.
pub struct GraphFactory;

impl GraphFactory {
  /// Build a graph from the rows of one workflow.
  ///
  /// The entry point is the first row flagged as entry point, or the first
  /// row when none is flagged.
  pub fn build(name: &str, specs: &[NodeSpec]) -> Graph {
    let mut graph = Graph::new(name);

    for spec in specs {
      graph.add_node(Node::from_spec(spec));
    }

    graph.entry_point = specs
      .iter()
      .find(|s| s.entry_point)
      .or_else(|| specs.first())
      .map(|s| s.name.clone());

    debug!(
      graph = %name,
      nodes = graph.len(),
      entry_point = ?graph.entry_point,
      "built graph"
    );

    graph
  }

  /// Build the requested workflow, or the first one in the table.
  ///
  /// A requested workflow with no rows yields an empty graph.
  pub fn build_from_spec(spec: &GraphSpec, workflow: Option<&str>) -> Result<Graph, WorkflowError> {
    match workflow {
      Some(name) => Ok(Self::build(name, spec.nodes(name))),
      None => {
        let first = spec.first_workflow().ok_or(WorkflowError::NoWorkflows)?;
        Ok(Self::build(&first.name, &first.nodes))
      }
    }
  }

  /// Validate graph structure.
  pub fn validate(graph: &Graph) -> Vec<StructuralWarning> {
    let mut warnings = Vec::new();

    if graph.is_empty() {
      warnings.push(StructuralWarning::EmptyGraph);
    }

    match &graph.entry_point {
      None => warnings.push(StructuralWarning::MissingEntryPoint),
      Some(entry) if graph.get_node(entry).is_none() => {
        warnings.push(StructuralWarning::UnknownEntryPoint {
          entry_point: entry.clone(),
        });
      }
      Some(_) => {}
    }

    for node in graph.nodes.values() {
      for (label, target) in &node.edges {
        if let EdgeTarget::Node(to) = EdgeTarget::parse(target)
          && graph.get_node(to).is_none()
        {
          warnings.push(StructuralWarning::DanglingEdge {
            from: node.name.clone(),
            label: *label,
            to: to.to_string(),
          });
        }
      }
    }

    for warning in &warnings {
      warn!(graph = %graph.name, warning = %warning, "graph structure warning");
    }

    warnings
  }
}
