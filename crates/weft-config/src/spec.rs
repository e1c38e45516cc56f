use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseWarning};
use crate::node::NodeSpec;

/// The rows of a single workflow, in table order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSpec {
  pub name: String,
  pub nodes: Vec<NodeSpec>,
}

/// A parsed workflow table, grouped by workflow name.
///
/// Workflows keep the order in which they first appear and rows keep their
/// table order within a workflow. Entry-point detection depends on that.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSpec {
  workflows: Vec<WorkflowSpec>,
  #[serde(default)]
  warnings: Vec<ParseWarning>,
}

impl GraphSpec {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append a row to its workflow, creating the workflow on first sight.
  pub fn push(&mut self, node: NodeSpec) -> Result<(), ParseError> {
    let position = self
      .workflows
      .iter()
      .position(|w| w.name == node.workflow_name);

    let workflow = match position {
      Some(i) => &mut self.workflows[i],
      None => {
        self.workflows.push(WorkflowSpec {
          name: node.workflow_name.clone(),
          nodes: Vec::new(),
        });
        let last = self.workflows.len() - 1;
        &mut self.workflows[last]
      }
    };

    if workflow.nodes.iter().any(|n| n.name == node.name) {
      return Err(ParseError::DuplicateNode {
        row: node.row,
        workflow: workflow.name.clone(),
        node: node.name,
      });
    }

    workflow.nodes.push(node);
    Ok(())
  }

  pub(crate) fn push_warning(&mut self, warning: ParseWarning) {
    self.warnings.push(warning);
  }

  /// Rows for a workflow. Unknown workflows yield an empty slice.
  pub fn nodes(&self, workflow_name: &str) -> &[NodeSpec] {
    self
      .workflow(workflow_name)
      .map(|w| w.nodes.as_slice())
      .unwrap_or(&[])
  }

  pub fn workflow(&self, workflow_name: &str) -> Option<&WorkflowSpec> {
    self.workflows.iter().find(|w| w.name == workflow_name)
  }

  /// The workflow that appears first in the table.
  pub fn first_workflow(&self) -> Option<&WorkflowSpec> {
    self.workflows.first()
  }

  pub fn workflows(&self) -> &[WorkflowSpec] {
    &self.workflows
  }

  pub fn workflow_names(&self) -> impl Iterator<Item = &str> {
    self.workflows.iter().map(|w| w.name.as_str())
  }

  pub fn warnings(&self) -> &[ParseWarning] {
    &self.warnings
  }

  pub fn is_empty(&self) -> bool {
    self.workflows.is_empty()
  }
}
