use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::tracking::ExecutionSummary;

/// Decides whether an execution succeeded.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum SuccessPolicy {
  /// Every node run succeeded.
  #[default]
  AllNodes,
  /// The last node run succeeded.
  FinalNode,
  /// Every listed node ran and all of its runs succeeded.
  CriticalNodes { nodes: BTreeSet<String> },
  /// A caller-supplied predicate.
  #[serde(skip)]
  Custom(Arc<dyn Fn(&ExecutionSummary) -> bool + Send + Sync>),
}

impl SuccessPolicy {
  pub fn critical<I, S>(nodes: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    SuccessPolicy::CriticalNodes {
      nodes: nodes.into_iter().map(Into::into).collect(),
    }
  }

  pub fn custom<F>(predicate: F) -> Self
  where
    F: Fn(&ExecutionSummary) -> bool + Send + Sync + 'static,
  {
    SuccessPolicy::Custom(Arc::new(predicate))
  }

  pub fn evaluate(&self, summary: &ExecutionSummary) -> bool {
    match self {
      SuccessPolicy::AllNodes => {
        summary.nodes_run > 0
          && summary.failed_nodes.is_empty()
          && summary
            .node_executions
            .iter()
            .all(|r| r.success == Some(true))
      }
      SuccessPolicy::FinalNode => summary.final_node_success == Some(true),
      SuccessPolicy::CriticalNodes { nodes } => nodes.iter().all(|name| {
        if summary.failed_nodes.contains(name) {
          return false;
        }
        // Untracked runs only know about failures.
        summary.node_executions.is_empty()
          || summary
            .node_executions
            .iter()
            .any(|r| &r.node_name == name && r.success == Some(true))
      }),
      SuccessPolicy::Custom(predicate) => predicate(summary),
    }
  }
}

impl fmt::Debug for SuccessPolicy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SuccessPolicy::AllNodes => f.write_str("AllNodes"),
      SuccessPolicy::FinalNode => f.write_str("FinalNode"),
      SuccessPolicy::CriticalNodes { nodes } => {
        f.debug_struct("CriticalNodes").field("nodes", nodes).finish()
      }
      SuccessPolicy::Custom(_) => f.write_str("Custom(..)"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tracking::ExecutionTrackingService;

  fn summary(runs: &[(&str, bool)]) -> ExecutionSummary {
    let service = ExecutionTrackingService::default();
    let mut tracker = service.create_tracker();
    for (node, success) in runs {
      service.record_node_start(&mut tracker, node, None);
      service.record_node_result(&mut tracker, node, *success, None, None);
    }
    service.complete_execution(&mut tracker);
    service.to_summary(&tracker, "flow")
  }

  #[test]
  fn test_all_nodes() {
    assert!(SuccessPolicy::AllNodes.evaluate(&summary(&[("a", true), ("b", true)])));
    assert!(!SuccessPolicy::AllNodes.evaluate(&summary(&[("a", false), ("b", true)])));
    assert!(!SuccessPolicy::AllNodes.evaluate(&summary(&[])));
  }

  #[test]
  fn test_final_node() {
    assert!(SuccessPolicy::FinalNode.evaluate(&summary(&[("a", false), ("recover", true)])));
    assert!(!SuccessPolicy::FinalNode.evaluate(&summary(&[("a", true), ("b", false)])));
  }

  #[test]
  fn test_critical_nodes() {
    let policy = SuccessPolicy::critical(["save"]);
    assert!(policy.evaluate(&summary(&[("fetch", false), ("save", true)])));
    assert!(!policy.evaluate(&summary(&[("fetch", true), ("save", false)])));
    assert!(!policy.evaluate(&summary(&[("fetch", true)])));
  }

  #[test]
  fn test_custom_and_serde() {
    let policy = SuccessPolicy::custom(|s| s.nodes_run == 1);
    assert!(policy.evaluate(&summary(&[("a", false)])));

    let parsed: SuccessPolicy =
      serde_json::from_str(r#"{"policy": "critical_nodes", "nodes": ["x"]}"#).unwrap();
    assert!(matches!(parsed, SuccessPolicy::CriticalNodes { .. }));
    assert_eq!(
      serde_json::to_string(&SuccessPolicy::FinalNode).unwrap(),
      r#"{"policy":"final_node"}"#
    );
  }
}
