use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tracking::{ExecutionStatus, ExecutionSummary};

/// Graph state: output fields written by nodes plus the initial input.
pub type State = Map<String, Value>;

/// Which strategy produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompiledFrom {
  /// A compiled artifact already existed.
  Precompiled,
  /// The graph was compiled for this run.
  Autocompiled,
  /// The graph was built from its source and never persisted.
  Memory,
}

impl fmt::Display for CompiledFrom {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      CompiledFrom::Precompiled => "precompiled",
      CompiledFrom::Autocompiled => "autocompiled",
      CompiledFrom::Memory => "memory",
    })
  }
}

/// Outcome of running a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
  pub execution_id: String,
  pub graph_name: String,
  pub final_state: State,
  pub summary: ExecutionSummary,
  pub success: bool,
  pub duration_ms: u64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub compiled_from: Option<CompiledFrom>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl ExecutionResult {
  /// A failed result for a run that never reached the engine.
  pub fn failure(graph_name: &str, initial_state: State, error: impl Into<String>) -> Self {
    let now = Utc::now();
    Self {
      execution_id: uuid::Uuid::new_v4().to_string(),
      graph_name: graph_name.to_string(),
      final_state: initial_state,
      summary: ExecutionSummary {
        graph_name: graph_name.to_string(),
        status: ExecutionStatus::Failed,
        overall_success: false,
        node_executions: Vec::new(),
        nodes_run: 0,
        failed_nodes: Vec::new(),
        final_node: None,
        final_node_success: None,
        started_at: now,
        completed_at: Some(now),
        duration_ms: Some(0),
      },
      success: false,
      duration_ms: 0,
      compiled_from: None,
      error: Some(error.into()),
    }
  }

  pub fn with_compiled_from(mut self, compiled_from: CompiledFrom) -> Self {
    self.compiled_from = Some(compiled_from);
    self
  }
}
