//! Per-node execution tracking.
//!
//! Each node start opens a [`NodeExecution`] record; the matching result
//! closes the most recently opened record for that node that is still open.
//! A node that runs several times in one execution (a loop) therefore gets
//! one record per run, each with its own timing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// What the tracker records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
  /// With tracking disabled no per-node records are kept; only failure
  /// counts survive for the success decision.
  pub enabled: bool,
  pub track_inputs: bool,
  pub track_outputs: bool,
}

impl Default for TrackingConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      track_inputs: true,
      track_outputs: true,
    }
  }
}

impl TrackingConfig {
  /// Timing and outcome only, no captured values.
  pub fn minimal() -> Self {
    Self {
      enabled: true,
      track_inputs: false,
      track_outputs: false,
    }
  }

  pub fn disabled() -> Self {
    Self {
      enabled: false,
      track_inputs: false,
      track_outputs: false,
    }
  }
}

/// One run of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExecution {
  pub node_name: String,
  pub started_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ended_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub duration_ms: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub success: Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub inputs: Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output: Option<serde_json::Value>,
}

impl NodeExecution {
  pub fn is_open(&self) -> bool {
    self.ended_at.is_none()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
  Running,
  Completed,
  Failed,
}

/// Rolled-up view of a tracked execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
  pub graph_name: String,
  pub status: ExecutionStatus,
  pub overall_success: bool,
  pub node_executions: Vec<NodeExecution>,
  /// Node runs seen, tracked or not.
  pub nodes_run: usize,
  /// Nodes that failed at least once, in first-failure order.
  pub failed_nodes: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub final_node: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub final_node_success: Option<bool>,
  pub started_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub completed_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub duration_ms: Option<u64>,
}

/// State of one execution's tracking.
#[derive(Debug, Clone)]
pub struct ExecutionTracker {
  config: TrackingConfig,
  started_at: DateTime<Utc>,
  completed_at: Option<DateTime<Utc>>,
  records: Vec<NodeExecution>,
  nodes_run: usize,
  failed_nodes: Vec<String>,
  final_node: Option<(String, bool)>,
}

impl ExecutionTracker {
  pub fn config(&self) -> TrackingConfig {
    self.config
  }

  pub fn records(&self) -> &[NodeExecution] {
    &self.records
  }

  pub fn is_complete(&self) -> bool {
    self.completed_at.is_some()
  }
}

fn millis_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
  u64::try_from((end - start).num_milliseconds()).unwrap_or(0)
}

/// Creates and updates [`ExecutionTracker`]s.
#[derive(Debug, Clone, Default)]
pub struct ExecutionTrackingService {
  config: TrackingConfig,
}

impl ExecutionTrackingService {
  pub fn new(config: TrackingConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> TrackingConfig {
    self.config
  }

  pub fn create_tracker(&self) -> ExecutionTracker {
    ExecutionTracker {
      config: self.config,
      started_at: Utc::now(),
      completed_at: None,
      records: Vec::new(),
      nodes_run: 0,
      failed_nodes: Vec::new(),
      final_node: None,
    }
  }

  /// Open a new record for `node_name`.
  pub fn record_node_start(
    &self,
    tracker: &mut ExecutionTracker,
    node_name: &str,
    inputs: Option<&serde_json::Value>,
  ) {
    tracker.nodes_run += 1;

    if !tracker.config.enabled {
      return;
    }

    tracker.records.push(NodeExecution {
      node_name: node_name.to_string(),
      started_at: Utc::now(),
      ended_at: None,
      duration_ms: None,
      success: None,
      error: None,
      inputs: inputs.filter(|_| tracker.config.track_inputs).cloned(),
      output: None,
    });
  }

  /// Close the most recent open record for `node_name`.
  pub fn record_node_result(
    &self,
    tracker: &mut ExecutionTracker,
    node_name: &str,
    success: bool,
    result: Option<&serde_json::Value>,
    error: Option<&str>,
  ) {
    if !success && !tracker.failed_nodes.iter().any(|n| n == node_name) {
      tracker.failed_nodes.push(node_name.to_string());
    }
    tracker.final_node = Some((node_name.to_string(), success));

    if !tracker.config.enabled {
      return;
    }

    let track_outputs = tracker.config.track_outputs;
    let open = tracker
      .records
      .iter()
      .rposition(|r| r.node_name == node_name && r.is_open());

    match open {
      Some(index) => {
        let record = &mut tracker.records[index];
        let ended_at = Utc::now();
        record.duration_ms = Some(millis_between(record.started_at, ended_at));
        record.ended_at = Some(ended_at);
        record.success = Some(success);
        record.error = error.map(str::to_string);
        record.output = result.filter(|_| track_outputs).cloned();
      }
      None => {
        warn!(node = %node_name, "node result recorded without a matching start");
      }
    }
  }

  pub fn complete_execution(&self, tracker: &mut ExecutionTracker) {
    if tracker.completed_at.is_none() {
      tracker.completed_at = Some(Utc::now());
    }
  }

  /// Summarize a tracker.
  ///
  /// Overall success here means no node failed and no record is left open;
  /// the engine may override it with its success policy.
  pub fn to_summary(&self, tracker: &ExecutionTracker, graph_name: &str) -> ExecutionSummary {
    let overall_success =
      tracker.failed_nodes.is_empty() && tracker.records.iter().all(|r| !r.is_open());

    let status = match (tracker.completed_at, overall_success) {
      (None, _) => ExecutionStatus::Running,
      (Some(_), true) => ExecutionStatus::Completed,
      (Some(_), false) => ExecutionStatus::Failed,
    };

    ExecutionSummary {
      graph_name: graph_name.to_string(),
      status,
      overall_success,
      node_executions: tracker.records.clone(),
      nodes_run: tracker.nodes_run,
      failed_nodes: tracker.failed_nodes.clone(),
      final_node: tracker.final_node.as_ref().map(|(name, _)| name.clone()),
      final_node_success: tracker.final_node.as_ref().map(|(_, success)| *success),
      started_at: tracker.started_at,
      completed_at: tracker.completed_at,
      duration_ms: tracker
        .completed_at
        .map(|end| millis_between(tracker.started_at, end)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_repeated_node_gets_distinct_records() {
    let service = ExecutionTrackingService::default();
    let mut tracker = service.create_tracker();

    service.record_node_start(&mut tracker, "loop", Some(&json!({"i": 1})));
    service.record_node_result(&mut tracker, "loop", true, Some(&json!("first")), None);
    service.record_node_start(&mut tracker, "loop", Some(&json!({"i": 2})));
    service.record_node_result(&mut tracker, "loop", false, None, Some("boom"));
    service.complete_execution(&mut tracker);

    let records = tracker.records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| !r.is_open()));
    assert_eq!(records[0].success, Some(true));
    assert_eq!(records[0].output, Some(json!("first")));
    assert_eq!(records[0].error, None);
    assert_eq!(records[1].success, Some(false));
    assert_eq!(records[1].error.as_deref(), Some("boom"));
    assert_eq!(records[1].inputs, Some(json!({"i": 2})));
    assert!(records.iter().all(|r| r.duration_ms.is_some()));
  }

  #[test]
  fn test_result_closes_most_recent_open_record() {
    let service = ExecutionTrackingService::default();
    let mut tracker = service.create_tracker();

    service.record_node_start(&mut tracker, "a", None);
    service.record_node_start(&mut tracker, "a", None);
    service.record_node_result(&mut tracker, "a", true, None, None);

    assert!(tracker.records()[0].is_open());
    assert!(!tracker.records()[1].is_open());

    service.record_node_result(&mut tracker, "a", true, None, None);
    assert!(!tracker.records()[0].is_open());
  }

  #[test]
  fn test_minimal_mode_skips_values() {
    let service = ExecutionTrackingService::new(TrackingConfig::minimal());
    let mut tracker = service.create_tracker();

    service.record_node_start(&mut tracker, "a", Some(&json!({"x": 1})));
    service.record_node_result(&mut tracker, "a", true, Some(&json!("out")), None);

    let record = &tracker.records()[0];
    assert!(record.inputs.is_none());
    assert!(record.output.is_none());
    assert!(record.duration_ms.is_some());
  }

  #[test]
  fn test_disabled_keeps_only_counts() {
    let service = ExecutionTrackingService::new(TrackingConfig::disabled());
    let mut tracker = service.create_tracker();

    service.record_node_start(&mut tracker, "a", None);
    service.record_node_result(&mut tracker, "a", false, None, Some("bad"));
    service.complete_execution(&mut tracker);

    let summary = service.to_summary(&tracker, "flow");
    assert!(summary.node_executions.is_empty());
    assert_eq!(summary.nodes_run, 1);
    assert_eq!(summary.failed_nodes, vec!["a"]);
    assert!(!summary.overall_success);
    assert_eq!(summary.status, ExecutionStatus::Failed);
  }

  #[test]
  fn test_summary_status() {
    let service = ExecutionTrackingService::default();
    let mut tracker = service.create_tracker();
    service.record_node_start(&mut tracker, "a", None);
    service.record_node_result(&mut tracker, "a", true, None, None);

    assert_eq!(
      service.to_summary(&tracker, "flow").status,
      ExecutionStatus::Running
    );

    service.complete_execution(&mut tracker);
    let summary = service.to_summary(&tracker, "flow");
    assert_eq!(summary.status, ExecutionStatus::Completed);
    assert!(summary.overall_success);
    assert_eq!(summary.final_node.as_deref(), Some("a"));
    assert!(summary.duration_ms.is_some());
  }
}
