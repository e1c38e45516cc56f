//! Graph execution.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures::FutureExt;
use minijinja::Environment;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info, instrument, warn};
use weft_workflow::{EdgeTarget, Graph, Node};

use crate::agent::{AgentInput, AgentInstance, AgentOutcome};
use crate::error::EngineError;
use crate::policy::SuccessPolicy;
use crate::result::{ExecutionResult, State};
use crate::routing::{RouteContext, RouteTable};
use crate::tracking::{ExecutionStatus, ExecutionTracker, ExecutionTrackingService, TrackingConfig};

/// State key holding whether the most recent node succeeded.
pub const LAST_ACTION_SUCCESS_KEY: &str = "last_action_success";

pub const DEFAULT_MAX_STEPS: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
  /// Upper bound on node runs per execution.
  pub max_steps: usize,
  pub tracking: TrackingConfig,
  pub success_policy: SuccessPolicy,
}

impl Default for ExecutionConfig {
  fn default() -> Self {
    Self {
      max_steps: DEFAULT_MAX_STEPS,
      tracking: TrackingConfig::default(),
      success_policy: SuccessPolicy::default(),
    }
  }
}

/// Runs instantiated graphs.
#[derive(Clone)]
pub struct ExecutionEngine {
  config: ExecutionConfig,
  tracking: ExecutionTrackingService,
  routes: RouteTable,
}

impl ExecutionEngine {
  pub fn new(config: ExecutionConfig) -> Self {
    Self {
      tracking: ExecutionTrackingService::new(config.tracking),
      config,
      routes: RouteTable::new(),
    }
  }

  pub fn with_routes(mut self, routes: RouteTable) -> Self {
    self.routes = routes;
    self
  }

  pub fn routes_mut(&mut self) -> &mut RouteTable {
    &mut self.routes
  }

  pub fn config(&self) -> &ExecutionConfig {
    &self.config
  }

  /// Execute a graph whose nodes have agents bound.
  ///
  /// Never fails: problems are reported through the result's `success` and
  /// `error` fields. Node failures are in-band and only decide which edge is
  /// taken; the success policy decides the overall outcome.
  #[instrument(name = "graph_execute", skip(self, graph, initial_state), fields(graph = %graph.name))]
  pub async fn execute(&self, graph: &Graph, initial_state: State) -> ExecutionResult {
    let execution_id = uuid::Uuid::new_v4().to_string();
    let started = Instant::now();

    info!(
      execution_id = %execution_id,
      graph = %graph.name,
      nodes = graph.len(),
      "graph_started"
    );

    let mut state = initial_state;
    let mut tracker = self.tracking.create_tracker();
    let run = self.run_loop(graph, &mut state, &mut tracker).await;

    self.tracking.complete_execution(&mut tracker);
    let mut summary = self.tracking.to_summary(&tracker, &graph.name);

    let (success, error) = match run {
      Ok(node_error) => {
        let success = self.config.success_policy.evaluate(&summary);
        let error = if success {
          None
        } else {
          Some(node_error.unwrap_or_else(|| "execution did not meet its success policy".to_string()))
        };
        (success, error)
      }
      Err(e) => (false, Some(e.to_string())),
    };

    summary.overall_success = success;
    summary.status = if success {
      ExecutionStatus::Completed
    } else {
      ExecutionStatus::Failed
    };

    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    match &error {
      None => info!(
        execution_id = %execution_id,
        nodes_run = summary.nodes_run,
        duration_ms,
        "graph_completed"
      ),
      Some(e) => error!(
        execution_id = %execution_id,
        nodes_run = summary.nodes_run,
        error = %e,
        "graph_failed"
      ),
    }

    ExecutionResult {
      execution_id,
      graph_name: graph.name.clone(),
      final_state: state,
      summary,
      success,
      duration_ms,
      compiled_from: None,
      error,
    }
  }

  /// Walk the graph from its entry point. Returns the first node error.
  async fn run_loop(
    &self,
    graph: &Graph,
    state: &mut State,
    tracker: &mut ExecutionTracker,
  ) -> Result<Option<String>, EngineError> {
    let entry = graph
      .entry_point
      .as_deref()
      .ok_or_else(|| EngineError::NoEntryPoint {
        graph: graph.name.clone(),
      })?;

    let mut current = entry.to_string();
    let mut steps = 0;
    let mut first_error = None;

    loop {
      if steps >= self.config.max_steps {
        return Err(EngineError::MaxStepsExceeded {
          graph: graph.name.clone(),
          max_steps: self.config.max_steps,
        });
      }
      steps += 1;

      let node = graph
        .get_node(&current)
        .ok_or_else(|| EngineError::NodeNotFound {
          graph: graph.name.clone(),
          node: current.clone(),
        })?;

      let inputs = collect_inputs(node, state);
      let inputs_value = Value::Object(inputs.clone());
      self
        .tracking
        .record_node_start(tracker, &node.name, Some(&inputs_value));

      let outcome = self.run_node(node, &inputs).await;
      let success = outcome.is_success();

      match &outcome {
        AgentOutcome::Success(value) => {
          if let Some(output) = &node.output {
            state.insert(output.clone(), value.clone());
          }
          self
            .tracking
            .record_node_result(tracker, &node.name, true, Some(value), None);
          debug!(node = %node.name, "node_completed");
        }
        AgentOutcome::Failure(message) => {
          first_error.get_or_insert_with(|| format!("node '{}' failed: {}", node.name, message));
          self
            .tracking
            .record_node_result(tracker, &node.name, false, None, Some(message));
          warn!(node = %node.name, error = %message, "node_failed");
        }
      }
      state.insert(LAST_ACTION_SUCCESS_KEY.to_string(), Value::Bool(success));

      let Some((label, target)) = node.next_edge(success) else {
        break;
      };

      current = match EdgeTarget::parse(target) {
        EdgeTarget::Node(next) => next.to_string(),
        EdgeTarget::Function(function) => {
          let route = self
            .routes
            .get(function)
            .ok_or_else(|| EngineError::UnknownRouteFunction {
              function: function.to_string(),
            })?;
          let context = RouteContext {
            node: &node.name,
            success,
            state,
          };
          match route(&context) {
            Some(next) => next,
            None => break,
          }
        }
      };

      debug!(from = %node.name, label = %label, to = %current, "following edge");
    }

    Ok(first_error)
  }

  async fn run_node(&self, node: &Node, inputs: &Map<String, Value>) -> AgentOutcome {
    let Some(instance) = node
      .context
      .runtime()
      .and_then(|h| h.downcast_ref::<AgentInstance>())
    else {
      return AgentOutcome::Failure(
        EngineError::NotInstantiated {
          node: node.name.clone(),
        }
        .to_string(),
      );
    };

    let prompt = match node.prompt.as_deref().map(|p| render_prompt(p, inputs)) {
      Some(Ok(rendered)) => Some(rendered),
      Some(Err(message)) => return AgentOutcome::Failure(message),
      None => None,
    };

    let input = AgentInput {
      node: &node.name,
      agent_type: &node.agent_type,
      inputs,
      prompt: prompt.as_deref(),
      context: &node.context,
      services: &instance.services,
    };

    // A panicking agent fails its node, not the execution.
    match AssertUnwindSafe(instance.agent.run(input)).catch_unwind().await {
      Ok(outcome) => outcome,
      Err(payload) => {
        let message = panic_message(payload.as_ref());
        error!(node = %node.name, panic = %message, "agent panicked");
        AgentOutcome::Failure(format!("agent panicked: {}", message))
      }
    }
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    message.to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "unknown panic".to_string()
  }
}

/// The state values named by a node's input fields. Absent fields are
/// skipped.
fn collect_inputs(node: &Node, state: &State) -> Map<String, Value> {
  node
    .inputs
    .iter()
    .filter_map(|field| state.get(field).map(|value| (field.clone(), value.clone())))
    .collect()
}

fn render_prompt(template: &str, inputs: &Map<String, Value>) -> Result<String, String> {
  if !template.contains("{{") && !template.contains("{%") {
    return Ok(template.to_string());
  }
  let env = Environment::new();
  env
    .render_str(template, minijinja::Value::from_serialize(inputs))
    .map_err(|e| format!("failed to render prompt: {}", e))
}
