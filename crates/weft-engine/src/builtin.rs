//! Built-in agents.
//!
//! These carry no business logic. They exist so graphs can run without any
//! custom agents registered.

use async_trait::async_trait;
use serde_json::Value;

use crate::agent::{Agent, AgentInput, AgentOutcome};

/// Input keys the branching agent reads its decision from.
const BRANCH_KEYS: &[&str] = &["success", "should_succeed", "succeed", "branch"];

/// Returns the rendered prompt, or a note that the node ran.
pub struct DefaultAgent;

#[async_trait]
impl Agent for DefaultAgent {
  async fn run(&self, input: AgentInput<'_>) -> AgentOutcome {
    match input.prompt {
      Some(prompt) => AgentOutcome::Success(Value::String(prompt.to_string())),
      None => AgentOutcome::Success(Value::String(format!("{} executed", input.node))),
    }
  }
}

/// Returns its input: the value itself for a single input field, an object
/// for several, null for none.
pub struct EchoAgent;

#[async_trait]
impl Agent for EchoAgent {
  async fn run(&self, input: AgentInput<'_>) -> AgentOutcome {
    let value = match input.inputs.len() {
      0 => Value::Null,
      1 => input.inputs.values().next().cloned().unwrap_or(Value::Null),
      _ => Value::Object(input.inputs.clone()),
    };
    AgentOutcome::Success(value)
  }
}

/// Always succeeds.
pub struct SuccessAgent;

#[async_trait]
impl Agent for SuccessAgent {
  async fn run(&self, input: AgentInput<'_>) -> AgentOutcome {
    AgentOutcome::Success(Value::String(format!("{} succeeded", input.node)))
  }
}

/// Always fails.
pub struct FailureAgent;

#[async_trait]
impl Agent for FailureAgent {
  async fn run(&self, input: AgentInput<'_>) -> AgentOutcome {
    AgentOutcome::Failure(format!("{} failed", input.node))
  }
}

/// Succeeds or fails depending on a flag in its inputs or context.
///
/// The first of `success`, `should_succeed`, `succeed` or `branch` found in
/// the inputs (then the context) decides; with none present it succeeds.
pub struct BranchingAgent;

#[async_trait]
impl Agent for BranchingAgent {
  async fn run(&self, input: AgentInput<'_>) -> AgentOutcome {
    let flag = BRANCH_KEYS
      .iter()
      .find_map(|key| input.inputs.get(*key).or_else(|| input.context.get(key)));

    if flag.is_none_or(is_truthy) {
      AgentOutcome::Success(Value::String(format!("{} took the success branch", input.node)))
    } else {
      AgentOutcome::Failure(format!("{} took the failure branch", input.node))
    }
  }
}

fn is_truthy(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
    Value::String(s) => matches!(
      s.trim().to_ascii_lowercase().as_str(),
      "true" | "yes" | "y" | "1" | "success" | "ok"
    ),
    Value::Array(a) => !a.is_empty(),
    Value::Object(o) => !o.is_empty(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::services::ServiceContainer;
  use serde_json::{Map, json};
  use weft_workflow::NodeContext;

  async fn run(agent: &dyn Agent, inputs: Map<String, Value>, prompt: Option<&str>) -> AgentOutcome {
    let context = NodeContext::default();
    let services = ServiceContainer::new();
    agent
      .run(AgentInput {
        node: "n",
        agent_type: "test",
        inputs: &inputs,
        prompt,
        context: &context,
        services: &services,
      })
      .await
  }

  fn inputs(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
  }

  #[tokio::test]
  async fn test_echo() {
    assert_eq!(
      run(&EchoAgent, inputs(json!({"a": 1})), None).await,
      AgentOutcome::Success(json!(1))
    );
    assert_eq!(
      run(&EchoAgent, inputs(json!({"a": 1, "b": 2})), None).await,
      AgentOutcome::Success(json!({"a": 1, "b": 2}))
    );
    assert_eq!(
      run(&EchoAgent, Map::new(), None).await,
      AgentOutcome::Success(Value::Null)
    );
  }

  #[tokio::test]
  async fn test_default_uses_prompt() {
    assert_eq!(
      run(&DefaultAgent, Map::new(), Some("hello")).await,
      AgentOutcome::Success(json!("hello"))
    );
    assert_eq!(
      run(&DefaultAgent, Map::new(), None).await,
      AgentOutcome::Success(json!("n executed"))
    );
  }

  #[tokio::test]
  async fn test_branching() {
    assert!(run(&BranchingAgent, Map::new(), None).await.is_success());
    assert!(
      run(&BranchingAgent, inputs(json!({"success": true})), None)
        .await
        .is_success()
    );
    assert!(
      !run(&BranchingAgent, inputs(json!({"branch": "no"})), None)
        .await
        .is_success()
    );
    assert!(!run(&FailureAgent, Map::new(), None).await.is_success());
    assert!(run(&SuccessAgent, Map::new(), None).await.is_success());
  }
}
