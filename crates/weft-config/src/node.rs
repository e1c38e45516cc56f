use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Agent type assigned to rows that leave the agent column blank.
pub const DEFAULT_AGENT_TYPE: &str = "default";

/// One row of a workflow table.
///
/// Edge references are kept exactly as written. A row may use the
/// unconditional `next_node` or the `success_next` / `failure_next` pair;
/// the graph factory decides how they are wired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
  pub workflow_name: String,
  pub name: String,
  pub agent_type: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub prompt: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub context: BTreeMap<String, serde_json::Value>,
  #[serde(default)]
  pub input_fields: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output_field: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub next_node: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub success_next: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub failure_next: Option<String>,
  /// Explicitly marks the workflow's entry node.
  #[serde(default)]
  pub entry_point: bool,
  /// Source line of the row, for error messages.
  pub row: usize,
}

impl NodeSpec {
  /// Create a row with only the identifying fields set.
  pub fn new(workflow_name: impl Into<String>, name: impl Into<String>, row: usize) -> Self {
    Self {
      workflow_name: workflow_name.into(),
      name: name.into(),
      agent_type: DEFAULT_AGENT_TYPE.to_string(),
      prompt: None,
      description: None,
      context: BTreeMap::new(),
      input_fields: Vec::new(),
      output_field: None,
      next_node: None,
      success_next: None,
      failure_next: None,
      entry_point: false,
      row,
    }
  }
}

/// Split an input-field cell on `|` or `,`.
pub(crate) fn split_fields(raw: &str) -> Vec<String> {
  raw
    .split(['|', ','])
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_string)
    .collect()
}

pub(crate) fn is_truthy(raw: &str) -> bool {
  matches!(
    raw.trim().to_ascii_lowercase().as_str(),
    "true" | "yes" | "y" | "1" | "x"
  )
}

/// Parse a context cell.
///
/// Accepts either a JSON object or `key=value` pairs separated by `;` or `|`.
/// Pair values are read as JSON when they parse (numbers, booleans, quoted
/// strings) and as plain strings otherwise. A bare key is read as `true`.
pub fn parse_context(raw: &str) -> Result<BTreeMap<String, serde_json::Value>, String> {
  let raw = raw.trim();
  if raw.is_empty() {
    return Ok(BTreeMap::new());
  }

  if raw.starts_with('{') {
    return serde_json::from_str(raw).map_err(|e| e.to_string());
  }

  let mut context = BTreeMap::new();
  for pair in raw.split([';', '|']).map(str::trim).filter(|p| !p.is_empty()) {
    match pair.split_once('=') {
      Some((key, value)) => {
        let key = key.trim();
        if key.is_empty() {
          return Err(format!("empty key in '{}'", pair));
        }
        let value = value.trim();
        let value = serde_json::from_str(value)
          .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        context.insert(key.to_string(), value);
      }
      None => {
        context.insert(pair.to_string(), serde_json::Value::Bool(true));
      }
    }
  }

  Ok(context)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_split_fields() {
    assert_eq!(split_fields("a|b, c ||"), vec!["a", "b", "c"]);
    assert!(split_fields("  ").is_empty());
  }

  #[test]
  fn test_parse_context_json() {
    let context = parse_context(r#"{"temperature": 0.2, "memory": true}"#).unwrap();
    assert_eq!(context["temperature"], json!(0.2));
    assert_eq!(context["memory"], json!(true));
  }

  #[test]
  fn test_parse_context_pairs() {
    let context = parse_context("retries=3; label=hello world|cached").unwrap();
    assert_eq!(context["retries"], json!(3));
    assert_eq!(context["label"], json!("hello world"));
    assert_eq!(context["cached"], json!(true));
  }

  #[test]
  fn test_parse_context_rejects_bad_json() {
    assert!(parse_context("{not json").is_err());
    assert!(parse_context("=value").is_err());
  }

  #[test]
  fn test_is_truthy() {
    assert!(is_truthy("TRUE"));
    assert!(is_truthy(" yes "));
    assert!(!is_truthy("no"));
    assert!(!is_truthy(""));
  }
}
