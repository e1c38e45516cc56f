use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix marking an edge target as an inline routing function.
pub const FUNCTION_PREFIX: &str = "func:";

/// The outcome label an edge is taken on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeLabel {
  Success,
  Failure,
  Default,
}

impl EdgeLabel {
  pub fn as_str(self) -> &'static str {
    match self {
      EdgeLabel::Success => "success",
      EdgeLabel::Failure => "failure",
      EdgeLabel::Default => "default",
    }
  }
}

impl fmt::Display for EdgeLabel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// What an edge destination refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeTarget<'a> {
  /// Another node of the same graph.
  Node(&'a str),
  /// A routing function that picks the next node at run time.
  Function(&'a str),
}

impl<'a> EdgeTarget<'a> {
  pub fn parse(raw: &'a str) -> Self {
    match raw.strip_prefix(FUNCTION_PREFIX) {
      Some(name) => EdgeTarget::Function(name.trim()),
      None => EdgeTarget::Node(raw),
    }
  }
}
