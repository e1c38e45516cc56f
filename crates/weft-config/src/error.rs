use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structural errors raised while parsing a workflow table.
#[derive(Debug, Error)]
pub enum ParseError {
  /// The source has no header row.
  #[error("workflow table is empty: no header row found")]
  EmptyTable,

  /// Required columns are absent after normalization.
  #[error("missing required columns: {}", .missing.join(", "))]
  MissingColumns { missing: Vec<String> },

  /// A row lacks a value for a required field.
  #[error("row {row}: missing required field '{field}'")]
  MissingField { row: usize, field: String },

  /// A node name appears twice within one workflow.
  #[error("row {row}: duplicate node '{node}' in workflow '{workflow}'")]
  DuplicateNode {
    row: usize,
    workflow: String,
    node: String,
  },

  /// The context cell could not be interpreted.
  #[error("row {row}: invalid context: {message}")]
  InvalidContext { row: usize, message: String },

  /// A quoted field is never closed.
  #[error("unterminated quoted field starting on line {line}")]
  UnterminatedQuote { line: usize },

  /// The requested workflow, or any workflow when none was requested, has
  /// no rows in the table.
  #[error("no workflow could be resolved from the table{}", .requested.as_deref().map(|n| format!(" (requested '{n}')")).unwrap_or_default())]
  UnresolvableWorkflow { requested: Option<String> },

  /// The source file could not be read.
  #[error("failed to read {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Non-fatal findings reported alongside a parsed table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseWarning {
  /// A header cell matched no known column.
  UnknownColumn { name: String, position: usize },

  /// A header cell resolved to a column that was already mapped.
  DuplicateColumn { name: String, column: String },
}

impl fmt::Display for ParseWarning {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ParseWarning::UnknownColumn { name, position } => {
        write!(f, "unrecognized column '{}' at position {}", name, position)
      }
      ParseWarning::DuplicateColumn { name, column } => {
        write!(f, "column '{}' repeats '{}' and is ignored", name, column)
      }
    }
  }
}
