//! Column-name normalization for workflow tables.

use std::collections::BTreeMap;

use crate::error::ParseWarning;

/// A logical column of a workflow table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
  WorkflowName,
  NodeName,
  AgentType,
  Prompt,
  Description,
  Context,
  InputFields,
  OutputField,
  NextNode,
  SuccessNext,
  FailureNext,
  EntryPoint,
}

impl Column {
  pub const ALL: [Column; 12] = [
    Column::WorkflowName,
    Column::NodeName,
    Column::AgentType,
    Column::Prompt,
    Column::Description,
    Column::Context,
    Column::InputFields,
    Column::OutputField,
    Column::NextNode,
    Column::SuccessNext,
    Column::FailureNext,
    Column::EntryPoint,
  ];

  /// The canonical snake_case name of the column.
  pub fn canonical_name(self) -> &'static str {
    match self {
      Column::WorkflowName => "workflow_name",
      Column::NodeName => "node_name",
      Column::AgentType => "agent_type",
      Column::Prompt => "prompt",
      Column::Description => "description",
      Column::Context => "context",
      Column::InputFields => "input_fields",
      Column::OutputField => "output_field",
      Column::NextNode => "next_node",
      Column::SuccessNext => "success_next",
      Column::FailureNext => "failure_next",
      Column::EntryPoint => "entry_point",
    }
  }

  /// Documented alternative spellings accepted for the column.
  pub fn aliases(self) -> &'static [&'static str] {
    match self {
      Column::WorkflowName => &["graph_name", "graph", "workflow"],
      Column::NodeName => &["node", "name"],
      Column::AgentType => &["agent", "type"],
      Column::Prompt => &[],
      Column::Description => &["desc"],
      Column::Context => &[],
      Column::InputFields => &["inputs", "input"],
      Column::OutputField => &["output"],
      Column::NextNode => &["edge", "next"],
      Column::SuccessNext => &["on_success", "next_on_success"],
      Column::FailureNext => &["on_failure", "next_on_failure"],
      Column::EntryPoint => &["is_start", "start"],
    }
  }

  /// Whether a table without this column is rejected.
  pub fn is_required(self) -> bool {
    matches!(self, Column::WorkflowName | Column::NodeName)
  }

  /// Resolve a raw header cell to a logical column.
  pub fn resolve(header: &str) -> Option<Column> {
    let key = normalize_header(header);
    if key.is_empty() {
      return None;
    }

    Column::ALL.into_iter().find(|column| {
      normalize_header(column.canonical_name()) == key
        || column.aliases().iter().any(|alias| normalize_header(alias) == key)
    })
  }
}

/// Normalize a header cell for comparison.
///
/// Lowercases and drops every non-alphanumeric character, so `Workflow Name`,
/// `WORKFLOW_NAME` and `workflow-name` compare equal.
pub fn normalize_header(header: &str) -> String {
  header
    .trim()
    .chars()
    .filter(|c| c.is_alphanumeric())
    .flat_map(char::to_lowercase)
    .collect()
}

/// Mapping from logical columns to their position in the header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
  indices: BTreeMap<Column, usize>,
}

impl HeaderMap {
  /// Build the mapping from a header row.
  ///
  /// Returns the mapping and the non-fatal warnings for unknown or repeated
  /// columns. The first occurrence of a repeated column wins.
  pub fn from_headers<S: AsRef<str>>(headers: &[S]) -> (Self, Vec<ParseWarning>) {
    let mut indices = BTreeMap::new();
    let mut warnings = Vec::new();

    for (position, header) in headers.iter().enumerate() {
      let header = header.as_ref().trim();
      match Column::resolve(header) {
        Some(column) if indices.contains_key(&column) => {
          warnings.push(ParseWarning::DuplicateColumn {
            name: header.to_string(),
            column: column.canonical_name().to_string(),
          });
        }
        Some(column) => {
          indices.insert(column, position);
        }
        None if header.is_empty() => {}
        None => warnings.push(ParseWarning::UnknownColumn {
          name: header.to_string(),
          position,
        }),
      }
    }

    (Self { indices }, warnings)
  }

  /// Position of a column in the header row.
  pub fn index(&self, column: Column) -> Option<usize> {
    self.indices.get(&column).copied()
  }

  /// Required columns absent from the header row.
  pub fn missing_required(&self) -> Vec<Column> {
    Column::ALL
      .into_iter()
      .filter(|c| c.is_required() && !self.indices.contains_key(c))
      .collect()
  }

  /// Read a trimmed, non-empty cell for `column` from a record.
  pub(crate) fn cell<'a>(&self, fields: &'a [String], column: Column) -> Option<&'a str> {
    self
      .index(column)
      .and_then(|i| fields.get(i))
      .map(|s| s.trim())
      .filter(|s| !s.is_empty())
  }
}
