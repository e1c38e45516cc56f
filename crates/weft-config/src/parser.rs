//! Workflow table parser.

use std::path::Path;

use tracing::{debug, warn};

use crate::columns::{Column, HeaderMap};
use crate::csv::{Record, read_records};
use crate::error::ParseError;
use crate::node::{DEFAULT_AGENT_TYPE, NodeSpec, is_truthy, parse_context, split_fields};
use crate::spec::GraphSpec;

/// Parse a workflow table into a [`GraphSpec`].
///
/// Fails when a required column is absent after normalization or when a row
/// is structurally invalid. Unrecognized columns are reported as warnings on
/// the returned spec.
pub fn parse(source: &str) -> Result<GraphSpec, ParseError> {
  let records = read_records(source)?;
  let mut records = records.into_iter();

  let header = records.next().ok_or(ParseError::EmptyTable)?;
  let (headers, warnings) = HeaderMap::from_headers(&header.fields);

  let missing = headers.missing_required();
  if !missing.is_empty() {
    return Err(ParseError::MissingColumns {
      missing: missing
        .into_iter()
        .map(|c| c.canonical_name().to_string())
        .collect(),
    });
  }

  let mut spec = GraphSpec::new();
  for warning in warnings {
    warn!(warning = %warning, "workflow table column ignored");
    spec.push_warning(warning);
  }

  for record in records {
    let node = parse_row(&headers, &record)?;
    spec.push(node)?;
  }

  debug!(
    workflows = spec.workflows().len(),
    warnings = spec.warnings().len(),
    "parsed workflow table"
  );

  Ok(spec)
}

/// Read and parse a workflow table from disk.
pub async fn parse_file(path: impl AsRef<Path>) -> Result<GraphSpec, ParseError> {
  let path = path.as_ref();
  let source = tokio::fs::read_to_string(path)
    .await
    .map_err(|source| ParseError::Io {
      path: path.to_path_buf(),
      source,
    })?;
  parse(&source)
}

fn parse_row(headers: &HeaderMap, record: &Record) -> Result<NodeSpec, ParseError> {
  let row = record.line;
  let fields = &record.fields;
  let cell = |column: Column| headers.cell(fields, column).map(str::to_string);

  // Blank workflow names are allowed; the bundle layer names them.
  let workflow_name = cell(Column::WorkflowName).unwrap_or_default();
  let name = cell(Column::NodeName).ok_or_else(|| ParseError::MissingField {
    row,
    field: Column::NodeName.canonical_name().to_string(),
  })?;

  let context = match headers.cell(fields, Column::Context) {
    Some(raw) => parse_context(raw).map_err(|message| ParseError::InvalidContext { row, message })?,
    None => Default::default(),
  };

  Ok(NodeSpec {
    workflow_name,
    name,
    agent_type: cell(Column::AgentType).unwrap_or_else(|| DEFAULT_AGENT_TYPE.to_string()),
    prompt: cell(Column::Prompt),
    description: cell(Column::Description),
    context,
    input_fields: headers
      .cell(fields, Column::InputFields)
      .map(split_fields)
      .unwrap_or_default(),
    output_field: cell(Column::OutputField),
    next_node: cell(Column::NextNode),
    success_next: cell(Column::SuccessNext),
    failure_next: cell(Column::FailureNext),
    entry_point: headers
      .cell(fields, Column::EntryPoint)
      .is_some_and(is_truthy),
    row,
  })
}
