use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
  #[error("node not found: {0}")]
  NodeNotFound(String),

  #[error("no workflow could be resolved: the table defines no workflows")]
  NoWorkflows,
}
