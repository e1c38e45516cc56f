use std::path::PathBuf;

use thiserror::Error;
use weft_config::ParseError;
use weft_registry::RegistryError;
use weft_store::StoreError;
use weft_workflow::WorkflowError;

#[derive(Debug, Error)]
pub enum BundleError {
  #[error(transparent)]
  Parse(#[from] ParseError),

  #[error(transparent)]
  Workflow(#[from] WorkflowError),

  #[error(transparent)]
  Registry(#[from] RegistryError),

  #[error("storage error: {0}")]
  Store(#[from] StoreError),

  #[error("failed to read {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to encode bundle: {0}")]
  Encode(#[from] serde_json::Error),

  #[error("bundle hash mismatch: bundle has {expected}, source hashes to {actual}")]
  HashMismatch { expected: String, actual: String },
}
