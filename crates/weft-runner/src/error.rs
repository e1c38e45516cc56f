use std::path::PathBuf;

use thiserror::Error;
use weft_bundle::BundleError;
use weft_config::ParseError;
use weft_engine::EngineError;
use weft_store::StoreError;

/// Errors from compiling a graph ahead of execution.
#[derive(Debug, Error)]
pub enum CompileError {
  #[error("failed to build bundle: {0}")]
  Bundle(#[from] BundleError),

  #[error("failed to persist compiled graph: {0}")]
  Store(#[from] StoreError),

  #[error("failed to read workflow table: {0}")]
  Parse(#[from] ParseError),
}

/// Errors from a single run strategy. The runner turns these into failed
/// results.
#[derive(Debug, Error)]
pub enum RunnerError {
  /// Neither the run options nor the config name a workflow table.
  #[error("no workflow table configured for graph '{graph}'")]
  NoSource { graph: String },

  #[error("failed to read config {}: {source}", path.display())]
  ConfigIo {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid config {}: {source}", path.display())]
  InvalidConfig {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error(transparent)]
  Parse(#[from] ParseError),

  #[error(transparent)]
  Bundle(#[from] BundleError),

  #[error(transparent)]
  Engine(#[from] EngineError),

  #[error("failed to load compiled graph: {0}")]
  Store(#[from] StoreError),
}
