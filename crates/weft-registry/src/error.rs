use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when working with the declaration registry.
#[derive(Debug, Error)]
pub enum RegistryError {
  /// Service dependencies form a cycle. The first and last entries are the
  /// same service.
  #[error("cyclic service dependency: {}", cycle.join(" -> "))]
  CycleDetected { cycle: Vec<String> },

  /// IO error when reading declaration manifests.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// A manifest file could not be parsed.
  #[error("invalid manifest {}: {source}", path.display())]
  InvalidManifest {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}
