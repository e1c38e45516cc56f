use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use weft_engine::{ExecutionConfig, State};

use crate::error::RunnerError;

/// Runner configuration, usually read from `weft.json` in the data dir.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
  /// Workflow table used when a run does not name one.
  pub csv_path: Option<PathBuf>,
  /// Root of the filesystem store holding bundles and compiled graphs.
  pub store_root: PathBuf,
  /// Directory of custom declaration manifests.
  pub declarations_dir: PathBuf,
  /// Compile a graph on demand when no compiled artifact exists.
  pub autocompile: bool,
  pub execution: ExecutionConfig,
}

impl Default for RunnerConfig {
  fn default() -> Self {
    Self::with_data_dir(".weft")
  }
}

impl RunnerConfig {
  /// Default layout under a data directory.
  pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
    let data_dir = data_dir.as_ref();
    Self {
      csv_path: None,
      store_root: data_dir.join("store"),
      declarations_dir: data_dir.join("declarations"),
      autocompile: false,
      execution: ExecutionConfig::default(),
    }
  }

  /// Read a JSON config file. Missing fields take their defaults.
  pub async fn load(path: impl AsRef<Path>) -> Result<Self, RunnerError> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
      .await
      .map_err(|source| RunnerError::ConfigIo {
        path: path.to_path_buf(),
        source,
      })?;
    serde_json::from_str(&content).map_err(|source| RunnerError::InvalidConfig {
      path: path.to_path_buf(),
      source,
    })
  }
}

/// Per-run overrides.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
  pub initial_state: State,
  /// Overrides [`RunnerConfig::autocompile`] when set.
  pub autocompile: Option<bool>,
  /// Overrides [`RunnerConfig::csv_path`] when set.
  pub csv_path: Option<PathBuf>,
}

impl RunOptions {
  pub fn new(initial_state: State) -> Self {
    Self {
      initial_state,
      ..Self::default()
    }
  }

  pub fn autocompile(mut self, autocompile: bool) -> Self {
    self.autocompile = Some(autocompile);
    self
  }

  pub fn csv_path(mut self, path: impl Into<PathBuf>) -> Self {
    self.csv_path = Some(path.into());
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use weft_engine::SuccessPolicy;

  #[tokio::test]
  async fn test_load_partial_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("weft.json");
    std::fs::write(
      &path,
      r#"{
        "csv_path": "flows/main.csv",
        "autocompile": true,
        "execution": { "max_steps": 50, "success_policy": { "policy": "final_node" } }
      }"#,
    )
    .unwrap();

    let config = RunnerConfig::load(&path).await.unwrap();
    assert_eq!(config.csv_path, Some(PathBuf::from("flows/main.csv")));
    assert!(config.autocompile);
    assert_eq!(config.execution.max_steps, 50);
    assert!(matches!(
      config.execution.success_policy,
      SuccessPolicy::FinalNode
    ));
    assert!(config.execution.tracking.enabled);
    assert_eq!(config.store_root, PathBuf::from(".weft/store"));
  }

  #[tokio::test]
  async fn test_load_errors() {
    let dir = tempfile::tempdir().unwrap();
    let missing = RunnerConfig::load(dir.path().join("nope.json")).await;
    assert!(matches!(missing, Err(RunnerError::ConfigIo { .. })));

    let path = dir.path().join("bad.json");
    std::fs::write(&path, "{ not json").unwrap();
    let invalid = RunnerConfig::load(&path).await;
    assert!(matches!(invalid, Err(RunnerError::InvalidConfig { .. })));
  }
}
