use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use crate::declaration::{AgentDeclaration, DeclarationSource, ServiceDeclaration};
use crate::error::RegistryError;
use crate::registry::DeclarationRegistry;

/// Contents of a declaration manifest file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclarationManifest {
  #[serde(default)]
  pub agents: Vec<AgentDeclaration>,
  #[serde(default)]
  pub services: Vec<ServiceDeclaration>,
}

/// Loads custom declarations from a directory of manifests.
///
/// ```text
/// {root}/
/// ├── summarizer.json
/// └── storage.json
/// ```
///
/// Every `*.json` file holds a [`DeclarationManifest`]. Declarations loaded
/// from disk are always custom; agents without a `source_path` get the
/// manifest's path.
pub struct FsDeclarationSource {
  root: PathBuf,
}

impl FsDeclarationSource {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  async fn read_manifest(&self, path: &Path) -> Result<DeclarationManifest, RegistryError> {
    let content = fs::read_to_string(path).await?;
    let mut manifest: DeclarationManifest =
      serde_json::from_str(&content).map_err(|source| RegistryError::InvalidManifest {
        path: path.to_path_buf(),
        source,
      })?;

    for agent in &mut manifest.agents {
      agent.source = DeclarationSource::Custom;
      if agent.source_path.is_none() {
        agent.source_path = Some(path.to_path_buf());
      }
    }
    for service in &mut manifest.services {
      service.source = DeclarationSource::Custom;
    }

    Ok(manifest)
  }

  /// Read every manifest under the root, in file name order.
  ///
  /// A missing root directory yields an empty manifest.
  pub async fn load(&self) -> Result<DeclarationManifest, RegistryError> {
    let mut combined = DeclarationManifest::default();

    if !self.root.exists() {
      return Ok(combined);
    }

    let mut paths = Vec::new();
    let mut entries = fs::read_dir(&self.root).await?;
    while let Some(entry) = entries.next_entry().await? {
      let path = entry.path();
      if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("json") {
        paths.push(path);
      }
    }
    paths.sort();

    for path in paths {
      let manifest = self.read_manifest(&path).await?;
      debug!(
        path = %path.display(),
        agents = manifest.agents.len(),
        services = manifest.services.len(),
        "read declaration manifest"
      );
      combined.agents.extend(manifest.agents);
      combined.services.extend(manifest.services);
    }

    Ok(combined)
  }

  /// Load every manifest and register its declarations.
  ///
  /// Returns the number of declarations registered.
  pub async fn load_into(&self, registry: &DeclarationRegistry) -> Result<usize, RegistryError> {
    let manifest = self.load().await?;
    let count = manifest.agents.len() + manifest.services.len();

    for service in manifest.services {
      registry.register_service(service);
    }
    for agent in manifest.agents {
      registry.register_agent(agent);
    }

    info!(root = %self.root.display(), declarations = count, "loaded custom declarations");
    Ok(count)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[tokio::test]
  async fn test_load_into_registers_custom_declarations() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
      dir.path().join("summarizer.json"),
      r#"{
        "agents": [
          {"agent_type": "summarizer", "implementation": "custom.summarizer", "services": ["llm"]}
        ],
        "services": [
          {"name": "llm", "implementation": "svc.llm", "source": "builtin"}
        ]
      }"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let registry = DeclarationRegistry::new();
    let source = FsDeclarationSource::new(dir.path());
    let count = source.load_into(&registry).await.unwrap();
    assert_eq!(count, 2);

    let agent = registry.get_agent_declaration("summarizer").unwrap();
    assert!(agent.is_custom());
    assert_eq!(agent.source_path, Some(dir.path().join("summarizer.json")));

    let service = registry.get_service_declaration("llm").unwrap();
    assert_eq!(service.source, DeclarationSource::Custom);
  }

  #[tokio::test]
  async fn test_missing_root_is_empty() {
    let dir = TempDir::new().unwrap();
    let source = FsDeclarationSource::new(dir.path().join("absent"));

    assert_eq!(source.load().await.unwrap(), DeclarationManifest::default());
  }

  #[tokio::test]
  async fn test_invalid_manifest_names_the_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();

    let err = FsDeclarationSource::new(dir.path()).load().await.unwrap_err();
    match err {
      RegistryError::InvalidManifest { path, .. } => {
        assert!(path.ends_with("broken.json"));
      }
      other => panic!("unexpected error: {other}"),
    }
  }
}
