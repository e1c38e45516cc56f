//! Compiling graphs into stored artifacts.

use std::path::Path;

use async_trait::async_trait;
use tracing::{info, instrument};
use weft_bundle::{BundleService, GraphBundle, compiled_key};
use weft_store::{WriteMode, read_json, write_json};

use crate::error::CompileError;

/// Turns a graph of a workflow table into a persisted, executable bundle.
#[async_trait]
pub trait GraphCompiler: Send + Sync {
  async fn compile(&self, graph_name: &str, csv_path: &Path) -> Result<GraphBundle, CompileError>;
}

/// Default compiler: builds or reuses the cached bundle and writes it as the
/// graph's compiled artifact.
#[derive(Clone)]
pub struct CompilationService {
  bundles: BundleService,
}

impl CompilationService {
  pub fn new(bundles: BundleService) -> Self {
    Self { bundles }
  }

  /// Compile every workflow of a table. Stops at the first failure.
  pub async fn compile_all(&self, csv_path: &Path) -> Result<Vec<GraphBundle>, CompileError> {
    let spec = weft_config::parse_file(csv_path).await?;
    let mut compiled = Vec::new();
    for name in spec.workflow_names() {
      compiled.push(self.compile(name, csv_path).await?);
    }
    Ok(compiled)
  }

  /// The compiled artifact of a graph, if one exists.
  pub async fn load_compiled(&self, graph_name: &str) -> Result<Option<GraphBundle>, CompileError> {
    let key = compiled_key(graph_name);
    Ok(read_json(self.bundles.store().as_ref(), &key).await?)
  }

  pub async fn is_compiled(&self, graph_name: &str) -> Result<bool, CompileError> {
    let key = compiled_key(graph_name);
    Ok(self.bundles.store().exists(&key).await?)
  }
}

#[async_trait]
impl GraphCompiler for CompilationService {
  #[instrument(name = "compile_graph", skip(self, csv_path), fields(path = %csv_path.display()))]
  async fn compile(&self, graph_name: &str, csv_path: &Path) -> Result<GraphBundle, CompileError> {
    let bundle = self
      .bundles
      .get_or_create_bundle(csv_path, Some(graph_name))
      .await?;

    let key = compiled_key(&bundle.graph_name);
    write_json(
      self.bundles.store().as_ref(),
      &key,
      &bundle,
      WriteMode::Overwrite,
    )
    .await?;

    info!(
      graph = %bundle.graph_name,
      key = %key,
      csv_hash = %bundle.csv_hash,
      missing = bundle.missing_declarations.len(),
      "graph compiled"
    );
    Ok(bundle)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;
  use weft_registry::DeclarationRegistry;
  use weft_store::{FsStore, Store};

  const SOURCE: &str = "\
graph,node,agent,input,output,on_success
first,a,echo,x,y,b
first,b,echo,y,z,
second,only,success,,,
";

  #[tokio::test]
  async fn test_compile_all_writes_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("flows.csv");
    std::fs::write(&csv, SOURCE).unwrap();

    let store: Arc<dyn Store> = Arc::new(FsStore::new(dir.path().join("store")));
    let service = CompilationService::new(BundleService::new(
      DeclarationRegistry::with_builtins(),
      store.clone(),
    ));

    assert!(!service.is_compiled("first").await.unwrap());
    let bundles = service.compile_all(&csv).await.unwrap();
    let names: Vec<_> = bundles.iter().map(|b| b.graph_name.as_str()).collect();
    assert_eq!(names, vec!["first", "second"]);

    assert!(service.is_compiled("first").await.unwrap());
    assert!(store.exists("compiled/second.json").await.unwrap());

    let loaded = service.load_compiled("first").await.unwrap().unwrap();
    assert_eq!(loaded.entry_point.as_deref(), Some("a"));
    assert_eq!(loaded.csv_hash, bundles[0].csv_hash);
  }

  #[tokio::test]
  async fn test_unknown_graph_is_a_compile_error() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("flows.csv");
    std::fs::write(&csv, SOURCE).unwrap();

    let service = CompilationService::new(BundleService::new(
      DeclarationRegistry::with_builtins(),
      Arc::new(FsStore::new(dir.path().join("store"))),
    ));

    let result = service.compile("third", &csv).await;
    assert!(matches!(result, Err(CompileError::Bundle(_))));
  }
}
