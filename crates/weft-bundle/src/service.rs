use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use weft_config::ParseError;
use weft_registry::DeclarationRegistry;
use weft_store::{Store, StoreError, WriteMode, read_json, write_json};
use weft_workflow::{Graph, GraphFactory};

use crate::bundle::{BUNDLE_FORMAT, GraphBundle};
use crate::error::BundleError;
use crate::hash::{csv_hash, find_workflow, synthetic_graph_name, version_hash};
use crate::keys::bundle_key;
use crate::update::BundleUpdateService;

/// Builds, stores and loads [`GraphBundle`]s.
#[derive(Clone)]
pub struct BundleService {
  registry: DeclarationRegistry,
  store: Arc<dyn Store>,
}

impl BundleService {
  pub fn new(registry: DeclarationRegistry, store: Arc<dyn Store>) -> Self {
    Self { registry, store }
  }

  pub fn registry(&self) -> &DeclarationRegistry {
    &self.registry
  }

  pub fn store(&self) -> &Arc<dyn Store> {
    &self.store
  }

  /// Compile a source table into a bundle.
  ///
  /// `cache_key` replaces the computed source hash when given. When
  /// `workflow_name` is `None` the first workflow of the table is used.
  pub fn create_from_source(
    &self,
    source: &str,
    cache_key: Option<&str>,
    workflow_name: Option<&str>,
  ) -> Result<GraphBundle, BundleError> {
    let spec = weft_config::parse(source)?;

    let hash = match cache_key {
      Some(key) => key.to_string(),
      None => csv_hash(source.as_bytes()),
    };

    let workflow = match workflow_name {
      Some(name) => find_workflow(&spec, name, &hash),
      None => spec.first_workflow(),
    }
    .ok_or_else(|| ParseError::UnresolvableWorkflow {
      requested: workflow_name.map(str::to_string),
    })?;

    let mut graph = GraphFactory::build(&workflow.name, &workflow.nodes);
    if graph.name.trim().is_empty() {
      graph.name = synthetic_graph_name(&hash);
      debug!(graph = %graph.name, "assigned synthetic graph name");
    }

    let warnings = GraphFactory::validate(&graph);
    if !warnings.is_empty() {
      debug!(graph = %graph.name, warnings = warnings.len(), "bundling graph with structural warnings");
    }

    self.create_from_graph(&graph, hash)
  }

  /// Build a bundle from an already constructed graph.
  #[instrument(name = "create_bundle", skip(self, graph), fields(graph = %graph.name))]
  pub fn create_from_graph(&self, graph: &Graph, csv_hash: String) -> Result<GraphBundle, BundleError> {
    let required_agents = graph.agent_types();
    let requirements = self.registry.resolve_requirements(&required_agents);

    let mut agent_mappings = BTreeMap::new();
    let mut custom_agents = BTreeSet::new();
    for agent_type in &required_agents {
      if let Some(declaration) = self.registry.get_agent_declaration(agent_type)
        && declaration.is_custom()
      {
        agent_mappings.insert(agent_type.clone(), declaration.implementation);
        custom_agents.insert(agent_type.clone());
      }
    }

    let required_services = self.filter_actual_services(&requirements.services);
    let service_load_order = self.registry.calculate_load_order(&required_services)?;

    let function_mappings = graph
      .function_names()
      .into_iter()
      .map(|name| (name.clone(), name))
      .collect();

    let stripped = graph.stripped();

    for agent_type in &requirements.missing {
      warn!(graph = %graph.name, agent_type = %agent_type, "bundle has a missing declaration");
    }

    let bundle = GraphBundle {
      graph_name: graph.name.clone(),
      entry_point: graph.entry_point.clone(),
      version_hash: Some(version_hash(&stripped)?),
      nodes: stripped.nodes,
      required_agents,
      required_services,
      agent_mappings,
      missing_declarations: requirements.missing,
      custom_agents,
      function_mappings,
      protocols: requirements.protocols,
      csv_hash,
      service_load_order,
      created_at: Utc::now(),
      last_updated: None,
      bundle_format: BUNDLE_FORMAT,
    };

    info!(
      graph = %bundle.graph_name,
      csv_hash = %bundle.csv_hash,
      nodes = bundle.nodes.len(),
      services = bundle.required_services.len(),
      missing = bundle.missing_declarations.len(),
      "bundle created"
    );

    Ok(bundle)
  }

  /// Keep only the names the registry declares as services.
  pub fn filter_actual_services<I, S>(&self, candidates: I) -> BTreeSet<String>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    candidates
      .into_iter()
      .filter(|name| self.registry.has_service(name.as_ref()))
      .map(|name| name.as_ref().to_string())
      .collect()
  }

  /// Whether the bundle was built from exactly this source.
  pub fn verify_hash(&self, bundle: &GraphBundle, source: &[u8]) -> bool {
    bundle.csv_hash == csv_hash(source)
  }

  /// Persist a bundle under its content address. Returns the storage key.
  pub async fn save_bundle(&self, bundle: &GraphBundle) -> Result<String, BundleError> {
    let key = bundle_key(&bundle.csv_hash, &bundle.graph_name);
    write_json(self.store.as_ref(), &key, bundle, WriteMode::Overwrite).await?;
    debug!(key = %key, "bundle saved");
    Ok(key)
  }

  pub async fn load_bundle(
    &self,
    csv_hash: &str,
    graph_name: &str,
  ) -> Result<Option<GraphBundle>, BundleError> {
    let key = bundle_key(csv_hash, graph_name);
    Ok(read_json(self.store.as_ref(), &key).await?)
  }

  /// Return the cached bundle for a source file, creating it if needed.
  ///
  /// A cached bundle is reconciled against the registry before it is
  /// returned. A new bundle is saved; a failed save is logged and the
  /// in-memory bundle is still returned.
  #[instrument(skip(self, csv_path), fields(path = %csv_path.display()))]
  pub async fn get_or_create_bundle(
    &self,
    csv_path: &Path,
    workflow_name: Option<&str>,
  ) -> Result<GraphBundle, BundleError> {
    let source = tokio::fs::read_to_string(csv_path)
      .await
      .map_err(|source| BundleError::Io {
        path: csv_path.to_path_buf(),
        source,
      })?;
    let hash = csv_hash(source.as_bytes());
    let graph_name = self.resolve_graph_name(&source, &hash, workflow_name)?;

    let cached = match self.load_bundle(&hash, &graph_name).await {
      Ok(cached) => cached,
      Err(BundleError::Store(StoreError::Serialization { key, source })) => {
        warn!(key = %key, error = %source, "cached bundle is unreadable, rebuilding");
        None
      }
      Err(e) => return Err(e),
    };

    if let Some(mut bundle) = cached {
      if !self.verify_hash(&bundle, source.as_bytes()) {
        return Err(BundleError::HashMismatch {
          expected: bundle.csv_hash,
          actual: hash,
        });
      }
      debug!(graph = %graph_name, csv_hash = %hash, "reusing cached bundle");
      BundleUpdateService::new(self.clone())
        .reconcile(&mut bundle, true)
        .await?;
      return Ok(bundle);
    }

    let bundle = self.create_from_source(&source, None, workflow_name)?;
    if let Err(e) = self.save_bundle(&bundle).await {
      warn!(graph = %bundle.graph_name, error = %e, "failed to save bundle");
    }
    Ok(bundle)
  }

  fn resolve_graph_name(
    &self,
    source: &str,
    hash: &str,
    workflow_name: Option<&str>,
  ) -> Result<String, BundleError> {
    let name = match workflow_name {
      Some(name) => name.to_string(),
      None => {
        let spec = weft_config::parse(source)?;
        spec
          .first_workflow()
          .map(|w| w.name.clone())
          .ok_or(ParseError::UnresolvableWorkflow { requested: None })?
      }
    };

    if name.trim().is_empty() {
      Ok(synthetic_graph_name(hash))
    } else {
      Ok(name)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use weft_registry::{AgentDeclaration, ServiceDeclaration};
  use weft_store::{FsStore, MemoryStore};
  use weft_workflow::{NodeContext, RuntimeHandle};

  const SOURCE: &str = "\
graph_name,node_name,agent_type,input_fields,output_field,success_next
TestGraph,start,echo,input_data,start_out,end
TestGraph,end,summarizer,start_out,end_out,
";

  fn service() -> BundleService {
    let registry = DeclarationRegistry::with_builtins();
    registry.register_service(ServiceDeclaration::new("B", "svc.b").depends_on("A"));
    registry.register_service(ServiceDeclaration::new("A", "svc.a"));
    BundleService::new(registry, Arc::new(MemoryStore::new()))
  }

  #[test]
  fn test_create_from_source() {
    let service = service();
    service.registry().register_agent(
      AgentDeclaration::custom("summarizer", "custom.summarizer")
        .with_service("B")
        .with_service("config_path"),
    );

    let bundle = service.create_from_source(SOURCE, None, None).unwrap();

    assert_eq!(bundle.graph_name, "TestGraph");
    assert_eq!(bundle.entry_point.as_deref(), Some("start"));
    assert_eq!(bundle.csv_hash, csv_hash(SOURCE.as_bytes()));
    assert_eq!(
      bundle.required_agents.iter().collect::<Vec<_>>(),
      vec!["echo", "summarizer"]
    );
    assert_eq!(
      bundle.agent_mappings.get("summarizer").map(String::as_str),
      Some("custom.summarizer")
    );
    assert!(bundle.custom_agents.contains("summarizer"));
    assert!(bundle.missing_declarations.is_empty());
    assert_eq!(bundle.service_load_order, vec!["A", "B"]);
    assert!(!bundle.required_services.contains("config_path"));
    assert!(bundle.invariant_violations(service.registry()).is_empty());
  }

  #[test]
  fn test_missing_declarations_are_recorded() {
    let service = service();
    let bundle = service.create_from_source(SOURCE, None, None).unwrap();

    assert_eq!(
      bundle.missing_declarations.iter().collect::<Vec<_>>(),
      vec!["summarizer"]
    );
    assert!(bundle.agent_mappings.is_empty());
    assert!(bundle.service_load_order.is_empty());
    assert!(bundle.invariant_violations(service.registry()).is_empty());
  }

  #[test]
  fn test_cache_key_overrides_hash() {
    let bundle = service()
      .create_from_source(SOURCE, Some("pinned"), None)
      .unwrap();
    assert_eq!(bundle.csv_hash, "pinned");
  }

  #[test]
  fn test_unnamed_workflow_gets_synthetic_name() {
    let source = "graph,node\n,a\n,b\n";
    let first = service().create_from_source(source, None, None).unwrap();
    let second = service().create_from_source(source, None, None).unwrap();

    assert!(first.graph_name.starts_with("graph-"));
    assert_eq!(first.graph_name, second.graph_name);
  }

  #[test]
  fn test_unknown_workflow_is_unresolvable() {
    let err = service()
      .create_from_source(SOURCE, None, Some("Other"))
      .unwrap_err();
    assert!(matches!(
      err,
      BundleError::Parse(ParseError::UnresolvableWorkflow { .. })
    ));
  }

  #[test]
  fn test_filter_actual_services() {
    let service = service();
    let filtered = service.filter_actual_services(["A", "csv_path", "B", "cache_key"]);
    assert_eq!(filtered.into_iter().collect::<Vec<_>>(), vec!["A", "B"]);
  }

  #[test]
  fn test_runtime_state_is_stripped() {
    let service = service();
    let mut graph = Graph::new("live");
    let mut node = weft_workflow::Node::new("a", "echo");
    let mut context = NodeContext::default();
    context.insert("instance", serde_json::json!("<agent>"));
    context.insert("mode", serde_json::json!("fast"));
    context.set_runtime(RuntimeHandle::new(42u32));
    node.context = context;
    graph.add_node(node);

    let bundle = service.create_from_graph(&graph, "h".to_string()).unwrap();
    let stored = &bundle.nodes["a"];
    assert!(!stored.context.has_runtime());
    assert_eq!(stored.context.get("mode"), Some(&serde_json::json!("fast")));

    // the live graph keeps its instance
    assert!(graph.get_node("a").unwrap().context.runtime().is_some());
  }

  #[tokio::test]
  async fn test_save_and_load() {
    let service = service();
    let bundle = service.create_from_source(SOURCE, None, None).unwrap();

    let key = service.save_bundle(&bundle).await.unwrap();
    assert_eq!(key, format!("bundles/{}/TestGraph.json", bundle.csv_hash));

    let loaded = service
      .load_bundle(&bundle.csv_hash, "TestGraph")
      .await
      .unwrap()
      .unwrap();
    assert_eq!(loaded, bundle);
    assert!(service.load_bundle("other", "TestGraph").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_get_or_create_reuses_cached_bundle() {
    let dir = tempfile::TempDir::new().unwrap();
    let csv_path = dir.path().join("flow.csv");
    std::fs::write(&csv_path, SOURCE).unwrap();

    let registry = DeclarationRegistry::with_builtins();
    let service = BundleService::new(registry, Arc::new(FsStore::new(dir.path().join("cache"))));

    let created = service.get_or_create_bundle(&csv_path, None).await.unwrap();
    assert!(
      dir
        .path()
        .join("cache")
        .join(bundle_key(&created.csv_hash, "TestGraph"))
        .is_file()
    );

    let reused = service.get_or_create_bundle(&csv_path, None).await.unwrap();
    assert_eq!(reused.created_at, created.created_at);
    assert_eq!(reused.last_updated, None);

    // a changed registry is picked up by the cached bundle
    service
      .registry()
      .register_agent(AgentDeclaration::custom("summarizer", "custom.summarizer"));
    let repaired = service.get_or_create_bundle(&csv_path, None).await.unwrap();
    assert!(repaired.missing_declarations.is_empty());
    assert_eq!(repaired.created_at, created.created_at);
    assert!(repaired.last_updated.is_some());
  }

  #[tokio::test]
  async fn test_unreadable_cached_bundle_is_rebuilt() {
    let dir = tempfile::TempDir::new().unwrap();
    let csv_path = dir.path().join("flow.csv");
    std::fs::write(&csv_path, SOURCE).unwrap();

    let store = Arc::new(MemoryStore::new());
    let key = bundle_key(&csv_hash(SOURCE.as_bytes()), "TestGraph");
    weft_store::write_bytes(store.as_ref(), &key, b"{\"graph_na".to_vec(), WriteMode::Overwrite)
      .await
      .unwrap();

    let service = BundleService::new(DeclarationRegistry::with_builtins(), store.clone());
    let bundle = service.get_or_create_bundle(&csv_path, None).await.unwrap();
    assert_eq!(bundle.graph_name, "TestGraph");

    // the truncated entry was replaced by a readable one
    let stored = service
      .load_bundle(&bundle.csv_hash, "TestGraph")
      .await
      .unwrap()
      .unwrap();
    assert_eq!(stored, bundle);
  }

  #[test]
  fn test_synthetic_name_resolves_unnamed_workflow() {
    let source = "graph,node\n,a\n,b\n";
    let name = synthetic_graph_name(&csv_hash(source.as_bytes()));
    let bundle = service().create_from_source(source, None, Some(&name)).unwrap();

    assert_eq!(bundle.graph_name, name);
    assert_eq!(bundle.nodes.len(), 2);
  }

  #[test]
  fn test_verify_hash() {
    let service = service();
    let bundle = service.create_from_source(SOURCE, None, None).unwrap();

    assert!(service.verify_hash(&bundle, SOURCE.as_bytes()));
    let mutated = SOURCE.replacen("start", "stars", 1);
    assert!(!service.verify_hash(&bundle, mutated.as_bytes()));
  }
}
