//! Strategy selection for graph runs.
//!
//! A run tries, in order:
//! 1. the compiled artifact at `compiled/<graph>.json`
//! 2. compiling the graph on demand, when autocompile is on
//! 3. parsing the workflow table and running the graph in memory
//!
//! An existing artifact is authoritative: when it is present neither the
//! compiler nor the in-memory path is used. An artifact that cannot be
//! decoded counts as absent. A compile failure falls through to the
//! in-memory path, which never writes anything.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use weft_bundle::{
  BundleService, BundleUpdateService, GraphBundle, compiled_key, csv_hash, find_workflow,
  synthetic_graph_name,
};
use weft_config::ParseError;
use weft_engine::{
  AgentFactory, CompiledFrom, ExecutionEngine, ExecutionResult, GraphInstantiator, RouteTable,
  ServiceFactory, State,
};
use weft_registry::DeclarationRegistry;
use weft_store::{Store, StoreError, read_json};
use weft_workflow::{Graph, GraphFactory};

use crate::compiler::{CompilationService, GraphCompiler};
use crate::config::{RunOptions, RunnerConfig};
use crate::error::RunnerError;

pub struct GraphRunner {
  config: RunnerConfig,
  bundles: BundleService,
  instantiator: GraphInstantiator,
  engine: ExecutionEngine,
  compiler: Arc<dyn GraphCompiler>,
}

impl GraphRunner {
  /// A runner with the built-in agents and no services.
  pub fn new(config: RunnerConfig, registry: DeclarationRegistry, store: Arc<dyn Store>) -> Self {
    Self::with_factories(
      config,
      registry,
      store,
      AgentFactory::with_builtins(),
      ServiceFactory::new(),
    )
  }

  pub fn with_factories(
    config: RunnerConfig,
    registry: DeclarationRegistry,
    store: Arc<dyn Store>,
    agents: AgentFactory,
    services: ServiceFactory,
  ) -> Self {
    let bundles = BundleService::new(registry.clone(), store);
    Self {
      engine: ExecutionEngine::new(config.execution.clone()),
      instantiator: GraphInstantiator::new(registry, agents, services),
      compiler: Arc::new(CompilationService::new(bundles.clone())),
      bundles,
      config,
    }
  }

  /// Replace the compiler used for autocompilation.
  pub fn with_compiler(mut self, compiler: Arc<dyn GraphCompiler>) -> Self {
    self.compiler = compiler;
    self
  }

  pub fn with_routes(mut self, routes: RouteTable) -> Self {
    self.engine = self.engine.with_routes(routes);
    self
  }

  pub fn config(&self) -> &RunnerConfig {
    &self.config
  }

  pub fn bundles(&self) -> &BundleService {
    &self.bundles
  }

  /// Run a graph by name. Never fails; errors are reported in the result.
  #[instrument(name = "graph_run", skip(self, options), fields(graph = %graph_name))]
  pub async fn run(&self, graph_name: &str, options: RunOptions) -> ExecutionResult {
    let RunOptions {
      initial_state,
      autocompile,
      csv_path,
    } = options;

    match self.load_precompiled(graph_name).await {
      Ok(Some(bundle)) => {
        info!(strategy = %CompiledFrom::Precompiled, "running graph");
        return self
          .execute_bundle(&bundle, initial_state)
          .await
          .with_compiled_from(CompiledFrom::Precompiled);
      }
      Ok(None) => debug!("no compiled artifact"),
      Err(e) => {
        return ExecutionResult::failure(graph_name, initial_state, e.to_string())
          .with_compiled_from(CompiledFrom::Precompiled);
      }
    }

    let Some(csv_path) = csv_path.or_else(|| self.config.csv_path.clone()) else {
      let error = RunnerError::NoSource {
        graph: graph_name.to_string(),
      };
      return ExecutionResult::failure(graph_name, initial_state, error.to_string())
        .with_compiled_from(CompiledFrom::Memory);
    };

    if autocompile.unwrap_or(self.config.autocompile) {
      match self.compiler.compile(graph_name, &csv_path).await {
        Ok(bundle) => {
          info!(strategy = %CompiledFrom::Autocompiled, "running graph");
          return self
            .execute_bundle(&bundle, initial_state)
            .await
            .with_compiled_from(CompiledFrom::Autocompiled);
        }
        Err(e) => {
          warn!(error = %e, "autocompile failed, running from source");
        }
      }
    }

    self.run_from_csv_direct(&csv_path, graph_name, initial_state).await
  }

  /// Parse, build and run a graph in memory without touching the store.
  #[instrument(skip(self, csv_path, initial_state), fields(path = %csv_path.display()))]
  pub async fn run_from_csv_direct(
    &self,
    csv_path: &Path,
    graph_name: &str,
    initial_state: State,
  ) -> ExecutionResult {
    info!(strategy = %CompiledFrom::Memory, "running graph");
    let result = match self.build_in_memory(csv_path, graph_name).await {
      Ok(graph) => self.engine.execute(&graph, initial_state).await,
      Err(e) => ExecutionResult::failure(graph_name, initial_state, e.to_string()),
    };
    result.with_compiled_from(CompiledFrom::Memory)
  }

  async fn load_precompiled(&self, graph_name: &str) -> Result<Option<GraphBundle>, RunnerError> {
    let key = compiled_key(graph_name);
    let stored = match read_json::<GraphBundle>(self.bundles.store().as_ref(), &key).await {
      Ok(stored) => stored,
      Err(StoreError::Serialization { source, .. }) => {
        warn!(key = %key, error = %source, "compiled graph is unreadable, ignoring it");
        None
      }
      Err(e) => return Err(e.into()),
    };
    let Some(mut bundle) = stored else {
      return Ok(None);
    };

    // Pick up declarations registered since the artifact was written.
    let outcome = BundleUpdateService::new(self.bundles.clone())
      .reconcile(&mut bundle, false)
      .await?;
    if outcome.changed {
      debug!("compiled graph reconciled against registry");
    }
    Ok(Some(bundle))
  }

  async fn execute_bundle(&self, bundle: &GraphBundle, initial_state: State) -> ExecutionResult {
    match self.instantiator.instantiate_bundle(bundle) {
      Ok(graph) => self.engine.execute(&graph, initial_state).await,
      Err(e) => ExecutionResult::failure(&bundle.graph_name, initial_state, e.to_string()),
    }
  }

  async fn build_in_memory(&self, csv_path: &Path, graph_name: &str) -> Result<Graph, RunnerError> {
    let source = tokio::fs::read_to_string(csv_path)
      .await
      .map_err(|source| ParseError::Io {
        path: csv_path.to_path_buf(),
        source,
      })?;
    let hash = csv_hash(source.as_bytes());
    let spec = weft_config::parse(&source)?;

    let workflow =
      find_workflow(&spec, graph_name, &hash).ok_or_else(|| ParseError::UnresolvableWorkflow {
        requested: Some(graph_name.to_string()),
      })?;

    let mut graph = GraphFactory::build(&workflow.name, &workflow.nodes);
    if graph.name.trim().is_empty() {
      graph.name = synthetic_graph_name(&hash);
    }
    GraphFactory::validate(&graph);
    self.instantiator.instantiate(&mut graph)?;
    Ok(graph)
  }
}
