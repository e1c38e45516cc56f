//! Binding live agents and services to graph nodes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info, instrument};
use weft_bundle::GraphBundle;
use weft_registry::DeclarationRegistry;
use weft_workflow::{Graph, RuntimeHandle};

use crate::agent::AgentInstance;
use crate::error::EngineError;
use crate::factory::AgentFactory;
use crate::services::{ServiceContainer, ServiceFactory};

/// What an instantiation bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstantiationSummary {
  pub nodes: usize,
  /// Services created, in load order.
  pub services: Vec<String>,
}

struct Binding {
  implementation: String,
  services: BTreeSet<String>,
}

/// Creates agents and services for a graph and attaches them to its nodes.
#[derive(Clone)]
pub struct GraphInstantiator {
  registry: DeclarationRegistry,
  agents: AgentFactory,
  services: ServiceFactory,
}

impl GraphInstantiator {
  pub fn new(registry: DeclarationRegistry, agents: AgentFactory, services: ServiceFactory) -> Self {
    Self {
      registry,
      agents,
      services,
    }
  }

  pub fn registry(&self) -> &DeclarationRegistry {
    &self.registry
  }

  /// Bind a graph built directly from its source.
  ///
  /// Every agent type must be declared in the registry.
  #[instrument(name = "instantiate_graph", skip(self, graph), fields(graph = %graph.name))]
  pub fn instantiate(&self, graph: &mut Graph) -> Result<InstantiationSummary, EngineError> {
    let agent_types = graph.agent_types();
    let mut bindings = BTreeMap::new();

    for agent_type in &agent_types {
      let declaration = self.registry.get_agent_declaration(agent_type).ok_or_else(|| {
        EngineError::MissingDeclaration {
          agent_type: agent_type.clone(),
        }
      })?;
      bindings.insert(
        agent_type.clone(),
        Binding {
          implementation: declaration.implementation,
          services: declaration.services,
        },
      );
    }

    let requirements = self.registry.resolve_requirements(&agent_types);
    let services: BTreeSet<String> = requirements
      .services
      .into_iter()
      .filter(|s| self.registry.has_service(s))
      .collect();
    let load_order = self.registry.calculate_load_order(&services)?;

    self.bind(graph, &bindings, &load_order)
  }

  /// Rebuild and bind the graph stored in a bundle.
  ///
  /// Custom agents use the bundle's recorded implementation; the bundle's
  /// load order decides service creation order.
  #[instrument(name = "instantiate_bundle", skip(self, bundle), fields(graph = %bundle.graph_name))]
  pub fn instantiate_bundle(&self, bundle: &GraphBundle) -> Result<Graph, EngineError> {
    if let Some(agent_type) = bundle.missing_declarations.iter().next() {
      return Err(EngineError::MissingDeclaration {
        agent_type: agent_type.clone(),
      });
    }

    let mut bindings = BTreeMap::new();
    for agent_type in &bundle.required_agents {
      let declaration = self.registry.get_agent_declaration(agent_type);
      let implementation = bundle
        .agent_mappings
        .get(agent_type)
        .cloned()
        .or_else(|| declaration.as_ref().map(|d| d.implementation.clone()))
        .ok_or_else(|| EngineError::MissingDeclaration {
          agent_type: agent_type.clone(),
        })?;
      bindings.insert(
        agent_type.clone(),
        Binding {
          implementation,
          services: declaration.map(|d| d.services).unwrap_or_default(),
        },
      );
    }

    let mut graph = bundle.to_graph();
    self.bind(&mut graph, &bindings, &bundle.service_load_order)?;
    Ok(graph)
  }

  fn bind(
    &self,
    graph: &mut Graph,
    bindings: &BTreeMap<String, Binding>,
    load_order: &[String],
  ) -> Result<InstantiationSummary, EngineError> {
    let container = self.services.create_services(&self.registry, load_order)?;

    for node in graph.nodes.values_mut() {
      let binding =
        bindings
          .get(&node.agent_type)
          .ok_or_else(|| EngineError::MissingDeclaration {
            agent_type: node.agent_type.clone(),
          })?;

      let mut injected = ServiceContainer::new();
      for service in &binding.services {
        // Names that are not declared services are not injected.
        if !self.registry.has_service(service) {
          continue;
        }
        let handle = container
          .get(service)
          .ok_or_else(|| EngineError::ServiceUnavailable {
            service: service.clone(),
            agent_type: node.agent_type.clone(),
          })?;
        injected.insert(service.clone(), handle.clone());
      }

      let agent = self.agents.create(&binding.implementation)?;
      debug!(
        node = %node.name,
        agent_type = %node.agent_type,
        implementation = %binding.implementation,
        services = injected.len(),
        "agent bound"
      );

      node.context.set_runtime(RuntimeHandle::new(AgentInstance {
        agent_type: node.agent_type.clone(),
        implementation: binding.implementation.clone(),
        agent,
        services: Arc::new(injected),
      }));
    }

    info!(nodes = graph.len(), services = load_order.len(), "graph instantiated");

    Ok(InstantiationSummary {
      nodes: graph.len(),
      services: load_order.to_vec(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use weft_registry::{AgentDeclaration, ServiceDeclaration};
  use weft_store::MemoryStore;
  use weft_workflow::Node;

  use crate::services::ServiceHandle;

  struct Clock;

  fn instantiator(registry: DeclarationRegistry) -> GraphInstantiator {
    let mut services = ServiceFactory::new();
    services.register("svc.clock", |_: &ServiceContainer| Ok(Arc::new(Clock) as ServiceHandle));
    let mut agents = AgentFactory::with_builtins();
    agents.register("custom.timed", || Arc::new(crate::builtin::EchoAgent) as Arc<dyn crate::agent::Agent>);
    GraphInstantiator::new(registry, agents, services)
  }

  fn registry() -> DeclarationRegistry {
    let registry = DeclarationRegistry::with_builtins();
    registry.register_service(ServiceDeclaration::new("clock", "svc.clock"));
    registry.register_agent(
      AgentDeclaration::custom("timed", "custom.timed")
        .with_service("clock")
        .with_service("config_path"),
    );
    registry
  }

  fn instance(graph: &Graph, node: &str) -> AgentInstance {
    graph
      .get_node(node)
      .and_then(|n| n.context.runtime())
      .and_then(|h| h.downcast_ref::<AgentInstance>())
      .cloned()
      .unwrap()
  }

  #[test]
  fn test_instantiate_injects_services() {
    let mut graph = Graph::new("flow");
    graph.add_node(Node::new("a", "timed"));
    graph.add_node(Node::new("b", "echo"));

    let summary = instantiator(registry()).instantiate(&mut graph).unwrap();
    assert_eq!(summary.services, vec!["clock"]);

    let timed = instance(&graph, "a");
    assert_eq!(timed.implementation, "custom.timed");
    assert!(timed.services.get_as::<Clock>("clock").is_some());
    assert!(!timed.services.contains("config_path"));

    let echo = instance(&graph, "b");
    assert_eq!(echo.implementation, "builtin.echo");
    assert!(echo.services.is_empty());
  }

  #[test]
  fn test_instantiate_rejects_missing_declaration() {
    let mut graph = Graph::new("flow");
    graph.add_node(Node::new("a", "ghost"));

    let err = instantiator(registry()).instantiate(&mut graph).err().unwrap();
    assert!(matches!(err, EngineError::MissingDeclaration { agent_type } if agent_type == "ghost"));
  }

  #[test]
  fn test_instantiate_bundle_uses_recorded_mapping() {
    let registry = registry();
    let bundles = weft_bundle::BundleService::new(
      registry.clone(),
      Arc::new(MemoryStore::new()),
    );
    let bundle = bundles
      .create_from_source("graph,node,agent\nflow,a,timed\nflow,b,echo\n", None, None)
      .unwrap();

    let graph = instantiator(registry).instantiate_bundle(&bundle).unwrap();
    assert_eq!(instance(&graph, "a").implementation, "custom.timed");
    assert!(instance(&graph, "a").services.contains("clock"));
  }

  #[test]
  fn test_instantiate_bundle_with_missing_declaration_fails() {
    let registry = DeclarationRegistry::with_builtins();
    let bundles = weft_bundle::BundleService::new(
      registry.clone(),
      Arc::new(MemoryStore::new()),
    );
    let bundle = bundles
      .create_from_source("graph,node,agent\nflow,a,unknown\n", None, None)
      .unwrap();

    let err = instantiator(registry).instantiate_bundle(&bundle).err().unwrap();
    assert!(matches!(err, EngineError::MissingDeclaration { .. }));
  }
}
