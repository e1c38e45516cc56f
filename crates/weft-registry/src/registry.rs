use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::declaration::{AgentDeclaration, ServiceDeclaration};
use crate::error::RegistryError;

/// Agent types every registry created with [`DeclarationRegistry::with_builtins`] knows.
pub const BUILTIN_AGENT_TYPES: &[&str] = &["default", "echo", "success", "failure", "branching"];

/// The capabilities a set of agent types needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements {
  /// Transitive closure of required service names. May contain names with
  /// no service declaration; callers filter those out.
  pub services: BTreeSet<String>,
  pub protocols: BTreeSet<String>,
  /// Agent types with no declaration.
  pub missing: BTreeSet<String>,
}

#[derive(Default)]
struct Declarations {
  agents: BTreeMap<String, AgentDeclaration>,
  services: BTreeMap<String, ServiceDeclaration>,
}

/// Catalog of agent and service declarations.
///
/// Cloning is cheap and every clone shares the same declarations.
#[derive(Clone, Default)]
pub struct DeclarationRegistry {
  inner: Arc<RwLock<Declarations>>,
}

impl DeclarationRegistry {
  /// Create an empty registry.
  pub fn new() -> Self {
    Self::default()
  }

  /// Create a registry pre-populated with the built-in agents.
  pub fn with_builtins() -> Self {
    let registry = Self::new();
    for agent_type in BUILTIN_AGENT_TYPES {
      registry.register_agent(AgentDeclaration::builtin(
        *agent_type,
        format!("builtin.{}", agent_type),
      ));
    }
    registry
  }

  fn read(&self) -> RwLockReadGuard<'_, Declarations> {
    self.inner.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write(&self) -> RwLockWriteGuard<'_, Declarations> {
    self.inner.write().unwrap_or_else(PoisonError::into_inner)
  }

  /// Register an agent declaration, returning the one it replaced.
  pub fn register_agent(&self, declaration: AgentDeclaration) -> Option<AgentDeclaration> {
    debug!(
      agent_type = %declaration.agent_type,
      implementation = %declaration.implementation,
      "registering agent declaration"
    );
    self
      .write()
      .agents
      .insert(declaration.agent_type.clone(), declaration)
  }

  /// Register a service declaration, returning the one it replaced.
  pub fn register_service(&self, declaration: ServiceDeclaration) -> Option<ServiceDeclaration> {
    debug!(
      service = %declaration.name,
      implementation = %declaration.implementation,
      "registering service declaration"
    );
    self
      .write()
      .services
      .insert(declaration.name.clone(), declaration)
  }

  pub fn unregister_agent(&self, agent_type: &str) -> Option<AgentDeclaration> {
    self.write().agents.remove(agent_type)
  }

  pub fn unregister_service(&self, name: &str) -> Option<ServiceDeclaration> {
    self.write().services.remove(name)
  }

  pub fn get_agent_declaration(&self, agent_type: &str) -> Option<AgentDeclaration> {
    self.read().agents.get(agent_type).cloned()
  }

  pub fn get_service_declaration(&self, name: &str) -> Option<ServiceDeclaration> {
    self.read().services.get(name).cloned()
  }

  pub fn has_service(&self, name: &str) -> bool {
    self.read().services.contains_key(name)
  }

  pub fn agent_types(&self) -> Vec<String> {
    self.read().agents.keys().cloned().collect()
  }

  pub fn service_names(&self) -> Vec<String> {
    self.read().services.keys().cloned().collect()
  }

  /// Resolve what the given agent types need.
  ///
  /// Services are followed transitively through their `depends_on` lists.
  pub fn resolve_requirements<I, S>(&self, agent_types: I) -> Requirements
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let declarations = self.read();
    let mut requirements = Requirements::default();
    let mut pending: Vec<String> = Vec::new();

    for agent_type in agent_types {
      let agent_type = agent_type.as_ref();
      match declarations.agents.get(agent_type) {
        Some(agent) => {
          pending.extend(agent.services.iter().cloned());
          requirements.protocols.extend(agent.protocols.iter().cloned());
        }
        None => {
          requirements.missing.insert(agent_type.to_string());
        }
      }
    }

    while let Some(service) = pending.pop() {
      if !requirements.services.insert(service.clone()) {
        continue;
      }
      if let Some(declaration) = declarations.services.get(&service) {
        pending.extend(
          declaration
            .depends_on
            .iter()
            .filter(|d| !requirements.services.contains(*d))
            .cloned(),
        );
      }
    }

    for agent_type in &requirements.missing {
      warn!(agent_type = %agent_type, "no declaration for agent type");
    }

    requirements
  }

  /// Order services so that every service comes after its dependencies.
  ///
  /// Only dependencies inside `services` are considered. Services are visited
  /// in sorted order so the result is deterministic.
  pub fn calculate_load_order(
    &self,
    services: &BTreeSet<String>,
  ) -> Result<Vec<String>, RegistryError> {
    let adjacency: HashMap<&str, Vec<&str>> = {
      let declarations = self.read();
      services
        .iter()
        .map(|name| {
          let deps = declarations
            .services
            .get(name)
            .map(|d| {
              d.depends_on
                .iter()
                .filter_map(|dep| services.get(dep).map(String::as_str))
                .collect()
            })
            .unwrap_or_default();
          (name.as_str(), deps)
        })
        .collect()
    };

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
      Visiting,
      Done,
    }

    fn visit<'a>(
      service: &'a str,
      adjacency: &HashMap<&'a str, Vec<&'a str>>,
      marks: &mut HashMap<&'a str, Mark>,
      path: &mut Vec<&'a str>,
      order: &mut Vec<String>,
    ) -> Result<(), RegistryError> {
      match marks.get(service) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
          let start = path.iter().position(|s| *s == service).unwrap_or(0);
          let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
          cycle.push(service.to_string());
          return Err(RegistryError::CycleDetected { cycle });
        }
        None => {}
      }

      marks.insert(service, Mark::Visiting);
      path.push(service);

      if let Some(deps) = adjacency.get(service) {
        for dep in deps {
          visit(*dep, adjacency, marks, path, order)?;
        }
      }

      path.pop();
      marks.insert(service, Mark::Done);
      order.push(service.to_string());
      Ok(())
    }

    let mut marks = HashMap::new();
    let mut path = Vec::new();
    let mut order = Vec::with_capacity(services.len());

    for service in services {
      visit(service, &adjacency, &mut marks, &mut path, &mut order)?;
    }

    Ok(order)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn test_builtins_are_declared() {
    let registry = DeclarationRegistry::with_builtins();

    for agent_type in BUILTIN_AGENT_TYPES {
      let declaration = registry.get_agent_declaration(agent_type).unwrap();
      assert!(!declaration.is_custom());
    }
    assert!(registry.get_agent_declaration("summarizer").is_none());
  }

  #[test]
  fn test_resolve_requirements_is_transitive() {
    let registry = DeclarationRegistry::with_builtins();
    registry.register_service(ServiceDeclaration::new("llm", "svc.llm").depends_on("http"));
    registry.register_service(ServiceDeclaration::new("http", "svc.http"));
    registry.register_agent(
      AgentDeclaration::custom("summarizer", "custom.summarizer")
        .with_service("llm")
        .with_protocol("llm_capable"),
    );

    let requirements = registry.resolve_requirements(["summarizer", "echo", "ghost"]);
    assert_eq!(requirements.services, set(&["http", "llm"]));
    assert_eq!(requirements.protocols, set(&["llm_capable"]));
    assert_eq!(requirements.missing, set(&["ghost"]));
  }

  #[test]
  fn test_load_order_respects_dependencies() {
    let registry = DeclarationRegistry::new();
    registry.register_service(ServiceDeclaration::new("B", "svc.b").depends_on("A"));
    registry.register_service(ServiceDeclaration::new("A", "svc.a"));

    let order = registry.calculate_load_order(&set(&["A", "B"])).unwrap();
    assert_eq!(order, vec!["A", "B"]);
  }

  #[test]
  fn test_load_order_chain_and_independent() {
    let registry = DeclarationRegistry::new();
    registry.register_service(ServiceDeclaration::new("a", "x").depends_on("c"));
    registry.register_service(ServiceDeclaration::new("c", "x").depends_on("d"));
    registry.register_service(ServiceDeclaration::new("d", "x"));
    registry.register_service(ServiceDeclaration::new("b", "x"));

    let order = registry
      .calculate_load_order(&set(&["a", "b", "c", "d"]))
      .unwrap();
    assert_eq!(order, vec!["d", "c", "a", "b"]);
  }

  #[test]
  fn test_load_order_ignores_dependencies_outside_the_set() {
    let registry = DeclarationRegistry::new();
    registry.register_service(ServiceDeclaration::new("B", "svc.b").depends_on("A"));

    let order = registry.calculate_load_order(&set(&["B"])).unwrap();
    assert_eq!(order, vec!["B"]);
  }

  #[test]
  fn test_load_order_reports_cycle() {
    let registry = DeclarationRegistry::new();
    registry.register_service(ServiceDeclaration::new("A", "x").depends_on("B"));
    registry.register_service(ServiceDeclaration::new("B", "x").depends_on("A"));

    let err = registry
      .calculate_load_order(&set(&["A", "B"]))
      .unwrap_err();
    match err {
      RegistryError::CycleDetected { cycle } => assert_eq!(cycle, vec!["A", "B", "A"]),
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn test_clones_share_declarations() {
    let registry = DeclarationRegistry::new();
    let shared = registry.clone();
    shared.register_agent(AgentDeclaration::custom("late", "custom.late"));

    assert!(registry.get_agent_declaration("late").is_some());
    assert!(registry.unregister_agent("late").is_some());
    assert!(shared.get_agent_declaration("late").is_none());
  }
}
