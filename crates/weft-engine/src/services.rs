//! Service construction and injection.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;
use weft_registry::DeclarationRegistry;

use crate::error::EngineError;

/// A live service instance.
pub type ServiceHandle = Arc<dyn Any + Send + Sync>;

/// Builds a service from the services created before it.
pub type ServiceConstructor =
  Arc<dyn Fn(&ServiceContainer) -> Result<ServiceHandle, String> + Send + Sync>;

/// Named service instances.
#[derive(Clone, Default)]
pub struct ServiceContainer {
  services: BTreeMap<String, ServiceHandle>,
}

impl ServiceContainer {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, name: impl Into<String>, service: ServiceHandle) {
    self.services.insert(name.into(), service);
  }

  pub fn get(&self, name: &str) -> Option<&ServiceHandle> {
    self.services.get(name)
  }

  /// Get a service downcast to its concrete type.
  pub fn get_as<T: Any + Send + Sync>(&self, name: &str) -> Option<&T> {
    self.services.get(name).and_then(|s| s.downcast_ref::<T>())
  }

  pub fn contains(&self, name: &str) -> bool {
    self.services.contains_key(name)
  }

  pub fn names(&self) -> Vec<&str> {
    self.services.keys().map(String::as_str).collect()
  }

  pub fn len(&self) -> usize {
    self.services.len()
  }

  pub fn is_empty(&self) -> bool {
    self.services.is_empty()
  }
}

/// Maps service implementation ids to constructors.
#[derive(Clone, Default)]
pub struct ServiceFactory {
  constructors: HashMap<String, ServiceConstructor>,
}

impl ServiceFactory {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register<F>(&mut self, implementation: impl Into<String>, constructor: F)
  where
    F: Fn(&ServiceContainer) -> Result<ServiceHandle, String> + Send + Sync + 'static,
  {
    self
      .constructors
      .insert(implementation.into(), Arc::new(constructor));
  }

  pub fn contains(&self, implementation: &str) -> bool {
    self.constructors.contains_key(implementation)
  }

  /// Create services in `load_order`, each seeing the ones before it.
  pub fn create_services(
    &self,
    registry: &DeclarationRegistry,
    load_order: &[String],
  ) -> Result<ServiceContainer, EngineError> {
    let mut container = ServiceContainer::new();

    for name in load_order {
      let declaration =
        registry
          .get_service_declaration(name)
          .ok_or_else(|| EngineError::ServiceCreation {
            service: name.clone(),
            message: "service is not declared".to_string(),
          })?;

      let constructor = self.constructors.get(&declaration.implementation).ok_or_else(|| {
        EngineError::UnknownImplementation {
          kind: "service",
          implementation: declaration.implementation.clone(),
        }
      })?;

      let service = constructor(&container).map_err(|message| EngineError::ServiceCreation {
        service: name.clone(),
        message,
      })?;

      debug!(service = %name, implementation = %declaration.implementation, "service created");
      container.insert(name.clone(), service);
    }

    Ok(container)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use weft_registry::ServiceDeclaration;

  struct Database {
    url: String,
  }

  struct Cache {
    backend: String,
  }

  #[test]
  fn test_services_are_created_in_order() {
    let registry = DeclarationRegistry::new();
    registry.register_service(ServiceDeclaration::new("db", "svc.db"));
    registry.register_service(ServiceDeclaration::new("cache", "svc.cache").depends_on("db"));

    let mut factory = ServiceFactory::new();
    factory.register("svc.db", |_: &ServiceContainer| {
      Ok(Arc::new(Database {
        url: "memory://".to_string(),
      }) as ServiceHandle)
    });
    factory.register("svc.cache", |container: &ServiceContainer| {
      let db = container
        .get_as::<Database>("db")
        .ok_or_else(|| "db not loaded".to_string())?;
      Ok(Arc::new(Cache {
        backend: db.url.clone(),
      }) as ServiceHandle)
    });

    let order = vec!["db".to_string(), "cache".to_string()];
    let container = factory.create_services(&registry, &order).unwrap();
    assert_eq!(container.get_as::<Cache>("cache").unwrap().backend, "memory://");

    let reversed = vec!["cache".to_string(), "db".to_string()];
    let err = factory.create_services(&registry, &reversed).err().unwrap();
    assert!(matches!(err, EngineError::ServiceCreation { .. }));
  }

  #[test]
  fn test_unknown_implementation() {
    let registry = DeclarationRegistry::new();
    registry.register_service(ServiceDeclaration::new("db", "svc.db"));

    let err = ServiceFactory::new()
      .create_services(&registry, &["db".to_string()])
      .err()
      .unwrap();
    assert!(matches!(
      err,
      EngineError::UnknownImplementation { kind: "service", .. }
    ));
  }
}
