//! Routing functions for `func:<name>` edges.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

/// What a routing function sees after its node ran.
pub struct RouteContext<'a> {
  pub node: &'a str,
  pub success: bool,
  pub state: &'a Map<String, Value>,
}

/// Picks the next node, or `None` to end the run.
pub type RouteFunction = Arc<dyn Fn(&RouteContext<'_>) -> Option<String> + Send + Sync>;

#[derive(Clone, Default)]
pub struct RouteTable {
  functions: HashMap<String, RouteFunction>,
}

impl RouteTable {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register<F>(&mut self, name: impl Into<String>, function: F)
  where
    F: Fn(&RouteContext<'_>) -> Option<String> + Send + Sync + 'static,
  {
    self.functions.insert(name.into(), Arc::new(function));
  }

  pub fn get(&self, name: &str) -> Option<&RouteFunction> {
    self.functions.get(name)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.functions.contains_key(name)
  }
}
