//! Node context with a dedicated runtime slot.
//!
//! The context holds the serializable key-value pairs a node was declared
//! with. The live agent instance attached during instantiation lives in a
//! separate slot that serde never sees, so a persisted node can never carry
//! it.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Context key reserved for runtime instances in loosely-typed sources.
///
/// Values stored under this key are dropped whenever a context is stripped.
pub const RUNTIME_INSTANCE_KEY: &str = "instance";

/// An opaque, shareable handle to a live runtime object.
#[derive(Clone)]
pub struct RuntimeHandle(Arc<dyn Any + Send + Sync>);

impl RuntimeHandle {
  pub fn new<T: Any + Send + Sync>(value: T) -> Self {
    Self(Arc::new(value))
  }

  pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
    self.0.downcast_ref::<T>()
  }
}

impl fmt::Debug for RuntimeHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("RuntimeHandle(..)")
  }
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeContext {
  values: BTreeMap<String, serde_json::Value>,
  #[serde(skip)]
  runtime: Option<RuntimeHandle>,
}

impl NodeContext {
  pub fn new(values: BTreeMap<String, serde_json::Value>) -> Self {
    Self {
      values,
      runtime: None,
    }
  }

  pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
    self.values.get(key)
  }

  pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
    self.values.insert(key.into(), value);
  }

  pub fn values(&self) -> &BTreeMap<String, serde_json::Value> {
    &self.values
  }

  pub fn runtime(&self) -> Option<&RuntimeHandle> {
    self.runtime.as_ref()
  }

  pub fn set_runtime(&mut self, handle: RuntimeHandle) {
    self.runtime = Some(handle);
  }

  pub fn has_runtime(&self) -> bool {
    self.runtime.is_some() || self.values.contains_key(RUNTIME_INSTANCE_KEY)
  }

  /// Drop the runtime slot and the reserved instance key.
  pub fn strip_runtime(&mut self) {
    self.runtime = None;
    self.values.remove(RUNTIME_INSTANCE_KEY);
  }

  /// A deep copy without any runtime state.
  pub fn stripped(&self) -> Self {
    let mut copy = Self::new(self.values.clone());
    copy.strip_runtime();
    copy
  }
}

// Equality ignores the runtime slot: two nodes are the same declaration
// whether or not an agent has been attached.
impl PartialEq for NodeContext {
  fn eq(&self, other: &Self) -> bool {
    self.values == other.values
  }
}

impl fmt::Debug for NodeContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("NodeContext")
      .field("values", &self.values)
      .field("runtime", &self.runtime.is_some())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  struct Live(u32);

  #[test]
  fn test_runtime_slot_is_not_serialized() {
    let mut context = NodeContext::default();
    context.insert("mode", json!("fast"));
    context.set_runtime(RuntimeHandle::new(Live(7)));

    let encoded = serde_json::to_value(&context).unwrap();
    assert_eq!(encoded, json!({"mode": "fast"}));

    let decoded: NodeContext = serde_json::from_value(encoded).unwrap();
    assert!(decoded.runtime().is_none());
    assert_eq!(decoded, context);
  }

  #[test]
  fn test_downcast_runtime() {
    let mut context = NodeContext::default();
    context.set_runtime(RuntimeHandle::new(Live(7)));

    let live = context.runtime().and_then(|h| h.downcast_ref::<Live>());
    assert_eq!(live.map(|l| l.0), Some(7));
    assert!(context.runtime().unwrap().downcast_ref::<String>().is_none());
  }

  #[test]
  fn test_stripped_drops_reserved_key_and_slot() {
    let mut context = NodeContext::default();
    context.insert("keep", json!(1));
    context.insert(RUNTIME_INSTANCE_KEY, json!("<agent>"));
    context.set_runtime(RuntimeHandle::new(Live(1)));
    assert!(context.has_runtime());

    let copy = context.stripped();
    assert!(!copy.has_runtime());
    assert_eq!(copy.get("keep"), Some(&json!(1)));
    assert!(copy.get(RUNTIME_INSTANCE_KEY).is_none());

    // the original is untouched
    assert!(context.runtime().is_some());
  }
}
