use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{ByteStream, Store, StoreError, collect_stream, single_chunk};

/// In-memory store, for tests and ad-hoc runs that should leave no files.
#[derive(Default)]
pub struct MemoryStore {
  values: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Keys currently stored, in sorted order.
  pub fn keys(&self) -> Vec<String> {
    self
      .values
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .keys()
      .cloned()
      .collect()
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn get(&self, key: &str) -> Result<ByteStream, StoreError> {
    let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
    values
      .get(key)
      .cloned()
      .map(single_chunk)
      .ok_or_else(|| StoreError::NotFound(key.to_string()))
  }

  async fn put(&self, key: &str, data: ByteStream) -> Result<(), StoreError> {
    let bytes = collect_stream(data).await?;
    self
      .values
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(key.to_string(), bytes);
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<(), StoreError> {
    self
      .values
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(key)
      .map(|_| ())
      .ok_or_else(|| StoreError::NotFound(key.to_string()))
  }

  async fn exists(&self, key: &str) -> Result<bool, StoreError> {
    Ok(
      self
        .values
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .contains_key(key),
    )
  }
}
