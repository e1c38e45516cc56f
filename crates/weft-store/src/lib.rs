//! Weft Store
//!
//! This crate provides the storage trait weft persists bundles and compiled
//! graphs through, with a filesystem and an in-memory implementation.
//!
//! The [`Store`] trait is the backend layer: keys are `/`-separated paths
//! and values are byte streams. The [`read_bytes`], [`write_bytes`],
//! [`read_json`] and [`write_json`] helpers cover the whole-value access the
//! bundle services need.

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// A boxed stream of bytes.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StoreError>> + Send>>;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// No value is stored under the key.
  #[error("not found: {0}")]
  NotFound(String),

  /// A value already exists and the write asked for a new key.
  #[error("already exists: {0}")]
  AlreadyExists(String),

  /// An I/O error occurred.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// A stored value could not be encoded or decoded.
  #[error("serialization error for {key}: {source}")]
  Serialization {
    key: String,
    #[source]
    source: serde_json::Error,
  },
}

/// How a write treats an existing value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
  #[default]
  Overwrite,
  /// Fail with [`StoreError::AlreadyExists`] if the key is taken.
  CreateNew,
}

/// Storage backend trait.
#[async_trait]
pub trait Store: Send + Sync {
  /// Retrieve a value by key.
  async fn get(&self, key: &str) -> Result<ByteStream, StoreError>;

  /// Store a value, replacing any previous one.
  async fn put(&self, key: &str, data: ByteStream) -> Result<(), StoreError>;

  /// Delete a value by key.
  async fn delete(&self, key: &str) -> Result<(), StoreError>;

  /// Whether a value is stored under the key.
  async fn exists(&self, key: &str) -> Result<bool, StoreError>;
}

/// Wrap a buffer as a single-chunk stream.
pub fn single_chunk(bytes: impl Into<Bytes>) -> ByteStream {
  let bytes = bytes.into();
  Box::pin(futures::stream::once(async move { Ok(bytes) }))
}

/// Drain a stream into one buffer.
pub async fn collect_stream(mut stream: ByteStream) -> Result<Bytes, StoreError> {
  let mut buffer = BytesMut::new();
  while let Some(chunk) = stream.next().await {
    buffer.extend_from_slice(&chunk?);
  }
  Ok(buffer.freeze())
}

/// Read a whole value. A missing key yields `None`.
pub async fn read_bytes(store: &dyn Store, key: &str) -> Result<Option<Bytes>, StoreError> {
  match store.get(key).await {
    Ok(stream) => collect_stream(stream).await.map(Some),
    Err(StoreError::NotFound(_)) => Ok(None),
    Err(e) => Err(e),
  }
}

/// Write a whole value.
pub async fn write_bytes(
  store: &dyn Store,
  key: &str,
  bytes: impl Into<Bytes>,
  mode: WriteMode,
) -> Result<(), StoreError> {
  if mode == WriteMode::CreateNew && store.exists(key).await? {
    return Err(StoreError::AlreadyExists(key.to_string()));
  }
  store.put(key, single_chunk(bytes)).await
}

/// Read and decode a JSON value. A missing key yields `None`.
pub async fn read_json<T: DeserializeOwned>(
  store: &dyn Store,
  key: &str,
) -> Result<Option<T>, StoreError> {
  let Some(bytes) = read_bytes(store, key).await? else {
    return Ok(None);
  };
  serde_json::from_slice(&bytes)
    .map(Some)
    .map_err(|source| StoreError::Serialization {
      key: key.to_string(),
      source,
    })
}

/// Encode a value as pretty-printed JSON and write it.
pub async fn write_json<T: Serialize + ?Sized>(
  store: &dyn Store,
  key: &str,
  value: &T,
  mode: WriteMode,
) -> Result<(), StoreError> {
  let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Serialization {
    key: key.to_string(),
    source,
  })?;
  write_bytes(store, key, bytes, mode).await
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde::Deserialize;

  #[derive(Debug, PartialEq, Serialize, Deserialize)]
  struct Record {
    name: String,
    count: u32,
  }

  #[tokio::test]
  async fn test_json_helpers() {
    let store = MemoryStore::new();
    let record = Record {
      name: "flow".to_string(),
      count: 3,
    };

    assert!(read_json::<Record>(&store, "a/b.json").await.unwrap().is_none());
    write_json(&store, "a/b.json", &record, WriteMode::Overwrite)
      .await
      .unwrap();
    let loaded: Record = read_json(&store, "a/b.json").await.unwrap().unwrap();
    assert_eq!(loaded, record);
  }

  #[tokio::test]
  async fn test_create_new_refuses_existing_key() {
    let store = MemoryStore::new();
    write_bytes(&store, "k", "one", WriteMode::CreateNew)
      .await
      .unwrap();

    let err = write_bytes(&store, "k", "two", WriteMode::CreateNew)
      .await
      .unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)));

    write_bytes(&store, "k", "three", WriteMode::Overwrite)
      .await
      .unwrap();
    let value = read_bytes(&store, "k").await.unwrap().unwrap();
    assert_eq!(&value[..], b"three");
  }

  #[tokio::test]
  async fn test_read_json_reports_corrupt_values() {
    let store = MemoryStore::new();
    write_bytes(&store, "bad.json", "{", WriteMode::Overwrite)
      .await
      .unwrap();

    let err = read_json::<Record>(&store, "bad.json").await.unwrap_err();
    assert!(matches!(err, StoreError::Serialization { .. }));
  }
}
