use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{trace, warn};

use crate::{ByteStream, Store, StoreError};

static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

/// Filesystem-based store.
///
/// A key maps to the file `{base_path}/{key}`. Writes land in a hidden
/// sibling file first and are renamed over the target once complete, so a
/// reader sees either the old value or the new one.
pub struct FsStore {
  base_path: PathBuf,
}

impl FsStore {
  pub fn new(base_path: impl Into<PathBuf>) -> Self {
    Self {
      base_path: base_path.into(),
    }
  }

  pub fn base_path(&self) -> &Path {
    &self.base_path
  }

  fn path_for(&self, key: &str) -> PathBuf {
    self.base_path.join(key)
  }
}

/// `.{name}.{pid}-{seq}.tmp` next to the target.
fn staging_path(target: &Path) -> PathBuf {
  let name = target
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();
  let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
  target.with_file_name(format!(".{}.{}-{}.tmp", name, std::process::id(), seq))
}

fn keyed(key: &str) -> impl Fn(std::io::Error) -> StoreError + '_ {
  move |e| match e.kind() {
    ErrorKind::NotFound => StoreError::NotFound(key.to_string()),
    _ => StoreError::Io(e),
  }
}

async fn drain_into(file: &mut File, mut data: ByteStream) -> Result<usize, StoreError> {
  let mut written = 0;
  while let Some(chunk) = data.next().await {
    let chunk = chunk?;
    file.write_all(&chunk).await?;
    written += chunk.len();
  }
  file.sync_all().await?;
  Ok(written)
}

async fn write_atomically(target: &Path, data: ByteStream) -> Result<usize, StoreError> {
  let staging = staging_path(target);
  let mut file = File::create(&staging).await?;
  let drained = drain_into(&mut file, data).await;
  drop(file);

  let result = match drained {
    Ok(written) => fs::rename(&staging, target)
      .await
      .map(|()| written)
      .map_err(StoreError::Io),
    Err(e) => Err(e),
  };

  if result.is_err()
    && let Err(e) = fs::remove_file(&staging).await
    && e.kind() != ErrorKind::NotFound
  {
    warn!(path = %staging.display(), error = %e, "failed to remove staging file");
  }
  result
}

#[async_trait]
impl Store for FsStore {
  async fn get(&self, key: &str) -> Result<ByteStream, StoreError> {
    let file = File::open(self.path_for(key)).await.map_err(keyed(key))?;
    Ok(Box::pin(ReaderStream::new(file).map_err(StoreError::Io)))
  }

  async fn put(&self, key: &str, data: ByteStream) -> Result<(), StoreError> {
    let target = self.path_for(key);
    if let Some(dir) = target.parent() {
      fs::create_dir_all(dir).await?;
    }

    let written = write_atomically(&target, data).await?;
    trace!(key = %key, path = %target.display(), bytes = written, "stored");
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<(), StoreError> {
    fs::remove_file(self.path_for(key)).await.map_err(keyed(key))
  }

  async fn exists(&self, key: &str) -> Result<bool, StoreError> {
    Ok(fs::try_exists(self.path_for(key)).await?)
  }
}
