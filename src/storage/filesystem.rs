use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use super::backend::{validate_key, ObjectResult, ObjectStore, PutOutcome};
use super::error::ObjectStoreError;

/// Sidecar written next to every object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMeta {
  pub key: String,
  pub content_type: String,
  pub etag: String,
  pub size: u64,
}

/// Object store on the local filesystem
pub struct LocalObjectStore {
  base_path: PathBuf,
  public_base: String,
}

impl LocalObjectStore {
  pub fn new(base_path: impl AsRef<Path>, public_base: &str) -> Self {
    Self {
      base_path: base_path.as_ref().to_path_buf(),
      public_base: public_base.trim_end_matches('/').to_string(),
    }
  }

  /// Sharded location of an object: `objects/ab/cd/<sha256>.data`
  fn object_path(&self, key: &str) -> PathBuf {
    let key_hash = Self::hash_key(key);
    self
      .base_path
      .join("objects")
      .join(&key_hash[0..2])
      .join(&key_hash[2..4])
      .join(format!("{}.data", key_hash))
  }

  fn meta_path(&self, key: &str) -> PathBuf {
    self.object_path(key).with_extension("json")
  }

  fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
  }

  pub fn calculate_etag(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
  }

  /// Bytes stored under `key`
  pub async fn read(&self, key: &str) -> ObjectResult<Vec<u8>> {
    validate_key(key)?;
    Ok(fs::read(self.object_path(key)).await?)
  }

  pub async fn meta(&self, key: &str) -> ObjectResult<ObjectMeta> {
    validate_key(key)?;
    let raw = fs::read(self.meta_path(key)).await?;
    serde_json::from_slice(&raw)
      .map_err(|e| ObjectStoreError::backend(format!("Corrupt metadata for {}: {}", key, e)))
  }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
  async fn init(&self) -> ObjectResult<()> {
    fs::create_dir_all(self.base_path.join("objects")).await?;
    Ok(())
  }

  async fn put(&self, key: &str, data: &[u8], content_type: &str) -> ObjectResult<PutOutcome> {
    validate_key(key)?;
    let path = self.object_path(key);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).await?;
    }

    let mut file = File::create(&path).await?;
    file.write_all(data).await?;
    file.flush().await?;

    let meta = ObjectMeta {
      key: key.to_string(),
      content_type: content_type.to_string(),
      etag: Self::calculate_etag(data),
      size: data.len() as u64,
    };
    let encoded = serde_json::to_vec(&meta)
      .map_err(|e| ObjectStoreError::backend(format!("Failed to encode metadata: {}", e)))?;
    fs::write(self.meta_path(key), encoded).await?;

    Ok(PutOutcome {
      key: meta.key,
      etag: meta.etag,
      size: meta.size,
    })
  }

  async fn exists(&self, key: &str) -> ObjectResult<bool> {
    validate_key(key)?;
    Ok(fs::try_exists(self.object_path(key)).await?)
  }

  fn public_url(&self, key: &str) -> String {
    format!("{}/{}", self.public_base, key)
  }

  fn name(&self) -> &'static str {
    "local"
  }
}
