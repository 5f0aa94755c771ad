//! Object store trait for the R2 bucket and the local directory store

use async_trait::async_trait;

use super::error::ObjectStoreError;

pub type ObjectResult<T> = Result<T, ObjectStoreError>;

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome {
  pub key: String,
  pub etag: String,
  pub size: u64,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
  /// Prepare the store (create directories, check the bucket)
  async fn init(&self) -> ObjectResult<()>;

  /// Write `data` under `key`, replacing any existing object
  async fn put(&self, key: &str, data: &[u8], content_type: &str) -> ObjectResult<PutOutcome>;

  /// Whether an object exists under `key`
  async fn exists(&self, key: &str) -> ObjectResult<bool>;

  /// Public URL an object is served from
  fn public_url(&self, key: &str) -> String;

  /// Get a human-readable name for this backend
  fn name(&self) -> &'static str;
}

/// Keys are relative, slash separated and free of `..` segments.
pub fn validate_key(key: &str) -> ObjectResult<()> {
  let bad = key.is_empty()
    || key.starts_with('/')
    || key.split('/').any(|s| s.is_empty() || s == "." || s == "..")
    || key.chars().any(|c| c.is_control());
  if bad {
    return Err(ObjectStoreError::InvalidKey(key.to_string()));
  }
  Ok(())
}
