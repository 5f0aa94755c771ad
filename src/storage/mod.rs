mod backend;
pub mod config;
mod error;
mod fetch;
mod filesystem;
mod r2;

pub use backend::{validate_key, ObjectResult, ObjectStore, PutOutcome};
pub use config::{StorageConfig, StorageMode};
pub use error::ObjectStoreError;
pub use fetch::{media_type, FetchError, Fetched, Fetcher, HttpFetcher};
pub use filesystem::{LocalObjectStore, ObjectMeta};
pub use r2::R2ObjectStore;

use std::sync::Arc;

/// Object store for the configured mode
pub fn from_config(
  config: &StorageConfig,
  public_base: &str,
) -> Result<Arc<dyn ObjectStore>, ObjectStoreError> {
  let store: Arc<dyn ObjectStore> = match config.mode {
    StorageMode::R2 => Arc::new(R2ObjectStore::new(config, public_base)?),
    StorageMode::Local => Arc::new(LocalObjectStore::new(&config.local_path, public_base)),
  };
  tracing::info!(backend = store.name(), "Object store configured");
  Ok(store)
}
