use thiserror::Error;

use crate::db::SqlSanitizeError;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("Document {collection}/{id} not found")]
  NotFound { collection: String, id: String },

  #[error("Store handle is read-only")]
  ReadOnly,

  #[error(transparent)]
  InvalidName(#[from] SqlSanitizeError),

  #[error("Backend error: {0}")]
  Backend(#[from] anyhow::Error),
}

impl StoreError {
  pub fn not_found(collection: &str, id: &str) -> Self {
    Self::NotFound {
      collection: collection.to_string(),
      id: id.to_string(),
    }
  }
}
