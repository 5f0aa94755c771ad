use thiserror::Error;

use crate::assets::ReferenceError;
use crate::storage::{FetchError, ObjectStoreError};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum MigrateError {
  #[error("Collection {0} is not registered")]
  UnknownCollection(String),

  #[error(transparent)]
  Reference(#[from] ReferenceError),

  #[error(transparent)]
  Fetch(#[from] FetchError),

  #[error(transparent)]
  ObjectStore(#[from] ObjectStoreError),

  #[error(transparent)]
  Store(#[from] StoreError),
}

impl MigrateError {
  /// Skips are counted apart from errors: the reference cannot be migrated
  /// as it stands, and retrying will not change that.
  pub fn is_skip(&self) -> bool {
    matches!(self, Self::Reference(_))
  }
}
