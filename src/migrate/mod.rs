//! Batch migration of inline and legacy assets into the object store.

mod error;
pub mod key;
mod migrator;
mod stats;

pub use error::MigrateError;
pub use key::{extension_for, label_for, mime_from_name, KeyDeriver, KeyParts};
pub use migrator::{MigrationOptions, Migrator};
pub use stats::{MigrationFailure, MigrationRun, MigrationStats};

use crate::store::{registry, CollectionSpec};

/// Registry entries for the requested names, in the order given; every
/// registered collection when `names` is empty.
pub fn select_collections(names: &[String]) -> Result<Vec<&'static CollectionSpec>, MigrateError> {
  if names.is_empty() {
    return Ok(registry::COLLECTIONS.iter().collect());
  }
  names
    .iter()
    .map(|n| registry::lookup(n).ok_or_else(|| MigrateError::UnknownCollection(n.clone())))
    .collect()
}
