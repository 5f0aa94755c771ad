use serde_json::Value;
use std::sync::Arc;

use super::error::MigrateError;
use super::key::{label_for, mime_from_name, KeyDeriver, KeyParts, DEFAULT_MIME};
use super::stats::{MigrationFailure, MigrationRun, MigrationStats};
use crate::assets::{
  decode_inline, scan_document, truncate, AssetRef, Classifier, ReferenceError, ScanHit,
};
use crate::storage::{Fetcher, ObjectStore};
use crate::store::{CollectionSpec, DocumentStore, ParentLookup, StoreError};
use crate::types::{Data, Document};

#[derive(Debug, Clone)]
pub struct MigrationOptions {
  /// Cap on documents per collection; `None` scans everything
  pub limit: Option<usize>,
  /// Classify and count without uploading or writing
  pub dry_run: bool,
  /// Failures kept for the report
  pub sample_size: usize,
}

impl Default for MigrationOptions {
  fn default() -> Self {
    Self {
      limit: None,
      dry_run: false,
      sample_size: 50,
    }
  }
}

/// Outcome of one document
#[derive(Debug, Default)]
struct DocResult {
  migrated: usize,
  skipped: usize,
  failures: Vec<MigrationFailure>,
}

/// Moves inline and legacy assets into the object store and points the
/// documents at their new public URLs.
pub struct Migrator {
  store: DocumentStore,
  objects: Arc<dyn ObjectStore>,
  fetcher: Arc<dyn Fetcher>,
  classifier: Classifier,
  keys: KeyDeriver,
  options: MigrationOptions,
}

impl Migrator {
  pub fn new(
    store: DocumentStore,
    objects: Arc<dyn ObjectStore>,
    fetcher: Arc<dyn Fetcher>,
    classifier: Classifier,
    options: MigrationOptions,
  ) -> Self {
    Self {
      store,
      objects,
      fetcher,
      classifier,
      keys: KeyDeriver::new(),
      options,
    }
  }

  pub fn options(&self) -> &MigrationOptions {
    &self.options
  }

  /// Migrate the given collections one after another.
  ///
  /// A collection that cannot be read is recorded as failed and the run
  /// continues with the next one.
  pub async fn run(&self, specs: &[&'static CollectionSpec]) -> MigrationRun {
    let parents = self.load_parents(specs).await;
    let mut run = MigrationRun {
      dry_run: self.options.dry_run,
      ..Default::default()
    };

    for spec in specs {
      let mut failures = Vec::new();
      match self.migrate_collection(spec, &parents, &mut failures).await {
        Ok(stats) => {
          tracing::info!(
            collection = spec.name,
            processed = stats.processed,
            migrated = stats.migrated,
            skipped = stats.skipped,
            errors = stats.errors,
            "Collection migrated"
          );
          run.collections.push((spec.name.to_string(), Ok(stats)));
        }
        Err(e) => {
          tracing::error!(collection = spec.name, error = %e, "Skipping collection");
          run.collections.push((spec.name.to_string(), Err(e.to_string())));
        }
      }

      let room = self.options.sample_size.saturating_sub(run.failures.len());
      run.failures_dropped += failures.len().saturating_sub(room);
      run.failures.extend(failures.into_iter().take(room));
    }
    run
  }

  /// Owner tables for every parent collection the targets inherit from
  async fn load_parents(&self, specs: &[&'static CollectionSpec]) -> ParentLookup {
    let mut parents = ParentLookup::new();
    for parent in specs.iter().filter_map(|s| s.parent()) {
      if parents.contains(parent) {
        continue;
      }
      match self.store.get_collection(parent).await {
        Ok(docs) => {
          tracing::info!(collection = parent, count = docs.len(), "Loaded owner lookup");
          parents.insert(parent, &docs);
        }
        Err(e) => {
          tracing::warn!(collection = parent, error = %e, "Owner lookup unavailable");
        }
      }
    }
    parents
  }

  /// Sequentially migrate one collection. Only the initial read can fail;
  /// per-document problems are counted and collected in `failures`.
  pub async fn migrate_collection(
    &self,
    spec: &CollectionSpec,
    parents: &ParentLookup,
    failures: &mut Vec<MigrationFailure>,
  ) -> Result<MigrationStats, StoreError> {
    let docs = self.store.get_collection(spec.name).await?;
    let limit = self.options.limit.unwrap_or(usize::MAX);
    tracing::info!(
      collection = spec.name,
      documents = docs.len(),
      limit = ?self.options.limit,
      dry_run = self.options.dry_run,
      "Migrating collection"
    );

    let mut stats = MigrationStats::default();
    for doc in docs.iter().take(limit) {
      stats.processed += 1;
      match self.migrate_document(spec, doc, parents).await {
        Ok(result) => {
          stats.references_migrated += result.migrated;
          stats.references_skipped += result.skipped;
          stats.references_failed += result.failures.len();
          if !result.failures.is_empty() {
            stats.errors += 1;
            failures.extend(result.failures);
          } else if result.migrated > 0 {
            stats.migrated += 1;
          } else {
            stats.skipped += 1;
          }
        }
        Err(e) => {
          tracing::warn!(collection = spec.name, id = %doc.id, error = %e, "Document failed");
          stats.errors += 1;
          failures.push(MigrationFailure {
            collection: spec.name.to_string(),
            document_id: doc.id.clone(),
            path: None,
            reference: None,
            error: e.to_string(),
          });
        }
      }
    }
    Ok(stats)
  }

  async fn migrate_document(
    &self,
    spec: &CollectionSpec,
    doc: &Document,
    parents: &ParentLookup,
  ) -> Result<DocResult, MigrateError> {
    let hits: Vec<ScanHit> = scan_document(&self.classifier, spec.name, doc, false)
      .into_iter()
      .filter(|h| h.kind.is_residual())
      .collect();
    let mut result = DocResult::default();
    if hits.is_empty() {
      return Ok(result);
    }

    let Some(owner) = spec.resolve_owner(doc, parents) else {
      tracing::debug!(collection = spec.name, id = %doc.id, "No owner, skipping");
      result.skipped = hits.len();
      return Ok(result);
    };

    let mut rewrites = Vec::with_capacity(hits.len());
    for hit in &hits {
      match self.migrate_hit(spec, doc, &owner, hit).await {
        Ok(url) => rewrites.push((hit, url)),
        Err(e) if e.is_skip() => {
          tracing::debug!(collection = spec.name, id = %doc.id, path = %hit.path, error = %e, "Reference skipped");
          result.skipped += 1;
        }
        Err(e) => {
          tracing::warn!(collection = spec.name, id = %doc.id, path = %hit.path, error = %e, "Reference failed");
          result.failures.push(MigrationFailure {
            collection: spec.name.to_string(),
            document_id: doc.id.clone(),
            path: Some(hit.path.to_string()),
            reference: Some(truncate(&hit.reference, 120)),
            error: e.to_string(),
          });
        }
      }
    }

    if rewrites.is_empty() {
      return Ok(result);
    }
    if self.options.dry_run {
      result.migrated = rewrites.len();
      return Ok(result);
    }
    let (applied, stale) = self.apply_rewrites(spec.name, &doc.id, &rewrites).await?;
    result.migrated = applied;
    result.skipped += stale;
    Ok(result)
  }

  async fn migrate_hit(
    &self,
    spec: &CollectionSpec,
    doc: &Document,
    owner: &str,
    hit: &ScanHit,
  ) -> Result<String, MigrateError> {
    let (bytes, mime) = match self.classifier.parse(&hit.reference)? {
      AssetRef::Inline { mime, payload } => (decode_inline(&payload)?, mime),
      AssetRef::Legacy { url, object_name } => {
        let guessed = mime_from_name(&object_name).unwrap_or(DEFAULT_MIME);
        if self.options.dry_run {
          (Vec::new(), guessed.to_string())
        } else {
          let fetched = self.fetcher.get(&url).await?;
          let mime = fetched
            .content_type
            .filter(|m| m != DEFAULT_MIME)
            .unwrap_or_else(|| guessed.to_string());
          (fetched.bytes, mime)
        }
      }
      AssetRef::Canonical { url, .. } => {
        return Err(ReferenceError::NotAReference(url).into());
      }
    };

    let label = label_for(spec, &hit.path);
    let key = self.keys.derive(&KeyParts {
      module: spec.module_for(label),
      owner_id: owner,
      label,
      document_id: (!spec.is_privileged()).then_some(doc.id.as_str()),
      mime: &mime,
    });

    if !self.options.dry_run {
      self.objects.put(&key, &bytes, &mime).await?;
    }
    tracing::debug!(collection = spec.name, id = %doc.id, path = %hit.path, key = %key, "Reference uploaded");
    Ok(self.objects.public_url(&key))
  }

  /// Write the new URLs back with a single merge update. A rewrite whose
  /// slot no longer holds the scanned reference is dropped.
  async fn apply_rewrites(
    &self,
    collection: &str,
    id: &str,
    rewrites: &[(&ScanHit, String)],
  ) -> Result<(usize, usize), MigrateError> {
    let current = self
      .store
      .get(collection, id)
      .await?
      .ok_or_else(|| StoreError::not_found(collection, id))?;

    let mut partial = Data::new();
    let mut applied = 0;
    let mut stale = 0;
    for (hit, url) in rewrites {
      let Some(top) = hit.path.top_level() else {
        stale += 1;
        continue;
      };
      if !partial.contains_key(top) {
        match current.data.get(top) {
          Some(v) => {
            partial.insert(top.to_string(), v.clone());
          }
          None => {
            stale += 1;
            continue;
          }
        }
      }
      let unchanged =
        hit.path.get_in(&partial).and_then(Value::as_str) == Some(hit.reference.as_str());
      if !unchanged || !hit.path.set_in(&mut partial, Value::String(url.clone())) {
        tracing::debug!(collection, id, path = %hit.path, "Reference changed since scan");
        stale += 1;
        continue;
      }
      applied += 1;
    }

    if applied > 0 {
      self.store.update(collection, id, partial).await?;
    }
    Ok((applied, stale))
  }
}
