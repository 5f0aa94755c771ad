//! Document store over a [`DatabaseBackend`].
//!
//! Documents are schema-less JSON objects grouped into collections. The
//! business collection is routed to its own table with typed columns; every
//! other collection shares the tagged documents table.

mod error;
pub mod projector;
pub mod registry;

pub use error::StoreError;
pub use projector::{projector_for, BusinessProjector, DocumentProjector, Projector};
pub use registry::{CollectionSpec, OwnerStrategy, ParentLookup, BUSINESSES, OWNER_FIELDS};

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{
  validate_collection_name, validate_document_id, Access, DatabaseBackend, Record, StoreClient,
};
use crate::types::{Data, Document};

#[derive(Clone)]
pub struct DocumentStore {
  backend: Arc<dyn DatabaseBackend>,
  access: Access,
  page_size: usize,
}

impl DocumentStore {
  pub fn new(backend: Arc<dyn DatabaseBackend>, access: Access, page_size: usize) -> Self {
    Self {
      backend,
      access,
      page_size: page_size.max(1),
    }
  }

  /// Store bound to one of the client's connections
  pub async fn connect(client: &StoreClient, access: Access) -> Result<Self, StoreError> {
    let backend = client.backend(access).await?;
    Ok(Self::new(backend, access, client.page_size()))
  }

  pub fn access(&self) -> Access {
    self.access
  }

  pub fn backend(&self) -> &Arc<dyn DatabaseBackend> {
    &self.backend
  }

  fn ensure_writable(&self) -> Result<(), StoreError> {
    match self.access {
      Access::Elevated => Ok(()),
      Access::Restricted => Err(StoreError::ReadOnly),
    }
  }

  fn tag<'a>(projector: &dyn Projector, collection: &'a str) -> Option<&'a str> {
    projector.table().tagged.then_some(collection)
  }

  fn to_document(projector: &dyn Projector, collection: &str, record: Record) -> Document {
    let id = record.id.clone();
    let created_at = record.created_at;
    let updated_at = record.updated_at;
    let tag = record.collection.clone();
    let data = projector.reconstruct(record);
    Document {
      id,
      collection: tag.or_else(|| {
        (!registry::is_privileged(collection)).then(|| collection.to_string())
      }),
      data,
      created_at,
      updated_at,
    }
  }

  /// Insert a document and return its id. A fresh UUID is generated when
  /// `id` is `None`; an existing document with the same id is replaced.
  pub async fn create(
    &self,
    collection: &str,
    data: Data,
    id: Option<&str>,
  ) -> Result<String, StoreError> {
    self.ensure_writable()?;
    validate_collection_name(collection)?;
    let id = id
      .map(str::to_string)
      .unwrap_or_else(|| Uuid::new_v4().to_string());
    validate_document_id(&id)?;

    let projector = projector_for(collection);
    let now = Utc::now();
    let record = Record {
      id: id.clone(),
      collection: Self::tag(projector, collection).map(str::to_string),
      columns: projector.project(&data),
      snapshot: data,
      created_at: now,
      updated_at: now,
    };
    self.backend.upsert(projector.table(), &record).await?;
    tracing::debug!(collection, id = %id, "Document created");
    Ok(id)
  }

  pub async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
    validate_collection_name(collection)?;
    validate_document_id(id)?;
    let projector = projector_for(collection);
    let record = self
      .backend
      .fetch(projector.table(), Self::tag(projector, collection), id)
      .await?;
    Ok(record.map(|r| Self::to_document(projector, collection, r)))
  }

  /// Every document of a collection, read page by page in id order.
  pub async fn get_collection(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
    validate_collection_name(collection)?;
    let projector = projector_for(collection);
    let tag = Self::tag(projector, collection);

    let mut docs = Vec::new();
    let mut offset = 0;
    loop {
      let page = self
        .backend
        .fetch_page(projector.table(), tag, self.page_size, offset)
        .await?;
      let n = page.len();
      docs.extend(
        page
          .into_iter()
          .map(|r| Self::to_document(projector, collection, r)),
      );
      if n < self.page_size {
        break;
      }
      offset += n;
    }
    tracing::debug!(collection, count = docs.len(), "Collection read");
    Ok(docs)
  }

  /// Shallow merge of `partial` into the stored document. Keys in `partial`
  /// replace whole top-level values; `created_at` is kept.
  pub async fn update(
    &self,
    collection: &str,
    id: &str,
    partial: Data,
  ) -> Result<Document, StoreError> {
    self.ensure_writable()?;
    validate_collection_name(collection)?;
    validate_document_id(id)?;
    let projector = projector_for(collection);
    let tag = Self::tag(projector, collection);

    let existing = self
      .backend
      .fetch(projector.table(), tag, id)
      .await?
      .ok_or_else(|| StoreError::not_found(collection, id))?;
    let created_at = existing.created_at;
    let mut data = projector.reconstruct(existing);
    for (k, v) in partial {
      data.insert(k, v);
    }

    let record = Record {
      id: id.to_string(),
      collection: tag.map(str::to_string),
      columns: projector.project(&data),
      snapshot: data,
      created_at,
      updated_at: Utc::now(),
    };
    self.backend.upsert(projector.table(), &record).await?;
    tracing::debug!(collection, id, "Document updated");
    Ok(Self::to_document(projector, collection, record))
  }

  /// Remove one document. Returns whether it existed.
  pub async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
    self.ensure_writable()?;
    validate_collection_name(collection)?;
    validate_document_id(id)?;
    let projector = projector_for(collection);
    let removed = self
      .backend
      .remove(projector.table(), Self::tag(projector, collection), id)
      .await?;
    tracing::debug!(collection, id, removed, "Document deleted");
    Ok(removed)
  }

  /// Remove every document whose top-level `field` equals `value`.
  pub async fn delete_by_field(
    &self,
    collection: &str,
    field: &str,
    value: &Value,
  ) -> Result<usize, StoreError> {
    self.ensure_writable()?;
    let docs = self.get_collection(collection).await?;
    let mut removed = 0;
    for doc in docs.iter().filter(|d| d.data.get(field) == Some(value)) {
      if self.delete(collection, &doc.id).await? {
        removed += 1;
      }
    }
    Ok(removed)
  }

  /// Remove every document of `collection` owned by `owner_id`, under either
  /// owner field spelling. Collections that inherit their owner also lose the
  /// documents linked to one of the tenant's parents.
  pub async fn delete_by_owner(
    &self,
    collection: &str,
    owner_id: &str,
  ) -> Result<usize, StoreError> {
    self.ensure_writable()?;
    validate_collection_name(collection)?;
    let mut parents = ParentLookup::new();
    if let Some(parent) = registry::lookup(collection).and_then(CollectionSpec::parent) {
      parents.insert(parent, &self.get_collection(parent).await?);
    }
    self.delete_owned(collection, owner_id, &parents).await
  }

  async fn delete_owned(
    &self,
    collection: &str,
    owner_id: &str,
    parents: &ParentLookup,
  ) -> Result<usize, StoreError> {
    let spec = registry::lookup(collection);

    if let Some(spec) = spec {
      if spec.owner == OwnerStrategy::SelfId {
        return Ok(usize::from(self.delete(collection, owner_id).await?));
      }
      if spec.owner_column {
        let projector = projector_for(collection);
        let removed = self
          .backend
          .remove_by_owner(projector.table(), Some(collection), owner_id)
          .await?;
        return Ok(removed as usize);
      }
    }

    let docs = self.get_collection(collection).await?;
    let mut removed = 0;
    for doc in docs.iter().filter(|d| match spec {
      Some(spec) if spec.parent().is_some() => {
        registry::owned_by(&d.data, owner_id)
          || spec.resolve_owner(d, parents).as_deref() == Some(owner_id)
      }
      _ => registry::owned_by(&d.data, owner_id),
    }) {
      if self.delete(collection, &doc.id).await? {
        removed += 1;
      }
    }
    Ok(removed)
  }

  /// Remove a tenant's documents from every cascading collection.
  ///
  /// Parent owner tables are read before anything is removed, since parents
  /// go first. A failing collection is recorded and the cascade moves on.
  pub async fn cascade_delete(&self, owner_id: &str) -> Result<CascadeReport, StoreError> {
    self.ensure_writable()?;
    let mut report = CascadeReport::default();

    let mut parents = ParentLookup::new();
    let mut unresolved: Vec<(&str, String)> = Vec::new();
    for parent in registry::cascade_collections().filter_map(CollectionSpec::parent) {
      if parents.contains(parent) {
        continue;
      }
      match self.get_collection(parent).await {
        Ok(docs) => parents.insert(parent, &docs),
        Err(e) => unresolved.push((parent, e.to_string())),
      }
    }

    for spec in registry::cascade_collections() {
      let lookup_failed = spec
        .parent()
        .and_then(|p| unresolved.iter().find(|(name, _)| *name == p));
      let result = match lookup_failed {
        Some((parent, e)) => Err(format!("owner lookup on {} failed: {}", parent, e)),
        None => self
          .delete_owned(spec.name, owner_id, &parents)
          .await
          .map_err(|e| e.to_string()),
      };
      if let Err(e) = &result {
        tracing::warn!(collection = spec.name, owner = owner_id, error = %e, "Cascade delete failed");
      }
      report.results.push((spec.name.to_string(), result));
    }
    tracing::info!(
      owner = owner_id,
      removed = report.total(),
      failed = report.failures().count(),
      "Cascade delete finished"
    );
    Ok(report)
  }
}

/// Per-collection outcome of a cascade delete
#[derive(Debug, Default)]
pub struct CascadeReport {
  pub results: Vec<(String, Result<usize, String>)>,
}

impl CascadeReport {
  pub fn total(&self) -> usize {
    self
      .results
      .iter()
      .filter_map(|(_, r)| r.as_ref().ok())
      .sum()
  }

  pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
    self
      .results
      .iter()
      .filter_map(|(c, r)| r.as_ref().err().map(|e| (c.as_str(), e.as_str())))
  }
}
