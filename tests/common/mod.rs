//! Shared fixtures: an in-memory store, a local object store, a canned
//! HTTP fetcher and a backend that fails on demand.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use vitrine::assets::{legacy_regex, Classifier};
use vitrine::db::{Access, DatabaseBackend, Record, SqlDialect, SqliteBackend, TableSpec};
use vitrine::storage::{FetchError, Fetched, Fetcher, LocalObjectStore, ObjectStore};
use vitrine::store::DocumentStore;
use vitrine::types::Data;

pub const CDN: &str = "https://cdn.example.com";
pub const LEGACY_HOST: &str = "legacy.example.com";

pub fn data(value: Value) -> Data {
  match value {
    Value::Object(map) => map,
    other => panic!("expected object, got {other}"),
  }
}

pub fn legacy_url(object_name: &str) -> String {
  format!(
    "https://{}/v0/b/app/o/{}?alt=media",
    LEGACY_HOST,
    urlencoding::encode(object_name)
  )
}

pub fn classifier() -> Classifier {
  let legacy = legacy_regex(None, &[LEGACY_HOST.to_string()]).unwrap();
  Classifier::new(CDN, legacy)
}

pub async fn backend() -> Arc<dyn DatabaseBackend> {
  let backend = SqliteBackend::in_memory().await.unwrap();
  backend.init_schema().await.unwrap();
  Arc::new(backend)
}

pub async fn store(page_size: usize) -> DocumentStore {
  DocumentStore::new(backend().await, Access::Elevated, page_size)
}

/// Fetcher answering from a fixed table; unknown URLs are 404s.
#[derive(Default)]
pub struct StubFetcher {
  bodies: Mutex<HashMap<String, (Vec<u8>, Option<String>)>>,
  head_status: Mutex<HashMap<String, u16>>,
  pub gets: AtomicUsize,
  pub heads: AtomicUsize,
}

impl StubFetcher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn serve(&self, url: &str, bytes: &[u8], content_type: Option<&str>) {
    self.bodies.lock().unwrap().insert(
      url.to_string(),
      (bytes.to_vec(), content_type.map(str::to_string)),
    );
  }

  pub fn head_status(&self, url: &str, status: u16) {
    self
      .head_status
      .lock()
      .unwrap()
      .insert(url.to_string(), status);
  }

  pub fn get_count(&self) -> usize {
    self.gets.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Fetcher for StubFetcher {
  async fn get(&self, url: &str) -> Result<Fetched, FetchError> {
    self.gets.fetch_add(1, Ordering::SeqCst);
    match self.bodies.lock().unwrap().get(url) {
      Some((bytes, content_type)) => Ok(Fetched {
        bytes: bytes.clone(),
        content_type: content_type.clone(),
      }),
      None => Err(FetchError::Status {
        url: url.to_string(),
        status: 404,
      }),
    }
  }

  async fn head(&self, url: &str) -> Result<u16, FetchError> {
    self.heads.fetch_add(1, Ordering::SeqCst);
    Ok(self.head_status.lock().unwrap().get(url).copied().unwrap_or(200))
  }
}

/// Wraps a real backend and refuses chosen operations per collection tag.
pub struct FaultyBackend {
  inner: Arc<dyn DatabaseBackend>,
  failing_reads: Mutex<HashSet<String>>,
  failing_owner_deletes: Mutex<HashSet<String>>,
  vanishing: Mutex<HashSet<(String, String)>>,
}

impl FaultyBackend {
  pub fn new(inner: Arc<dyn DatabaseBackend>) -> Self {
    Self {
      inner,
      failing_reads: Mutex::default(),
      failing_owner_deletes: Mutex::default(),
      vanishing: Mutex::default(),
    }
  }

  /// Page reads of `collection` fail
  pub fn fail_reads(&self, collection: &str) {
    self.failing_reads.lock().unwrap().insert(collection.to_string());
  }

  /// Owner-column deletes in `collection` fail
  pub fn fail_owner_deletes(&self, collection: &str) {
    self
      .failing_owner_deletes
      .lock()
      .unwrap()
      .insert(collection.to_string());
  }

  /// The document is removed right after the first page holding it is read,
  /// as if someone deleted it mid-run
  pub fn vanish_after_read(&self, collection: &str, id: &str) {
    self
      .vanishing
      .lock()
      .unwrap()
      .insert((collection.to_string(), id.to_string()));
  }

  fn refuse(
    set: &Mutex<HashSet<String>>,
    collection: Option<&str>,
    op: &str,
  ) -> Result<(), anyhow::Error> {
    match collection {
      Some(c) if set.lock().unwrap().contains(c) => Err(anyhow::anyhow!("{} on {} refused", op, c)),
      _ => Ok(()),
    }
  }
}

#[async_trait]
impl DatabaseBackend for FaultyBackend {
  fn dialect(&self) -> SqlDialect {
    self.inner.dialect()
  }

  async fn init_schema(&self) -> Result<(), anyhow::Error> {
    self.inner.init_schema().await
  }

  async fn drop_schema(&self) -> Result<(), anyhow::Error> {
    self.inner.drop_schema().await
  }

  async fn upsert(&self, table: &TableSpec, record: &Record) -> Result<(), anyhow::Error> {
    self.inner.upsert(table, record).await
  }

  async fn fetch(
    &self,
    table: &TableSpec,
    collection: Option<&str>,
    id: &str,
  ) -> Result<Option<Record>, anyhow::Error> {
    self.inner.fetch(table, collection, id).await
  }

  async fn fetch_page(
    &self,
    table: &TableSpec,
    collection: Option<&str>,
    limit: usize,
    offset: usize,
  ) -> Result<Vec<Record>, anyhow::Error> {
    Self::refuse(&self.failing_reads, collection, "read")?;
    let page = self.inner.fetch_page(table, collection, limit, offset).await?;
    let gone: Vec<String> = {
      let mut vanishing = self.vanishing.lock().unwrap();
      page
        .iter()
        .filter(|r| vanishing.remove(&(r.collection.clone().unwrap_or_default(), r.id.clone())))
        .map(|r| r.id.clone())
        .collect()
    };
    for id in gone {
      self.inner.remove(table, collection, &id).await?;
    }
    Ok(page)
  }

  async fn remove(
    &self,
    table: &TableSpec,
    collection: Option<&str>,
    id: &str,
  ) -> Result<bool, anyhow::Error> {
    self.inner.remove(table, collection, id).await
  }

  async fn remove_by_owner(
    &self,
    table: &TableSpec,
    collection: Option<&str>,
    owner_id: &str,
  ) -> Result<u64, anyhow::Error> {
    Self::refuse(&self.failing_owner_deletes, collection, "owner delete")?;
    self.inner.remove_by_owner(table, collection, owner_id).await
  }

  async fn list_collections(&self) -> Result<Vec<String>, anyhow::Error> {
    self.inner.list_collections().await
  }
}

/// Everything a migration or verification needs, backed by temp storage
pub struct Harness {
  pub backend: Arc<dyn DatabaseBackend>,
  pub store: DocumentStore,
  pub objects: Arc<LocalObjectStore>,
  pub fetcher: Arc<StubFetcher>,
  _dir: TempDir,
}

impl Harness {
  pub async fn new(page_size: usize) -> Self {
    Self::over(backend().await, page_size).await
  }

  /// Harness whose database fails on demand
  pub async fn faulty(page_size: usize) -> (Self, Arc<FaultyBackend>) {
    let faulty = Arc::new(FaultyBackend::new(backend().await));
    (Self::over(faulty.clone(), page_size).await, faulty)
  }

  async fn over(backend: Arc<dyn DatabaseBackend>, page_size: usize) -> Self {
    let dir = TempDir::new().unwrap();
    let objects = Arc::new(LocalObjectStore::new(dir.path(), CDN));
    objects.init().await.unwrap();
    Self {
      store: DocumentStore::new(backend.clone(), Access::Elevated, page_size),
      backend,
      objects,
      fetcher: Arc::new(StubFetcher::new()),
      _dir: dir,
    }
  }

  /// Another handle on the same database
  pub fn store(&self, access: Access) -> DocumentStore {
    DocumentStore::new(self.backend.clone(), access, 3)
  }

  pub fn objects(&self) -> Arc<dyn ObjectStore> {
    self.objects.clone()
  }

  pub fn fetcher(&self) -> Arc<dyn Fetcher> {
    self.fetcher.clone()
  }
}
