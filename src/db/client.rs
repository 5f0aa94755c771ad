use std::sync::Arc;
use tokio::sync::OnceCell;

use super::backend::DatabaseBackend;
use super::postgres::PostgresBackend;
use super::sqlite::SqliteBackend;
use crate::config::{BackendType, DatabaseSection};

/// Privilege level of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
  /// Administrative role: reads and writes
  Elevated,
  /// Public role: reads only
  Restricted,
}

/// Process-wide connection handle.
///
/// Built once by the entry point and passed to whoever needs the database.
/// Each variant connects on first use and is reused afterwards.
pub struct StoreClient {
  config: DatabaseSection,
  elevated: OnceCell<Arc<dyn DatabaseBackend>>,
  restricted: OnceCell<Arc<dyn DatabaseBackend>>,
}

impl StoreClient {
  pub fn new(config: DatabaseSection) -> Self {
    Self {
      config,
      elevated: OnceCell::new(),
      restricted: OnceCell::new(),
    }
  }

  /// Wrap an already connected backend; both variants share it.
  pub fn with_backend(backend: Arc<dyn DatabaseBackend>, page_size: usize) -> Self {
    Self {
      config: DatabaseSection {
        page_size,
        ..DatabaseSection::default()
      },
      elevated: OnceCell::new_with(Some(backend.clone())),
      restricted: OnceCell::new_with(Some(backend)),
    }
  }

  pub fn page_size(&self) -> usize {
    self.config.page_size
  }

  pub async fn backend(&self, access: Access) -> Result<Arc<dyn DatabaseBackend>, anyhow::Error> {
    match access {
      Access::Elevated => self.elevated().await,
      Access::Restricted => self.restricted().await,
    }
  }

  /// Administrative connection. The schema is created on first connect.
  pub async fn elevated(&self) -> Result<Arc<dyn DatabaseBackend>, anyhow::Error> {
    self
      .elevated
      .get_or_try_init(|| async {
        let url = self.config.postgres.url.clone();
        let backend = self.connect(&url).await?;
        backend.init_schema().await?;
        tracing::info!(backend = ?self.config.backend, "Elevated store client connected");
        Ok(backend)
      })
      .await
      .cloned()
  }

  /// Public read-only connection. An in-memory SQLite database only exists
  /// on the connection that opened it, so that one is shared.
  pub async fn restricted(&self) -> Result<Arc<dyn DatabaseBackend>, anyhow::Error> {
    self
      .restricted
      .get_or_try_init(|| async {
        if self.is_memory() {
          return self.elevated().await;
        }
        let url = self
          .config
          .postgres
          .restricted_url
          .clone()
          .filter(|u| !u.is_empty())
          .unwrap_or_else(|| self.config.postgres.url.clone());
        let backend = self.connect(&url).await?;
        tracing::info!(backend = ?self.config.backend, "Restricted store client connected");
        Ok(backend)
      })
      .await
      .cloned()
  }

  fn is_memory(&self) -> bool {
    self.config.backend == BackendType::Sqlite && self.config.sqlite.path == ":memory:"
  }

  async fn connect(&self, pg_url: &str) -> Result<Arc<dyn DatabaseBackend>, anyhow::Error> {
    Ok(match self.config.backend {
      BackendType::Postgres => Arc::new(PostgresBackend::new(
        pg_url,
        self.config.postgres.max_connections,
      )?),
      BackendType::Sqlite => Arc::new(SqliteBackend::new(&self.config.sqlite.path).await?),
    })
  }
}
