use async_trait::async_trait;

use super::record::{Record, TableSpec};

/// SQL dialect of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
  Postgres,
  Sqlite,
}

impl SqlDialect {
  /// Positional parameter placeholder for the given 1-based index
  pub fn placeholder(&self, index: usize) -> String {
    match self {
      Self::Postgres => format!("${}", index),
      Self::Sqlite => format!("?{}", index),
    }
  }

  /// `INSERT ... ON CONFLICT DO UPDATE` for a record of `table`.
  ///
  /// `created_at` is written on insert only; every other column is replaced
  /// on conflict.
  pub fn upsert_sql(&self, table: &TableSpec) -> String {
    let mut cols: Vec<&str> = Vec::with_capacity(table.columns.len() + 5);
    if table.tagged {
      cols.push("collection");
    }
    cols.push("id");
    cols.extend(table.columns.iter().map(|c| c.name));
    cols.push(table.snapshot);
    cols.push("created_at");
    cols.push("updated_at");

    let placeholders: Vec<String> = (1..=cols.len()).map(|i| self.placeholder(i)).collect();
    let updates: Vec<String> = cols
      .iter()
      .filter(|c| !matches!(**c, "collection" | "id" | "created_at"))
      .map(|c| format!("{c} = excluded.{c}"))
      .collect();

    format!(
      "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {}",
      table.name,
      cols.join(", "),
      placeholders.join(", "),
      table.key_columns(),
      updates.join(", ")
    )
  }

  /// WHERE clause matching one row, parameters starting at `first`
  pub fn key_predicate(&self, table: &TableSpec, first: usize) -> String {
    if table.tagged {
      format!(
        "collection = {} AND id = {}",
        self.placeholder(first),
        self.placeholder(first + 1)
      )
    } else {
      format!("id = {}", self.placeholder(first))
    }
  }
}

/// Abstract relational backend.
///
/// Operations are table-generic: the [`TableSpec`] describes the physical
/// layout, `collection` is required for tagged tables and ignored otherwise.
#[async_trait]
pub trait DatabaseBackend: Send + Sync {
  fn dialect(&self) -> SqlDialect;

  async fn init_schema(&self) -> Result<(), anyhow::Error>;
  async fn drop_schema(&self) -> Result<(), anyhow::Error>;

  /// Insert or replace a row. An existing row keeps its `created_at`.
  async fn upsert(&self, table: &TableSpec, record: &Record) -> Result<(), anyhow::Error>;

  async fn fetch(
    &self,
    table: &TableSpec,
    collection: Option<&str>,
    id: &str,
  ) -> Result<Option<Record>, anyhow::Error>;

  /// One page of rows ordered by id
  async fn fetch_page(
    &self,
    table: &TableSpec,
    collection: Option<&str>,
    limit: usize,
    offset: usize,
  ) -> Result<Vec<Record>, anyhow::Error>;

  /// Remove one row, returning whether it existed
  async fn remove(
    &self,
    table: &TableSpec,
    collection: Option<&str>,
    id: &str,
  ) -> Result<bool, anyhow::Error>;

  /// Remove every row whose owner column equals `owner_id` in a single
  /// statement, returning the number of rows removed
  async fn remove_by_owner(
    &self,
    table: &TableSpec,
    collection: Option<&str>,
    owner_id: &str,
  ) -> Result<u64, anyhow::Error>;

  /// Distinct collection tags present in the documents table
  async fn list_collections(&self) -> Result<Vec<String>, anyhow::Error>;
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::record::{BUSINESSES_TABLE, DOCUMENTS_TABLE};

  #[test]
  fn test_upsert_sql_keeps_created_at() {
    let sql = SqlDialect::Sqlite.upsert_sql(&DOCUMENTS_TABLE);
    assert!(sql.starts_with(
      "INSERT INTO documents (collection, id, owner_id, data, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
    ));
    assert!(sql.contains("ON CONFLICT (collection, id)"));
    assert!(sql.contains("data = excluded.data"));
    assert!(!sql.contains("created_at = excluded.created_at"));
  }

  #[test]
  fn test_upsert_sql_untagged() {
    let sql = SqlDialect::Postgres.upsert_sql(&BUSINESSES_TABLE);
    assert!(sql.contains("ON CONFLICT (id)"));
    assert!(sql.contains("$16"));
    assert!(!sql.contains("collection"));
  }

  #[test]
  fn test_key_predicate() {
    assert_eq!(
      SqlDialect::Postgres.key_predicate(&DOCUMENTS_TABLE, 1),
      "collection = $1 AND id = $2"
    );
    assert_eq!(
      SqlDialect::Sqlite.key_predicate(&BUSINESSES_TABLE, 1),
      "id = ?1"
    );
  }
}
