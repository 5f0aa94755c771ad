use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::params_from_iter;
use tokio_rusqlite::Connection;

use super::backend::{DatabaseBackend, SqlDialect};
use super::record::{ColumnKind, ColumnValue, Record, TableSpec};
use super::sanitize::{validate_collection_name, validate_document_id};
use crate::types::Data;

const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -64000;
PRAGMA temp_store = MEMORY;
"#;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    owner_id TEXT,
    data TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (collection, id)
) WITHOUT ROWID;
CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(collection, owner_id);

CREATE TABLE IF NOT EXISTS businesses (
    id TEXT PRIMARY KEY,
    owner_uid TEXT,
    name TEXT,
    slug TEXT,
    status TEXT,
    plan TEXT,
    subscription_start TEXT,
    subscription_end TEXT,
    modules TEXT,
    logo TEXT,
    cover_image TEXT,
    is_frozen INTEGER,
    frozen_reason TEXT,
    raw TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
) WITHOUT ROWID;
CREATE INDEX IF NOT EXISTS idx_businesses_slug ON businesses(slug);
CREATE INDEX IF NOT EXISTS idx_businesses_owner ON businesses(owner_uid);
"#;

pub struct SqliteBackend {
  conn: Connection,
}

impl SqliteBackend {
  pub async fn new(path: &str) -> Result<Self, anyhow::Error> {
    let conn = if path == ":memory:" {
      Connection::open_in_memory().await?
    } else {
      Connection::open(path).await?
    };

    conn
      .call(|conn| conn.execute_batch(PRAGMAS).map_err(|e| e.into()))
      .await?;

    Ok(Self { conn })
  }

  pub async fn in_memory() -> Result<Self, anyhow::Error> {
    Self::new(":memory:").await
  }

  /// Run a query and return raw rows; decoding happens outside the
  /// connection thread.
  async fn query_raw(
    &self,
    sql: String,
    params: Vec<SqlValue>,
  ) -> Result<Vec<Vec<SqlValue>>, anyhow::Error> {
    self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(&sql)?;
        let width = stmt.column_count();
        let mut rows = stmt.query(params_from_iter(params))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
          let mut values = Vec::with_capacity(width);
          for i in 0..width {
            values.push(row.get::<_, SqlValue>(i)?);
          }
          out.push(values);
        }
        Ok(out)
      })
      .await
      .map_err(|e| anyhow::anyhow!("{}", e))
  }

  async fn execute(&self, sql: String, params: Vec<SqlValue>) -> Result<usize, anyhow::Error> {
    self
      .conn
      .call(move |conn| {
        conn
          .execute(&sql, params_from_iter(params))
          .map_err(|e| e.into())
      })
      .await
      .map_err(|e| anyhow::anyhow!("{}", e))
  }
}

fn key_params(table: &TableSpec, collection: Option<&str>, id: &str) -> Result<Vec<SqlValue>, anyhow::Error> {
  validate_document_id(id)?;
  let mut params = Vec::with_capacity(2);
  if table.tagged {
    params.push(SqlValue::Text(tag(table, collection)?.to_string()));
  }
  params.push(SqlValue::Text(id.to_string()));
  Ok(params)
}

/// Collection tag for a tagged table, validated
fn tag<'a>(table: &TableSpec, collection: Option<&'a str>) -> Result<&'a str, anyhow::Error> {
  let collection = collection
    .ok_or_else(|| anyhow::anyhow!("Table {} requires a collection tag", table.name))?;
  validate_collection_name(collection)?;
  Ok(collection)
}

#[async_trait]
impl DatabaseBackend for SqliteBackend {
  fn dialect(&self) -> SqlDialect {
    SqlDialect::Sqlite
  }

  async fn init_schema(&self) -> Result<(), anyhow::Error> {
    self
      .conn
      .call(|conn| conn.execute_batch(SCHEMA).map_err(|e| e.into()))
      .await?;
    tracing::info!("SQLite schema initialized");
    Ok(())
  }

  async fn drop_schema(&self) -> Result<(), anyhow::Error> {
    self
      .conn
      .call(|conn| {
        conn
          .execute_batch(
            "DROP TABLE IF EXISTS businesses;
         DROP TABLE IF EXISTS documents;",
          )
          .map_err(|e| e.into())
      })
      .await?;
    Ok(())
  }

  async fn upsert(&self, table: &TableSpec, record: &Record) -> Result<(), anyhow::Error> {
    validate_document_id(&record.id)?;
    let mut params = Vec::with_capacity(table.columns.len() + 5);
    if table.tagged {
      params.push(SqlValue::Text(
        tag(table, record.collection.as_deref())?.to_string(),
      ));
    }
    params.push(SqlValue::Text(record.id.clone()));
    for value in &record.columns {
      params.push(encode_column(value)?);
    }
    params.push(SqlValue::Text(serde_json::to_string(&record.snapshot)?));
    params.push(SqlValue::Text(encode_timestamp(&record.created_at)));
    params.push(SqlValue::Text(encode_timestamp(&record.updated_at)));

    self
      .execute(SqlDialect::Sqlite.upsert_sql(table), params)
      .await?;
    Ok(())
  }

  async fn fetch(
    &self,
    table: &TableSpec,
    collection: Option<&str>,
    id: &str,
  ) -> Result<Option<Record>, anyhow::Error> {
    let params = key_params(table, collection, id)?;
    let sql = format!(
      "SELECT {} FROM {} WHERE {}",
      table.select_list(),
      table.name,
      SqlDialect::Sqlite.key_predicate(table, 1)
    );

    let rows = self.query_raw(sql, params).await?;
    rows.into_iter().next().map(|r| decode_row(table, r)).transpose()
  }

  async fn fetch_page(
    &self,
    table: &TableSpec,
    collection: Option<&str>,
    limit: usize,
    offset: usize,
  ) -> Result<Vec<Record>, anyhow::Error> {
    let mut params = Vec::with_capacity(3);
    let mut sql = format!("SELECT {} FROM {}", table.select_list(), table.name);
    if table.tagged {
      params.push(SqlValue::Text(tag(table, collection)?.to_string()));
      sql.push_str(" WHERE collection = ?1");
    }
    let next = params.len() + 1;
    sql.push_str(&format!(" ORDER BY id LIMIT ?{} OFFSET ?{}", next, next + 1));
    params.push(SqlValue::Integer(limit as i64));
    params.push(SqlValue::Integer(offset as i64));

    self
      .query_raw(sql, params)
      .await?
      .into_iter()
      .map(|r| decode_row(table, r))
      .collect()
  }

  async fn remove(
    &self,
    table: &TableSpec,
    collection: Option<&str>,
    id: &str,
  ) -> Result<bool, anyhow::Error> {
    let params = key_params(table, collection, id)?;
    let sql = format!(
      "DELETE FROM {} WHERE {}",
      table.name,
      SqlDialect::Sqlite.key_predicate(table, 1)
    );
    Ok(self.execute(sql, params).await? > 0)
  }

  async fn remove_by_owner(
    &self,
    table: &TableSpec,
    collection: Option<&str>,
    owner_id: &str,
  ) -> Result<u64, anyhow::Error> {
    let owner_column = table
      .owner_column
      .ok_or_else(|| anyhow::anyhow!("Table {} has no owner column", table.name))?;

    let mut params = Vec::with_capacity(2);
    let sql = if table.tagged {
      params.push(SqlValue::Text(tag(table, collection)?.to_string()));
      format!(
        "DELETE FROM {} WHERE collection = ?1 AND {} = ?2",
        table.name, owner_column
      )
    } else {
      format!("DELETE FROM {} WHERE {} = ?1", table.name, owner_column)
    };
    params.push(SqlValue::Text(owner_id.to_string()));

    Ok(self.execute(sql, params).await? as u64)
  }

  async fn list_collections(&self) -> Result<Vec<String>, anyhow::Error> {
    let rows = self
      .query_raw(
        "SELECT DISTINCT collection FROM documents ORDER BY collection".into(),
        Vec::new(),
      )
      .await?;
    Ok(
      rows
        .into_iter()
        .filter_map(|mut r| match r.pop() {
          Some(SqlValue::Text(s)) => Some(s),
          _ => None,
        })
        .collect(),
    )
  }
}

fn encode_timestamp(t: &DateTime<Utc>) -> String {
  t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn encode_column(value: &ColumnValue) -> Result<SqlValue, anyhow::Error> {
  Ok(match value {
    ColumnValue::Text(Some(s)) => SqlValue::Text(s.clone()),
    ColumnValue::Bool(Some(b)) => SqlValue::Integer(i64::from(*b)),
    ColumnValue::Timestamp(Some(t)) => SqlValue::Text(encode_timestamp(t)),
    ColumnValue::Json(Some(v)) => SqlValue::Text(serde_json::to_string(v)?),
    _ => SqlValue::Null,
  })
}

fn decode_column(kind: ColumnKind, value: SqlValue) -> Result<ColumnValue, anyhow::Error> {
  if matches!(value, SqlValue::Null) {
    return Ok(ColumnValue::null(kind));
  }
  Ok(match (kind, value) {
    (ColumnKind::Text, SqlValue::Text(s)) => ColumnValue::Text(Some(s)),
    (ColumnKind::Bool, SqlValue::Integer(i)) => ColumnValue::Bool(Some(i != 0)),
    (ColumnKind::Timestamp, SqlValue::Text(s)) => ColumnValue::Timestamp(Some(decode_timestamp(&s)?)),
    (ColumnKind::Json, SqlValue::Text(s)) => ColumnValue::Json(Some(serde_json::from_str(&s)?)),
    (kind, other) => anyhow::bail!("Unexpected SQLite value {:?} for {:?} column", other, kind),
  })
}

fn decode_timestamp(s: &str) -> Result<DateTime<Utc>, anyhow::Error> {
  Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

fn decode_text(value: Option<SqlValue>) -> Result<String, anyhow::Error> {
  match value {
    Some(SqlValue::Text(s)) => Ok(s),
    other => anyhow::bail!("Expected TEXT, got {:?}", other),
  }
}

fn decode_row(table: &TableSpec, row: Vec<SqlValue>) -> Result<Record, anyhow::Error> {
  let mut values = row.into_iter();

  let collection = if table.tagged {
    Some(decode_text(values.next())?)
  } else {
    None
  };
  let id = decode_text(values.next())?;

  let mut columns = Vec::with_capacity(table.columns.len());
  for def in table.columns {
    let value = values
      .next()
      .ok_or_else(|| anyhow::anyhow!("Missing column {}", def.name))?;
    columns.push(decode_column(def.kind, value)?);
  }

  let snapshot: Data = serde_json::from_str(&decode_text(values.next())?)?;
  let created_at = decode_timestamp(&decode_text(values.next())?)?;
  let updated_at = decode_timestamp(&decode_text(values.next())?)?;

  Ok(Record {
    id,
    collection,
    columns,
    snapshot,
    created_at,
    updated_at,
  })
}
