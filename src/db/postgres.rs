use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

use super::backend::{DatabaseBackend, SqlDialect};
use super::record::{ColumnKind, ColumnValue, Record, TableSpec};
use super::sanitize::{validate_collection_name, validate_document_id};

type Param = Box<dyn ToSql + Sync + Send>;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    collection VARCHAR(255) NOT NULL,
    id VARCHAR(255) NOT NULL,
    owner_id VARCHAR(255),
    data JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (collection, id)
);
CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(collection, owner_id);
CREATE INDEX IF NOT EXISTS idx_documents_data ON documents USING GIN(data);

CREATE TABLE IF NOT EXISTS businesses (
    id VARCHAR(255) PRIMARY KEY,
    owner_uid VARCHAR(255),
    name TEXT,
    slug TEXT,
    status TEXT,
    plan TEXT,
    subscription_start TIMESTAMPTZ,
    subscription_end TIMESTAMPTZ,
    modules JSONB,
    logo TEXT,
    cover_image TEXT,
    is_frozen BOOLEAN,
    frozen_reason TEXT,
    raw JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_businesses_slug ON businesses(slug);
CREATE INDEX IF NOT EXISTS idx_businesses_owner ON businesses(owner_uid);
CREATE INDEX IF NOT EXISTS idx_businesses_status ON businesses(status);
"#;

pub struct PostgresBackend {
  pool: Pool,
}

impl PostgresBackend {
  pub fn new(url: &str, max_connections: usize) -> Result<Self, anyhow::Error> {
    let mut cfg = Config::new();
    cfg.url = Some(url.into());
    cfg.manager = Some(ManagerConfig {
      recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig::new(max_connections.max(1)));
    let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;
    Ok(Self { pool })
  }

  async fn query(&self, sql: &str, params: &[Param]) -> Result<Vec<Row>, anyhow::Error> {
    let refs: Vec<&(dyn ToSql + Sync)> = params
      .iter()
      .map(|p| p.as_ref() as &(dyn ToSql + Sync))
      .collect();
    Ok(self.pool.get().await?.query(sql, &refs).await?)
  }

  async fn execute(&self, sql: &str, params: &[Param]) -> Result<u64, anyhow::Error> {
    let refs: Vec<&(dyn ToSql + Sync)> = params
      .iter()
      .map(|p| p.as_ref() as &(dyn ToSql + Sync))
      .collect();
    Ok(self.pool.get().await?.execute(sql, &refs).await?)
  }
}

/// Collection tag for a tagged table, validated
fn tag<'a>(table: &TableSpec, collection: Option<&'a str>) -> Result<&'a str, anyhow::Error> {
  let collection = collection
    .ok_or_else(|| anyhow::anyhow!("Table {} requires a collection tag", table.name))?;
  validate_collection_name(collection)?;
  Ok(collection)
}

fn key_params(
  table: &TableSpec,
  collection: Option<&str>,
  id: &str,
) -> Result<Vec<Param>, anyhow::Error> {
  validate_document_id(id)?;
  let mut params: Vec<Param> = Vec::with_capacity(2);
  if table.tagged {
    params.push(Box::new(tag(table, collection)?.to_string()));
  }
  params.push(Box::new(id.to_string()));
  Ok(params)
}

#[async_trait]
impl DatabaseBackend for PostgresBackend {
  fn dialect(&self) -> SqlDialect {
    SqlDialect::Postgres
  }

  async fn init_schema(&self) -> Result<(), anyhow::Error> {
    self.pool.get().await?.batch_execute(SCHEMA).await?;
    tracing::info!("PostgreSQL schema initialized");
    Ok(())
  }

  async fn drop_schema(&self) -> Result<(), anyhow::Error> {
    self
      .pool
      .get()
      .await?
      .batch_execute("DROP TABLE IF EXISTS businesses; DROP TABLE IF EXISTS documents;")
      .await?;
    Ok(())
  }

  async fn upsert(&self, table: &TableSpec, record: &Record) -> Result<(), anyhow::Error> {
    validate_document_id(&record.id)?;
    let mut params: Vec<Param> = Vec::with_capacity(table.columns.len() + 5);
    if table.tagged {
      params.push(Box::new(
        tag(table, record.collection.as_deref())?.to_string(),
      ));
    }
    params.push(Box::new(record.id.clone()));
    for value in &record.columns {
      params.push(encode_column(value));
    }
    params.push(Box::new(serde_json::Value::Object(record.snapshot.clone())));
    params.push(Box::new(record.created_at));
    params.push(Box::new(record.updated_at));

    self
      .execute(&SqlDialect::Postgres.upsert_sql(table), &params)
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
      SqlDialect::Postgres.key_predicate(table, 1)
    );
    let rows = self.query(&sql, &params).await?;
    rows.iter().next().map(|r| decode_row(table, r)).transpose()
  }

  async fn fetch_page(
    &self,
    table: &TableSpec,
    collection: Option<&str>,
    limit: usize,
    offset: usize,
  ) -> Result<Vec<Record>, anyhow::Error> {
    let mut params: Vec<Param> = Vec::with_capacity(3);
    let mut sql = format!("SELECT {} FROM {}", table.select_list(), table.name);
    if table.tagged {
      params.push(Box::new(tag(table, collection)?.to_string()));
      sql.push_str(" WHERE collection = $1");
    }
    let next = params.len() + 1;
    sql.push_str(&format!(" ORDER BY id LIMIT ${} OFFSET ${}", next, next + 1));
    params.push(Box::new(limit as i64));
    params.push(Box::new(offset as i64));

    let rows = self.query(&sql, &params).await?;
    rows.iter().map(|r| decode_row(table, r)).collect()
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
      SqlDialect::Postgres.key_predicate(table, 1)
    );
    Ok(self.execute(&sql, &params).await? > 0)
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

    let mut params: Vec<Param> = Vec::with_capacity(2);
    let sql = if table.tagged {
      params.push(Box::new(tag(table, collection)?.to_string()));
      format!(
        "DELETE FROM {} WHERE collection = $1 AND {} = $2",
        table.name, owner_column
      )
    } else {
      format!("DELETE FROM {} WHERE {} = $1", table.name, owner_column)
    };
    params.push(Box::new(owner_id.to_string()));

    self.execute(&sql, &params).await
  }

  async fn list_collections(&self) -> Result<Vec<String>, anyhow::Error> {
    let rows = self
      .query(
        "SELECT DISTINCT collection FROM documents ORDER BY collection",
        &[],
      )
      .await?;
    Ok(rows.iter().map(|r| r.get(0)).collect())
  }
}

fn encode_column(value: &ColumnValue) -> Param {
  match value {
    ColumnValue::Text(v) => Box::new(v.clone()),
    ColumnValue::Bool(v) => Box::new(*v),
    ColumnValue::Timestamp(v) => Box::new(*v),
    ColumnValue::Json(v) => Box::new(v.clone()),
  }
}

fn decode_row(table: &TableSpec, row: &Row) -> Result<Record, anyhow::Error> {
  let mut idx = 0;
  let collection = if table.tagged {
    idx += 1;
    Some(row.try_get::<_, String>(0)?)
  } else {
    None
  };
  let id: String = row.try_get(idx)?;
  idx += 1;

  let mut columns = Vec::with_capacity(table.columns.len());
  for def in table.columns {
    let value = match def.kind {
      ColumnKind::Text => ColumnValue::Text(row.try_get(idx)?),
      ColumnKind::Bool => ColumnValue::Bool(row.try_get(idx)?),
      ColumnKind::Timestamp => ColumnValue::Timestamp(row.try_get(idx)?),
      ColumnKind::Json => ColumnValue::Json(row.try_get(idx)?),
    };
    columns.push(value);
    idx += 1;
  }

  let snapshot = match row.try_get::<_, serde_json::Value>(idx)? {
    serde_json::Value::Object(map) => map,
    other => anyhow::bail!("Snapshot of {} is not an object: {}", id, other),
  };
  let created_at: DateTime<Utc> = row.try_get(idx + 1)?;
  let updated_at: DateTime<Utc> = row.try_get(idx + 2)?;

  Ok(Record {
    id,
    collection,
    columns,
    snapshot,
    created_at,
    updated_at,
  })
}
