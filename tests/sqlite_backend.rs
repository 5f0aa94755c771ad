//! SQLite backend tests - raw record storage, paging, persistence

use chrono::{TimeZone, Utc};
use serde_json::json;
use tempfile::TempDir;
use vitrine::db::record::{BUSINESSES_TABLE, DOCUMENTS_TABLE};
use vitrine::db::{ColumnValue, DatabaseBackend, Record, SqlDialect, SqliteBackend};

fn record(collection: &str, id: &str, owner: Option<&str>) -> Record {
  let now = Utc::now();
  Record {
    id: id.to_string(),
    collection: Some(collection.to_string()),
    columns: vec![ColumnValue::Text(owner.map(str::to_string))],
    snapshot: json!({"id": id}).as_object().unwrap().clone(),
    created_at: now,
    updated_at: now,
  }
}

async fn backend() -> SqliteBackend {
  let backend = SqliteBackend::in_memory().await.unwrap();
  backend.init_schema().await.unwrap();
  backend
}

// =============================================================================
// Schema
// =============================================================================

#[tokio::test]
async fn test_init_schema_is_idempotent() {
  let backend = backend().await;
  backend.init_schema().await.unwrap();
  assert_eq!(backend.dialect(), SqlDialect::Sqlite);
  assert!(backend.list_collections().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_drop_schema() {
  let backend = backend().await;
  backend
    .upsert(&DOCUMENTS_TABLE, &record("products", "p1", None))
    .await
    .unwrap();
  backend.drop_schema().await.unwrap();
  assert!(backend
    .fetch(&DOCUMENTS_TABLE, Some("products"), "p1")
    .await
    .is_err());
}

// =============================================================================
// Records
// =============================================================================

#[tokio::test]
async fn test_upsert_keeps_created_at() {
  let backend = backend().await;
  let mut rec = record("products", "p1", Some("b1"));
  rec.created_at = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
  backend.upsert(&DOCUMENTS_TABLE, &rec).await.unwrap();

  let mut again = record("products", "p1", Some("b2"));
  again.snapshot.insert("v".into(), json!(2));
  backend.upsert(&DOCUMENTS_TABLE, &again).await.unwrap();

  let stored = backend
    .fetch(&DOCUMENTS_TABLE, Some("products"), "p1")
    .await
    .unwrap()
    .unwrap();
  assert_eq!(stored.created_at, rec.created_at);
  assert_eq!(stored.snapshot["v"], 2);
  assert_eq!(stored.columns, vec![ColumnValue::Text(Some("b2".into()))]);
  assert_eq!(stored.collection.as_deref(), Some("products"));
}

#[tokio::test]
async fn test_tagged_table_requires_collection() {
  let backend = backend().await;
  let mut rec = record("products", "p1", None);
  rec.collection = None;
  assert!(backend.upsert(&DOCUMENTS_TABLE, &rec).await.is_err());
  assert!(backend.fetch(&DOCUMENTS_TABLE, None, "p1").await.is_err());
}

#[tokio::test]
async fn test_fetch_page_orders_by_id() {
  let backend = backend().await;
  for id in ["c", "a", "e", "b", "d"] {
    backend
      .upsert(&DOCUMENTS_TABLE, &record("rooms", id, None))
      .await
      .unwrap();
  }
  backend
    .upsert(&DOCUMENTS_TABLE, &record("staff", "a0", None))
    .await
    .unwrap();

  let first = backend
    .fetch_page(&DOCUMENTS_TABLE, Some("rooms"), 2, 0)
    .await
    .unwrap();
  let rest = backend
    .fetch_page(&DOCUMENTS_TABLE, Some("rooms"), 10, 2)
    .await
    .unwrap();
  let ids: Vec<String> = first.iter().chain(rest.iter()).map(|r| r.id.clone()).collect();
  assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);
  assert_eq!(
    backend.list_collections().await.unwrap(),
    vec!["rooms".to_string(), "staff".to_string()]
  );
}

#[tokio::test]
async fn test_remove_and_remove_by_owner() {
  let backend = backend().await;
  for (id, owner) in [("p1", "b1"), ("p2", "b1"), ("p3", "b2")] {
    backend
      .upsert(&DOCUMENTS_TABLE, &record("products", id, Some(owner)))
      .await
      .unwrap();
  }
  backend
    .upsert(&DOCUMENTS_TABLE, &record("orders", "o1", Some("b1")))
    .await
    .unwrap();

  assert!(backend.remove(&DOCUMENTS_TABLE, Some("products"), "p3").await.unwrap());
  assert!(!backend.remove(&DOCUMENTS_TABLE, Some("products"), "p3").await.unwrap());

  let removed = backend
    .remove_by_owner(&DOCUMENTS_TABLE, Some("products"), "b1")
    .await
    .unwrap();
  assert_eq!(removed, 2);
  assert!(backend
    .fetch(&DOCUMENTS_TABLE, Some("orders"), "o1")
    .await
    .unwrap()
    .is_some());
}

#[tokio::test]
async fn test_business_columns_round_trip() {
  let backend = backend().await;
  let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
  let mut columns: Vec<ColumnValue> = BUSINESSES_TABLE
    .columns
    .iter()
    .map(|c| ColumnValue::null(c.kind))
    .collect();
  columns[BUSINESSES_TABLE.column_index("name").unwrap()] = ColumnValue::Text(Some("Inn".into()));
  columns[BUSINESSES_TABLE.column_index("subscription_start").unwrap()] =
    ColumnValue::Timestamp(Some(start));
  columns[BUSINESSES_TABLE.column_index("modules").unwrap()] =
    ColumnValue::Json(Some(json!({"hotel": true})));
  columns[BUSINESSES_TABLE.column_index("is_frozen").unwrap()] = ColumnValue::Bool(Some(false));

  let now = Utc::now();
  let rec = Record {
    id: "b1".into(),
    collection: None,
    columns: columns.clone(),
    snapshot: json!({"name": "Inn"}).as_object().unwrap().clone(),
    created_at: now,
    updated_at: now,
  };
  backend.upsert(&BUSINESSES_TABLE, &rec).await.unwrap();

  let stored = backend
    .fetch(&BUSINESSES_TABLE, None, "b1")
    .await
    .unwrap()
    .unwrap();
  assert_eq!(stored.columns, columns);
  assert!(stored.collection.is_none());
  assert!(backend.list_collections().await.unwrap().is_empty());
}

// =============================================================================
// Persistence
// =============================================================================

#[tokio::test]
async fn test_file_database_persists() {
  let dir = TempDir::new().unwrap();
  let path = dir.path().join("vitrine.db");
  let path = path.to_str().unwrap();

  {
    let backend = SqliteBackend::new(path).await.unwrap();
    backend.init_schema().await.unwrap();
    backend
      .upsert(&DOCUMENTS_TABLE, &record("gallery", "g1", None))
      .await
      .unwrap();
  }

  let backend = SqliteBackend::new(path).await.unwrap();
  let stored = backend
    .fetch(&DOCUMENTS_TABLE, Some("gallery"), "g1")
    .await
    .unwrap();
  assert!(stored.is_some());
}
