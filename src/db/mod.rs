mod backend;
mod client;
mod postgres;
pub mod record;
pub mod sanitize;
mod sqlite;

pub use backend::{DatabaseBackend, SqlDialect};
pub use client::{Access, StoreClient};
pub use postgres::PostgresBackend;
pub use record::{ColumnDef, ColumnKind, ColumnValue, Record, TableSpec};
pub use sanitize::{validate_collection_name, validate_document_id, SqlSanitizeError};
pub use sqlite::SqliteBackend;
