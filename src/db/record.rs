//! Table-generic row representation shared by every backend.
//!
//! A [`Record`] is what actually hits the database: an id, an optional
//! collection tag, a set of typed column values laid out as described by the
//! owning [`TableSpec`], and the JSON snapshot of the full document.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::types::Data;

/// SQL type of a projected column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
  Text,
  Bool,
  Timestamp,
  Json,
}

impl ColumnKind {
  pub fn postgres_type(&self) -> &'static str {
    match self {
      Self::Text => "TEXT",
      Self::Bool => "BOOLEAN",
      Self::Timestamp => "TIMESTAMPTZ",
      Self::Json => "JSONB",
    }
  }

  pub fn sqlite_type(&self) -> &'static str {
    match self {
      Self::Text | Self::Timestamp | Self::Json => "TEXT",
      Self::Bool => "INTEGER",
    }
  }
}

/// A typed column and the document field it mirrors
#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
  pub name: &'static str,
  pub kind: ColumnKind,
  /// Document field the column is projected from. `None` for columns that
  /// are derived rather than mirrored (e.g. the owner index).
  pub field: Option<&'static str>,
}

/// Physical layout of a table
#[derive(Debug)]
pub struct TableSpec {
  pub name: &'static str,
  /// Tagged tables carry a `collection` column and are keyed by
  /// (collection, id); untagged tables are keyed by id alone.
  pub tagged: bool,
  /// Column holding the JSON snapshot
  pub snapshot: &'static str,
  pub columns: &'static [ColumnDef],
  /// Column that holds the owning tenant id, when the table has one
  pub owner_column: Option<&'static str>,
}

impl TableSpec {
  pub fn column_index(&self, name: &str) -> Option<usize> {
    self.columns.iter().position(|c| c.name == name)
  }

  /// Comma separated list of every column in storage order:
  /// `[collection,] id, <columns...>, <snapshot>, created_at, updated_at`
  pub fn select_list(&self) -> String {
    let mut cols: Vec<&str> = Vec::with_capacity(self.columns.len() + 5);
    if self.tagged {
      cols.push("collection");
    }
    cols.push("id");
    cols.extend(self.columns.iter().map(|c| c.name));
    cols.push(self.snapshot);
    cols.push("created_at");
    cols.push("updated_at");
    cols.join(", ")
  }

  /// Columns that make up the primary key
  pub fn key_columns(&self) -> &'static str {
    if self.tagged {
      "collection, id"
    } else {
      "id"
    }
  }
}

/// Generic collections share one tagged table with an owner index.
pub static DOCUMENTS_TABLE: TableSpec = TableSpec {
  name: "documents",
  tagged: true,
  snapshot: "data",
  columns: &[ColumnDef {
    name: "owner_id",
    kind: ColumnKind::Text,
    field: None,
  }],
  owner_column: Some("owner_id"),
};

/// The privileged business entity: typed columns plus the raw snapshot.
pub static BUSINESSES_TABLE: TableSpec = TableSpec {
  name: "businesses",
  tagged: false,
  snapshot: "raw",
  columns: &[
    ColumnDef {
      name: "owner_uid",
      kind: ColumnKind::Text,
      field: Some("ownerId"),
    },
    ColumnDef {
      name: "name",
      kind: ColumnKind::Text,
      field: Some("name"),
    },
    ColumnDef {
      name: "slug",
      kind: ColumnKind::Text,
      field: Some("slug"),
    },
    ColumnDef {
      name: "status",
      kind: ColumnKind::Text,
      field: Some("status"),
    },
    ColumnDef {
      name: "plan",
      kind: ColumnKind::Text,
      field: Some("plan"),
    },
    ColumnDef {
      name: "subscription_start",
      kind: ColumnKind::Timestamp,
      field: Some("subscriptionStart"),
    },
    ColumnDef {
      name: "subscription_end",
      kind: ColumnKind::Timestamp,
      field: Some("subscriptionEnd"),
    },
    ColumnDef {
      name: "modules",
      kind: ColumnKind::Json,
      field: Some("modules"),
    },
    ColumnDef {
      name: "logo",
      kind: ColumnKind::Text,
      field: Some("logo"),
    },
    ColumnDef {
      name: "cover_image",
      kind: ColumnKind::Text,
      field: Some("coverImage"),
    },
    ColumnDef {
      name: "is_frozen",
      kind: ColumnKind::Bool,
      field: Some("isFrozen"),
    },
    ColumnDef {
      name: "frozen_reason",
      kind: ColumnKind::Text,
      field: Some("frozenReason"),
    },
  ],
  owner_column: None,
};

/// A nullable typed column value. `None` is stored as SQL NULL.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
  Text(Option<String>),
  Bool(Option<bool>),
  Timestamp(Option<DateTime<Utc>>),
  Json(Option<Value>),
}

impl ColumnValue {
  pub fn null(kind: ColumnKind) -> Self {
    match kind {
      ColumnKind::Text => Self::Text(None),
      ColumnKind::Bool => Self::Bool(None),
      ColumnKind::Timestamp => Self::Timestamp(None),
      ColumnKind::Json => Self::Json(None),
    }
  }

  pub fn is_null(&self) -> bool {
    match self {
      Self::Text(v) => v.is_none(),
      Self::Bool(v) => v.is_none(),
      Self::Timestamp(v) => v.is_none(),
      Self::Json(v) => v.is_none(),
    }
  }

  pub fn as_text(&self) -> Option<&str> {
    match self {
      Self::Text(Some(s)) => Some(s),
      _ => None,
    }
  }
}

/// One stored row
#[derive(Debug, Clone)]
pub struct Record {
  pub id: String,
  pub collection: Option<String>,
  /// Values aligned with `TableSpec::columns`
  pub columns: Vec<ColumnValue>,
  pub snapshot: Data,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}
