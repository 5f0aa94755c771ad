//! Mapping between documents and stored records.
//!
//! A projector decides which table a collection lives in, which typed
//! columns are derived from a document on write and how a document is rebuilt
//! from a row on read. The snapshot is always written verbatim, so a document
//! survives a round trip even when a field does not fit its column's type.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use super::registry::{self, direct_owner};
use crate::db::record::{BUSINESSES_TABLE, DOCUMENTS_TABLE};
use crate::db::{ColumnKind, ColumnValue, Record, TableSpec};
use crate::types::Data;

pub trait Projector: Send + Sync {
  fn table(&self) -> &'static TableSpec;

  /// Column values for `data`, aligned with `table().columns`
  fn project(&self, data: &Data) -> Vec<ColumnValue>;

  /// Document payload for a stored row
  fn reconstruct(&self, record: Record) -> Data;
}

/// Generic collections: snapshot only, plus the owner index where the
/// collection has one.
pub struct DocumentProjector {
  owner_column: bool,
}

/// The business entity: every mirrored field gets a typed column and the
/// snapshot is kept under `raw`.
pub struct BusinessProjector;

static INDEXED: DocumentProjector = DocumentProjector { owner_column: true };
static PLAIN: DocumentProjector = DocumentProjector {
  owner_column: false,
};
static BUSINESS: BusinessProjector = BusinessProjector;

/// Projector responsible for `collection`
pub fn projector_for(collection: &str) -> &'static dyn Projector {
  if registry::is_privileged(collection) {
    return &BUSINESS;
  }
  match registry::lookup(collection) {
    Some(spec) if spec.owner_column => &INDEXED,
    _ => &PLAIN,
  }
}

impl Projector for DocumentProjector {
  fn table(&self) -> &'static TableSpec {
    &DOCUMENTS_TABLE
  }

  fn project(&self, data: &Data) -> Vec<ColumnValue> {
    let owner = if self.owner_column {
      direct_owner(data).map(str::to_string)
    } else {
      None
    };
    vec![ColumnValue::Text(owner)]
  }

  fn reconstruct(&self, record: Record) -> Data {
    record.snapshot
  }
}

impl Projector for BusinessProjector {
  fn table(&self) -> &'static TableSpec {
    &BUSINESSES_TABLE
  }

  fn project(&self, data: &Data) -> Vec<ColumnValue> {
    BUSINESSES_TABLE
      .columns
      .iter()
      .map(|def| match def.field {
        Some(field) => decode_field(def.kind, data.get(field)),
        None => ColumnValue::null(def.kind),
      })
      .collect()
  }

  /// Columns win over the snapshot when the two disagree, so a column
  /// updated directly in the database shows up on read.
  fn reconstruct(&self, record: Record) -> Data {
    let mut data = record.snapshot;
    for (def, value) in BUSINESSES_TABLE.columns.iter().zip(record.columns) {
      let Some(field) = def.field else { continue };
      if value.is_null() {
        continue;
      }
      if !same_value(&value, &decode_field(def.kind, data.get(field))) {
        if let Some(json) = encode_column(value) {
          data.insert(field.to_string(), json);
        }
      }
    }
    data
  }
}

/// Typed decoding of a document field; anything that does not fit is NULL.
pub fn decode_field(kind: ColumnKind, value: Option<&Value>) -> ColumnValue {
  let value = value.filter(|v| !v.is_null());
  match kind {
    ColumnKind::Text => ColumnValue::Text(value.and_then(Value::as_str).map(str::to_string)),
    ColumnKind::Bool => ColumnValue::Bool(value.and_then(Value::as_bool)),
    ColumnKind::Timestamp => ColumnValue::Timestamp(value.and_then(decode_timestamp)),
    ColumnKind::Json => ColumnValue::Json(value.cloned()),
  }
}

/// Accepts RFC 3339 strings, epoch milliseconds and exported timestamp
/// objects (`{seconds, nanoseconds}` or `{_seconds, _nanoseconds}`).
pub fn decode_timestamp(value: &Value) -> Option<DateTime<Utc>> {
  match value {
    Value::String(s) => DateTime::parse_from_rfc3339(s)
      .ok()
      .map(|t| t.with_timezone(&Utc)),
    Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
    Value::Object(map) => {
      let secs = map
        .get("seconds")
        .or_else(|| map.get("_seconds"))
        .and_then(Value::as_i64)?;
      let nanos = map
        .get("nanoseconds")
        .or_else(|| map.get("_nanoseconds"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
      DateTime::from_timestamp(secs, u32::try_from(nanos).ok()?)
    }
    _ => None,
  }
}

fn encode_column(value: ColumnValue) -> Option<Value> {
  match value {
    ColumnValue::Text(v) => v.map(Value::String),
    ColumnValue::Bool(v) => v.map(Value::Bool),
    ColumnValue::Timestamp(v) => {
      v.map(|t| Value::String(t.to_rfc3339_opts(SecondsFormat::Millis, true)))
    }
    ColumnValue::Json(v) => v,
  }
}

/// Equality at storage precision. Timestamps compare at microseconds, the
/// resolution both backends keep.
fn same_value(a: &ColumnValue, b: &ColumnValue) -> bool {
  match (a, b) {
    (ColumnValue::Timestamp(Some(x)), ColumnValue::Timestamp(Some(y))) => {
      x.timestamp_micros() == y.timestamp_micros()
    }
    _ => a == b,
  }
}
