use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Schema-less payload of a document.
pub type Data = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
  pub id: String,
  /// Collection tag. `None` for records of the privileged business table,
  /// which are identified by table identity instead.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub collection: Option<String>,
  pub data: Data,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Document {
  /// Flatten into `{id, ...data}`, the shape application code reads.
  pub fn to_value(&self) -> Value {
    let mut out = Map::with_capacity(self.data.len() + 1);
    out.insert("id".into(), Value::String(self.id.clone()));
    for (k, v) in &self.data {
      if k != "id" {
        out.insert(k.clone(), v.clone());
      }
    }
    Value::Object(out)
  }

  /// Top-level string field, if present.
  pub fn str_field(&self, field: &str) -> Option<&str> {
    self.data.get(field).and_then(Value::as_str)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_to_value_puts_id_first() {
    let now = Utc::now();
    let Value::Object(data) = json!({"name": "Cafe", "id": "stale"}) else {
      unreachable!()
    };
    let doc = Document {
      id: "b1".into(),
      collection: None,
      data,
      created_at: now,
      updated_at: now,
    };
    let v = doc.to_value();
    assert_eq!(v["id"], "b1");
    assert_eq!(v["name"], "Cafe");
    assert_eq!(v.as_object().unwrap().keys().next().unwrap(), "id");
  }
}
