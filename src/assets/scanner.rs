use serde_json::Value;

use super::path::FieldPath;
use super::reference::{Classifier, RefKind};
use crate::types::Document;

/// Field name fragments that mark a value as an asset slot
pub const ASSET_KEYWORDS: &[&str] = &[
  "logo",
  "cover",
  "photo",
  "avatar",
  "image",
  "gallery",
  "banner",
  "thumbnail",
];

/// A located asset reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanHit {
  pub collection: String,
  pub document_id: String,
  pub path: FieldPath,
  /// The string found at `path`
  pub reference: String,
  pub kind: RefKind,
}

/// Visit every string leaf of `value` that classifies as a reference.
///
/// Objects extend the path with `.key`, arrays with `[i]`; scalars other
/// than strings end the descent.
pub fn walk<F>(value: &Value, path: &FieldPath, classifier: &Classifier, on_hit: &mut F)
where
  F: FnMut(&FieldPath, &str, RefKind),
{
  match value {
    Value::String(s) => {
      if let Some(kind) = classifier.classify(s) {
        on_hit(path, s, kind);
      }
    }
    Value::Array(items) => {
      for (i, item) in items.iter().enumerate() {
        walk(item, &path.index(i), classifier, on_hit);
      }
    }
    Value::Object(map) => {
      for (k, v) in map {
        walk(v, &path.key(k), classifier, on_hit);
      }
    }
    Value::Null | Value::Bool(_) | Value::Number(_) => {}
  }
}

/// Case-insensitive keyword match anywhere along the path
pub fn is_interesting(path: &FieldPath) -> bool {
  path.keys().any(|k| {
    let k = k.to_ascii_lowercase();
    ASSET_KEYWORDS.iter().any(|kw| k.contains(kw))
  })
}

/// Every reference in a document. With `interesting_only`, hits outside
/// asset-like fields are dropped.
pub fn scan_document(
  classifier: &Classifier,
  collection: &str,
  doc: &Document,
  interesting_only: bool,
) -> Vec<ScanHit> {
  let mut hits = Vec::new();
  let root = FieldPath::root();
  for (key, value) in &doc.data {
    walk(value, &root.key(key), classifier, &mut |path, s, kind| {
      if interesting_only && !is_interesting(path) {
        return;
      }
      hits.push(ScanHit {
        collection: collection.to_string(),
        document_id: doc.id.clone(),
        path: path.clone(),
        reference: s.to_string(),
        kind,
      });
    });
  }
  hits
}
