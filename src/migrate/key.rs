//! Object key derivation.
//!
//! Keys look like `<module>/<owner>/<millis>_<label>[_<document>].<ext>`.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::assets::FieldPath;
use crate::store::CollectionSpec;

pub const DEFAULT_EXTENSION: &str = "bin";
pub const DEFAULT_MIME: &str = "application/octet-stream";

const EXTENSIONS: &[(&str, &str)] = &[
  ("image/png", "png"),
  ("image/jpeg", "jpg"),
  ("image/jpg", "jpg"),
  ("image/pjpeg", "jpg"),
  ("image/gif", "gif"),
  ("image/webp", "webp"),
  ("image/svg+xml", "svg"),
  ("image/avif", "avif"),
  ("image/x-icon", "ico"),
  ("image/vnd.microsoft.icon", "ico"),
  ("image/bmp", "bmp"),
  ("application/pdf", "pdf"),
  ("video/mp4", "mp4"),
  ("video/webm", "webm"),
  ("audio/mpeg", "mp3"),
];

/// Labels recognised in field names, checked innermost key first
const FIELD_LABELS: &[&str] = &["logo", "cover", "banner", "avatar"];

pub fn extension_for(mime: &str) -> &'static str {
  let mime = mime.trim().to_ascii_lowercase();
  EXTENSIONS
    .iter()
    .find(|(m, _)| *m == mime)
    .map_or(DEFAULT_EXTENSION, |&(_, ext)| ext)
}

/// MIME type implied by a file name's extension
pub fn mime_from_name(name: &str) -> Option<&'static str> {
  let file = name.rsplit('/').next().unwrap_or(name);
  let (_, ext) = file.rsplit_once('.')?;
  let ext = ext.to_ascii_lowercase();
  let ext = if ext == "jpeg" { "jpg".to_string() } else { ext };
  EXTENSIONS
    .iter()
    .find(|(_, e)| *e == ext)
    .map(|&(m, _)| m)
}

/// Human-readable role of an asset from its field path
pub fn label_for(spec: &CollectionSpec, path: &FieldPath) -> &'static str {
  let keys: Vec<String> = path.keys().map(str::to_ascii_lowercase).collect();
  keys
    .iter()
    .rev()
    .find_map(|k| FIELD_LABELS.iter().find(|l| k.contains(*l)).copied())
    .unwrap_or(spec.label)
}

/// Replace anything outside `[A-Za-z0-9_.-]` so ids are safe in keys
pub fn sanitize_component(s: &str) -> String {
  let cleaned: String = s
    .chars()
    .map(|c| {
      if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
        c
      } else {
        '_'
      }
    })
    .collect();
  let cleaned = cleaned.trim_matches('.');
  if cleaned.is_empty() {
    "_".to_string()
  } else {
    cleaned.to_string()
  }
}

#[derive(Debug, Clone, Copy)]
pub struct KeyParts<'a> {
  pub module: &'a str,
  pub owner_id: &'a str,
  pub label: &'a str,
  /// Present for every collection except the business one
  pub document_id: Option<&'a str>,
  pub mime: &'a str,
}

/// Issues object keys. The millisecond stamp is strictly increasing per
/// deriver, so two keys from one run never share a stamp.
#[derive(Debug, Default)]
pub struct KeyDeriver {
  last: AtomicI64,
}

impl KeyDeriver {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn next_timestamp(&self) -> i64 {
    let now = Utc::now().timestamp_millis();
    let prev = self
      .last
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
        Some(now.max(last + 1))
      })
      .unwrap_or(now);
    now.max(prev + 1)
  }

  pub fn derive(&self, parts: &KeyParts<'_>) -> String {
    Self::format(parts, self.next_timestamp())
  }

  pub fn format(parts: &KeyParts<'_>, timestamp: i64) -> String {
    let mut name = format!("{}_{}", timestamp, sanitize_component(parts.label));
    if let Some(doc) = parts.document_id {
      name.push('_');
      name.push_str(&sanitize_component(doc));
    }
    format!(
      "{}/{}/{}.{}",
      parts.module,
      sanitize_component(parts.owner_id),
      name,
      extension_for(parts.mime)
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::registry;

  #[test]
  fn test_extensions() {
    assert_eq!(extension_for("image/png"), "png");
    assert_eq!(extension_for("IMAGE/JPEG"), "jpg");
    assert_eq!(extension_for("image/svg+xml"), "svg");
    assert_eq!(extension_for("application/x-unknown"), "bin");
    assert_eq!(mime_from_name("foo/bar.JPEG"), Some("image/jpeg"));
    assert_eq!(mime_from_name("a.webp"), Some("image/webp"));
    assert_eq!(mime_from_name("noext"), None);
  }

  #[test]
  fn test_key_format() {
    let parts = KeyParts {
      module: "logos",
      owner_id: "b1",
      label: "logo",
      document_id: None,
      mime: "image/png",
    };
    assert_eq!(KeyDeriver::format(&parts, 123), "logos/b1/123_logo.png");

    let parts = KeyParts {
      module: "products",
      owner_id: "b/1",
      label: "product",
      document_id: Some("p 9"),
      mime: "application/zip",
    };
    assert_eq!(
      KeyDeriver::format(&parts, 5),
      "products/b_1/5_product_p_9.bin"
    );
  }

  #[test]
  fn test_timestamps_strictly_increase() {
    let keys = KeyDeriver::new();
    let mut prev = keys.next_timestamp();
    for _ in 0..1000 {
      let next = keys.next_timestamp();
      assert!(next > prev);
      prev = next;
    }
  }

  #[test]
  fn test_labels_from_paths() {
    let business = registry::lookup("businesses").unwrap();
    let products = registry::lookup("products").unwrap();
    let path = |s: &str| FieldPath::parse(s).unwrap();
    assert_eq!(label_for(business, &path("logo")), "logo");
    assert_eq!(label_for(business, &path("coverImage")), "cover");
    assert_eq!(label_for(business, &path("branding.bannerUrl")), "banner");
    assert_eq!(label_for(business, &path("gallery[0]")), "asset");
    assert_eq!(label_for(products, &path("images[2].url")), "product");
  }
}
