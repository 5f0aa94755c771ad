//! Classification of string values that point at binary content.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use regex::Regex;
use std::fmt;
use thiserror::Error;

use crate::config::{AssetsSection, ConfigError};

const INLINE_PREFIX: &str = "data:";
const INLINE_MARKER: &str = ";base64";
const LEGACY_OBJECT_MARKER: &str = "/o/";

const LENIENT: GeneralPurposeConfig =
  GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::RequireNone);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

#[derive(Debug, Error)]
pub enum ReferenceError {
  #[error("not an asset reference: {0}")]
  NotAReference(String),
  #[error("malformed inline reference: {0}")]
  InvalidInline(String),
  #[error("invalid base64 payload: {0}")]
  InvalidBase64(#[from] base64::DecodeError),
  #[error("unparseable legacy URL: {0}")]
  InvalidUrl(String),
  #[error("invalid field path: {0}")]
  InvalidPath(String),
}

/// Shape of an asset reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RefKind {
  Inline,
  Legacy,
  Canonical,
}

impl RefKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Inline => "inline",
      Self::Legacy => "legacy",
      Self::Canonical => "canonical",
    }
  }

  /// Whether references of this kind still need migrating
  pub fn is_residual(&self) -> bool {
    !matches!(self, Self::Canonical)
  }
}

impl fmt::Display for RefKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Parsed asset reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetRef {
  /// `data:<mime>;base64,<payload>`
  Inline { mime: String, payload: String },
  /// URL on the previous storage provider
  Legacy { url: String, object_name: String },
  /// URL under the current public base
  Canonical { url: String, key: String },
}

impl AssetRef {
  pub fn kind(&self) -> RefKind {
    match self {
      Self::Inline { .. } => RefKind::Inline,
      Self::Legacy { .. } => RefKind::Legacy,
      Self::Canonical { .. } => RefKind::Canonical,
    }
  }
}

/// Decode a base64 payload. Padding is optional (and tolerated even when
/// wrong), whitespace is ignored and the URL-safe alphabet is accepted.
pub fn decode_inline(payload: &str) -> Result<Vec<u8>, ReferenceError> {
  let cleaned: String = payload
    .chars()
    .filter(|c| !c.is_ascii_whitespace())
    .collect();
  let cleaned = cleaned.trim_end_matches('=');
  if cleaned.is_empty() {
    return Err(ReferenceError::InvalidInline("empty payload".into()));
  }
  match STANDARD_LENIENT.decode(cleaned) {
    Ok(bytes) => Ok(bytes),
    Err(e) => URL_SAFE_LENIENT.decode(cleaned).map_err(|_| e.into()),
  }
}

/// Object name of a legacy URL: the percent-decoded segment after `/o/`,
/// or the whole URL path when there is no such segment.
pub fn legacy_object_name(url: &str) -> Result<String, ReferenceError> {
  let invalid = || ReferenceError::InvalidUrl(url.to_string());
  let without_query = url.split(['?', '#']).next().unwrap_or(url);

  let raw = match without_query.find(LEGACY_OBJECT_MARKER) {
    Some(pos) => &without_query[pos + LEGACY_OBJECT_MARKER.len()..],
    None => {
      let after_scheme = without_query
        .split_once("://")
        .map_or(without_query, |(_, rest)| rest);
      let path_start = after_scheme.find('/').ok_or_else(invalid)?;
      after_scheme[path_start..].trim_start_matches('/')
    }
  };
  if raw.is_empty() {
    return Err(invalid());
  }
  let decoded = urlencoding::decode(raw).map_err(|_| invalid())?;
  Ok(decoded.into_owned())
}

/// Sorts string leaves into inline, legacy and canonical references.
#[derive(Debug, Clone)]
pub struct Classifier {
  canonical_base: String,
  legacy: Option<Regex>,
}

impl Classifier {
  pub fn new(canonical_base: &str, legacy: Option<Regex>) -> Self {
    Self {
      canonical_base: canonical_base.trim_end_matches('/').to_string(),
      legacy,
    }
  }

  pub fn from_config(assets: &AssetsSection) -> Result<Self, ConfigError> {
    let legacy = legacy_regex(assets.legacy_pattern.as_deref(), &assets.legacy_domains)?;
    Ok(Self::new(&assets.public_base_url, legacy))
  }

  pub fn canonical_base(&self) -> &str {
    &self.canonical_base
  }

  /// Public URL of an object key
  pub fn public_url(&self, key: &str) -> String {
    format!("{}/{}", self.canonical_base, key)
  }

  /// Cheap shape check. Inline beats URL shapes; canonical beats legacy.
  pub fn classify(&self, s: &str) -> Option<RefKind> {
    if is_inline(s) {
      return Some(RefKind::Inline);
    }
    if self.canonical_key(s).is_some() {
      return Some(RefKind::Canonical);
    }
    match &self.legacy {
      Some(re) if re.is_match(s) => Some(RefKind::Legacy),
      _ => None,
    }
  }

  /// Full parse of a reference
  pub fn parse(&self, s: &str) -> Result<AssetRef, ReferenceError> {
    match self.classify(s) {
      Some(RefKind::Inline) => parse_inline(s),
      Some(RefKind::Canonical) => Ok(AssetRef::Canonical {
        url: s.to_string(),
        key: self.canonical_key(s).unwrap_or_default().to_string(),
      }),
      Some(RefKind::Legacy) => Ok(AssetRef::Legacy {
        url: s.to_string(),
        object_name: legacy_object_name(s)?,
      }),
      None => Err(ReferenceError::NotAReference(truncate(s, 80))),
    }
  }

  /// Object key of a canonical URL
  pub fn canonical_key<'a>(&self, s: &'a str) -> Option<&'a str> {
    if self.canonical_base.is_empty() {
      return None;
    }
    let rest = s.strip_prefix(self.canonical_base.as_str())?.strip_prefix('/')?;
    let key = rest.split(['?', '#']).next().unwrap_or(rest);
    (!key.is_empty()).then_some(key)
  }
}

/// Legacy matcher from an explicit pattern, or from a list of domains
/// (any scheme, any subdomain). The pattern wins when both are set.
pub fn legacy_regex(
  pattern: Option<&str>,
  domains: &[String],
) -> Result<Option<Regex>, regex::Error> {
  if let Some(p) = pattern.filter(|p| !p.trim().is_empty()) {
    return Regex::new(p).map(Some);
  }
  let domains: Vec<String> = domains
    .iter()
    .map(|d| d.trim())
    .filter(|d| !d.is_empty())
    .map(regex::escape)
    .collect();
  if domains.is_empty() {
    return Ok(None);
  }
  Regex::new(&format!(
    r"(?i)^https?://([a-z0-9-]+\.)*(?:{})(?::\d+)?(?:[/?#]|$)",
    domains.join("|")
  ))
  .map(Some)
}

fn is_inline(s: &str) -> bool {
  s.get(..INLINE_PREFIX.len())
    .is_some_and(|p| p.eq_ignore_ascii_case(INLINE_PREFIX))
    && s
      .split_once(',')
      .is_some_and(|(header, _)| header.to_ascii_lowercase().ends_with(INLINE_MARKER))
}

fn parse_inline(s: &str) -> Result<AssetRef, ReferenceError> {
  let (header, payload) = s
    .split_once(',')
    .ok_or_else(|| ReferenceError::InvalidInline(truncate(s, 80)))?;
  let mime = header[INLINE_PREFIX.len()..]
    .split(';')
    .next()
    .unwrap_or_default()
    .trim()
    .to_ascii_lowercase();
  if payload.trim().is_empty() {
    return Err(ReferenceError::InvalidInline(truncate(s, 80)));
  }
  Ok(AssetRef::Inline {
    mime: if mime.is_empty() {
      "application/octet-stream".to_string()
    } else {
      mime
    },
    payload: payload.to_string(),
  })
}

/// Shorten long values (inline payloads) for logs and reports
pub fn truncate(s: &str, max: usize) -> String {
  match s.char_indices().nth(max) {
    Some((idx, _)) => format!("{}...", &s[..idx]),
    None => s.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn classifier() -> Classifier {
    Classifier::new(
      "https://cdn.example.com/",
      legacy_regex(None, &["legacy.example.com".to_string()]).unwrap(),
    )
  }

  #[test]
  fn test_inline() {
    let c = classifier();
    let s = "data:image/png;base64,iVBORw0KGgoAAAA";
    assert_eq!(c.classify(s), Some(RefKind::Inline));
    match c.parse(s).unwrap() {
      AssetRef::Inline { mime, payload } => {
        assert_eq!(mime, "image/png");
        assert_eq!(payload, "iVBORw0KGgoAAAA");
      }
      other => panic!("unexpected {:?}", other),
    }
    assert_eq!(c.classify("data:text/plain,hello"), None);
  }

  #[test]
  fn test_legacy() {
    let c = classifier();
    let s = "https://legacy.example.com/o/foo%2Fbar.jpg";
    assert_eq!(c.classify(s), Some(RefKind::Legacy));
    assert_eq!(
      c.parse(s).unwrap(),
      AssetRef::Legacy {
        url: s.into(),
        object_name: "foo/bar.jpg".into()
      }
    );
    assert_eq!(
      c.classify("https://files.legacy.example.com/x.png"),
      Some(RefKind::Legacy)
    );
    assert_eq!(c.classify("https://legacy.example.com.evil.io/x.png"), None);
    assert_eq!(c.classify("https://example.com/x.png"), None);
  }

  #[test]
  fn test_canonical() {
    let c = classifier();
    let s = "https://cdn.example.com/logos/b1/123_logo.png";
    assert_eq!(c.classify(s), Some(RefKind::Canonical));
    assert_eq!(c.canonical_key(s), Some("logos/b1/123_logo.png"));
    assert_eq!(c.public_url("logos/b1/123_logo.png"), s);
    assert_eq!(c.classify("https://cdn.example.com"), None);
  }

  #[test]
  fn test_canonical_before_legacy() {
    let c = Classifier::new(
      "https://cdn.example.com",
      Some(Regex::new("example\\.com").unwrap()),
    );
    assert_eq!(
      c.classify("https://cdn.example.com/a.png"),
      Some(RefKind::Canonical)
    );
  }

  #[test]
  fn test_legacy_object_name_fallbacks() {
    assert_eq!(
      legacy_object_name("https://h.io/o/a%20b.png?alt=media&token=1").unwrap(),
      "a b.png"
    );
    assert_eq!(
      legacy_object_name("https://h.io/uploads/x.png").unwrap(),
      "uploads/x.png"
    );
    assert!(legacy_object_name("https://h.io").is_err());
    assert!(legacy_object_name("https://h.io/o/").is_err());
  }

  #[test]
  fn test_decode_inline_tolerance() {
    assert_eq!(decode_inline("AAAA==").unwrap(), vec![0, 0, 0]);
    assert_eq!(decode_inline("aGk=").unwrap(), b"hi");
    assert_eq!(decode_inline("aGk").unwrap(), b"hi");
    assert_eq!(decode_inline("_-8").unwrap(), vec![0xff, 0xef]);
    assert!(decode_inline("!!!!").is_err());
    assert!(decode_inline("").is_err());
  }

  #[test]
  fn test_pattern_wins_over_domains() {
    let re = legacy_regex(Some("^gs://"), &["legacy.example.com".into()])
      .unwrap()
      .unwrap();
    assert!(re.is_match("gs://bucket/a.png"));
    assert!(!re.is_match("https://legacy.example.com/a.png"));
    assert!(legacy_regex(None, &[]).unwrap().is_none());
    assert!(legacy_regex(Some("("), &[]).is_err());
  }
}
