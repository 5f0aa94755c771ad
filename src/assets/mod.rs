//! Locating asset references inside document trees.

mod path;
mod reference;
mod scanner;

pub use path::{FieldPath, Segment};
pub use reference::{
  decode_inline, legacy_object_name, legacy_regex, truncate, AssetRef, Classifier, RefKind,
  ReferenceError,
};
pub use scanner::{is_interesting, scan_document, walk, ScanHit, ASSET_KEYWORDS};
