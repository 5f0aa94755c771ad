use serde_json::Value;
use std::fmt;

use super::reference::ReferenceError;
use crate::types::Data;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
  Key(String),
  Index(usize),
}

/// Location of a value inside a document tree, rendered as `images[2].url`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath {
  segments: Vec<Segment>,
}

impl FieldPath {
  pub fn root() -> Self {
    Self::default()
  }

  pub fn key(&self, key: &str) -> Self {
    let mut segments = self.segments.clone();
    segments.push(Segment::Key(key.to_string()));
    Self { segments }
  }

  pub fn index(&self, index: usize) -> Self {
    let mut segments = self.segments.clone();
    segments.push(Segment::Index(index));
    Self { segments }
  }

  pub fn segments(&self) -> &[Segment] {
    &self.segments
  }

  pub fn is_root(&self) -> bool {
    self.segments.is_empty()
  }

  /// Top-level field of the document this path starts in
  pub fn top_level(&self) -> Option<&str> {
    match self.segments.first() {
      Some(Segment::Key(k)) => Some(k),
      _ => None,
    }
  }

  /// Object keys along the path, outermost first
  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.segments.iter().filter_map(|s| match s {
      Segment::Key(k) => Some(k.as_str()),
      Segment::Index(_) => None,
    })
  }

  pub fn parse(s: &str) -> Result<Self, ReferenceError> {
    let invalid = || ReferenceError::InvalidPath(s.to_string());
    let mut segments = Vec::new();
    let mut key = String::new();
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
      match c {
        '.' => {
          if key.is_empty() {
            // `a[0].b` puts a dot right after an index
            if !matches!(segments.last(), Some(Segment::Index(_))) {
              return Err(invalid());
            }
          } else {
            segments.push(Segment::Key(std::mem::take(&mut key)));
          }
        }
        '[' => {
          if !key.is_empty() {
            segments.push(Segment::Key(std::mem::take(&mut key)));
          }
          let digits: String = chars.by_ref().take_while(|c| *c != ']').collect();
          let index = digits.parse::<usize>().map_err(|_| invalid())?;
          segments.push(Segment::Index(index));
        }
        ']' => return Err(invalid()),
        c => key.push(c),
      }
    }
    if !key.is_empty() {
      segments.push(Segment::Key(key));
    } else if s.ends_with('.') {
      return Err(invalid());
    }
    Ok(Self { segments })
  }

  pub fn get<'a>(&self, root: &'a Value) -> Option<&'a Value> {
    self
      .segments
      .iter()
      .try_fold(root, |node, seg| match (seg, node) {
        (Segment::Key(k), Value::Object(map)) => map.get(k),
        (Segment::Index(i), Value::Array(items)) => items.get(*i),
        _ => None,
      })
  }

  /// Value at this path inside a document payload
  pub fn get_in<'a>(&self, data: &'a Data) -> Option<&'a Value> {
    let (first, rest) = self.split_first()?;
    rest.get(data.get(first)?)
  }

  /// Replace the value at this path. Only existing slots are written;
  /// returns false when the path does not resolve.
  pub fn set_in(&self, data: &mut Data, value: Value) -> bool {
    let Some((first, rest)) = self.split_first() else {
      return false;
    };
    let Some(mut node) = data.get_mut(first) else {
      return false;
    };
    for seg in &rest.segments {
      let next = match (seg, node) {
        (Segment::Key(k), Value::Object(map)) => map.get_mut(k),
        (Segment::Index(i), Value::Array(items)) => items.get_mut(*i),
        _ => None,
      };
      match next {
        Some(n) => node = n,
        None => return false,
      }
    }
    *node = value;
    true
  }

  fn split_first(&self) -> Option<(&str, FieldPath)> {
    match self.segments.split_first() {
      Some((Segment::Key(k), rest)) => Some((
        k,
        FieldPath {
          segments: rest.to_vec(),
        },
      )),
      _ => None,
    }
  }
}

impl fmt::Display for FieldPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, seg) in self.segments.iter().enumerate() {
      match seg {
        Segment::Key(k) if i == 0 => write!(f, "{}", k)?,
        Segment::Key(k) => write!(f, ".{}", k)?,
        Segment::Index(idx) => write!(f, "[{}]", idx)?,
      }
    }
    Ok(())
  }
}

impl std::str::FromStr for FieldPath {
  type Err = ReferenceError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn data(v: Value) -> Data {
    match v {
      Value::Object(m) => m,
      _ => panic!("object expected"),
    }
  }

  #[test]
  fn test_render() {
    let path = FieldPath::root().key("images").index(2).key("url");
    assert_eq!(path.to_string(), "images[2].url");
    assert_eq!(path.top_level(), Some("images"));
    assert_eq!(FieldPath::root().key("logo").to_string(), "logo");
    assert_eq!(FieldPath::root().to_string(), "");
  }

  #[test]
  fn test_parse() {
    let path = FieldPath::parse("images[2].url").unwrap();
    assert_eq!(
      path.segments(),
      &[
        Segment::Key("images".into()),
        Segment::Index(2),
        Segment::Key("url".into())
      ]
    );
    assert_eq!(FieldPath::parse("a.b[0][1]").unwrap().to_string(), "a.b[0][1]");
    assert!(FieldPath::parse("").unwrap().is_root());
    assert!(FieldPath::parse("images[x]").is_err());
    assert!(FieldPath::parse("a..b").is_err());
    assert!(FieldPath::parse("a.").is_err());
    assert!(FieldPath::parse("a]").is_err());
  }

  #[test]
  fn test_get_and_set() {
    let mut d = data(json!({
      "images": [{"url": "a"}, {"url": "b", "alt": "x"}],
      "logo": "l"
    }));
    let path = FieldPath::parse("images[1].url").unwrap();
    assert_eq!(path.get_in(&d), Some(&json!("b")));

    assert!(path.set_in(&mut d, json!("c")));
    assert_eq!(d["images"][1], json!({"url": "c", "alt": "x"}));
    assert_eq!(d["images"][0], json!({"url": "a"}));

    assert!(!FieldPath::parse("images[5].url").unwrap().set_in(&mut d, json!("z")));
    assert!(!FieldPath::parse("missing").unwrap().set_in(&mut d, json!("z")));
    assert!(FieldPath::parse("logo").unwrap().set_in(&mut d, json!("m")));
    assert_eq!(d["logo"], "m");
  }
}
