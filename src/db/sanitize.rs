//! Validation of names that end up next to SQL.
//!
//! Values are always bound as parameters; collection tags and document ids
//! are still checked up front so a malformed name fails with a clear error
//! instead of silently addressing nothing.

/// Maximum length for collection names and document ids
pub const MAX_IDENTIFIER_LENGTH: usize = 255;

/// Validates a collection name.
/// Letters, digits, underscores and dashes; must start with a letter or
/// underscore. Mixed case is allowed because imported collections keep the
/// spelling they had upstream.
pub fn validate_collection_name(s: &str) -> Result<(), SqlSanitizeError> {
  if s.is_empty() {
    return Err(SqlSanitizeError::EmptyIdentifier);
  }

  if s.len() > MAX_IDENTIFIER_LENGTH {
    return Err(SqlSanitizeError::IdentifierTooLong(s.len()));
  }

  let first = s.chars().next().unwrap_or('_');
  if !first.is_ascii_alphabetic() && first != '_' {
    return Err(SqlSanitizeError::InvalidIdentifierStart(first));
  }

  for c in s.chars() {
    if !c.is_ascii_alphanumeric() && c != '_' && c != '-' {
      return Err(SqlSanitizeError::InvalidCollectionChar(c));
    }
  }

  let upper = s.to_uppercase();
  if SQL_KEYWORDS.contains(&upper.as_str()) {
    return Err(SqlSanitizeError::ReservedKeyword(s.to_string()));
  }

  Ok(())
}

/// Validates a document id: non-empty, bounded, no control characters and no
/// path separators.
pub fn validate_document_id(s: &str) -> Result<(), SqlSanitizeError> {
  if s.is_empty() {
    return Err(SqlSanitizeError::EmptyIdentifier);
  }

  if s.len() > MAX_IDENTIFIER_LENGTH {
    return Err(SqlSanitizeError::IdentifierTooLong(s.len()));
  }

  for c in s.chars() {
    if c.is_control() || c == '/' {
      return Err(SqlSanitizeError::InvalidIdChar(c));
    }
  }

  Ok(())
}

/// SQL sanitization errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SqlSanitizeError {
  #[error("Identifier cannot be empty")]
  EmptyIdentifier,
  #[error("Identifier too long: {0} > {MAX_IDENTIFIER_LENGTH}")]
  IdentifierTooLong(usize),
  #[error("Identifier must start with letter or underscore, got '{0}'")]
  InvalidIdentifierStart(char),
  #[error("Collection names must be alphanumeric, underscore or dash, got '{0}'")]
  InvalidCollectionChar(char),
  #[error("Invalid character in document id: {0:?}")]
  InvalidIdChar(char),
  #[error("'{0}' is a reserved SQL keyword")]
  ReservedKeyword(String),
}

/// Common SQL keywords that cannot be used as collection names
const SQL_KEYWORDS: &[&str] = &[
  "SELECT", "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TABLE", "INDEX", "FROM",
  "WHERE", "AND", "OR", "NOT", "NULL", "TRUE", "FALSE", "ORDER", "BY", "LIMIT", "OFFSET", "JOIN",
  "UNION", "ALL", "DISTINCT", "GROUP", "HAVING", "INTO", "VALUES", "SET", "CASCADE", "TRIGGER",
  "FUNCTION", "VIEW", "DATABASE", "SCHEMA", "GRANT", "REVOKE", "TRUNCATE",
];

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_validate_collection_name() {
    assert!(validate_collection_name("products").is_ok());
    assert!(validate_collection_name("menu_items").is_ok());
    assert!(validate_collection_name("menuItems").is_ok());
    assert!(validate_collection_name("gallery-v2").is_ok());
    assert!(validate_collection_name("_temp").is_ok());

    assert!(validate_collection_name("").is_err());
    assert!(validate_collection_name("1st").is_err());
    assert!(validate_collection_name("user.data").is_err());
    assert!(validate_collection_name("select").is_err());
  }

  #[test]
  fn test_validate_document_id() {
    assert!(validate_document_id("b1").is_ok());
    assert!(validate_document_id("8f0a7c1e-53f4-4b43-9a8a-0d6e9b7b8c11").is_ok());
    assert!(validate_document_id("Xk29 pq").is_ok());

    assert!(validate_document_id("").is_err());
    assert!(validate_document_id("a/b").is_err());
    assert!(validate_document_id("nul\0").is_err());
    assert!(validate_document_id(&"x".repeat(300)).is_err());
  }

  #[test]
  fn test_sql_injection_attempts() {
    assert!(validate_collection_name("users; DROP TABLE users;--").is_err());
    assert!(validate_collection_name("' OR '1'='1").is_err());
    assert!(validate_collection_name("users/**/OR/**/1=1").is_err());
  }
}
