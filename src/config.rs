use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

use crate::storage::config::{StorageConfig, StorageMode};

/// Expand `$VAR_NAME` and `${VAR_NAME}` references from the environment.
/// Unset variables expand to the empty string.
fn expand_env_vars(input: &str) -> String {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  let pattern = PATTERN.get_or_init(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
      .expect("static pattern")
  });
  pattern
    .replace_all(input, |caps: &regex::Captures| {
      let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
      std::env::var(name).unwrap_or_default()
    })
    .into_owned()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("missing required configuration: {0}")]
  Missing(String),
  #[error("invalid legacy URL pattern: {0}")]
  InvalidPattern(#[from] regex::Error),
  #[error("invalid configuration: {0}")]
  Invalid(String),
  #[error("failed to read config: {0}")]
  Io(#[from] std::io::Error),
  #[error("failed to parse config: {0}")]
  Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
  #[default]
  Postgres,
  Sqlite,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub database: DatabaseSection,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub assets: AssetsSection,
  #[serde(default)]
  pub migration: MigrationSection,
  #[serde(default)]
  pub verify: VerifySection,
  #[serde(default)]
  pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
  #[serde(default)]
  pub backend: BackendType,
  #[serde(default)]
  pub postgres: PostgresSection,
  #[serde(default)]
  pub sqlite: SqliteSection,
  /// Rows fetched per round trip when reading a whole collection
  #[serde(default = "default_page_size")]
  pub page_size: usize,
}

fn default_page_size() -> usize {
  1000
}

impl Default for DatabaseSection {
  fn default() -> Self {
    Self {
      backend: BackendType::default(),
      postgres: PostgresSection::default(),
      sqlite: SqliteSection::default(),
      page_size: default_page_size(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresSection {
  /// Connection URL of the administrative role
  #[serde(default)]
  pub url: String,
  /// Connection URL of the read-only public role. Falls back to `url`.
  #[serde(default)]
  pub restricted_url: Option<String>,
  #[serde(default = "default_max_conn")]
  pub max_connections: usize,
}

fn default_max_conn() -> usize {
  10
}

impl Default for PostgresSection {
  fn default() -> Self {
    Self {
      url: String::new(),
      restricted_url: None,
      max_connections: default_max_conn(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteSection {
  #[serde(default = "default_sqlite_path")]
  pub path: String,
}

fn default_sqlite_path() -> String {
  "vitrine.db".into()
}

impl Default for SqliteSection {
  fn default() -> Self {
    Self {
      path: default_sqlite_path(),
    }
  }
}

/// Where asset references point to, before and after migration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetsSection {
  /// Public base URL of the bucket (CDN), e.g. `https://cdn.example.com`
  #[serde(default)]
  pub public_base_url: String,
  /// Raw regular expression matching legacy-hosted URLs
  #[serde(default)]
  pub legacy_pattern: Option<String>,
  /// Legacy hosts; compiled into a pattern when `legacy_pattern` is unset
  #[serde(default)]
  pub legacy_domains: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationSection {
  /// Per-collection document cap applied unless `--all` or `--limit` is given
  #[serde(default = "default_migration_limit")]
  pub default_limit: Option<usize>,
  #[serde(default)]
  pub dry_run: bool,
}

fn default_migration_limit() -> Option<usize> {
  Some(100)
}

impl Default for MigrationSection {
  fn default() -> Self {
    Self {
      default_limit: default_migration_limit(),
      dry_run: false,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifySection {
  #[serde(default = "default_workers")]
  pub workers: usize,
  /// Problem rows kept for the report
  #[serde(default = "default_sample_size")]
  pub sample_size: usize,
  #[serde(default)]
  pub check_cdn: bool,
}

fn default_workers() -> usize {
  20
}

fn default_sample_size() -> usize {
  50
}

impl Default for VerifySection {
  fn default() -> Self {
    Self {
      workers: default_workers(),
      sample_size: default_sample_size(),
      check_cdn: false,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
  #[serde(default = "default_level")]
  pub level: String,
}

fn default_level() -> String {
  "info".into()
}

impl Default for LoggingSection {
  fn default() -> Self {
    Self {
      level: default_level(),
    }
  }
}

impl Config {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(&path)?;
    Self::from_yaml(&content)
  }

  pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
    let expanded = expand_env_vars(content);
    Ok(serde_yaml::from_str(&expanded)?)
  }

  pub fn find_and_load() -> Result<Option<Self>, ConfigError> {
    for p in ["vitrine.yaml", "vitrine.yml"] {
      if Path::new(p).exists() {
        tracing::info!("Loading config from {}", p);
        return Ok(Some(Self::from_file(p)?));
      }
    }
    Ok(None)
  }

  /// Apply overrides from the process environment
  pub fn apply_env(&mut self) {
    self.apply_overrides(|name| std::env::var(name).ok().filter(|v| !v.is_empty()));
  }

  /// Apply overrides from `lookup`, which maps a variable name to its value
  pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup("DATABASE_URL") {
      self.database.postgres.url = url;
      self.database.backend = BackendType::Postgres;
    }
    if let Some(url) = lookup("DATABASE_RESTRICTED_URL") {
      self.database.postgres.restricted_url = Some(url);
    }
    if let Some(path) = lookup("SQLITE_PATH") {
      self.database.sqlite.path = path;
      self.database.backend = BackendType::Sqlite;
    }
    if let Some(v) = lookup("R2_ACCOUNT_ID") {
      self.storage.account_id = v;
    }
    if let Some(v) = lookup("R2_ACCESS_KEY_ID") {
      self.storage.access_key_id = v;
    }
    if let Some(v) = lookup("R2_SECRET_ACCESS_KEY") {
      self.storage.secret_access_key = v;
    }
    if let Some(v) = lookup("R2_BUCKET_NAME") {
      self.storage.bucket = v;
    }
    if let Some(v) = lookup("R2_ENDPOINT") {
      self.storage.endpoint = Some(v);
    }
    if let Some(v) = lookup("R2_PUBLIC_URL") {
      self.assets.public_base_url = v;
    }
    if let Some(v) = lookup("LEGACY_URL_PATTERN") {
      self.assets.legacy_pattern = Some(v);
    }
    if let Some(v) = lookup("LEGACY_DOMAINS") {
      self.assets.legacy_domains = v
        .split(',')
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .collect();
    }
  }

  /// Check every required setting, reporting all missing names at once
  pub fn validate(&self) -> Result<(), ConfigError> {
    self.check(true)
  }

  /// Like [`Config::validate`], for commands that never touch object storage
  pub fn validate_database(&self) -> Result<(), ConfigError> {
    self.check(false)
  }

  fn check(&self, with_storage: bool) -> Result<(), ConfigError> {
    let mut missing: Vec<&str> = Vec::new();
    if self.database.backend == BackendType::Postgres && self.database.postgres.url.is_empty() {
      missing.push("DATABASE_URL");
    }
    if with_storage && self.storage.mode == StorageMode::R2 {
      missing.extend(self.storage.missing());
    }
    if with_storage && self.assets.public_base_url.is_empty() {
      missing.push("R2_PUBLIC_URL");
    }
    if !missing.is_empty() {
      return Err(ConfigError::Missing(missing.join(", ")));
    }

    if self.database.page_size == 0 {
      return Err(ConfigError::Invalid("database.page_size must be > 0".into()));
    }
    if self.verify.workers == 0 {
      return Err(ConfigError::Invalid("verify.workers must be > 0".into()));
    }
    if let Some(pattern) = &self.assets.legacy_pattern {
      Regex::new(pattern)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.database.backend, BackendType::Postgres);
    assert_eq!(config.database.page_size, 1000);
    assert_eq!(config.verify.workers, 20);
    assert_eq!(config.verify.sample_size, 50);
    assert_eq!(config.migration.default_limit, Some(100));
    assert_eq!(config.storage.mode, StorageMode::R2);
    assert_eq!(config.logging.level, "info");
  }

  #[test]
  fn test_from_yaml_partial() {
    let config = Config::from_yaml(
      r#"
database:
  backend: sqlite
  sqlite:
    path: /tmp/test.db
  page_size: 250
assets:
  public_base_url: https://cdn.example.com
  legacy_domains: [firebasestorage.googleapis.com]
"#,
    )
    .unwrap();
    assert_eq!(config.database.backend, BackendType::Sqlite);
    assert_eq!(config.database.sqlite.path, "/tmp/test.db");
    assert_eq!(config.database.page_size, 250);
    assert_eq!(config.assets.legacy_domains.len(), 1);
    assert_eq!(config.verify.workers, 20);
  }

  #[test]
  fn test_env_expansion() {
    std::env::set_var("VITRINE_TEST_BUCKET", "assets-prod");
    let config = Config::from_yaml(
      r#"
storage:
  bucket: ${VITRINE_TEST_BUCKET}
  access_key_id: $VITRINE_TEST_UNSET_KEY
"#,
    )
    .unwrap();
    assert_eq!(config.storage.bucket, "assets-prod");
    assert_eq!(config.storage.access_key_id, "");
  }

  #[test]
  fn test_overrides() {
    let env: HashMap<&str, &str> = [
      ("SQLITE_PATH", "/data/v.db"),
      ("R2_BUCKET_NAME", "media"),
      ("R2_PUBLIC_URL", "https://media.example.com"),
      ("LEGACY_DOMAINS", "a.example.com, b.example.com,"),
    ]
    .into_iter()
    .collect();
    let mut config = Config::default();
    config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

    assert_eq!(config.database.backend, BackendType::Sqlite);
    assert_eq!(config.database.sqlite.path, "/data/v.db");
    assert_eq!(config.storage.bucket, "media");
    assert_eq!(config.assets.public_base_url, "https://media.example.com");
    assert_eq!(
      config.assets.legacy_domains,
      vec!["a.example.com", "b.example.com"]
    );
  }

  #[test]
  fn test_validate_reports_every_missing_value() {
    let err = Config::default().validate().unwrap_err();
    let msg = err.to_string();
    for name in [
      "DATABASE_URL",
      "R2_ACCOUNT_ID",
      "R2_ACCESS_KEY_ID",
      "R2_SECRET_ACCESS_KEY",
      "R2_BUCKET_NAME",
      "R2_PUBLIC_URL",
    ] {
      assert!(msg.contains(name), "{} not reported in {}", name, msg);
    }
  }

  #[test]
  fn test_validate_local_sqlite() {
    let mut config = Config::default();
    config.database.backend = BackendType::Sqlite;
    config.storage.mode = StorageMode::Local;
    config.assets.public_base_url = "https://cdn.example.com".into();
    assert!(config.validate().is_ok());

    let mut db_only = Config::default();
    db_only.database.backend = BackendType::Sqlite;
    assert!(db_only.validate_database().is_ok());
    assert!(db_only.validate().is_err());

    config.assets.legacy_pattern = Some("([unclosed".into());
    assert!(matches!(
      config.validate(),
      Err(ConfigError::InvalidPattern(_))
    ));
  }
}
