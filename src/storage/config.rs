use serde::{Deserialize, Serialize};

/// Storage mode: Cloudflare R2 (S3 API) or a local directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
  /// R2 bucket behind the public CDN (default)
  #[default]
  R2,
  /// Local filesystem, for development and dry runs
  Local,
}

impl std::fmt::Display for StorageMode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      StorageMode::R2 => write!(f, "r2"),
      StorageMode::Local => write!(f, "local"),
    }
  }
}

impl std::str::FromStr for StorageMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "r2" | "s3" | "remote" => Ok(StorageMode::R2),
      "local" | "filesystem" | "fs" => Ok(StorageMode::Local),
      _ => Err(format!("Unknown storage mode: {}", s)),
    }
  }
}

/// Object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
  #[serde(default)]
  pub mode: StorageMode,

  /// Cloudflare account id, used to derive the R2 endpoint
  #[serde(default)]
  pub account_id: String,

  #[serde(default)]
  pub access_key_id: String,

  #[serde(default)]
  pub secret_access_key: String,

  #[serde(default)]
  pub bucket: String,

  /// Explicit S3 endpoint; overrides the one derived from `account_id`
  #[serde(default)]
  pub endpoint: Option<String>,

  /// Region sent to the S3 API. R2 expects `auto`.
  #[serde(default = "default_region")]
  pub region: String,

  /// Root directory for local mode
  #[serde(default = "default_local_path")]
  pub local_path: String,
}

fn default_region() -> String {
  "auto".into()
}

fn default_local_path() -> String {
  "./data/objects".into()
}

impl Default for StorageConfig {
  fn default() -> Self {
    Self {
      mode: StorageMode::default(),
      account_id: String::new(),
      access_key_id: String::new(),
      secret_access_key: String::new(),
      bucket: String::new(),
      endpoint: None,
      region: default_region(),
      local_path: default_local_path(),
    }
  }
}

impl StorageConfig {
  /// S3 endpoint for the configured account
  pub fn endpoint_url(&self) -> String {
    match &self.endpoint {
      Some(e) if !e.is_empty() => e.clone(),
      _ => format!("https://{}.r2.cloudflarestorage.com", self.account_id),
    }
  }

  /// Names of required settings that are empty in the current mode
  pub fn missing(&self) -> Vec<&'static str> {
    if self.mode == StorageMode::Local {
      return Vec::new();
    }
    let mut missing = Vec::new();
    if self.account_id.is_empty() && self.endpoint.as_deref().unwrap_or("").is_empty() {
      missing.push("R2_ACCOUNT_ID");
    }
    if self.access_key_id.is_empty() {
      missing.push("R2_ACCESS_KEY_ID");
    }
    if self.secret_access_key.is_empty() {
      missing.push("R2_SECRET_ACCESS_KEY");
    }
    if self.bucket.is_empty() {
      missing.push("R2_BUCKET_NAME");
    }
    missing
  }
}
