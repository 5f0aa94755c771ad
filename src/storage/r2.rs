//! Cloudflare R2 through its S3-compatible API

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

use super::backend::{validate_key, ObjectResult, ObjectStore, PutOutcome};
use super::config::StorageConfig;
use super::error::ObjectStoreError;
use super::filesystem::LocalObjectStore;

pub struct R2ObjectStore {
  client: S3Client,
  bucket: String,
  public_base: String,
}

impl R2ObjectStore {
  pub fn new(config: &StorageConfig, public_base: &str) -> Result<Self, ObjectStoreError> {
    let missing = config.missing();
    if !missing.is_empty() {
      return Err(ObjectStoreError::backend(format!(
        "Missing R2 settings: {}",
        missing.join(", ")
      )));
    }

    let credentials = Credentials::new(
      &config.access_key_id,
      &config.secret_access_key,
      None,
      None,
      "vitrine-r2",
    );

    let s3_config = S3ConfigBuilder::new()
      .behavior_version(BehaviorVersion::latest())
      .region(Region::new(config.region.clone()))
      .credentials_provider(credentials)
      .endpoint_url(config.endpoint_url())
      .force_path_style(true)
      .build();

    Ok(Self {
      client: S3Client::from_conf(s3_config),
      bucket: config.bucket.clone(),
      public_base: public_base.trim_end_matches('/').to_string(),
    })
  }
}

#[async_trait]
impl ObjectStore for R2ObjectStore {
  async fn init(&self) -> ObjectResult<()> {
    self
      .client
      .head_bucket()
      .bucket(&self.bucket)
      .send()
      .await
      .map_err(|e| {
        ObjectStoreError::backend(format!("Bucket {} is not reachable: {}", self.bucket, e))
      })?;
    tracing::info!(bucket = %self.bucket, "Connected to R2");
    Ok(())
  }

  async fn put(&self, key: &str, data: &[u8], content_type: &str) -> ObjectResult<PutOutcome> {
    validate_key(key)?;
    let result = self
      .client
      .put_object()
      .bucket(&self.bucket)
      .key(key)
      .content_type(content_type)
      .body(ByteStream::from(data.to_vec()))
      .send()
      .await
      .map_err(|e| ObjectStoreError::backend(format!("Failed to write {}: {}", key, e)))?;

    let etag = result
      .e_tag()
      .map(|s| s.trim_matches('"').to_string())
      .unwrap_or_else(|| LocalObjectStore::calculate_etag(data));

    Ok(PutOutcome {
      key: key.to_string(),
      etag,
      size: data.len() as u64,
    })
  }

  async fn exists(&self, key: &str) -> ObjectResult<bool> {
    validate_key(key)?;
    match self
      .client
      .head_object()
      .bucket(&self.bucket)
      .key(key)
      .send()
      .await
    {
      Ok(_) => Ok(true),
      Err(e) => {
        let not_found = e.as_service_error().is_some_and(|s| s.is_not_found())
          || e.raw_response().map(|r| r.status().as_u16()) == Some(404);
        if not_found {
          Ok(false)
        } else {
          Err(ObjectStoreError::backend(format!(
            "Failed to probe {}: {}",
            key, e
          )))
        }
      }
    }
  }

  fn public_url(&self, key: &str) -> String {
    format!("{}/{}", self.public_base, key)
  }

  fn name(&self) -> &'static str {
    "r2"
  }
}
