//! Network access for downloading legacy objects and probing public URLs

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
  #[error("Request to {url} failed: {message}")]
  Request { url: String, message: String },

  #[error("{url} returned HTTP {status}")]
  Status { url: String, status: u16 },
}

/// Downloaded body plus its declared content type
#[derive(Debug, Clone)]
pub struct Fetched {
  pub bytes: Vec<u8>,
  /// Media type without parameters, lowercased
  pub content_type: Option<String>,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
  /// GET `url`; any non-2xx status is an error
  async fn get(&self, url: &str) -> Result<Fetched, FetchError>;

  /// HEAD `url` and return the status code
  async fn head(&self, url: &str) -> Result<u16, FetchError>;
}

pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new() -> Result<Self, FetchError> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("vitrine/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| FetchError::Request {
        url: String::new(),
        message: e.to_string(),
      })?;
    Ok(Self { client })
  }
}

fn request_error(url: &str, e: reqwest::Error) -> FetchError {
  FetchError::Request {
    url: url.to_string(),
    message: e.to_string(),
  }
}

/// `image/png; charset=binary` -> `image/png`
pub fn media_type(header: &str) -> Option<String> {
  let mt = header.split(';').next()?.trim().to_ascii_lowercase();
  (!mt.is_empty()).then_some(mt)
}

#[async_trait]
impl Fetcher for HttpFetcher {
  async fn get(&self, url: &str) -> Result<Fetched, FetchError> {
    let response = self
      .client
      .get(url)
      .send()
      .await
      .map_err(|e| request_error(url, e))?;

    let status = response.status();
    if !status.is_success() {
      return Err(FetchError::Status {
        url: url.to_string(),
        status: status.as_u16(),
      });
    }

    let content_type = response
      .headers()
      .get(reqwest::header::CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .and_then(media_type);
    let bytes = response
      .bytes()
      .await
      .map_err(|e| request_error(url, e))?
      .to_vec();

    tracing::debug!(url, size = bytes.len(), "Downloaded legacy object");
    Ok(Fetched {
      bytes,
      content_type,
    })
  }

  async fn head(&self, url: &str) -> Result<u16, FetchError> {
    let response = self
      .client
      .head(url)
      .send()
      .await
      .map_err(|e| request_error(url, e))?;
    Ok(response.status().as_u16())
  }
}
