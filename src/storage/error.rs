use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
  #[error("Invalid object key: {0}")]
  InvalidKey(String),

  #[error("Object storage I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("Object storage error: {0}")]
  Backend(String),
}

impl ObjectStoreError {
  pub fn backend(msg: impl Into<String>) -> Self {
    Self::Backend(msg.into())
  }
}
