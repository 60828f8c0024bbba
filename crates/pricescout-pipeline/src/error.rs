//! Error types for `pricescout-pipeline`.

use std::time::Duration;

use thiserror::Error;

/// Why one source contributed nothing to a run. Never escapes the
/// orchestrator; it is rendered into the per-source error map.
#[derive(Debug, Error)]
pub enum SourceError {
  #[error("timed out after {0:?}")]
  Timeout(Duration),

  #[error("request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("unexpected status {0}")]
  Status(reqwest::StatusCode),

  #[error("malformed response: {0}")]
  Decode(String),

  #[error("authorization failed: {0}")]
  Auth(String),

  #[error("source unavailable: {0}")]
  Unavailable(String),
}

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] pricescout_core::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("store write timed out after {0:?}")]
  Timeout(Duration),

  #[error("invalid query: {0}")]
  InvalidQuery(String),
}

impl Error {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }

  /// `true` for a missing user, listing or product.
  pub fn is_not_found(&self) -> bool {
    matches!(self, Self::Core(e) if e.is_not_found())
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
