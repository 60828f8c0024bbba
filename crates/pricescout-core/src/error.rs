//! Error types for `pricescout-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("user not found: {0}")]
  UserNotFound(Uuid),

  #[error("listing not found: {0}")]
  ListingNotFound(Uuid),

  #[error("product not found: {0}")]
  ProductNotFound(Uuid),

  #[error("invalid input: {0}")]
  InvalidInput(String),

  /// The grouping capability was unavailable or returned something
  /// unparseable.
  #[error("matcher failure: {0}")]
  Matcher(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// `true` for the distinguished "entity missing" outcomes.
  pub fn is_not_found(&self) -> bool {
    matches!(
      self,
      Self::UserNotFound(_) | Self::ListingNotFound(_) | Self::ProductNotFound(_)
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
