use std::time::Duration;

use async_trait::async_trait;
use pricescout_core::listing::RawListing;

use super::{DEFAULT_SOURCE_TIMEOUT, SourceAdapter};
use crate::error::SourceError;

/// A source that answers every query with the same fixed items.
///
/// Used for fixtures and offline runs; the query is ignored.
#[derive(Debug, Clone)]
pub struct StaticSource {
  name:    String,
  items:   Vec<RawListing>,
  timeout: Duration,
}

impl StaticSource {
  pub fn new(name: impl Into<String>, items: Vec<RawListing>) -> Self {
    Self { name: name.into(), items, timeout: DEFAULT_SOURCE_TIMEOUT }
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }
}

#[async_trait]
impl SourceAdapter for StaticSource {
  fn name(&self) -> &str { &self.name }

  fn timeout(&self) -> Duration { self.timeout }

  async fn fetch(&self, _query: &str) -> Result<Vec<RawListing>, SourceError> {
    Ok(self.items.clone())
  }
}
