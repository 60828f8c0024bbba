use std::time::Duration;

use async_trait::async_trait;
use pricescout_core::listing::RawListing;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::{DEFAULT_SOURCE_TIMEOUT, SourceAdapter, extract_items, render_url};
use crate::error::SourceError;

/// Where and how to query a JSON search endpoint.
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
  pub name:       String,
  /// Search URL with a `{query}` placeholder.
  pub url:        String,
  /// Dotted path to the item array in the response body.
  pub items_path: String,
  pub timeout:    Duration,
}

impl HttpSourceConfig {
  pub fn new(name: impl Into<String>, url: impl Into<String>, items_path: impl Into<String>) -> Self {
    Self {
      name:       name.into(),
      url:        url.into(),
      items_path: items_path.into(),
      timeout:    DEFAULT_SOURCE_TIMEOUT,
    }
  }

  /// A client whose own timeout matches the source's.
  pub(super) fn client(&self) -> Result<Client, SourceError> {
    Ok(Client::builder().timeout(self.timeout).build()?)
  }

  pub(super) async fn decode(&self, resp: reqwest::Response) -> Result<Vec<RawListing>, SourceError> {
    let status = resp.status();
    if !status.is_success() {
      return Err(SourceError::Status(status));
    }
    let body: Value = resp
      .json()
      .await
      .map_err(|e| SourceError::Decode(e.to_string()))?;
    let items = extract_items(body, &self.items_path)?;
    debug!(source = %self.name, count = items.len(), "decoded response");
    Ok(items)
  }
}

/// A marketplace with a public JSON search endpoint.
#[derive(Debug, Clone)]
pub struct HttpJsonSource {
  config: HttpSourceConfig,
  client: Client,
}

impl HttpJsonSource {
  pub fn new(config: HttpSourceConfig) -> Result<Self, SourceError> {
    let client = config.client()?;
    Ok(Self { config, client })
  }
}

#[async_trait]
impl SourceAdapter for HttpJsonSource {
  fn name(&self) -> &str { &self.config.name }

  fn timeout(&self) -> Duration { self.config.timeout }

  async fn fetch(&self, query: &str) -> Result<Vec<RawListing>, SourceError> {
    let url = render_url(&self.config.url, query);
    let resp = self
      .client
      .get(&url)
      .header(reqwest::header::ACCEPT, "application/json")
      .send()
      .await?;
    self.config.decode(resp).await
  }
}
