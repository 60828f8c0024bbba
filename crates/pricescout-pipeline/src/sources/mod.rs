//! Source adapters: one per marketplace, each a black box behind
//! [`SourceAdapter::fetch`].
//!
//! Adapters are registered by name in a [`SourceRegistry`]; the orchestrator
//! looks them up per run, wraps each call in the adapter's own timeout and
//! never lets a failure escape.

mod http_json;
mod oauth;
mod static_source;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use pricescout_core::listing::RawListing;
use serde_json::Value;

use crate::error::SourceError;

pub use http_json::{HttpJsonSource, HttpSourceConfig};
pub use oauth::{ClientCredentials, CredentialCache, OAuthJsonSource};
pub use static_source::StaticSource;

pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(15);

// ─── Trait ───────────────────────────────────────────────────────────────────

/// A marketplace that can be searched for listings.
///
/// `fetch` may take arbitrarily long; the caller bounds it with
/// [`timeout`](SourceAdapter::timeout). The query is passed through as the
/// user typed it and adapters own any quoting.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
  /// Unique name, used as the key in timing and error maps and as the
  /// fallback store name of its listings.
  fn name(&self) -> &str;

  fn timeout(&self) -> Duration { DEFAULT_SOURCE_TIMEOUT }

  async fn fetch(&self, query: &str) -> Result<Vec<RawListing>, SourceError>;
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// Registered adapters, in registration order.
#[derive(Clone, Default)]
pub struct SourceRegistry {
  adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
  pub fn new() -> Self { Self::default() }

  /// Add an adapter. A later adapter with the same name replaces the earlier
  /// one in place.
  pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
    match self.adapters.iter_mut().find(|a| a.name() == adapter.name()) {
      Some(slot) => *slot = adapter,
      None => self.adapters.push(adapter),
    }
  }

  pub fn with(mut self, adapter: impl SourceAdapter + 'static) -> Self {
    self.register(Arc::new(adapter));
    self
  }

  pub fn get(&self, name: &str) -> Option<Arc<dyn SourceAdapter>> {
    self.adapters.iter().find(|a| a.name() == name).cloned()
  }

  pub fn names(&self) -> Vec<String> {
    self.adapters.iter().map(|a| a.name().to_owned()).collect()
  }

  pub fn is_empty(&self) -> bool { self.adapters.is_empty() }
}

// ─── Shared helpers ──────────────────────────────────────────────────────────

/// Substitute the percent-encoded `query` for `{query}` in `template`.
pub fn render_url(template: &str, query: &str) -> String {
  template.replace("{query}", &encode_component(query))
}

fn encode_component(raw: &str) -> String {
  let mut out = String::with_capacity(raw.len());
  for byte in raw.bytes() {
    match byte {
      b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
        out.push(byte as char)
      }
      _ => out.push_str(&format!("%{byte:02X}")),
    }
  }
  out
}

/// Pull the item array out of a JSON response body.
///
/// `items_path` is a dotted path (`"data.products"`); an empty path means the
/// body itself is the array. A missing or `null` path is an empty result,
/// anything else that is not an array is a decode error.
pub fn extract_items(body: Value, items_path: &str) -> Result<Vec<RawListing>, SourceError> {
  let body = RawListing(body);
  let target = if items_path.is_empty() {
    Some(&body.0)
  } else {
    body.lookup(items_path)
  };

  match target {
    None | Some(Value::Null) => Ok(Vec::new()),
    Some(Value::Array(items)) => Ok(items.iter().cloned().map(RawListing).collect()),
    Some(other) => Err(SourceError::Decode(format!(
      "expected an array at {items_path:?}, found {}",
      kind_of(other)
    ))),
  }
}

fn kind_of(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn query_is_percent_encoded() {
    assert_eq!(
      render_url("https://shop.test/s?q={query}&page=1", "iphone 13 & case/100%"),
      "https://shop.test/s?q=iphone%2013%20%26%20case%2F100%25&page=1"
    );
  }

  #[test]
  fn items_are_found_by_path() {
    let body = json!({ "data": { "products": [{ "name": "a" }, { "name": "b" }] } });
    let items = extract_items(body, "data.products").unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[1].lookup("name"), Some(&json!("b")));
  }

  #[test]
  fn missing_items_are_empty_and_wrong_shape_is_an_error() {
    assert!(extract_items(json!({ "data": null }), "data.products").unwrap().is_empty());
    assert!(extract_items(json!([]), "").unwrap().is_empty());
    assert!(matches!(
      extract_items(json!({ "items": "none" }), "items"),
      Err(SourceError::Decode(_))
    ));
  }

  #[test]
  fn registry_replaces_same_name() {
    let registry = SourceRegistry::new()
      .with(StaticSource::new("jumia", vec![]))
      .with(StaticSource::new("kilimall", vec![]))
      .with(StaticSource::new("jumia", vec![RawListing(json!({}))]));

    assert_eq!(registry.names(), vec!["jumia", "kilimall"]);
    assert!(registry.get("ebay").is_none());
  }
}
