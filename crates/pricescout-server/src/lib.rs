//! Server configuration and wiring for pricescout.
//!
//! [`ServerConfig`] is deserialized from `config.toml` layered under
//! `PRICESCOUT_*` environment variables; the `build_*` methods turn it into
//! the pipeline pieces the binary serves.

use std::{path::PathBuf, sync::Arc, time::Duration};

use pricescout_core::{
  currency::CurrencyTable, listing::RawListing, matcher::HeuristicMatcher, normalize::Normalizer,
  store::CatalogStore,
};
use pricescout_pipeline::{
  Aggregator, MatcherBackend, Orchestrator, ProcessMatcher, SourceError, SourceRegistry,
  orchestrator::DEFAULT_MAX_CONCURRENCY,
  persist::DEFAULT_WRITE_TIMEOUT,
  sources::{ClientCredentials, HttpJsonSource, HttpSourceConfig, OAuthJsonSource, StaticSource},
};
use serde::Deserialize;
use thiserror::Error;

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum Error {
  #[error("source {name:?}: {message}")]
  InvalidSource { name: String, message: String },

  #[error("matcher: {0}")]
  InvalidMatcher(String),

  #[error(transparent)]
  Source(#[from] SourceError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:             String,
  #[serde(default = "default_port")]
  pub port:             u16,
  #[serde(default = "default_store_path")]
  pub store_path:       PathBuf,
  #[serde(default = "default_max_concurrency")]
  pub max_concurrency:  usize,
  #[serde(default = "default_write_timeout_ms")]
  pub write_timeout_ms: u64,
  #[serde(default)]
  pub currency:         CurrencyTable,
  #[serde(default)]
  pub matcher:          MatcherConfig,
  #[serde(default)]
  pub sources:          Vec<SourceConfig>,
}

fn default_host() -> String { "127.0.0.1".to_owned() }
fn default_port() -> u16 { 8080 }
fn default_store_path() -> PathBuf { PathBuf::from("pricescout.db") }
fn default_max_concurrency() -> usize { DEFAULT_MAX_CONCURRENCY }
fn default_write_timeout_ms() -> u64 { DEFAULT_WRITE_TIMEOUT.as_millis() as u64 }

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherKind {
  #[default]
  Heuristic,
  Process,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatcherConfig {
  #[serde(default)]
  pub kind:       MatcherKind,
  /// Heuristic only; defaults to the matcher's own threshold.
  pub threshold:  Option<f64>,
  /// Process only.
  pub command:    Option<String>,
  #[serde(default)]
  pub args:       Vec<String>,
  pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
  HttpJson,
  OauthJson,
  Static,
}

/// One `[[sources]]` entry. Which fields are required depends on `kind`.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
  pub name:          String,
  pub kind:          SourceKind,
  pub url:           Option<String>,
  #[serde(default)]
  pub items_path:    String,
  pub timeout_ms:    Option<u64>,
  pub token_url:     Option<String>,
  pub client_id:     Option<String>,
  pub client_secret: Option<String>,
  pub scope:         Option<String>,
  #[serde(default)]
  pub items:         Vec<RawListing>,
}

impl SourceConfig {
  fn invalid(&self, message: impl Into<String>) -> Error {
    Error::InvalidSource { name: self.name.clone(), message: message.into() }
  }

  fn required<'a>(&self, field: &'static str, value: &'a Option<String>) -> Result<&'a str> {
    value
      .as_deref()
      .filter(|v| !v.trim().is_empty())
      .ok_or_else(|| self.invalid(format!("`{field}` is required for this kind")))
  }

  fn http_config(&self) -> Result<HttpSourceConfig> {
    let url = self.required("url", &self.url)?;
    if !url.contains("{query}") {
      return Err(self.invalid("`url` has no {query} placeholder"));
    }
    let mut config = HttpSourceConfig::new(&self.name, url, &self.items_path);
    if let Some(ms) = self.timeout_ms {
      config.timeout = Duration::from_millis(ms);
    }
    Ok(config)
  }

  fn credentials(&self) -> Result<ClientCredentials> {
    Ok(ClientCredentials {
      token_url:     self.required("token_url", &self.token_url)?.to_owned(),
      client_id:     self.required("client_id", &self.client_id)?.to_owned(),
      client_secret: self.required("client_secret", &self.client_secret)?.to_owned(),
      scope:         self.scope.clone().filter(|s| !s.trim().is_empty()),
    })
  }
}

// ─── Wiring ───────────────────────────────────────────────────────────────────

impl ServerConfig {
  pub fn write_timeout(&self) -> Duration { Duration::from_millis(self.write_timeout_ms) }

  /// One adapter per `[[sources]]` entry. Names must be unique.
  pub fn build_registry(&self) -> Result<SourceRegistry> {
    let mut registry = SourceRegistry::new();

    for source in &self.sources {
      if source.name.trim().is_empty() {
        return Err(source.invalid("`name` must not be blank"));
      }
      if registry.get(&source.name).is_some() {
        return Err(source.invalid("defined more than once"));
      }

      registry = match source.kind {
        SourceKind::HttpJson => registry.with(HttpJsonSource::new(source.http_config()?)?),
        SourceKind::OauthJson => {
          registry.with(OAuthJsonSource::new(source.http_config()?, source.credentials()?)?)
        }
        SourceKind::Static => {
          let mut adapter = StaticSource::new(&source.name, source.items.clone());
          if let Some(ms) = source.timeout_ms {
            adapter = adapter.with_timeout(Duration::from_millis(ms));
          }
          registry.with(adapter)
        }
      };
    }

    Ok(registry)
  }

  pub fn build_matcher(&self) -> Result<MatcherBackend> {
    let cfg = &self.matcher;
    match cfg.kind {
      MatcherKind::Heuristic => {
        let mut matcher = HeuristicMatcher::default();
        if let Some(threshold) = cfg.threshold {
          if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::InvalidMatcher(format!("threshold {threshold} is outside [0, 1]")));
          }
          matcher.threshold = threshold;
        }
        Ok(MatcherBackend::Heuristic(matcher))
      }
      MatcherKind::Process => {
        let command = cfg
          .command
          .as_deref()
          .filter(|c| !c.trim().is_empty())
          .ok_or_else(|| Error::InvalidMatcher("`command` is required for kind = \"process\"".into()))?;
        let mut matcher = ProcessMatcher::new(command, cfg.args.clone());
        if let Some(ms) = cfg.timeout_ms {
          matcher = matcher.with_timeout(Duration::from_millis(ms));
        }
        Ok(MatcherBackend::Process(matcher))
      }
    }
  }

  /// Assemble the full search pipeline over `store`.
  pub fn build_aggregator<S: CatalogStore>(
    &self,
    store: Arc<S>,
  ) -> Result<Aggregator<S, MatcherBackend>> {
    let orchestrator = Orchestrator::with_concurrency(
      self.build_registry()?,
      Normalizer::new(self.currency.clone()),
      self.max_concurrency,
    );
    Ok(
      Aggregator::new(orchestrator, self.build_matcher()?, store)
        .with_write_timeout(self.write_timeout()),
    )
  }
}
