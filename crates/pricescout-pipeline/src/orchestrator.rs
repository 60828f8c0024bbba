//! Concurrent fan-out to the enabled sources.
//!
//! Every adapter call runs in its own task under a shared concurrency cap and
//! its own timeout. A run waits for every source to settle, then merges the
//! normalized listings in source order. Individual failures end up in the
//! error map; the run as a whole only fails on a blank query.

use std::{
  collections::{BTreeMap, BTreeSet},
  sync::Arc,
  time::Instant,
};

use futures_util::future::join_all;
use pricescout_core::{
  listing::{Listing, RawListing},
  normalize::Normalizer,
};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::{
  error::{Error, Result, SourceError},
  sources::{SourceAdapter, SourceRegistry},
};

pub const DEFAULT_MAX_CONCURRENCY: usize = 2;

/// Outcome of one fan-out.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Aggregation {
  pub listings: Vec<Listing>,
  /// Source name → milliseconds spent, for every source that ran.
  pub timings:  BTreeMap<String, u64>,
  /// Source name → failure, for every source that contributed nothing
  /// because of an error, timeout or unknown name.
  pub errors:   BTreeMap<String, String>,
}

pub struct Orchestrator {
  registry:   SourceRegistry,
  normalizer: Normalizer,
  permits:    Arc<Semaphore>,
}

impl Orchestrator {
  pub fn new(registry: SourceRegistry, normalizer: Normalizer) -> Self {
    Self::with_concurrency(registry, normalizer, DEFAULT_MAX_CONCURRENCY)
  }

  /// `max_concurrency` caps in-flight adapter calls across all runs sharing
  /// this orchestrator. Zero is treated as one.
  pub fn with_concurrency(
    registry: SourceRegistry,
    normalizer: Normalizer,
    max_concurrency: usize,
  ) -> Self {
    Self {
      registry,
      normalizer,
      permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
    }
  }

  pub fn registry(&self) -> &SourceRegistry { &self.registry }

  pub fn normalizer(&self) -> &Normalizer { &self.normalizer }

  /// Query `enabled` sources (all registered sources when empty) for `query`.
  pub async fn aggregate(&self, query: &str, enabled: &[String]) -> Result<Aggregation> {
    let query = query.trim();
    if query.is_empty() {
      return Err(Error::InvalidQuery("query must not be blank".into()));
    }

    let mut names = if enabled.is_empty() { self.registry.names() } else { enabled.to_vec() };
    // Each source runs at most once per call; first mention wins.
    let mut seen = BTreeSet::new();
    names.retain(|name| seen.insert(name.clone()));

    let mut aggregation = Aggregation::default();
    let mut adapters = Vec::with_capacity(names.len());
    for name in names {
      match self.registry.get(&name) {
        Some(adapter) => adapters.push(adapter),
        None => {
          warn!(source = %name, "unknown source requested");
          aggregation.errors.insert(name, "unknown source".into());
        }
      }
    }

    let started = Instant::now();
    let runs = adapters.iter().map(|adapter| {
      tokio::spawn(run_source(adapter.clone(), query.to_owned(), self.permits.clone()))
    });
    let settled = join_all(runs).await;

    for (adapter, joined) in adapters.iter().zip(settled) {
      let name = adapter.name().to_owned();
      let (elapsed_ms, result) = joined.unwrap_or_else(|e| {
        (0, Err(SourceError::Unavailable(format!("adapter task failed: {e}"))))
      });
      aggregation.timings.insert(name.clone(), elapsed_ms);

      match result {
        Ok(raws) => {
          debug!(source = %name, count = raws.len(), elapsed_ms, "source settled");
          aggregation.listings.extend(self.normalizer.normalize_all(&raws, &name));
        }
        Err(e) => {
          warn!(source = %name, elapsed_ms, error = %e, "source failed");
          aggregation.errors.insert(name, e.to_string());
        }
      }
    }

    info!(
      query,
      listings = aggregation.listings.len(),
      failed = aggregation.errors.len(),
      elapsed_ms = started.elapsed().as_millis() as u64,
      "aggregation finished"
    );
    Ok(aggregation)
  }
}

/// One bounded adapter call. Time spent waiting for a permit is not counted.
async fn run_source(
  adapter: Arc<dyn SourceAdapter>,
  query: String,
  permits: Arc<Semaphore>,
) -> (u64, Result<Vec<RawListing>, SourceError>) {
  let Ok(_permit) = permits.acquire_owned().await else {
    return (0, Err(SourceError::Unavailable("orchestrator shut down".into())));
  };

  let limit = adapter.timeout();
  let started = Instant::now();
  let result = match tokio::time::timeout(limit, adapter.fetch(&query)).await {
    Ok(result) => result,
    Err(_) => Err(SourceError::Timeout(limit)),
  };

  (started.elapsed().as_millis() as u64, result)
}

#[cfg(test)]
mod tests {
  use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
  };

  use async_trait::async_trait;
  use serde_json::json;

  use super::*;
  use crate::sources::StaticSource;

  /// Sleeps before answering, optionally failing.
  struct SlowSource {
    name:    &'static str,
    delay:   Duration,
    timeout: Duration,
    items:   usize,
    fail:    bool,
  }

  #[async_trait]
  impl SourceAdapter for SlowSource {
    fn name(&self) -> &str { self.name }

    fn timeout(&self) -> Duration { self.timeout }

    async fn fetch(&self, query: &str) -> Result<Vec<RawListing>, SourceError> {
      tokio::time::sleep(self.delay).await;
      if self.fail {
        return Err(SourceError::Unavailable("blocked by captcha".into()));
      }
      Ok(
        (0..self.items)
          .map(|i| RawListing(json!({ "name": format!("{query} {}-{i}", self.name), "price": 100 + i })))
          .collect(),
      )
    }
  }

  fn slow(name: &'static str, delay_ms: u64, timeout_ms: u64, items: usize) -> SlowSource {
    SlowSource {
      name,
      delay: Duration::from_millis(delay_ms),
      timeout: Duration::from_millis(timeout_ms),
      items,
      fail: false,
    }
  }

  fn orchestrator(registry: SourceRegistry) -> Orchestrator {
    Orchestrator::new(registry, Normalizer::default())
  }

  #[tokio::test]
  async fn timed_out_source_is_isolated() {
    let o = orchestrator(
      SourceRegistry::new()
        .with(slow("a", 10, 1_000, 3))
        .with(slow("b", 5_000, 100, 3)),
    );

    let result = o.aggregate("phone", &["a".into(), "b".into()]).await.unwrap();

    assert_eq!(result.listings.len(), 3);
    assert_eq!(result.timings.len(), 2);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors["b"].contains("timed out"));
  }

  #[tokio::test]
  async fn total_failure_is_still_a_result() {
    let mut failing = slow("a", 1, 1_000, 0);
    failing.fail = true;
    let o = orchestrator(SourceRegistry::new().with(failing).with(slow("b", 500, 20, 1)));

    let result = o.aggregate("tv", &[]).await.unwrap();

    assert!(result.listings.is_empty());
    assert_eq!(result.errors.len(), 2);
  }

  #[tokio::test]
  async fn merge_follows_source_order_not_completion_order() {
    let o = orchestrator(
      SourceRegistry::new()
        .with(slow("late", 150, 1_000, 1))
        .with(slow("early", 1, 1_000, 1)),
    );

    let result = o.aggregate("fan", &["late".into(), "early".into()]).await.unwrap();

    let stores: Vec<&str> = result.listings.iter().map(|l| l.store.as_str()).collect();
    assert_eq!(stores, vec!["late", "early"]);
  }

  #[tokio::test]
  async fn unknown_sources_are_reported() {
    let o = orchestrator(SourceRegistry::new().with(StaticSource::new(
      "fixture",
      vec![RawListing(json!({ "name": "Kettle", "price": "KSh 2,000" }))],
    )));

    let result = o.aggregate("kettle", &["fixture".into(), "masoko".into()]).await.unwrap();

    assert_eq!(result.listings.len(), 1);
    assert_eq!(result.listings[0].price_normalized, 2_000.0);
    assert_eq!(result.errors["masoko"], "unknown source");
    assert!(!result.timings.contains_key("masoko"));
  }

  #[tokio::test]
  async fn repeated_source_names_run_once() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let o = orchestrator(SourceRegistry::new().with(Counting {
      fetches: fetches.clone(),
    }));

    let names = vec!["counting".to_owned(), "ghost".into(), "counting".into(), "ghost".into()];
    let result = o.aggregate("kettle", &names).await.unwrap();

    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    assert_eq!(result.listings.len(), 1);
    assert_eq!(result.timings.len(), 1);
    assert_eq!(result.errors.len(), 1);
  }

  /// One listing per fetch, counting calls.
  struct Counting {
    fetches: Arc<AtomicUsize>,
  }

  #[async_trait]
  impl SourceAdapter for Counting {
    fn name(&self) -> &str { "counting" }

    async fn fetch(&self, _query: &str) -> Result<Vec<RawListing>, SourceError> {
      self.fetches.fetch_add(1, Ordering::SeqCst);
      Ok(vec![RawListing(json!({ "name": "Kettle", "price": 900 }))])
    }
  }

  #[tokio::test]
  async fn blank_query_is_rejected() {
    let o = orchestrator(SourceRegistry::new());
    assert!(matches!(o.aggregate("   ", &[]).await, Err(Error::InvalidQuery(_))));
  }

  /// Counts how many fetches overlap.
  struct Gauge {
    name:    String,
    current: Arc<AtomicUsize>,
    peak:    Arc<AtomicUsize>,
  }

  #[async_trait]
  impl SourceAdapter for Gauge {
    fn name(&self) -> &str { &self.name }

    async fn fetch(&self, _query: &str) -> Result<Vec<RawListing>, SourceError> {
      let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
      self.peak.fetch_max(now, Ordering::SeqCst);
      tokio::time::sleep(Duration::from_millis(30)).await;
      self.current.fetch_sub(1, Ordering::SeqCst);
      Ok(Vec::new())
    }
  }

  #[tokio::test]
  async fn concurrency_cap_is_honoured() {
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut registry = SourceRegistry::new();
    for i in 0..6 {
      registry.register(Arc::new(Gauge {
        name:    format!("s{i}"),
        current: current.clone(),
        peak:    peak.clone(),
      }));
    }

    let o = Orchestrator::with_concurrency(registry, Normalizer::default(), 2);
    let result = o.aggregate("anything", &[]).await.unwrap();

    assert!(result.errors.is_empty());
    assert_eq!(result.timings.len(), 6);
    assert!(peak.load(Ordering::SeqCst) <= 2);
  }
}
