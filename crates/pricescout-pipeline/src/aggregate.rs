//! The public aggregation entry point.
//!
//! [`Aggregator::search`] runs the orchestrator, groups the merged listings,
//! optionally persists the groups and finally applies the caller's display
//! filters. Filters never affect what gets persisted.

use std::{cmp::Ordering, collections::BTreeMap, str::FromStr, sync::Arc, time::Duration};

use pricescout_core::{
  listing::{Listing, ProductGroup},
  matcher::Matcher,
  store::CatalogStore,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
  error::{Error, Result},
  orchestrator::Orchestrator,
  persist::{DEFAULT_WRITE_TIMEOUT, PersistReport, persist},
};

// ─── Request ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
  PriceAsc,
  PriceDesc,
  Rating,
  Name,
}

impl FromStr for SortKey {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "price_asc" => Ok(Self::PriceAsc),
      "price_desc" => Ok(Self::PriceDesc),
      "rating" => Ok(Self::Rating),
      "name" => Ok(Self::Name),
      other => Err(Error::InvalidQuery(format!("unknown sort key {other:?}"))),
    }
  }
}

/// Display filters. Prices are compared on `price_normalized`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchFilters {
  pub sort:       Option<SortKey>,
  pub min_price:  Option<f64>,
  pub max_price:  Option<f64>,
  pub min_rating: Option<f64>,
}

impl SearchFilters {
  fn admits(&self, listing: &Listing) -> bool {
    let price = listing.price_normalized;
    self.min_price.is_none_or(|min| price >= min)
      && self.max_price.is_none_or(|max| price <= max)
      && self.min_rating.is_none_or(|min| listing.rating.is_some_and(|r| r >= min))
  }

  /// Drop listings that fail the filters, then sort members and groups.
  ///
  /// A group whose base was filtered out is re-based on its first remaining
  /// member; a group with no members left disappears.
  pub fn apply(&self, groups: Vec<ProductGroup>) -> Vec<ProductGroup> {
    let mut groups: Vec<ProductGroup> = groups
      .into_iter()
      .filter_map(|mut group| {
        group.members.retain(|l| self.admits(l));
        if !self.admits(&group.base) {
          group.base = group.members.first()?.clone();
        }
        (!group.members.is_empty()).then_some(group)
      })
      .collect();

    if let Some(key) = self.sort {
      for group in &mut groups {
        group.members.sort_by(|a, b| compare(key, a, b));
      }
      // Members are sorted, so the first one is each group's best.
      groups.sort_by(|a, b| match (a.members.first(), b.members.first()) {
        (Some(x), Some(y)) if key != SortKey::Name => compare(key, x, y),
        _ => compare(key, &a.base, &b.base),
      });
    }
    groups
  }
}

fn compare(key: SortKey, a: &Listing, b: &Listing) -> Ordering {
  match key {
    SortKey::PriceAsc => a.price_normalized.total_cmp(&b.price_normalized),
    SortKey::PriceDesc => b.price_normalized.total_cmp(&a.price_normalized),
    // Unrated listings sort last.
    SortKey::Rating => match (a.rating, b.rating) {
      (Some(x), Some(y)) => y.total_cmp(&x),
      (Some(_), None) => Ordering::Less,
      (None, Some(_)) => Ordering::Greater,
      (None, None) => Ordering::Equal,
    },
    SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
  }
}

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
  pub query:   String,
  /// Source names; empty means every registered source.
  pub sources: Vec<String>,
  pub filters: SearchFilters,
  pub persist: bool,
}

impl SearchRequest {
  pub fn new(query: impl Into<String>) -> Self {
    Self { query: query.into(), ..Self::default() }
  }
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
  pub query:          String,
  /// Listings merged from all sources, before filtering.
  pub total_listings: usize,
  pub products:       Vec<ProductGroup>,
  /// Source name → milliseconds.
  pub performance:    BTreeMap<String, u64>,
  /// Source name → failure message.
  pub errors:         BTreeMap<String, String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub matcher_error:  Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub persisted:      Option<PersistReport>,
}

// ─── Aggregator ──────────────────────────────────────────────────────────────

pub struct Aggregator<S, M> {
  orchestrator:  Orchestrator,
  matcher:       M,
  store:         Arc<S>,
  write_timeout: Duration,
}

impl<S: CatalogStore, M: Matcher> Aggregator<S, M> {
  pub fn new(orchestrator: Orchestrator, matcher: M, store: Arc<S>) -> Self {
    Self { orchestrator, matcher, store, write_timeout: DEFAULT_WRITE_TIMEOUT }
  }

  pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
    self.write_timeout = write_timeout;
    self
  }

  pub fn orchestrator(&self) -> &Orchestrator { &self.orchestrator }

  pub fn store(&self) -> &Arc<S> { &self.store }

  /// Run one search. Only a blank query is an error; source, matcher and
  /// persistence failures are reported inside the outcome.
  pub async fn search(&self, request: &SearchRequest) -> Result<SearchOutcome> {
    let aggregation = self.orchestrator.aggregate(&request.query, &request.sources).await?;
    let total_listings = aggregation.listings.len();

    let (groups, matcher_error) = match self.matcher.group(&aggregation.listings).await {
      Ok(groups) => (groups, None),
      Err(e) => {
        warn!(error = %e, "matcher failed, returning no groups");
        (Vec::new(), Some(e.to_string()))
      }
    };

    let persisted = if request.persist {
      Some(persist(self.store.as_ref(), &groups, self.write_timeout).await)
    } else {
      None
    };

    Ok(SearchOutcome {
      query: request.query.trim().to_owned(),
      total_listings,
      products: request.filters.apply(groups),
      performance: aggregation.timings,
      errors: aggregation.errors,
      matcher_error,
      persisted,
    })
  }
}

#[cfg(test)]
mod tests {
  use pricescout_core::{
    Error as CoreError, catalog::ProductQuery, listing::RawListing, matcher::HeuristicMatcher,
    normalize::Normalizer,
  };
  use pricescout_store_sqlite::SqliteStore;
  use serde_json::json;

  use super::*;
  use crate::sources::{SourceRegistry, StaticSource};

  fn registry() -> SourceRegistry {
    SourceRegistry::new()
      .with(StaticSource::new("jumia", vec![
        RawListing(json!({ "name": "Samsung Galaxy A14 128GB", "price": "KSh 18,999", "rating": 4.2 })),
        RawListing(json!({ "name": "iPhone 13", "price": "KSh 80,000", "rating": 4.8 })),
      ]))
      .with(StaticSource::new("kilimall", vec![RawListing(json!({
        "name": "Samsung Galaxy A14 (128GB, Black)",
        "price": "KSh 18,500",
      }))]))
  }

  async fn aggregator<M: Matcher>(matcher: M) -> Aggregator<SqliteStore, M> {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    Aggregator::new(Orchestrator::new(registry(), Normalizer::default()), matcher, store)
  }

  #[tokio::test]
  async fn search_groups_and_persists() {
    let agg = aggregator(HeuristicMatcher::default()).await;
    let mut request = SearchRequest::new("galaxy");
    request.persist = true;

    let outcome = agg.search(&request).await.unwrap();

    assert_eq!(outcome.total_listings, 3);
    assert_eq!(outcome.products.len(), 2);
    assert_eq!(outcome.performance.len(), 2);
    assert!(outcome.errors.is_empty());
    let persisted = outcome.persisted.unwrap();
    assert_eq!(persisted.products_created, 2);
    assert_eq!(persisted.listings_created, 3);

    let stored = agg.store().list_products(&ProductQuery::default()).await.unwrap();
    assert_eq!(stored.len(), 2);
  }

  #[tokio::test]
  async fn filters_shape_output_but_not_persistence() {
    let agg = aggregator(HeuristicMatcher::default()).await;
    let request = SearchRequest {
      query:   "phone".into(),
      sources: vec![],
      filters: SearchFilters {
        sort:       Some(SortKey::PriceAsc),
        max_price:  Some(18_700.0),
        min_price:  None,
        min_rating: None,
      },
      persist: true,
    };

    let outcome = agg.search(&request).await.unwrap();

    assert_eq!(outcome.products.len(), 1);
    let group = &outcome.products[0];
    assert_eq!(group.members.len(), 1);
    assert_eq!(group.base.store, "kilimall");
    assert_eq!(outcome.persisted.unwrap().listings_created, 3);
  }

  #[tokio::test]
  async fn sort_by_rating_puts_unrated_last() {
    let agg = aggregator(HeuristicMatcher::default()).await;
    let mut request = SearchRequest::new("phone");
    request.filters.sort = Some(SortKey::Rating);

    let outcome = agg.search(&request).await.unwrap();

    assert_eq!(outcome.products[0].base.name, "iPhone 13");
    let samsung = &outcome.products[1];
    assert_eq!(samsung.members[0].rating, Some(4.2));
    assert_eq!(samsung.members[1].rating, None);
  }

  struct Broken;

  impl Matcher for Broken {
    async fn group(&self, _listings: &[Listing]) -> pricescout_core::Result<Vec<ProductGroup>> {
      Err(CoreError::Matcher("model offline".into()))
    }
  }

  #[tokio::test]
  async fn matcher_failure_yields_zero_groups() {
    let agg = aggregator(Broken).await;
    let mut request = SearchRequest::new("phone");
    request.persist = true;

    let outcome = agg.search(&request).await.unwrap();

    assert_eq!(outcome.total_listings, 3);
    assert!(outcome.products.is_empty());
    assert!(outcome.matcher_error.unwrap().contains("model offline"));
    assert_eq!(outcome.persisted.unwrap(), PersistReport::default());
  }

  #[test]
  fn sort_keys_parse() {
    assert_eq!("price_desc".parse::<SortKey>().unwrap(), SortKey::PriceDesc);
    assert!("cheapest".parse::<SortKey>().is_err());
  }
}
