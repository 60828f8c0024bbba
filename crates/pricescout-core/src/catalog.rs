//! Persisted catalog records: products, their per-store listings and the
//! append-only price ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prices closer than this are considered unchanged.
pub const PRICE_EPSILON: f64 = 0.01;

/// Identity key of a [`Product`]: trimmed, case-folded name.
pub fn product_key(name: &str) -> String { name.trim().to_lowercase() }

/// Whether moving from `previous` to `current` is a real price change.
pub fn price_changed(previous: f64, current: f64) -> bool {
  (previous - current).abs() >= PRICE_EPSILON
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// A canonical product. At most one exists per [`product_key`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
  pub id:         Uuid,
  pub name:       String,
  pub image_url:  Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// One store's offer for a product, keyed by `(product_id, store_name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreListing {
  pub id:           Uuid,
  pub product_id:   Uuid,
  pub store_name:   String,
  /// Observed price, in `currency`.
  pub price:        f64,
  pub currency:     String,
  pub url:          Option<String>,
  pub image_url:    Option<String>,
  pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistoryRecord {
  pub id:          Uuid,
  pub listing_id:  Uuid,
  pub price:       f64,
  pub recorded_at: DateTime<Utc>,
}

/// A product bundled with every store listing it owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductWithListings {
  pub product:  Product,
  pub listings: Vec<StoreListing>,
}

// ─── Write inputs and outcomes ───────────────────────────────────────────────

/// Input for [`CatalogStore::upsert_listing`](crate::store::CatalogStore::upsert_listing).
#[derive(Debug, Clone)]
pub struct ListingWrite {
  pub product_id: Uuid,
  pub store_name: String,
  pub price:      f64,
  pub currency:   String,
  pub url:        Option<String>,
  pub image_url:  Option<String>,
}

/// What an upsert did to an existing row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ListingChange {
  Created,
  PriceChanged { previous: f64 },
  Unchanged,
}

impl ListingChange {
  /// Created and re-priced listings get a ledger entry.
  pub fn appends_history(&self) -> bool { !matches!(self, Self::Unchanged) }
}

#[derive(Debug, Clone)]
pub struct ProductUpsert {
  pub product: Product,
  pub created: bool,
}

#[derive(Debug, Clone)]
pub struct ListingUpsert {
  pub listing: StoreListing,
  pub change:  ListingChange,
}

/// Parameters for [`CatalogStore::list_products`](crate::store::CatalogStore::list_products).
#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
  /// Case-insensitive substring of the product name.
  pub text:  Option<String>,
  pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn key_ignores_case_and_padding() {
    assert_eq!(product_key("  Samsung Galaxy A14 "), product_key("samsung galaxy a14"));
  }

  #[test]
  fn sub_cent_moves_are_not_changes() {
    assert!(!price_changed(19_999.0, 19_999.004));
    assert!(price_changed(19_999.0, 18_999.0));
    assert!(price_changed(10.0, 10.5));
  }

  #[test]
  fn only_unchanged_skips_history() {
    assert!(ListingChange::Created.appends_history());
    assert!(ListingChange::PriceChanged { previous: 1.0 }.appends_history());
    assert!(!ListingChange::Unchanged.appends_history());
  }
}
