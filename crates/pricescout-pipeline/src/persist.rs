//! Persistence & dedup of matched groups.
//!
//! Each group becomes one product (keyed by its base listing's name) and one
//! store listing per store. Every store call has its own timeout; a failing or
//! slow write is reported and the rest of the batch is still attempted.

use std::{future::Future, time::Duration};

use pricescout_core::{
  catalog::{ListingChange, ListingWrite},
  listing::{Listing, ProductGroup},
  store::CatalogStore,
};
use serde::Serialize;
use tracing::{debug, info, warn};

pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Counters for one [`persist`] call, plus what could not be written.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PersistReport {
  pub products_created:         usize,
  pub listings_created:         usize,
  pub listings_updated:         usize,
  pub history_records_appended: usize,
  pub failures:                 Vec<PersistFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistFailure {
  pub product: String,
  /// `None` when the whole group failed.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub store:   Option<String>,
  pub message: String,
}

impl PersistReport {
  fn absorb(&mut self, group: PersistReport) {
    self.products_created += group.products_created;
    self.listings_created += group.listings_created;
    self.listings_updated += group.listings_updated;
    self.history_records_appended += group.history_records_appended;
    self.failures.extend(group.failures);
  }
}

/// Upsert every group into `store`, bounding each store call by
/// `write_timeout`.
pub async fn persist<S: CatalogStore>(
  store: &S,
  groups: &[ProductGroup],
  write_timeout: Duration,
) -> PersistReport {
  let mut report = PersistReport::default();

  for group in groups {
    report.absorb(persist_group(store, group, write_timeout).await);
  }

  info!(
    groups = groups.len(),
    products_created = report.products_created,
    listings_created = report.listings_created,
    listings_updated = report.listings_updated,
    history = report.history_records_appended,
    failures = report.failures.len(),
    "persisted groups"
  );
  report
}

/// Run one store call under `write_timeout`, flattening both failure kinds.
async fn bounded<T, E: std::fmt::Display>(
  write_timeout: Duration,
  call: impl Future<Output = Result<T, E>>,
) -> Result<T, String> {
  match tokio::time::timeout(write_timeout, call).await {
    Ok(result) => result.map_err(|e| e.to_string()),
    Err(_) => Err(format!("write timed out after {write_timeout:?}")),
  }
}

/// One member per store: the cheapest, first-seen on ties.
///
/// Two offers from one store in a group would otherwise overwrite each other
/// on every run and grow the ledger without any real price movement. Offers
/// without a usable price (parsed as zero) never become a live price.
fn members_by_store(group: &ProductGroup) -> Vec<&Listing> {
  let mut picked: Vec<&Listing> = Vec::new();
  for member in group.members.iter().filter(|m| m.price > 0.0) {
    match picked.iter_mut().find(|p| p.store == member.store) {
      Some(slot) if member.price_normalized < slot.price_normalized => *slot = member,
      Some(_) => {}
      None => picked.push(member),
    }
  }
  picked
}

/// Write one group. Whatever was written is counted even when later calls in
/// the same group fail.
async fn persist_group<S: CatalogStore>(
  store: &S,
  group: &ProductGroup,
  write_timeout: Duration,
) -> PersistReport {
  let mut report = PersistReport::default();
  let product = group.base.name.clone();

  let members = members_by_store(group);
  let unpriced = group
    .members
    .iter()
    .filter(|m| m.price <= 0.0 && !members.iter().any(|p| p.store == m.store));
  for member in unpriced {
    debug!(%product, store = %member.store, "skipping offer without a price");
    report.failures.push(PersistFailure {
      product: product.clone(),
      store:   Some(member.store.clone()),
      message: "no usable price".into(),
    });
  }
  if members.is_empty() {
    return report;
  }

  let image = group
    .base
    .image_url
    .as_deref()
    .or_else(|| group.members.iter().find_map(|m| m.image_url.as_deref()));

  let upsert = match bounded(write_timeout, store.upsert_product(&group.base.name, image)).await {
    Ok(upsert) => upsert,
    Err(message) => {
      warn!(%product, %message, "product write failed");
      report.failures.push(PersistFailure { product, store: None, message });
      return report;
    }
  };
  report.products_created += usize::from(upsert.created);

  for member in members {
    let write = ListingWrite {
      product_id: upsert.product.id,
      store_name: member.store.clone(),
      price:      member.price,
      currency:   member.currency.clone(),
      url:        member.url.clone(),
      image_url:  member.image_url.clone(),
    };

    match bounded(write_timeout, store.upsert_listing(write)).await {
      Ok(listing) => {
        match listing.change {
          ListingChange::Created => report.listings_created += 1,
          ListingChange::PriceChanged { previous } => {
            debug!(store = %member.store, previous, current = member.price, "price changed");
            report.listings_updated += 1;
          }
          ListingChange::Unchanged => {}
        }
        if listing.change.appends_history() {
          report.history_records_appended += 1;
        }
      }
      Err(message) => {
        warn!(%product, store = %member.store, %message, "listing write failed");
        report.failures.push(PersistFailure {
          product: product.clone(),
          store: Some(member.store.clone()),
          message,
        });
      }
    }
  }

  report
}

#[cfg(test)]
mod tests {
  use pricescout_core::{
    catalog::{
      ListingUpsert, PriceHistoryRecord, Product, ProductQuery, ProductUpsert, StoreListing,
    },
    tracking::{AlertRecord, NewAlert, NewUser, TrackInsert, TrackedItem, User},
  };
  use pricescout_store_sqlite::SqliteStore;
  use uuid::Uuid;

  use super::*;

  fn listing(name: &str, store: &str, price: f64) -> Listing {
    Listing {
      name:             name.into(),
      price,
      currency:         "KES".into(),
      price_normalized: price,
      store:            store.into(),
      image_url:        None,
      url:              Some(format!("https://{store}.test/p")),
      rating:           None,
    }
  }

  fn group(listings: Vec<Listing>) -> ProductGroup {
    ProductGroup { base: listings[0].clone(), members: listings }
  }

  async fn counts(store: &SqliteStore) -> (usize, usize) {
    let products = store.list_products(&ProductQuery::default()).await.unwrap();
    let mut listings = 0;
    for p in &products {
      listings += store.listings_for_product(p.id).await.unwrap().len();
    }
    (products.len(), listings)
  }

  #[tokio::test]
  async fn repeated_persist_is_idempotent() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let groups = vec![
      group(vec![
        listing("Samsung Galaxy A14 128GB", "jumia", 18_999.0),
        listing("Samsung Galaxy A14 (128GB, Black)", "kilimall", 18_500.0),
      ]),
      group(vec![listing("iPhone 13", "amazon", 74_850.0)]),
    ];

    let first = persist(&store, &groups, DEFAULT_WRITE_TIMEOUT).await;
    assert_eq!(first.products_created, 2);
    assert_eq!(first.listings_created, 3);
    assert_eq!(first.history_records_appended, 3);
    assert!(first.failures.is_empty());

    for _ in 0..3 {
      let again = persist(&store, &groups, DEFAULT_WRITE_TIMEOUT).await;
      assert_eq!(again, PersistReport::default());
    }
    assert_eq!(counts(&store).await, (2, 3));
  }

  #[tokio::test]
  async fn price_drop_appends_one_record() {
    let store = SqliteStore::open_in_memory().await.unwrap();

    persist(&store, &[group(vec![listing("iPhone 13", "amazon", 19_999.0)])], DEFAULT_WRITE_TIMEOUT).await;
    let report =
      persist(&store, &[group(vec![listing("iPhone 13", "amazon", 18_999.0)])], DEFAULT_WRITE_TIMEOUT).await;

    assert_eq!(report.listings_updated, 1);
    assert_eq!(report.history_records_appended, 1);

    let product = store.list_products(&ProductQuery::default()).await.unwrap().remove(0);
    let listing = store.listings_for_product(product.id).await.unwrap().remove(0);
    assert_eq!(listing.price, 18_999.0);

    let prices: Vec<f64> = store
      .price_history(listing.id, None)
      .await
      .unwrap()
      .iter()
      .map(|r| r.price)
      .collect();
    assert_eq!(prices, vec![18_999.0, 19_999.0]);
  }

  #[tokio::test]
  async fn duplicate_store_offers_collapse_to_cheapest() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let groups = vec![group(vec![
      listing("Tecno Spark 20", "jiji", 16_000.0),
      listing("Tecno Spark 20 Pro", "jiji", 15_500.0),
    ])];

    let first = persist(&store, &groups, DEFAULT_WRITE_TIMEOUT).await;
    let second = persist(&store, &groups, DEFAULT_WRITE_TIMEOUT).await;

    assert_eq!(first.listings_created, 1);
    assert_eq!(second.history_records_appended, 0);
    let product = store.list_products(&ProductQuery::default()).await.unwrap().remove(0);
    assert_eq!(store.listings_for_product(product.id).await.unwrap()[0].price, 15_500.0);
  }

  #[tokio::test]
  async fn unpriced_offer_leaves_listing_and_ledger_alone() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let run = |price| vec![group(vec![listing("iPhone 13", "amazon", price)])];

    persist(&store, &run(19_999.0), DEFAULT_WRITE_TIMEOUT).await;
    let unpriced = persist(&store, &run(0.0), DEFAULT_WRITE_TIMEOUT).await;
    let again = persist(&store, &run(19_999.0), DEFAULT_WRITE_TIMEOUT).await;

    assert_eq!(unpriced.history_records_appended, 0);
    assert_eq!(unpriced.failures.len(), 1);
    assert_eq!(unpriced.failures[0].store.as_deref(), Some("amazon"));
    assert_eq!(again, PersistReport::default());

    let product = store.list_products(&ProductQuery::default()).await.unwrap().remove(0);
    let listing = store.listings_for_product(product.id).await.unwrap().remove(0);
    assert_eq!(listing.price, 19_999.0);
    let prices: Vec<f64> = store
      .price_history(listing.id, None)
      .await
      .unwrap()
      .iter()
      .map(|r| r.price)
      .collect();
    assert_eq!(prices, vec![19_999.0]);
  }

  #[tokio::test]
  async fn priced_offer_wins_over_unpriced_one_from_same_store() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let groups = vec![group(vec![
      listing("Tecno Spark 20", "jiji", 0.0),
      listing("Tecno Spark 20", "jiji", 16_000.0),
    ])];

    let report = persist(&store, &groups, DEFAULT_WRITE_TIMEOUT).await;

    assert_eq!(report.listings_created, 1);
    assert!(report.failures.is_empty());
  }

  // ── Partial failures ──────────────────────────────────────────────────────

  #[derive(Debug, thiserror::Error)]
  enum FlakyError {
    #[error("store refused {0:?}")]
    Refused(String),
    #[error(transparent)]
    Inner(#[from] pricescout_store_sqlite::Error),
  }

  /// Refuses one product name and stalls every listing write for one store.
  struct Flaky {
    inner:          SqliteStore,
    refuse_product: &'static str,
    stall_store:    &'static str,
  }

  impl CatalogStore for Flaky {
    type Error = FlakyError;

    async fn upsert_product(
      &self,
      name: &str,
      image_url: Option<&str>,
    ) -> Result<ProductUpsert, FlakyError> {
      if name == self.refuse_product {
        return Err(FlakyError::Refused(name.to_owned()));
      }
      Ok(self.inner.upsert_product(name, image_url).await?)
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, FlakyError> {
      Ok(self.inner.get_product(id).await?)
    }

    async fn list_products(&self, query: &ProductQuery) -> Result<Vec<Product>, FlakyError> {
      Ok(self.inner.list_products(query).await?)
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool, FlakyError> {
      Ok(self.inner.delete_product(id).await?)
    }

    async fn upsert_listing(&self, write: ListingWrite) -> Result<ListingUpsert, FlakyError> {
      if write.store_name == self.stall_store {
        tokio::time::sleep(Duration::from_secs(2)).await;
      }
      Ok(self.inner.upsert_listing(write).await?)
    }

    async fn get_listing(&self, id: Uuid) -> Result<Option<StoreListing>, FlakyError> {
      Ok(self.inner.get_listing(id).await?)
    }

    async fn listings_for_product(&self, product_id: Uuid) -> Result<Vec<StoreListing>, FlakyError> {
      Ok(self.inner.listings_for_product(product_id).await?)
    }

    async fn price_history(
      &self,
      listing_id: Uuid,
      limit: Option<usize>,
    ) -> Result<Vec<PriceHistoryRecord>, FlakyError> {
      Ok(self.inner.price_history(listing_id, limit).await?)
    }

    async fn add_user(&self, input: NewUser) -> Result<User, FlakyError> {
      Ok(self.inner.add_user(input).await?)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, FlakyError> {
      Ok(self.inner.get_user(id).await?)
    }

    async fn insert_tracked_item(
      &self,
      user_id: Uuid,
      item: TrackedItem,
      alert: NewAlert,
    ) -> Result<TrackInsert, FlakyError> {
      Ok(self.inner.insert_tracked_item(user_id, item, alert).await?)
    }

    async fn remove_tracked_item(
      &self,
      user_id: Uuid,
      listing_id: Uuid,
    ) -> Result<Option<bool>, FlakyError> {
      Ok(self.inner.remove_tracked_item(user_id, listing_id).await?)
    }

    async fn alerts_for_user(&self, user_id: Uuid) -> Result<Vec<AlertRecord>, FlakyError> {
      Ok(self.inner.alerts_for_user(user_id).await?)
    }

    async fn delete_alert(&self, id: Uuid) -> Result<bool, FlakyError> {
      Ok(self.inner.delete_alert(id).await?)
    }
  }

  #[tokio::test]
  async fn failed_writes_do_not_hide_completed_ones() {
    let store = Flaky {
      inner:          SqliteStore::open_in_memory().await.unwrap(),
      refuse_product: "Refused Phone",
      stall_store:    "stalled",
    };
    let groups = vec![
      group(vec![
        listing("Samsung Galaxy A14", "jumia", 18_999.0),
        listing("Samsung Galaxy A14", "stalled", 18_500.0),
      ]),
      group(vec![listing("Refused Phone", "amazon", 100.0)]),
      group(vec![listing("iPhone 13", "amazon", 74_850.0)]),
    ];

    let report = persist(&store, &groups, Duration::from_millis(100)).await;

    assert_eq!(report.products_created, 2);
    assert_eq!(report.listings_created, 2);
    assert_eq!(report.history_records_appended, 2);
    assert_eq!(report.failures.len(), 2);

    let stalled = &report.failures[0];
    assert_eq!(stalled.product, "Samsung Galaxy A14");
    assert_eq!(stalled.store.as_deref(), Some("stalled"));
    assert!(stalled.message.contains("timed out"), "{}", stalled.message);

    let refused = &report.failures[1];
    assert_eq!(refused.product, "Refused Phone");
    assert_eq!(refused.store, None);

    assert_eq!(counts(&store.inner).await, (2, 2));
  }
}
