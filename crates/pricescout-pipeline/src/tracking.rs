//! The per-user tracking service.

use std::{collections::BTreeMap, sync::Arc};

use chrono::Utc;
use pricescout_core::{
  Error as CoreError,
  normalize::UNKNOWN_PRODUCT,
  store::CatalogStore,
  tracking::{
    HISTORY_SNAPSHOT_LIMIT, NewAlert, PricePoint, TrackInsert, TrackOutcome, TrackedItem,
    build_snapshot,
  },
};
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Starts, stops and reads users' tracking of store listings.
pub struct TrackingService<S> {
  store: Arc<S>,
}

impl<S> Clone for TrackingService<S> {
  fn clone(&self) -> Self { Self { store: self.store.clone() } }
}

impl<S: CatalogStore> TrackingService<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  /// Start tracking `listing_id` for `user_id`.
  ///
  /// A listing the user already tracks is reported with
  /// `already_tracked: true` and nothing is written. Otherwise the item is
  /// appended with a fresh price snapshot and one alert is raised.
  pub async fn track(&self, user_id: Uuid, listing_id: Uuid) -> Result<TrackOutcome> {
    let user = self
      .store
      .get_user(user_id)
      .await
      .map_err(Error::store)?
      .ok_or(CoreError::UserNotFound(user_id))?;

    if user.tracks(listing_id) {
      return Ok(already_tracked());
    }

    let listing = self
      .store
      .get_listing(listing_id)
      .await
      .map_err(Error::store)?
      .ok_or(CoreError::ListingNotFound(listing_id))?;

    let name = self
      .store
      .get_product(listing.product_id)
      .await
      .map_err(Error::store)?
      .map_or_else(|| UNKNOWN_PRODUCT.to_owned(), |p| p.name);

    let history = self
      .store
      .price_history(listing_id, Some(HISTORY_SNAPSHOT_LIMIT))
      .await
      .map_err(Error::store)?;

    let now = Utc::now();
    let item = TrackedItem {
      listing_id,
      name,
      store: listing.store_name,
      currency: listing.currency,
      url: listing.url,
      image_url: listing.image_url,
      price_history: build_snapshot(listing.price, &history, now),
      tracked_since: now,
    };

    let inserted = self
      .store
      .insert_tracked_item(user_id, item, NewAlert::on_track(listing.price))
      .await
      .map_err(Error::store)?;

    match inserted {
      TrackInsert::Inserted { item, alert } => {
        info!(%user_id, %listing_id, alert_id = %alert.id, "tracking started");
        Ok(TrackOutcome {
          created:         true,
          already_tracked: false,
          history_count:   item.price_history.len(),
          item:            Some(item),
        })
      }
      // Lost a race with a concurrent track of the same listing.
      TrackInsert::AlreadyTracked => Ok(already_tracked()),
      TrackInsert::UserNotFound => Err(CoreError::UserNotFound(user_id).into()),
    }
  }

  /// Stop tracking. `Ok(false)` if the listing was not tracked.
  pub async fn untrack(&self, user_id: Uuid, listing_id: Uuid) -> Result<bool> {
    let removed = self
      .store
      .remove_tracked_item(user_id, listing_id)
      .await
      .map_err(Error::store)?
      .ok_or(CoreError::UserNotFound(user_id))?;

    if removed {
      info!(%user_id, %listing_id, "tracking stopped");
    }
    Ok(removed)
  }

  pub async fn tracked_items(&self, user_id: Uuid) -> Result<Vec<TrackedItem>> {
    let user = self
      .store
      .get_user(user_id)
      .await
      .map_err(Error::store)?
      .ok_or(CoreError::UserNotFound(user_id))?;
    Ok(user.tracked_items)
  }

  /// Every tracked listing's snapshot, keyed by listing id.
  pub async fn list_history(&self, user_id: Uuid) -> Result<BTreeMap<Uuid, Vec<PricePoint>>> {
    let items = self.tracked_items(user_id).await?;
    Ok(
      items
        .into_iter()
        .map(|item| (item.listing_id, item.price_history))
        .collect(),
    )
  }
}

fn already_tracked() -> TrackOutcome {
  TrackOutcome { created: false, already_tracked: true, history_count: 0, item: None }
}
