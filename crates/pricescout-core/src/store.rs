//! The `CatalogStore` trait.
//!
//! Implemented by storage backends (e.g. `pricescout-store-sqlite`). The
//! pipeline and the HTTP layer depend on this abstraction, not on any concrete
//! backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  catalog::{
    ListingUpsert, ListingWrite, PriceHistoryRecord, Product, ProductQuery,
    ProductUpsert, StoreListing,
  },
  tracking::{AlertRecord, NewAlert, NewUser, TrackInsert, TrackedItem, User},
};

/// Abstraction over a pricescout catalog backend.
///
/// Every write keyed by an identity (product name key, `(product, store)`,
/// `(user, listing)`) is a single read-modify-write that the backend must
/// make atomic. All methods return `Send` futures so the trait can be used
/// from axum handlers and spawned tasks.
pub trait CatalogStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Products ──────────────────────────────────────────────────────────

  /// Find the product whose [`product_key`](crate::catalog::product_key)
  /// matches `name`, bumping its `updated_at`, or create it.
  ///
  /// An existing product without an image picks up `image_url`.
  fn upsert_product<'a>(
    &'a self,
    name: &'a str,
    image_url: Option<&'a str>,
  ) -> impl Future<Output = Result<ProductUpsert, Self::Error>> + Send + 'a;

  fn get_product(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Product>, Self::Error>> + Send + '_;

  /// Products ordered by most recently updated.
  fn list_products<'a>(
    &'a self,
    query: &'a ProductQuery,
  ) -> impl Future<Output = Result<Vec<Product>, Self::Error>> + Send + 'a;

  /// Delete a product and, by cascade, its listings and their ledgers.
  /// Returns `false` if nothing was deleted.
  fn delete_product(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Listings and the price ledger ─────────────────────────────────────

  /// Upsert by `(product_id, store_name)`.
  ///
  /// A created listing, or one whose price moved by at least
  /// [`PRICE_EPSILON`](crate::catalog::PRICE_EPSILON), gets its price and
  /// `last_updated` written and exactly one ledger entry appended, in the
  /// same transaction. An unchanged listing is not written at all.
  fn upsert_listing(
    &self,
    write: ListingWrite,
  ) -> impl Future<Output = Result<ListingUpsert, Self::Error>> + Send + '_;

  fn get_listing(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<StoreListing>, Self::Error>> + Send + '_;

  fn listings_for_product(
    &self,
    product_id: Uuid,
  ) -> impl Future<Output = Result<Vec<StoreListing>, Self::Error>> + Send + '_;

  /// Ledger entries for a listing, newest first.
  fn price_history(
    &self,
    listing_id: Uuid,
    limit: Option<usize>,
  ) -> impl Future<Output = Result<Vec<PriceHistoryRecord>, Self::Error>> + Send + '_;

  // ── Users and tracking ────────────────────────────────────────────────

  fn add_user(
    &self,
    input: NewUser,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  fn get_user(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  /// Append `item` to the user's tracked items unless one with the same
  /// listing id is already there, and on success create the alert.
  ///
  /// The existence check, the append and the alert insert happen in one
  /// transaction that excludes concurrent writers to the same user.
  fn insert_tracked_item(
    &self,
    user_id: Uuid,
    item: TrackedItem,
    alert: NewAlert,
  ) -> impl Future<Output = Result<TrackInsert, Self::Error>> + Send + '_;

  /// Drop the user's tracked item for `listing_id`.
  ///
  /// `None` if the user does not exist, otherwise whether an item was
  /// removed.
  fn remove_tracked_item(
    &self,
    user_id: Uuid,
    listing_id: Uuid,
  ) -> impl Future<Output = Result<Option<bool>, Self::Error>> + Send + '_;

  // ── Alerts ────────────────────────────────────────────────────────────

  /// A user's alerts, newest first.
  fn alerts_for_user(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Vec<AlertRecord>, Self::Error>> + Send + '_;

  fn delete_alert(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}
