//! JSON REST API for pricescout.
//!
//! Exposes an axum [`Router`] over the aggregation pipeline and any
//! [`CatalogStore`]. Auth, TLS and request tracing are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", pricescout_api::api_router(state))
//! ```

pub mod alerts;
pub mod error;
pub mod products;
pub mod search;
pub mod users;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get},
};
use pricescout_core::store::CatalogStore;
use pricescout_pipeline::{Aggregator, MatcherBackend, TrackingService};

pub use error::ApiError;

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct AppState<S> {
  pub aggregator: Arc<Aggregator<S, MatcherBackend>>,
  pub tracking:   TrackingService<S>,
}

impl<S: CatalogStore> AppState<S> {
  pub fn new(aggregator: Aggregator<S, MatcherBackend>) -> Self {
    let tracking = TrackingService::new(aggregator.store().clone());
    Self { aggregator: Arc::new(aggregator), tracking }
  }

  pub fn store(&self) -> &Arc<S> { self.aggregator.store() }
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self { aggregator: self.aggregator.clone(), tracking: self.tracking.clone() }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: AppState<S>) -> Router<()>
where
  S: CatalogStore + 'static,
{
  Router::new()
    // Aggregation
    .route("/search", get(search::handler::<S>))
    // Catalog
    .route("/products", get(products::list::<S>))
    .route("/products/{id}", get(products::get_one::<S>).delete(products::delete_one::<S>))
    .route("/listings/{id}/history", get(products::listing_history::<S>))
    // Users and tracking
    .route("/users", axum::routing::post(users::create::<S>))
    .route("/users/{id}/tracked", get(users::tracked::<S>).post(users::track::<S>))
    .route("/users/{id}/tracked/{listing_id}", delete(users::untrack::<S>))
    .route("/users/{id}/history", get(users::history::<S>))
    .route("/users/{id}/alerts", get(users::alerts::<S>))
    // Alerts
    .route("/alerts/{id}", delete(alerts::delete_one::<S>))
    .with_state(state)
}
