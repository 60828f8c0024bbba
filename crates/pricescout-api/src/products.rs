//! Handlers for the persisted catalog.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`    | `/products` | Optional `?text=<substring>&limit=<n>` |
//! | `GET`    | `/products/{id}` | Product with its store listings; 404 if not found |
//! | `DELETE` | `/products/{id}` | Cascades to listings and history; 404 if not found |
//! | `GET`    | `/listings/{id}/history` | Newest first; optional `?limit=<n>` |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};
use pricescout_core::{
  catalog::{PriceHistoryRecord, Product, ProductQuery, ProductWithListings},
  store::CatalogStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub text:  Option<String>,
  pub limit: Option<usize>,
}

/// `GET /products[?text=..][&limit=..]`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Product>>, ApiError>
where
  S: CatalogStore + 'static,
{
  let query = ProductQuery {
    text:  params.text.filter(|t| !t.trim().is_empty()),
    limit: params.limit,
  };
  let products = state.store().list_products(&query).await.map_err(ApiError::store)?;
  Ok(Json(products))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /products/{id}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<ProductWithListings>, ApiError>
where
  S: CatalogStore + 'static,
{
  let store = state.store();
  let product = store
    .get_product(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("product {id}")))?;
  let listings = store.listings_for_product(id).await.map_err(ApiError::store)?;
  Ok(Json(ProductWithListings { product, listings }))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /products/{id}`
pub async fn delete_one<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: CatalogStore + 'static,
{
  let deleted = state.store().delete_product(id).await.map_err(ApiError::store)?;
  if deleted {
    Ok(StatusCode::NO_CONTENT)
  } else {
    Err(ApiError::NotFound(format!("product {id}")))
  }
}

// ─── Listing history ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
  pub limit: Option<usize>,
}

/// `GET /listings/{id}/history[?limit=..]`
pub async fn listing_history<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<PriceHistoryRecord>>, ApiError>
where
  S: CatalogStore + 'static,
{
  let store = state.store();
  store
    .get_listing(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("listing {id}")))?;
  let history = store.price_history(id, params.limit).await.map_err(ApiError::store)?;
  Ok(Json(history))
}
