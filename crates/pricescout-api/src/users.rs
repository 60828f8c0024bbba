//! Handlers for users and their tracked listings.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST`   | `/users` | Body: `{"name":"..","email":".."}` |
//! | `GET`    | `/users/{id}/tracked` | |
//! | `POST`   | `/users/{id}/tracked` | Body: `{"listing_id":".."}`; 201 on first track, 200 if already tracked |
//! | `DELETE` | `/users/{id}/tracked/{listing_id}` | `{"removed":bool}` |
//! | `GET`    | `/users/{id}/history` | Snapshots keyed by listing id |
//! | `GET`    | `/users/{id}/alerts` | Newest first |

use std::collections::BTreeMap;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use pricescout_core::{
  store::CatalogStore,
  tracking::{AlertRecord, NewUser, PricePoint, TrackedItem},
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /users`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  Json(mut body): Json<NewUser>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CatalogStore + 'static,
{
  body.name = body.name.trim().to_owned();
  if body.name.is_empty() {
    return Err(ApiError::BadRequest("name must not be blank".into()));
  }
  body.email = body.email.map(|e| e.trim().to_owned()).filter(|e| !e.is_empty());

  let user = state.store().add_user(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(user)))
}

// ─── Tracking ─────────────────────────────────────────────────────────────────

/// `GET /users/{id}/tracked`
pub async fn tracked<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<TrackedItem>>, ApiError>
where
  S: CatalogStore + 'static,
{
  Ok(Json(state.tracking.tracked_items(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct TrackBody {
  pub listing_id: Uuid,
}

/// `POST /users/{id}/tracked`
pub async fn track<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<TrackBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CatalogStore + 'static,
{
  let outcome = state.tracking.track(id, body.listing_id).await?;
  let status = if outcome.created { StatusCode::CREATED } else { StatusCode::OK };
  Ok((status, Json(outcome)))
}

/// `DELETE /users/{id}/tracked/{listing_id}`
pub async fn untrack<S>(
  State(state): State<AppState<S>>,
  Path((id, listing_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<serde_json::Value>, ApiError>
where
  S: CatalogStore + 'static,
{
  let removed = state.tracking.untrack(id, listing_id).await?;
  Ok(Json(json!({ "removed": removed })))
}

/// `GET /users/{id}/history`
pub async fn history<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<BTreeMap<Uuid, Vec<PricePoint>>>, ApiError>
where
  S: CatalogStore + 'static,
{
  Ok(Json(state.tracking.list_history(id).await?))
}

// ─── Alerts ───────────────────────────────────────────────────────────────────

/// `GET /users/{id}/alerts`
pub async fn alerts<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<AlertRecord>>, ApiError>
where
  S: CatalogStore + 'static,
{
  let store = state.store();
  store
    .get_user(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("user {id}")))?;
  Ok(Json(store.alerts_for_user(id).await.map_err(ApiError::store)?))
}
