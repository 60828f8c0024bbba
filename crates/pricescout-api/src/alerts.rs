//! Handler for `DELETE /alerts/{id}`.

use axum::{
  extract::{Path, State},
  http::StatusCode,
};
use pricescout_core::store::CatalogStore;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// `DELETE /alerts/{id}`; 404 if the alert does not exist.
pub async fn delete_one<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: CatalogStore + 'static,
{
  if state.store().delete_alert(id).await.map_err(ApiError::store)? {
    Ok(StatusCode::NO_CONTENT)
  } else {
    Err(ApiError::NotFound(format!("alert {id}")))
  }
}
