//! Handler for `GET /search`.
//!
//! | Param | Notes |
//! |-------|-------|
//! | `q` | Required, non-blank |
//! | `sources` | Comma-separated source names; omitted means all |
//! | `sort` | `price_asc`, `price_desc`, `rating` or `name` |
//! | `min_price`, `max_price` | Compared on the base-currency price |
//! | `min_rating` | Unrated listings never pass |
//! | `persist` | `true` writes the grouped products to the catalog |

use axum::{
  Json,
  extract::{Query, State},
};
use pricescout_core::store::CatalogStore;
use pricescout_pipeline::{SearchFilters, SearchOutcome, SearchRequest, SortKey};
use serde::Deserialize;

use crate::{AppState, error::ApiError};

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
  #[serde(default)]
  pub q:          String,
  pub sources:    Option<String>,
  pub sort:       Option<String>,
  pub min_price:  Option<f64>,
  pub max_price:  Option<f64>,
  pub min_rating: Option<f64>,
  #[serde(default)]
  pub persist:    bool,
}

impl SearchParams {
  fn into_request(self) -> Result<SearchRequest, ApiError> {
    let sort = self
      .sort
      .as_deref()
      .filter(|s| !s.is_empty())
      .map(str::parse::<SortKey>)
      .transpose()?;

    let sources = self
      .sources
      .as_deref()
      .map(|list| {
        list
          .split(',')
          .map(str::trim)
          .filter(|name| !name.is_empty())
          .map(str::to_owned)
          .collect()
      })
      .unwrap_or_default();

    Ok(SearchRequest {
      query: self.q,
      sources,
      filters: SearchFilters {
        sort,
        min_price: self.min_price,
        max_price: self.max_price,
        min_rating: self.min_rating,
      },
      persist: self.persist,
    })
  }
}

/// `GET /search?q=<query>[&sources=a,b][&sort=..][&persist=true]`
pub async fn handler<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<SearchParams>,
) -> Result<Json<SearchOutcome>, ApiError>
where
  S: CatalogStore + 'static,
{
  let request = params.into_request()?;
  let outcome = state.aggregator.search(&request).await?;
  Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn source_list_is_split_and_trimmed() {
    let params = SearchParams {
      q: "iphone".into(),
      sources: Some(" jumia, ,ebay ".into()),
      ..SearchParams::default()
    };
    let request = params.into_request().unwrap();
    assert_eq!(request.sources, vec!["jumia".to_owned(), "ebay".to_owned()]);
    assert!(!request.persist);
  }

  #[test]
  fn unknown_sort_is_a_bad_request() {
    let params = SearchParams { q: "x".into(), sort: Some("cheapest".into()), ..SearchParams::default() };
    assert!(matches!(params.into_request(), Err(ApiError::BadRequest(_))));
  }
}
