//! OAuth client-credentials sources.
//!
//! The bearer token lives in a [`CredentialCache`] owned by the adapter, so
//! two adapters against two accounts never share a token.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use pricescout_core::listing::RawListing;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, warn};

use super::{HttpSourceConfig, SourceAdapter, render_url};
use crate::error::SourceError;

/// Tokens are refreshed this long before the provider says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ClientCredentials {
  pub token_url:     String,
  pub client_id:     String,
  pub client_secret: String,
  pub scope:         Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
  access_token: String,
  #[serde(default)]
  expires_in:   Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
  value:      String,
  expires_at: Instant,
}

// ─── Cache ───────────────────────────────────────────────────────────────────

/// Lazily refreshed client-credentials token.
///
/// Holds at most one token. Concurrent callers that find it missing or
/// expired wait on the same lock, so only one of them hits the token
/// endpoint.
#[derive(Debug)]
pub struct CredentialCache {
  client:      Client,
  credentials: ClientCredentials,
  token:       Mutex<Option<CachedToken>>,
}

impl CredentialCache {
  pub fn new(client: Client, credentials: ClientCredentials) -> Self {
    Self { client, credentials, token: Mutex::new(None) }
  }

  /// A valid bearer token, fetching a new one if needed.
  pub async fn token(&self) -> Result<String, SourceError> {
    let mut slot = self.token.lock().await;
    if let Some(token) = slot.as_ref().filter(|t| Instant::now() < t.expires_at) {
      return Ok(token.value.clone());
    }

    let fresh = self.request_token().await?;
    let value = fresh.value.clone();
    *slot = Some(fresh);
    Ok(value)
  }

  /// Forget the cached token, e.g. after the API rejected it.
  pub async fn invalidate(&self) { *self.token.lock().await = None; }

  async fn request_token(&self) -> Result<CachedToken, SourceError> {
    let creds = &self.credentials;

    let mut form = vec![("grant_type", "client_credentials")];
    if let Some(scope) = creds.scope.as_deref() {
      form.push(("scope", scope));
    }

    let resp = self
      .client
      .post(&creds.token_url)
      .basic_auth(&creds.client_id, Some(&creds.client_secret))
      .form(&form)
      .send()
      .await?;

    let status = resp.status();
    if !status.is_success() {
      return Err(SourceError::Auth(format!("token endpoint returned {status}")));
    }

    let body: TokenResponse = resp
      .json()
      .await
      .map_err(|e| SourceError::Auth(format!("unreadable token response: {e}")))?;

    let lifetime = Duration::from_secs(body.expires_in.unwrap_or(0)).saturating_sub(EXPIRY_MARGIN);
    debug!(lifetime_secs = lifetime.as_secs(), "obtained access token");

    Ok(CachedToken { value: body.access_token, expires_at: Instant::now() + lifetime })
  }
}

// ─── Adapter ─────────────────────────────────────────────────────────────────

/// A JSON search endpoint behind a client-credentials bearer token.
///
/// A `401` drops the cached token and retries once with a fresh one.
#[derive(Debug, Clone)]
pub struct OAuthJsonSource {
  config: HttpSourceConfig,
  client: Client,
  cache:  Arc<CredentialCache>,
}

impl OAuthJsonSource {
  pub fn new(config: HttpSourceConfig, credentials: ClientCredentials) -> Result<Self, SourceError> {
    let client = config.client()?;
    let cache = Arc::new(CredentialCache::new(client.clone(), credentials));
    Ok(Self { config, client, cache })
  }

  /// Use an existing cache instead of a private one.
  pub fn with_cache(mut self, cache: Arc<CredentialCache>) -> Self {
    self.cache = cache;
    self
  }

  async fn send(&self, url: &str) -> Result<reqwest::Response, SourceError> {
    let token = self.cache.token().await?;
    Ok(
      self
        .client
        .get(url)
        .bearer_auth(token)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await?,
    )
  }
}

#[async_trait]
impl SourceAdapter for OAuthJsonSource {
  fn name(&self) -> &str { &self.config.name }

  fn timeout(&self) -> Duration { self.config.timeout }

  async fn fetch(&self, query: &str) -> Result<Vec<RawListing>, SourceError> {
    let url = render_url(&self.config.url, query);

    let mut resp = self.send(&url).await?;
    if resp.status() == StatusCode::UNAUTHORIZED {
      warn!(source = %self.config.name, "token rejected, refreshing");
      self.cache.invalidate().await;
      resp = self.send(&url).await?;
    }

    self.config.decode(resp).await
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
  };
  use serde_json::{Value, json};

  use super::*;

  #[derive(Clone, Default)]
  struct Counters {
    tokens:   Arc<AtomicUsize>,
    searches: Arc<AtomicUsize>,
  }

  async fn issue_token(State(c): State<Counters>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    let authorized = headers
      .get("authorization")
      .and_then(|v| v.to_str().ok())
      .is_some_and(|v| v.starts_with("Basic "));
    if !authorized {
      return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    let n = c.tokens.fetch_add(1, Ordering::SeqCst) + 1;
    (StatusCode::OK, Json(json!({ "access_token": format!("token-{n}"), "expires_in": 7200 })))
  }

  async fn search(State(c): State<Counters>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    c.searches.fetch_add(1, Ordering::SeqCst);
    let bearer = headers.get("authorization").and_then(|v| v.to_str().ok()).unwrap_or("");
    // Only the second token issued is accepted.
    if bearer != "Bearer token-2" {
      return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    (
      StatusCode::OK,
      Json(json!({ "itemSummaries": [{ "title": "iPhone 13", "price": { "value": "499.00", "currency": "USD" } }] })),
    )
  }

  async fn serve(counters: Counters) -> String {
    let router = Router::new()
      .route("/token", post(issue_token))
      .route("/search", get(search))
      .with_state(counters);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    format!("http://{addr}")
  }

  fn credentials(base: &str) -> ClientCredentials {
    ClientCredentials {
      token_url:     format!("{base}/token"),
      client_id:     "id".into(),
      client_secret: "secret".into(),
      scope:         Some("https://api.test/oauth/api_scope".into()),
    }
  }

  #[tokio::test]
  async fn cached_token_is_reused() {
    let counters = Counters::default();
    let base = serve(counters.clone()).await;

    let cache = CredentialCache::new(Client::new(), credentials(&base));
    assert_eq!(cache.token().await.unwrap(), "token-1");
    assert_eq!(cache.token().await.unwrap(), "token-1");
    assert_eq!(counters.tokens.load(Ordering::SeqCst), 1);

    cache.invalidate().await;
    assert_eq!(cache.token().await.unwrap(), "token-2");
  }

  #[tokio::test]
  async fn rejected_token_is_refreshed_once() {
    let counters = Counters::default();
    let base = serve(counters.clone()).await;

    let source = OAuthJsonSource::new(
      HttpSourceConfig::new("ebay", format!("{base}/search?q={{query}}"), "itemSummaries"),
      credentials(&base),
    )
    .unwrap();

    let items = source.fetch("iphone 13").await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(counters.tokens.load(Ordering::SeqCst), 2);
    assert_eq!(counters.searches.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn unreachable_token_endpoint_fails() {
    let cache = CredentialCache::new(Client::new(), ClientCredentials {
      token_url:     "http://127.0.0.1:9/token".into(),
      client_id:     "id".into(),
      client_secret: "secret".into(),
      scope:         None,
    });
    assert!(cache.token().await.is_err());
  }
}
