//! Users, their tracked items and price alerts.
//!
//! A tracked item is a denormalized copy of a listing taken when tracking
//! starts. Its price history is a snapshot; later ledger entries for the
//! listing do not show up in it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::PriceHistoryRecord;

/// Most prior ledger entries copied into a new snapshot.
pub const HISTORY_SNAPSHOT_LIMIT: usize = 50;

// ─── Users ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
  pub id:            Uuid,
  pub name:          String,
  pub email:         Option<String>,
  pub created_at:    DateTime<Utc>,
  #[serde(default)]
  pub tracked_items: Vec<TrackedItem>,
}

impl User {
  pub fn tracks(&self, listing_id: Uuid) -> bool {
    self.tracked_items.iter().any(|item| item.listing_id == listing_id)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
  pub name:  String,
  #[serde(default)]
  pub email: Option<String>,
}

// ─── Tracked items ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
  pub price:       f64,
  pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedItem {
  pub listing_id:    Uuid,
  pub name:          String,
  pub store:         String,
  pub currency:      String,
  pub url:           Option<String>,
  pub image_url:     Option<String>,
  /// Newest first; never empty.
  pub price_history: Vec<PricePoint>,
  pub tracked_since: DateTime<Utc>,
}

/// Build the history snapshot for a first-time track.
///
/// The live price comes first, stamped `now`, followed by up to
/// [`HISTORY_SNAPSHOT_LIMIT`] entries of `history` (already newest first).
/// With no history at all a single zero-price point stamped `now` stands in
/// for the prior entries.
pub fn build_snapshot(
  current_price: f64,
  history: &[PriceHistoryRecord],
  now: DateTime<Utc>,
) -> Vec<PricePoint> {
  let mut snapshot = Vec::with_capacity(1 + history.len().min(HISTORY_SNAPSHOT_LIMIT));
  snapshot.push(PricePoint { price: current_price, recorded_at: now });

  if history.is_empty() {
    snapshot.push(PricePoint { price: 0.0, recorded_at: now });
  } else {
    snapshot.extend(
      history
        .iter()
        .take(HISTORY_SNAPSHOT_LIMIT)
        .map(|record| PricePoint { price: record.price, recorded_at: record.recorded_at }),
    );
  }

  snapshot
}

// ─── Alerts ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
  PriceDrop,
  PriceRise,
  BackInStock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
  Active,
  Triggered,
  Disabled,
}

impl AlertKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::PriceDrop => "price_drop",
      Self::PriceRise => "price_rise",
      Self::BackInStock => "back_in_stock",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "price_drop" => Some(Self::PriceDrop),
      "price_rise" => Some(Self::PriceRise),
      "back_in_stock" => Some(Self::BackInStock),
      _ => None,
    }
  }
}

impl AlertStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Active => "active",
      Self::Triggered => "triggered",
      Self::Disabled => "disabled",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "active" => Some(Self::Active),
      "triggered" => Some(Self::Triggered),
      "disabled" => Some(Self::Disabled),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
  pub id:            Uuid,
  pub user_id:       Uuid,
  pub listing_id:    Uuid,
  pub kind:          AlertKind,
  pub trigger_price: f64,
  pub status:        AlertStatus,
  pub created_at:    DateTime<Utc>,
}

/// Alert raised alongside a first-time track. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewAlert {
  pub kind:          AlertKind,
  pub trigger_price: f64,
}

impl NewAlert {
  /// The alert created when a user starts tracking at `price`.
  pub fn on_track(price: f64) -> Self {
    Self { kind: AlertKind::PriceDrop, trigger_price: price }
  }
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// Result of the atomic "append tracked item if absent" write.
#[derive(Debug, Clone)]
pub enum TrackInsert {
  Inserted { item: TrackedItem, alert: AlertRecord },
  AlreadyTracked,
  UserNotFound,
}

/// Result of tracking a listing, as reported to callers.
#[derive(Debug, Clone, Serialize)]
pub struct TrackOutcome {
  pub created:         bool,
  pub already_tracked: bool,
  pub history_count:   usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub item:            Option<TrackedItem>,
}
