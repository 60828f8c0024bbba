//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are fixed-width RFC 3339 (microseconds, `Z`) so that text order
//! is time order. UUIDs are hyphenated lowercase strings. Tracked items are a
//! JSON array on the user row.

use chrono::{DateTime, SecondsFormat, Utc};
use pricescout_core::{
  catalog::{PriceHistoryRecord, Product, StoreListing},
  tracking::{AlertKind, AlertRecord, AlertStatus, TrackedItem, User},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

/// Drop sub-microsecond precision so a value survives a column round trip.
pub fn truncate_dt(dt: DateTime<Utc>) -> DateTime<Utc> {
  decode_dt(&encode_dt(dt)).unwrap_or(dt)
}

pub fn decode_alert_kind(s: &str) -> Result<AlertKind> {
  AlertKind::parse(s).ok_or_else(|| Error::UnknownVariant { column: "alerts.kind", value: s.to_owned() })
}

pub fn decode_alert_status(s: &str) -> Result<AlertStatus> {
  AlertStatus::parse(s)
    .ok_or_else(|| Error::UnknownVariant { column: "alerts.status", value: s.to_owned() })
}

pub fn encode_tracked_items(items: &[TrackedItem]) -> Result<String> {
  Ok(serde_json::to_string(items)?)
}

pub fn decode_tracked_items(s: &str) -> Result<Vec<TrackedItem>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw columns of a `products` row.
pub struct RawProduct {
  pub id:         String,
  pub name:       String,
  pub image_url:  Option<String>,
  pub created_at: String,
  pub updated_at: String,
}

pub const PRODUCT_COLUMNS: &str = "id, name, image_url, created_at, updated_at";

impl RawProduct {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      name:       row.get(1)?,
      image_url:  row.get(2)?,
      created_at: row.get(3)?,
      updated_at: row.get(4)?,
    })
  }

  pub fn into_product(self) -> Result<Product> {
    Ok(Product {
      id:         decode_uuid(&self.id)?,
      name:       self.name,
      image_url:  self.image_url,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw columns of a `store_listings` row.
pub struct RawStoreListing {
  pub id:           String,
  pub product_id:   String,
  pub store_name:   String,
  pub price:        f64,
  pub currency:     String,
  pub url:          Option<String>,
  pub image_url:    Option<String>,
  pub last_updated: String,
}

pub const LISTING_COLUMNS: &str =
  "id, product_id, store_name, price, currency, url, image_url, last_updated";

impl RawStoreListing {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      product_id:   row.get(1)?,
      store_name:   row.get(2)?,
      price:        row.get(3)?,
      currency:     row.get(4)?,
      url:          row.get(5)?,
      image_url:    row.get(6)?,
      last_updated: row.get(7)?,
    })
  }

  pub fn into_listing(self) -> Result<StoreListing> {
    Ok(StoreListing {
      id:           decode_uuid(&self.id)?,
      product_id:   decode_uuid(&self.product_id)?,
      store_name:   self.store_name,
      price:        self.price,
      currency:     self.currency,
      url:          self.url,
      image_url:    self.image_url,
      last_updated: decode_dt(&self.last_updated)?,
    })
  }
}

/// Raw columns of a `price_history` row.
pub struct RawPriceRecord {
  pub id:          String,
  pub listing_id:  String,
  pub price:       f64,
  pub recorded_at: String,
}

impl RawPriceRecord {
  pub fn into_record(self) -> Result<PriceHistoryRecord> {
    Ok(PriceHistoryRecord {
      id:          decode_uuid(&self.id)?,
      listing_id:  decode_uuid(&self.listing_id)?,
      price:       self.price,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw columns of a `users` row.
pub struct RawUser {
  pub id:            String,
  pub name:          String,
  pub email:         Option<String>,
  pub created_at:    String,
  pub tracked_items: String,
}

impl RawUser {
  pub fn into_user(self) -> Result<User> {
    Ok(User {
      id:            decode_uuid(&self.id)?,
      name:          self.name,
      email:         self.email,
      created_at:    decode_dt(&self.created_at)?,
      tracked_items: decode_tracked_items(&self.tracked_items)?,
    })
  }
}

/// Raw columns of an `alerts` row.
pub struct RawAlert {
  pub id:            String,
  pub user_id:       String,
  pub listing_id:    String,
  pub kind:          String,
  pub trigger_price: f64,
  pub status:        String,
  pub created_at:    String,
}

impl RawAlert {
  pub fn into_alert(self) -> Result<AlertRecord> {
    Ok(AlertRecord {
      id:            decode_uuid(&self.id)?,
      user_id:       decode_uuid(&self.user_id)?,
      listing_id:    decode_uuid(&self.listing_id)?,
      kind:          decode_alert_kind(&self.kind)?,
      trigger_price: self.trigger_price,
      status:        decode_alert_status(&self.status)?,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}
