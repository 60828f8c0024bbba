//! [`SqliteStore`], the SQLite implementation of [`CatalogStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use pricescout_core::{
  catalog::{
    ListingChange, ListingUpsert, ListingWrite, PriceHistoryRecord, Product,
    ProductQuery, ProductUpsert, StoreListing, price_changed, product_key,
  },
  store::CatalogStore,
  tracking::{
    AlertRecord, AlertStatus, NewAlert, NewUser, TrackInsert, TrackedItem, User,
  },
};

use crate::{
  Result,
  encode::{
    LISTING_COLUMNS, PRODUCT_COLUMNS, RawAlert, RawPriceRecord, RawProduct,
    RawStoreListing, RawUser, decode_tracked_items, encode_dt, encode_tracked_items,
    encode_uuid, truncate_dt,
  },
  error::Error,
  schema::SCHEMA,
};

/// Surface an encoding failure from inside a connection closure.
fn encode_failure(e: Error) -> tokio_rusqlite::Error {
  tokio_rusqlite::Error::Other(Box::new(e))
}

/// `%text%` for a case-insensitive `LIKE ... ESCAPE '\'` on `name_key`.
fn like_pattern(text: &str) -> String {
  let mut pattern = String::with_capacity(text.len() + 2);
  pattern.push('%');
  for c in text.to_lowercase().chars() {
    if matches!(c, '%' | '_' | '\\') {
      pattern.push('\\');
    }
    pattern.push(c);
  }
  pattern.push('%');
  pattern
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A pricescout catalog backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection handle is reference-counted and all
/// clones share one database thread.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests and one-shot runs.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Edit a user's tracked items inside one immediate transaction.
  ///
  /// `edit` sees the decoded items and the open transaction and returns
  /// whether it changed them; changed items are written back before commit.
  /// Yields `None` when the user does not exist.
  async fn edit_tracked_items<F>(&self, user_id: Uuid, edit: F) -> Result<Option<bool>>
  where
    F: FnOnce(&mut Vec<TrackedItem>, &rusqlite::Transaction<'_>) -> rusqlite::Result<bool>
      + Send
      + 'static,
  {
    let id_str = encode_uuid(user_id);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: Option<String> = tx
          .query_row(
            "SELECT tracked_items FROM users WHERE id = ?1",
            rusqlite::params![id_str],
            |row| row.get(0),
          )
          .optional()?;
        let Some(current) = current else {
          return Ok(None);
        };

        let mut items = decode_tracked_items(&current).map_err(encode_failure)?;
        let changed = edit(&mut items, &tx)?;

        if changed {
          let encoded = encode_tracked_items(&items).map_err(encode_failure)?;
          tx.execute(
            "UPDATE users SET tracked_items = ?2 WHERE id = ?1",
            rusqlite::params![id_str, encoded],
          )?;
        }
        tx.commit()?;
        Ok(Some(changed))
      })
      .await?;

    Ok(outcome)
  }
}

// ─── CatalogStore impl ───────────────────────────────────────────────────────

impl CatalogStore for SqliteStore {
  type Error = Error;

  // ── Products ──────────────────────────────────────────────────────────────

  async fn upsert_product(&self, name: &str, image_url: Option<&str>) -> Result<ProductUpsert> {
    let new_id    = encode_uuid(Uuid::new_v4());
    let now       = encode_dt(Utc::now());
    let key       = product_key(name);
    let name      = name.trim().to_owned();
    let image_url = image_url.map(str::to_owned);

    let (raw, created) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = tx
          .query_row(
            &format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE name_key = ?1"),
            rusqlite::params![key],
            RawProduct::from_row,
          )
          .optional()?;

        let outcome = match existing {
          Some(mut raw) => {
            tx.execute(
              "UPDATE products
               SET updated_at = ?2, image_url = COALESCE(image_url, ?3)
               WHERE id = ?1",
              rusqlite::params![raw.id, now, image_url],
            )?;
            raw.updated_at = now;
            if raw.image_url.is_none() {
              raw.image_url = image_url;
            }
            (raw, false)
          }
          None => {
            tx.execute(
              "INSERT INTO products (id, name, name_key, image_url, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
              rusqlite::params![new_id, name, key, image_url, now],
            )?;
            let raw = RawProduct {
              id: new_id,
              name,
              image_url,
              created_at: now.clone(),
              updated_at: now,
            };
            (raw, true)
          }
        };

        tx.commit()?;
        Ok(outcome)
      })
      .await?;

    Ok(ProductUpsert { product: raw.into_product()?, created })
  }

  async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawProduct> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"),
            rusqlite::params![id_str],
            RawProduct::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawProduct::into_product).transpose()
  }

  async fn list_products(&self, query: &ProductQuery) -> Result<Vec<Product>> {
    let pattern = query
      .text
      .as_deref()
      .map(str::trim)
      .filter(|t| !t.is_empty())
      .map(like_pattern);
    let limit = query.limit.map_or(-1, |l| l as i64);

    let raws: Vec<RawProduct> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PRODUCT_COLUMNS} FROM products
           WHERE (?1 IS NULL OR name_key LIKE ?1 ESCAPE '\\')
           ORDER BY updated_at DESC, rowid DESC
           LIMIT ?2"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![pattern, limit], RawProduct::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawProduct::into_product).collect()
  }

  async fn delete_product(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);

    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM products WHERE id = ?1", rusqlite::params![id_str])?)
      })
      .await?;

    Ok(deleted > 0)
  }

  // ── Listings and the price ledger ─────────────────────────────────────────

  async fn upsert_listing(&self, write: ListingWrite) -> Result<ListingUpsert> {
    let new_id     = encode_uuid(Uuid::new_v4());
    let history_id = encode_uuid(Uuid::new_v4());
    let product_id = encode_uuid(write.product_id);
    let now        = encode_dt(Utc::now());

    let (raw, change) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = tx
          .query_row(
            &format!(
              "SELECT {LISTING_COLUMNS} FROM store_listings
               WHERE product_id = ?1 AND store_name = ?2"
            ),
            rusqlite::params![product_id, write.store_name],
            RawStoreListing::from_row,
          )
          .optional()?;

        let (raw, change) = match existing {
          None => {
            tx.execute(
              "INSERT INTO store_listings (
                 id, product_id, store_name, price, currency, url, image_url, last_updated
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
              rusqlite::params![
                new_id,
                product_id,
                write.store_name,
                write.price,
                write.currency,
                write.url,
                write.image_url,
                now,
              ],
            )?;
            let raw = RawStoreListing {
              id:           new_id,
              product_id,
              store_name:   write.store_name,
              price:        write.price,
              currency:     write.currency,
              url:          write.url,
              image_url:    write.image_url,
              last_updated: now.clone(),
            };
            (raw, ListingChange::Created)
          }
          Some(raw) if price_changed(raw.price, write.price) => {
            tx.execute(
              "UPDATE store_listings
               SET price = ?2, currency = ?3,
                   url = COALESCE(?4, url), image_url = COALESCE(?5, image_url),
                   last_updated = ?6
               WHERE id = ?1",
              rusqlite::params![
                raw.id,
                write.price,
                write.currency,
                write.url,
                write.image_url,
                now,
              ],
            )?;
            let previous = raw.price;
            let raw = RawStoreListing {
              price:        write.price,
              currency:     write.currency,
              url:          write.url.or(raw.url),
              image_url:    write.image_url.or(raw.image_url),
              last_updated: now.clone(),
              ..raw
            };
            (raw, ListingChange::PriceChanged { previous })
          }
          Some(raw) => (raw, ListingChange::Unchanged),
        };

        if change.appends_history() {
          tx.execute(
            "INSERT INTO price_history (id, listing_id, price, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![history_id, raw.id, raw.price, now],
          )?;
        }

        tx.commit()?;
        Ok((raw, change))
      })
      .await?;

    Ok(ListingUpsert { listing: raw.into_listing()?, change })
  }

  async fn get_listing(&self, id: Uuid) -> Result<Option<StoreListing>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawStoreListing> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {LISTING_COLUMNS} FROM store_listings WHERE id = ?1"),
            rusqlite::params![id_str],
            RawStoreListing::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawStoreListing::into_listing).transpose()
  }

  async fn listings_for_product(&self, product_id: Uuid) -> Result<Vec<StoreListing>> {
    let id_str = encode_uuid(product_id);

    let raws: Vec<RawStoreListing> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {LISTING_COLUMNS} FROM store_listings
           WHERE product_id = ?1
           ORDER BY price ASC, store_name ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawStoreListing::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawStoreListing::into_listing).collect()
  }

  async fn price_history(
    &self,
    listing_id: Uuid,
    limit: Option<usize>,
  ) -> Result<Vec<PriceHistoryRecord>> {
    let id_str = encode_uuid(listing_id);
    let limit  = limit.map_or(-1, |l| l as i64);

    let raws: Vec<RawPriceRecord> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT id, listing_id, price, recorded_at FROM price_history
           WHERE listing_id = ?1
           ORDER BY recorded_at DESC, rowid DESC
           LIMIT ?2",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str, limit], |row| {
            Ok(RawPriceRecord {
              id:          row.get(0)?,
              listing_id:  row.get(1)?,
              price:       row.get(2)?,
              recorded_at: row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPriceRecord::into_record).collect()
  }

  // ── Users and tracking ────────────────────────────────────────────────────

  async fn add_user(&self, input: NewUser) -> Result<User> {
    let user = User {
      id:            Uuid::new_v4(),
      name:          input.name,
      email:         input.email,
      created_at:    truncate_dt(Utc::now()),
      tracked_items: Vec::new(),
    };

    let id_str = encode_uuid(user.id);
    let name   = user.name.clone();
    let email  = user.email.clone();
    let at_str = encode_dt(user.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO users (id, name, email, created_at) VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, name, email, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(user)
  }

  async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT id, name, email, created_at, tracked_items FROM users WHERE id = ?1",
            rusqlite::params![id_str],
            |row| {
              Ok(RawUser {
                id:            row.get(0)?,
                name:          row.get(1)?,
                email:         row.get(2)?,
                created_at:    row.get(3)?,
                tracked_items: row.get(4)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawUser::into_user).transpose()
  }

  async fn insert_tracked_item(
    &self,
    user_id: Uuid,
    item: TrackedItem,
    alert: NewAlert,
  ) -> Result<TrackInsert> {
    let alert = AlertRecord {
      id: Uuid::new_v4(),
      user_id,
      listing_id: item.listing_id,
      kind: alert.kind,
      trigger_price: alert.trigger_price,
      status: AlertStatus::Active,
      created_at: truncate_dt(Utc::now()),
    };

    let listing_id   = item.listing_id;
    let stored_item  = item.clone();
    let alert_id     = encode_uuid(alert.id);
    let alert_user   = encode_uuid(user_id);
    let alert_target = encode_uuid(listing_id);
    let kind         = alert.kind.as_str();
    let status       = alert.status.as_str();
    let price        = alert.trigger_price;
    let at_str       = encode_dt(alert.created_at);

    let outcome = self
      .edit_tracked_items(user_id, move |items, tx| {
        if items.iter().any(|existing| existing.listing_id == listing_id) {
          return Ok(false);
        }
        items.push(stored_item);
        tx.execute(
          "INSERT INTO alerts (id, user_id, listing_id, kind, trigger_price, status, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![alert_id, alert_user, alert_target, kind, price, status, at_str],
        )?;
        Ok(true)
      })
      .await?;

    Ok(match outcome {
      None => TrackInsert::UserNotFound,
      Some(false) => TrackInsert::AlreadyTracked,
      Some(true) => TrackInsert::Inserted { item, alert },
    })
  }

  async fn remove_tracked_item(&self, user_id: Uuid, listing_id: Uuid) -> Result<Option<bool>> {
    self
      .edit_tracked_items(user_id, move |items, _tx| {
        let before = items.len();
        items.retain(|item| item.listing_id != listing_id);
        Ok(items.len() != before)
      })
      .await
  }

  // ── Alerts ────────────────────────────────────────────────────────────────

  async fn alerts_for_user(&self, user_id: Uuid) -> Result<Vec<AlertRecord>> {
    let id_str = encode_uuid(user_id);

    let raws: Vec<RawAlert> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT id, user_id, listing_id, kind, trigger_price, status, created_at
           FROM alerts
           WHERE user_id = ?1
           ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawAlert {
              id:            row.get(0)?,
              user_id:       row.get(1)?,
              listing_id:    row.get(2)?,
              kind:          row.get(3)?,
              trigger_price: row.get(4)?,
              status:        row.get(5)?,
              created_at:    row.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAlert::into_alert).collect()
  }

  async fn delete_alert(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);

    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM alerts WHERE id = ?1", rusqlite::params![id_str])?)
      })
      .await?;

    Ok(deleted > 0)
  }
}
