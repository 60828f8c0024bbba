//! SQL schema for the pricescout SQLite store.
//!
//! Executed once at connection startup. `foreign_keys` is per connection and
//! must be on for the cascades below to fire.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS products (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    name_key    TEXT NOT NULL UNIQUE,   -- trimmed, lower-cased name
    image_url   TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS store_listings (
    id            TEXT PRIMARY KEY,
    product_id    TEXT NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    store_name    TEXT NOT NULL,
    price         REAL NOT NULL,
    currency      TEXT NOT NULL,
    url           TEXT,
    image_url     TEXT,
    last_updated  TEXT NOT NULL,
    UNIQUE (product_id, store_name)
);

-- Append-only. Rows leave only through the listing cascade.
CREATE TABLE IF NOT EXISTS price_history (
    id           TEXT PRIMARY KEY,
    listing_id   TEXT NOT NULL REFERENCES store_listings(id) ON DELETE CASCADE,
    price        REAL NOT NULL,
    recorded_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id             TEXT PRIMARY KEY,
    name           TEXT NOT NULL,
    email          TEXT,
    created_at     TEXT NOT NULL,
    tracked_items  TEXT NOT NULL DEFAULT '[]'   -- JSON array of TrackedItem
);

-- No foreign key on listing_id: alerts outlive the listings they watch.
CREATE TABLE IF NOT EXISTS alerts (
    id             TEXT PRIMARY KEY,
    user_id        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    listing_id     TEXT NOT NULL,
    kind           TEXT NOT NULL,   -- 'price_drop' | 'price_rise' | 'back_in_stock'
    trigger_price  REAL NOT NULL,
    status         TEXT NOT NULL,   -- 'active' | 'triggered' | 'disabled'
    created_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS listings_product_idx ON store_listings(product_id);
CREATE INDEX IF NOT EXISTS history_listing_idx  ON price_history(listing_id, recorded_at);
CREATE INDEX IF NOT EXISTS alerts_user_idx      ON alerts(user_id);

PRAGMA user_version = 1;
";
