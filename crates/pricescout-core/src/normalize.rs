//! Raw source record → canonical [`Listing`].
//!
//! Each canonical field has an ordered list of candidate paths into the raw
//! record. The first candidate holding a usable scalar wins; nothing here
//! fails, a record with nothing usable becomes a listing full of defaults.

use serde_json::Value;

use crate::{
  currency::CurrencyTable,
  listing::{Listing, RawListing},
};

pub const UNKNOWN_PRODUCT: &str = "Unknown Product";
pub const UNKNOWN_STORE: &str = "Unknown Store";

// ─── Extraction rules ────────────────────────────────────────────────────────

/// Candidate paths per canonical field, highest priority first.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionRules {
  pub name:     &'static [&'static str],
  pub price:    &'static [&'static str],
  pub currency: &'static [&'static str],
  pub store:    &'static [&'static str],
  pub image:    &'static [&'static str],
  pub url:      &'static [&'static str],
  pub rating:   &'static [&'static str],
}

/// Field names seen across the marketplaces we aggregate.
pub const DEFAULT_RULES: ExtractionRules = ExtractionRules {
  name:     &["name", "title", "Product_Name", "Listing_Product_Name", "goods_name"],
  price:    &["price", "price.value", "Listing_Price", "minPrice", "sale_price", "currentPrice"],
  currency: &["currency", "price.currency", "Listing_Currency", "currencyCode"],
  store:    &["store", "Listing_Store_Name", "storeName"],
  image:    &[
    "image",
    "imageUrl",
    "img",
    "image.imageUrl",
    "thumbnailImages.0.imageUrl",
    "Listing_Image_URL",
    "Product_Image_URL",
  ],
  url:      &["url", "link", "href", "itemWebUrl", "Listing_URL"],
  rating:   &["rating", "reviewStar", "stars"],
};

impl ExtractionRules {
  /// First candidate that resolves to a number or a non-blank string.
  fn first<'a>(candidates: &[&str], raw: &'a RawListing) -> Option<&'a Value> {
    candidates
      .iter()
      .filter_map(|path| raw.lookup(path))
      .find(|value| match value {
        Value::Number(_) => true,
        Value::String(s) => !s.trim().is_empty(),
        _ => false,
      })
  }

  fn first_text(candidates: &[&str], raw: &RawListing) -> Option<String> {
    Self::first(candidates, raw).map(|value| match value {
      Value::String(s) => s.trim().to_owned(),
      other => other.to_string(),
    })
  }
}

// ─── Normalizer ──────────────────────────────────────────────────────────────

/// Maps raw records into [`Listing`]s and converts prices into the base
/// currency of its [`CurrencyTable`].
#[derive(Debug, Clone)]
pub struct Normalizer {
  rules:      ExtractionRules,
  currencies: CurrencyTable,
}

impl Default for Normalizer {
  fn default() -> Self { Self::new(CurrencyTable::default()) }
}

impl Normalizer {
  pub fn new(currencies: CurrencyTable) -> Self {
    Self { rules: DEFAULT_RULES, currencies }
  }

  pub fn with_rules(mut self, rules: ExtractionRules) -> Self {
    self.rules = rules;
    self
  }

  pub fn currencies(&self) -> &CurrencyTable { &self.currencies }

  /// Normalize one record produced by the source called `source`.
  pub fn normalize(&self, raw: &RawListing, source: &str) -> Listing {
    let rules = &self.rules;

    let name = ExtractionRules::first_text(rules.name, raw)
      .unwrap_or_else(|| UNKNOWN_PRODUCT.to_owned());

    let price = ExtractionRules::first(rules.price, raw)
      .map(parse_price)
      .unwrap_or(0.0);

    let currency = ExtractionRules::first_text(rules.currency, raw)
      .map(|code| CurrencyTable::canonical_code(&code))
      .filter(|code| !code.is_empty())
      .unwrap_or_else(|| self.currencies.base.clone());

    let store = ExtractionRules::first_text(rules.store, raw)
      .or_else(|| Some(source.trim().to_owned()).filter(|s| !s.is_empty()))
      .unwrap_or_else(|| UNKNOWN_STORE.to_owned());

    let rating = ExtractionRules::first(rules.rating, raw).and_then(parse_rating);

    Listing {
      price_normalized: self.currencies.to_base(price, &currency),
      name,
      price,
      currency,
      store,
      image_url: ExtractionRules::first_text(rules.image, raw).map(absolute_url),
      url: ExtractionRules::first_text(rules.url, raw).map(absolute_url),
      rating,
    }
  }

  /// Normalize a whole batch from one source.
  pub fn normalize_all(&self, raws: &[RawListing], source: &str) -> Vec<Listing> {
    raws.iter().map(|raw| self.normalize(raw, source)).collect()
  }
}

// ─── Field parsers ───────────────────────────────────────────────────────────

/// Price from a number or a loosely formatted string such as `"KSh 12,500"`
/// or `"$1,299.99"`. Everything but digits and the decimal point is dropped.
/// Unparseable, negative and non-finite values resolve to `0.0`.
pub fn parse_price(value: &Value) -> f64 {
  let parsed = match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => {
      let digits: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
      // "KSh. 12,500" leaves a stray leading dot from the currency marker.
      digits.trim_start_matches('.').parse::<f64>().ok()
    }
    _ => None,
  };

  parsed.filter(|p| p.is_finite() && *p >= 0.0).unwrap_or(0.0)
}

fn parse_rating(value: &Value) -> Option<f64> {
  let rating = match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse::<f64>().ok(),
    _ => None,
  }?;
  (rating.is_finite() && rating >= 0.0).then_some(rating)
}

fn absolute_url(url: String) -> String {
  if url.starts_with("http://") || url.starts_with("https://") {
    url
  } else if let Some(rest) = url.strip_prefix("//") {
    format!("https://{rest}")
  } else {
    format!("https://{url}")
  }
}
