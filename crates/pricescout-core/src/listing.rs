//! Listing types: what flows from the sources through the matcher.
//!
//! None of these are persisted directly. A [`RawListing`] lives only until the
//! normaliser has seen it; a [`Listing`] and the [`ProductGroup`]s built from
//! it live for one aggregation run.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Raw ─────────────────────────────────────────────────────────────────────

/// One record exactly as a source adapter produced it. No schema is assumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawListing(pub Value);

impl RawListing {
  /// Resolve a dotted path (`"price.value"`, `"image.imageUrl"`). Array
  /// segments are addressed by index (`"thumbnailImages.0.imageUrl"`).
  pub fn lookup(&self, path: &str) -> Option<&Value> {
    path.split('.').try_fold(&self.0, |value, segment| match value {
      Value::Object(map) => map.get(segment),
      Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
      _ => None,
    })
  }
}

impl From<Value> for RawListing {
  fn from(value: Value) -> Self { Self(value) }
}

// ─── Normalized ──────────────────────────────────────────────────────────────

/// A normalized, per-store offer.
///
/// `price` is in `currency`; `price_normalized` is the base-currency
/// equivalent and is what cross-store comparisons and filters use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
  pub name:             String,
  pub price:            f64,
  pub currency:         String,
  pub price_normalized: f64,
  pub store:            String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub image_url:        Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub url:              Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub rating:           Option<f64>,
}

// ─── Groups ──────────────────────────────────────────────────────────────────

/// Listings believed to denote the same physical product.
///
/// The serialized shape (`{"baseProduct": …, "products": […]}`) is also the
/// wire format of out-of-process matchers. `members` always contains `base`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductGroup {
  #[serde(rename = "baseProduct")]
  pub base:    Listing,
  #[serde(rename = "products")]
  pub members: Vec<Listing>,
}

impl ProductGroup {
  /// Start a group whose only member is its base.
  pub fn new(base: Listing) -> Self {
    Self { members: vec![base.clone()], base }
  }

  /// Number of distinct stores represented in the group.
  pub fn store_count(&self) -> usize {
    let mut stores: Vec<&str> = self.members.iter().map(|l| l.store.as_str()).collect();
    stores.sort_unstable();
    stores.dedup();
    stores.len()
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn lookup_walks_objects_and_arrays() {
    let raw = RawListing(json!({
      "price": { "value": "12.50", "currency": "USD" },
      "thumbnailImages": [{ "imageUrl": "https://img.test/1.jpg" }],
    }));

    assert_eq!(raw.lookup("price.value"), Some(&json!("12.50")));
    assert_eq!(
      raw.lookup("thumbnailImages.0.imageUrl"),
      Some(&json!("https://img.test/1.jpg"))
    );
    assert_eq!(raw.lookup("thumbnailImages.3.imageUrl"), None);
    assert_eq!(raw.lookup("price.value.deeper"), None);
  }

  #[test]
  fn group_wire_shape_uses_base_product_and_products() {
    let listing = Listing {
      name:             "Tecno Spark 20".into(),
      price:            15_999.0,
      currency:         "KES".into(),
      price_normalized: 15_999.0,
      store:            "jumia".into(),
      image_url:        None,
      url:              None,
      rating:           None,
    };
    let value = serde_json::to_value(ProductGroup::new(listing)).unwrap();

    assert_eq!(value["baseProduct"]["priceNormalized"], json!(15_999.0));
    assert_eq!(value["products"].as_array().unwrap().len(), 1);
  }
}
