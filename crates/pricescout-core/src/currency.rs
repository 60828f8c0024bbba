//! Static currency conversion into the base currency.
//!
//! Rates are fixed multipliers, not live FX. A code missing from the table is
//! passed through unconverted, so a price in an unknown currency is compared
//! as though it were already in the base currency.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The currency every `price_normalized` is expressed in by default.
pub const DEFAULT_BASE: &str = "KES";

/// Multipliers from a currency code into the base currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyTable {
  #[serde(default = "default_base")]
  pub base:  String,
  /// Code → multiplier. The base currency is implicitly `1.0`.
  #[serde(default = "default_rates")]
  pub rates: BTreeMap<String, f64>,
}

fn default_base() -> String { DEFAULT_BASE.to_owned() }

fn default_rates() -> BTreeMap<String, f64> {
  BTreeMap::from([
    ("KES".to_owned(), 1.0),
    ("USD".to_owned(), 150.0),
    ("EUR".to_owned(), 165.0),
  ])
}

impl Default for CurrencyTable {
  fn default() -> Self {
    Self { base: default_base(), rates: default_rates() }
  }
}

impl CurrencyTable {
  /// Canonical form of a currency code: trimmed, upper-case, with the
  /// Kenyan shilling spellings folded into `KES`.
  pub fn canonical_code(raw: &str) -> String {
    let code = raw.trim().trim_end_matches('.').to_uppercase();
    match code.as_str() {
      "KSH" | "KSHS" => "KES".to_owned(),
      _ => code,
    }
  }

  /// Multiplier for `code`, if the table knows it.
  pub fn rate(&self, code: &str) -> Option<f64> {
    if code.eq_ignore_ascii_case(&self.base) {
      return Some(1.0);
    }
    self
      .rates
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(code))
      .map(|(_, rate)| *rate)
      .filter(|rate| rate.is_finite() && *rate > 0.0)
  }

  /// Convert `price` in `code` into the base currency.
  pub fn to_base(&self, price: f64, code: &str) -> f64 {
    match self.rate(code) {
      Some(rate) => price * rate,
      None => price,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_table_converts_known_codes() {
    let table = CurrencyTable::default();
    assert_eq!(table.to_base(10.0, "USD"), 1_500.0);
    assert_eq!(table.to_base(2.0, "eur"), 330.0);
    assert_eq!(table.to_base(12_500.0, "KES"), 12_500.0);
  }

  #[test]
  fn unknown_code_passes_through() {
    let table = CurrencyTable::default();
    assert_eq!(table.rate("GBP"), None);
    assert_eq!(table.to_base(42.0, "GBP"), 42.0);
  }

  #[test]
  fn base_is_identity_even_when_absent_from_rates() {
    let table = CurrencyTable { base: "USD".into(), rates: BTreeMap::new() };
    assert_eq!(table.to_base(9.5, "usd"), 9.5);
  }

  #[test]
  fn canonical_code_folds_shilling_spellings() {
    assert_eq!(CurrencyTable::canonical_code(" ksh "), "KES");
    assert_eq!(CurrencyTable::canonical_code("KShs."), "KES");
    assert_eq!(CurrencyTable::canonical_code("usd"), "USD");
  }
}
