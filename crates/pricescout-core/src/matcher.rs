//! Record linkage: grouping listings from different stores into products.
//!
//! The in-process [`HeuristicMatcher`] works on normalized names only. It is
//! best-effort: two storage variants of a phone may end up together, two
//! spellings of the same laptop may not. Anything implementing [`Matcher`]
//! can stand in for it, including matchers that run out of process.

use std::{collections::BTreeSet, future::Future};

use crate::{
  Result,
  listing::{Listing, ProductGroup},
};

/// Similarity a listing must exceed against a group's base to join it.
pub const DEFAULT_THRESHOLD: f64 = 0.75;

/// Score for "one name's tokens appear, in order, inside the other".
const CONTAINMENT_SCORE: f64 = 0.9;
/// Score for matching leading brand/model tokens.
const SIGNATURE_SCORE: f64 = 0.8;
/// Longest brand/model signature, in tokens.
const SIGNATURE_MAX_TOKENS: usize = 4;
/// Shortest signature (and shortest contained name) that counts.
const SIGNATURE_MIN_TOKENS: usize = 2;

const STOP_WORDS: &[&str] = &[
  "new", "original", "with", "and", "the", "a", "an", "of", "by", "smartphone",
  "mobile", "phone",
];
const STOP_PHRASES: &[[&str; 2]] = &[["for", "sale"], ["dual", "sim"]];

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Groups one run's merged listings into products.
///
/// Called once per aggregation run with the full batch. Implementations must
/// return every input listing in exactly one group; an `Err` means the
/// capability was unavailable and the run proceeds with no groups.
pub trait Matcher: Send + Sync {
  fn group<'a>(
    &'a self,
    listings: &'a [Listing],
  ) -> impl Future<Output = Result<Vec<ProductGroup>>> + Send + 'a;
}

/// Name-similarity matcher; the default backend.
#[derive(Debug, Clone, Copy)]
pub struct HeuristicMatcher {
  pub threshold: f64,
}

impl Default for HeuristicMatcher {
  fn default() -> Self { Self { threshold: DEFAULT_THRESHOLD } }
}

impl Matcher for HeuristicMatcher {
  async fn group(&self, listings: &[Listing]) -> Result<Vec<ProductGroup>> {
    Ok(group_listings(listings, self.threshold))
  }
}

// ─── Name normalization ──────────────────────────────────────────────────────

/// Reduce a scraped product title to comparable tokens.
///
/// Lower-cases, drops everything outside `[a-z0-9]`, whitespace, `-` and `.`
/// (so `15.6` survives), removes filler words and collapses whitespace and
/// hyphen runs into single spaces.
pub fn normalize_name(name: &str) -> String {
  let cleaned: String = name
    .to_lowercase()
    .chars()
    .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || *c == '-' || *c == '.')
    .collect();

  let tokens: Vec<&str> = cleaned
    .split(|c: char| c.is_whitespace() || c == '-')
    .filter(|t| !t.is_empty() && !t.chars().all(|c| c == '.'))
    .collect();

  let mut kept: Vec<&str> = Vec::with_capacity(tokens.len());
  let mut i = 0;
  while i < tokens.len() {
    let pair = tokens.get(i..i + 2);
    if pair.is_some_and(|p| STOP_PHRASES.iter().any(|phrase| phrase[..] == *p)) {
      i += 2;
      continue;
    }
    if !STOP_WORDS.contains(&tokens[i]) {
      kept.push(tokens[i]);
    }
    i += 1;
  }

  kept.join(" ")
}

// ─── Similarity ──────────────────────────────────────────────────────────────

/// Similarity in `[0, 1]` between two *normalized* names.
///
/// The maximum of three signals: token-boundary containment of the shorter
/// name in the longer, token-set overlap (shared tokens over the larger
/// set), and equality of the leading brand/model tokens.
pub fn similarity(a: &str, b: &str) -> f64 {
  if a.is_empty() || b.is_empty() {
    return 0.0;
  }
  if a == b {
    return 1.0;
  }

  let ta: Vec<&str> = a.split(' ').collect();
  let tb: Vec<&str> = b.split(' ').collect();

  containment(&ta, &tb)
    .max(token_overlap(&ta, &tb))
    .max(signature(&ta, &tb))
}

fn containment(ta: &[&str], tb: &[&str]) -> f64 {
  let (short, long) = if ta.len() <= tb.len() { (ta, tb) } else { (tb, ta) };
  if short.len() < SIGNATURE_MIN_TOKENS {
    return 0.0;
  }
  let contained = long.windows(short.len()).any(|window| window == short);
  if contained { CONTAINMENT_SCORE } else { 0.0 }
}

fn token_overlap(ta: &[&str], tb: &[&str]) -> f64 {
  let sa: BTreeSet<&str> = ta.iter().copied().collect();
  let sb: BTreeSet<&str> = tb.iter().copied().collect();
  let larger = sa.len().max(sb.len());
  if larger == 0 {
    return 0.0;
  }
  sa.intersection(&sb).count() as f64 / larger as f64
}

fn signature(ta: &[&str], tb: &[&str]) -> f64 {
  let k = SIGNATURE_MAX_TOKENS.min(ta.len()).min(tb.len());
  if k >= SIGNATURE_MIN_TOKENS && ta[..k] == tb[..k] {
    SIGNATURE_SCORE
  } else {
    0.0
  }
}

// ─── Grouping ────────────────────────────────────────────────────────────────

/// Greedy single pass over `listings` in input order.
///
/// A listing joins the group whose base it is most similar to, provided the
/// similarity exceeds `threshold`; ties go to the earlier group. Otherwise it
/// becomes the base of a new group.
pub fn group_listings(listings: &[Listing], threshold: f64) -> Vec<ProductGroup> {
  let mut groups: Vec<(String, ProductGroup)> = Vec::new();

  for listing in listings {
    let key = normalize_name(&listing.name);

    let mut best: Option<(usize, f64)> = None;
    for (i, (base_key, _)) in groups.iter().enumerate() {
      let score = similarity(&key, base_key);
      if score > threshold && best.is_none_or(|(_, top)| score > top) {
        best = Some((i, score));
      }
    }

    match best.and_then(|(i, _)| groups.get_mut(i)) {
      Some((_, group)) => group.members.push(listing.clone()),
      None => groups.push((key, ProductGroup::new(listing.clone()))),
    }
  }

  groups.into_iter().map(|(_, group)| group).collect()
}
