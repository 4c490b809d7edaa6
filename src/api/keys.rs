//! Cache key construction for API queries.
//!
//! List keys are composed from (endpoint, sorted params, page, limit) so two
//! callers asking the same question share one entry regardless of parameter
//! ordering. The endpoint stays in the clear as a key-family prefix so a
//! mutating operation can invalidate every cached page of one endpoint;
//! parameters are hashed for stable, fixed-length keys.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Cache key for one page of a list query.
pub fn list_key(
  endpoint: &str,
  params: &BTreeMap<String, String>,
  page: u64,
  limit: u64,
) -> String {
  format!(
    "list:{}:{}:p{}l{}",
    endpoint,
    hash(&serialize_params(params)),
    page,
    limit
  )
}

/// Pattern matching every cached page of an endpoint, across all parameter
/// sets.
pub fn list_family_pattern(endpoint: &str) -> Regex {
  Regex::new(&format!("^list:{}:", regex::escape(endpoint))).expect("valid key pattern")
}

/// Cache key for a single entity.
pub fn entity_key(kind: &str, id: &str) -> String {
  format!("{}:{}", kind, id)
}

/// Canonical form of a parameter set: sorted by key (BTreeMap order),
/// `k=v` pairs joined by `&`.
fn serialize_params(params: &BTreeMap<String, String>) -> String {
  params
    .iter()
    .map(|(k, v)| format!("{}={}", k, v))
    .collect::<Vec<_>>()
    .join("&")
}

/// SHA256 hash for stable, fixed-length keys
fn hash(input: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(input.as_bytes());
  hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect()
  }

  #[test]
  fn insertion_order_does_not_change_key() {
    let a = params(&[("status", "pending"), ("branch", "b1")]);
    let b = params(&[("branch", "b1"), ("status", "pending")]);
    assert_eq!(list_key("orders", &a, 1, 20), list_key("orders", &b, 1, 20));
  }

  #[test]
  fn different_params_get_different_keys() {
    let a = params(&[("status", "pending")]);
    let b = params(&[("status", "completed")]);
    assert_ne!(list_key("orders", &a, 1, 20), list_key("orders", &b, 1, 20));
  }

  #[test]
  fn pages_of_one_query_get_different_keys() {
    let p = params(&[("status", "pending")]);
    assert_ne!(list_key("orders", &p, 1, 20), list_key("orders", &p, 2, 20));
  }

  #[test]
  fn family_pattern_covers_all_pages_and_params() {
    let pattern = list_family_pattern("orders");
    let a = params(&[("status", "pending")]);
    let b = params(&[]);

    assert!(pattern.is_match(&list_key("orders", &a, 1, 20)));
    assert!(pattern.is_match(&list_key("orders", &a, 7, 50)));
    assert!(pattern.is_match(&list_key("orders", &b, 1, 20)));
    assert!(!pattern.is_match(&list_key("store-products", &b, 1, 20)));
  }

  #[test]
  fn slashed_endpoints_are_escaped_in_pattern() {
    let pattern = list_family_pattern("pos/kitchen/tickets");
    let p = params(&[]);
    assert!(pattern.is_match(&list_key("pos/kitchen/tickets", &p, 1, 20)));
    assert!(!pattern.is_match(&list_key("pos/kitchen", &p, 1, 20)));
  }
}
