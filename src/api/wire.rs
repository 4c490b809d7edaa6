//! Serde-deserializable types matching the management API's responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs. The server is not
//! consistent about pagination envelopes - some endpoints return flat
//! metadata fields next to `data`, others nest them under `pagination` and
//! call the item array `items` - so everything is normalized into one
//! `Page<T>` shape here.

use serde::{Deserialize, Serialize};

// ============================================================================
// Normalized page shape
// ============================================================================

/// Pagination metadata after normalization.
///
/// Serializable so whole pages can be cached as JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
  pub page: u64,
  pub limit: u64,
  pub total: u64,
  pub total_pages: u64,
  pub has_more: bool,
}

/// One fetched page of items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
  pub items: Vec<T>,
  pub meta: PageMeta,
}

// ============================================================================
// Raw list envelopes
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiPagination {
  #[serde(default)]
  pub page: Option<u64>,
  #[serde(default)]
  pub limit: Option<u64>,
  #[serde(default)]
  pub total: Option<u64>,
  #[serde(rename = "totalPages", default)]
  pub total_pages: Option<u64>,
  #[serde(rename = "hasMore", default)]
  pub has_more: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiListResponse<T> {
  // Item array: `data` on most endpoints, `items` on the rest
  #[serde(default)]
  pub data: Option<Vec<T>>,
  #[serde(default)]
  pub items: Option<Vec<T>>,

  // Flat metadata fields
  #[serde(default)]
  pub page: Option<u64>,
  #[serde(default)]
  pub limit: Option<u64>,
  #[serde(default)]
  pub total: Option<u64>,
  #[serde(rename = "totalPages", default)]
  pub total_pages: Option<u64>,
  #[serde(rename = "hasMore", default)]
  pub has_more: Option<bool>,

  // Nested variant
  #[serde(default)]
  pub pagination: Option<ApiPagination>,
}

impl<T> ApiListResponse<T> {
  /// Normalize either envelope shape into a `Page`.
  ///
  /// `requested_page` and `requested_limit` fill in whatever the server
  /// omits. `has_more` prefers the server's flag; without one it falls back
  /// to `page < total_pages` and finally to the full-page heuristic
  /// `items.len() >= limit`.
  pub fn into_page(self, requested_page: u64, requested_limit: u64) -> Page<T> {
    let items = self.data.or(self.items).unwrap_or_default();

    let nested = self.pagination;
    let pick = |flat: Option<u64>, nested_val: Option<u64>| flat.or(nested_val);

    let page = pick(self.page, nested.as_ref().and_then(|p| p.page)).unwrap_or(requested_page);
    let limit = pick(self.limit, nested.as_ref().and_then(|p| p.limit)).unwrap_or(requested_limit);
    let total =
      pick(self.total, nested.as_ref().and_then(|p| p.total)).unwrap_or(items.len() as u64);
    let total_pages = pick(
      self.total_pages,
      nested.as_ref().and_then(|p| p.total_pages),
    )
    .unwrap_or_else(|| {
      if limit == 0 {
        0
      } else {
        total.div_ceil(limit)
      }
    });

    let has_more = self
      .has_more
      .or(nested.as_ref().and_then(|p| p.has_more))
      .unwrap_or_else(|| {
        if self.total_pages.is_some()
          || nested.as_ref().map(|p| p.total_pages.is_some()).unwrap_or(false)
        {
          page < total_pages
        } else {
          items.len() as u64 >= limit
        }
      });

    Page {
      items,
      meta: PageMeta {
        page,
        limit,
        total,
        total_pages,
        has_more,
      },
    }
  }
}

// ============================================================================
// Auth endpoint
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiUser {
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiLoginResponse {
  pub token: String,
  pub user: ApiUser,
}

// ============================================================================
// Error body
// ============================================================================

/// Server-reported business errors carry a structured message in the body.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default)]
  pub error: Option<String>,
}

impl ApiErrorBody {
  /// The message to surface verbatim, if the body had one.
  pub fn into_message(self) -> Option<String> {
    self.message.or(self.error).filter(|m| !m.trim().is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn flat_envelope_normalizes() {
    let raw = r#"{"data":[1,2,3],"page":2,"limit":3,"total":7,"totalPages":3,"hasMore":true}"#;
    let resp: ApiListResponse<i32> = serde_json::from_str(raw).unwrap();
    let page = resp.into_page(2, 3);

    assert_eq!(page.items, vec![1, 2, 3]);
    assert_eq!(page.meta.page, 2);
    assert_eq!(page.meta.total, 7);
    assert_eq!(page.meta.total_pages, 3);
    assert!(page.meta.has_more);
  }

  #[test]
  fn nested_envelope_normalizes() {
    let raw = r#"{"items":[1,2],"pagination":{"page":1,"limit":2,"total":4,"totalPages":2,"hasMore":true}}"#;
    let resp: ApiListResponse<i32> = serde_json::from_str(raw).unwrap();
    let page = resp.into_page(1, 2);

    assert_eq!(page.items, vec![1, 2]);
    assert_eq!(page.meta.total, 4);
    assert!(page.meta.has_more);
  }

  #[test]
  fn has_more_falls_back_to_total_pages() {
    let raw = r#"{"data":[1,2],"page":2,"limit":2,"total":4,"totalPages":2}"#;
    let resp: ApiListResponse<i32> = serde_json::from_str(raw).unwrap();
    let page = resp.into_page(2, 2);
    assert!(!page.meta.has_more);
  }

  #[test]
  fn has_more_falls_back_to_full_page_heuristic() {
    // No metadata at all: a full page means there may be more
    let raw = r#"{"data":[1,2,3]}"#;
    let resp: ApiListResponse<i32> = serde_json::from_str(raw).unwrap();
    let page = resp.into_page(1, 3);
    assert!(page.meta.has_more);

    // A short page terminates
    let raw = r#"{"data":[1]}"#;
    let resp: ApiListResponse<i32> = serde_json::from_str(raw).unwrap();
    let page = resp.into_page(2, 3);
    assert!(!page.meta.has_more);
  }

  #[test]
  fn error_body_prefers_message_over_error() {
    let body: ApiErrorBody =
      serde_json::from_str(r#"{"message":"count first","error":"ignored"}"#).unwrap();
    assert_eq!(body.into_message().as_deref(), Some("count first"));

    let body: ApiErrorBody = serde_json::from_str(r#"{"error":"boom"}"#).unwrap();
    assert_eq!(body.into_message().as_deref(), Some("boom"));

    let body: ApiErrorBody = serde_json::from_str(r#"{"message":"  "}"#).unwrap();
    assert_eq!(body.into_message(), None);
  }
}
