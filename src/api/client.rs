//! HTTP client for the management API.
//!
//! A thin wrapper over reqwest that attaches the session's auth and scoping
//! headers to every request and normalizes the server's failure modes into
//! `ApiError`. All business logic lives server-side; this client only moves
//! payloads.

use reqwest::{Client, StatusCode, Url};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::session::{Session, SessionStore, SessionUser};

use super::types::{BarcodeItem, PurchaseOrder};
use super::wire::{ApiErrorBody, ApiListResponse, ApiLoginResponse, Page};

/// Failure modes of an API call.
///
/// Transport errors carry no server response; `Api` errors surface the
/// server's message verbatim; 401 is normalized into `Unauthorized` after
/// the stored credentials have been cleared.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("Network error: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("{message}")]
  Api { status: StatusCode, message: String },

  #[error("Session expired, please log in again")]
  Unauthorized,

  #[error("Invalid API URL: {0}")]
  BadUrl(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Management API client wrapper
#[derive(Clone)]
pub struct ApiClient {
  http: Client,
  api_root: Url,
  token: Option<String>,
  business_id: Option<String>,
  branch_id: Option<String>,
  session_store: Option<SessionStore>,
}

impl ApiClient {
  /// Create a client for the given base URL (without the `/api` prefix).
  pub fn new(base_url: &str) -> ApiResult<Self> {
    let api_root = Url::parse(&format!("{}/api/", base_url.trim_end_matches('/')))
      .map_err(|e| ApiError::BadUrl(format!("{}: {}", base_url, e)))?;

    let http = Client::builder()
      .user_agent(concat!("boh/", env!("CARGO_PKG_VERSION")))
      .build()?;

    Ok(Self {
      http,
      api_root,
      token: None,
      business_id: None,
      branch_id: None,
      session_store: None,
    })
  }

  /// Attach the credentials and business/branch scoping of a session.
  pub fn with_session(mut self, session: &Session) -> Self {
    self.token = Some(session.token.clone());
    self.business_id = session.business_id.clone();
    self.branch_id = session.branch_id.clone();
    self
  }

  /// Use a bare token (environment override, no business/branch scoping).
  pub fn with_token(mut self, token: String) -> Self {
    self.token = Some(token);
    self
  }

  /// Register the store whose credentials are wiped when the server reports
  /// the session expired.
  pub fn with_session_store(mut self, store: SessionStore) -> Self {
    self.session_store = Some(store);
    self
  }

  fn endpoint_url(&self, path: &str) -> ApiResult<Url> {
    self
      .api_root
      .join(path.trim_start_matches('/'))
      .map_err(|e| ApiError::BadUrl(format!("{}: {}", path, e)))
  }

  fn apply_headers(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    let mut req = req;
    if let Some(token) = &self.token {
      req = req.header("Authorization", format!("Bearer {}", token));
    }
    if let Some(business) = &self.business_id {
      req = req.header("X-Business-Id", business);
    }
    if let Some(branch) = &self.branch_id {
      req = req.header("X-Branch-Id", branch);
    }
    req
  }

  /// GET a JSON resource.
  pub async fn get<T: DeserializeOwned>(
    &self,
    path: &str,
    query: &[(String, String)],
  ) -> ApiResult<T> {
    let url = self.endpoint_url(path)?;
    debug!(%url, "GET");

    let response = self
      .apply_headers(self.http.get(url))
      .query(query)
      .send()
      .await?;

    self.decode(response).await
  }

  /// POST a JSON body and decode the JSON response.
  pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
    &self,
    path: &str,
    body: &B,
  ) -> ApiResult<T> {
    let url = self.endpoint_url(path)?;
    debug!(%url, "POST");

    let response = self
      .apply_headers(self.http.post(url))
      .json(body)
      .send()
      .await?;

    self.decode(response).await
  }

  async fn decode<T: DeserializeOwned>(&self, response: reqwest::Response) -> ApiResult<T> {
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED {
      // The token is dead either way; make the next run start from login
      if let Some(store) = &self.session_store {
        if let Err(e) = store.clear() {
          warn!("Failed to clear expired session: {}", e);
        }
      }
      return Err(ApiError::Unauthorized);
    }

    if !status.is_success() {
      let message = response
        .json::<ApiErrorBody>()
        .await
        .ok()
        .and_then(ApiErrorBody::into_message)
        .unwrap_or_else(|| format!("Request failed with status {}", status));
      return Err(ApiError::Api { status, message });
    }

    Ok(response.json::<T>().await?)
  }

  // ==========================================================================
  // Auth
  // ==========================================================================

  /// Log in and build a session from the response. Business/branch selection
  /// is left to the caller.
  pub async fn login(&self, email: &str, password: &str) -> ApiResult<Session> {
    let body = serde_json::json!({ "email": email, "password": password });
    let resp: ApiLoginResponse = self.post("business-auth/login", &body).await?;

    Ok(Session {
      token: resp.token,
      user: SessionUser {
        id: resp.user.id,
        name: resp.user.name,
        email: resp.user.email,
      },
      business_id: None,
      branch_id: None,
    })
  }

  // ==========================================================================
  // Paginated lists
  // ==========================================================================

  /// Fetch one page of a list endpoint, normalizing either envelope shape.
  pub async fn get_page<T: DeserializeOwned>(
    &self,
    endpoint: &str,
    params: &BTreeMap<String, String>,
    page: u64,
    limit: u64,
  ) -> ApiResult<Page<T>> {
    let mut query: Vec<(String, String)> = params
      .iter()
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect();
    query.push(("page".to_string(), page.to_string()));
    query.push(("limit".to_string(), limit.to_string()));

    let resp: ApiListResponse<T> = self.get(endpoint, &query).await?;
    Ok(resp.into_page(page, limit))
  }

  // ==========================================================================
  // Orders
  // ==========================================================================

  /// Cancel an order. Destructive; callers confirm first.
  pub async fn cancel_order(&self, order_id: &str) -> ApiResult<()> {
    let _: serde_json::Value = self
      .post(&format!("orders/{}/cancel", order_id), &serde_json::json!({}))
      .await?;
    Ok(())
  }

  // ==========================================================================
  // Purchase orders
  // ==========================================================================

  pub async fn get_purchase_order(&self, id: &str) -> ApiResult<PurchaseOrder> {
    self.get(&format!("purchase-orders/{}", id), &[]).await
  }

  pub async fn cancel_purchase_order(&self, id: &str) -> ApiResult<PurchaseOrder> {
    self
      .post(&format!("purchase-orders/{}/cancel", id), &serde_json::json!({}))
      .await
  }

  // ==========================================================================
  // Barcode registry
  // ==========================================================================

  /// Look a scanned code up in the item-barcode registry.
  ///
  /// Returns `None` when the code is unknown, so the caller can offer to
  /// register it.
  pub async fn lookup_barcode(&self, code: &str) -> ApiResult<Option<BarcodeItem>> {
    match self
      .get::<BarcodeItem>(&format!("inventory/items/barcode/{}", code), &[])
      .await
    {
      Ok(item) => Ok(Some(item)),
      Err(ApiError::Api { status, .. }) if status == StatusCode::NOT_FOUND => Ok(None),
      Err(e) => Err(e),
    }
  }

  /// Associate a scanned code with an inventory item.
  pub async fn register_barcode(&self, item_id: &str, code: &str) -> ApiResult<BarcodeItem> {
    let body = serde_json::json!({ "barcode": code });
    self
      .post(&format!("inventory/items/{}/barcodes", item_id), &body)
      .await
  }
}

impl std::fmt::Debug for ApiClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ApiClient")
      .field("api_root", &self.api_root)
      .field("business_id", &self.business_id)
      .field("branch_id", &self.branch_id)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn api_root_gets_api_prefix() {
    let client = ApiClient::new("https://api.example.test").unwrap();
    assert_eq!(client.api_root.as_str(), "https://api.example.test/api/");

    // Trailing slash on the configured URL makes no difference
    let client = ApiClient::new("https://api.example.test/").unwrap();
    assert_eq!(client.api_root.as_str(), "https://api.example.test/api/");
  }

  #[test]
  fn endpoint_urls_resolve_under_api_root() {
    let client = ApiClient::new("https://api.example.test").unwrap();
    let url = client.endpoint_url("business-auth/login").unwrap();
    assert_eq!(url.as_str(), "https://api.example.test/api/business-auth/login");

    // Leading slash would otherwise escape the /api prefix
    let url = client.endpoint_url("/orders").unwrap();
    assert_eq!(url.as_str(), "https://api.example.test/api/orders");
  }

  #[test]
  fn bad_url_is_reported() {
    assert!(matches!(
      ApiClient::new("not a url"),
      Err(ApiError::BadUrl(_))
    ));
  }
}
