//! Paginated list controller with cache-first loading.
//!
//! One controller instance drives one list surface: it fetches page by page,
//! accumulates items, and coordinates the loading/error/refresh states as an
//! explicit state machine. Page 1 is served straight from the cache when a
//! valid entry exists (no spinner), with a background revalidation that only
//! replaces the displayed data when the fresh result actually differs.
//!
//! The state machine is a pure reducer over `ListEvent`s, so every transition
//! is unit-testable without any async machinery. The async driver around it
//! serializes operations through a single-slot flight token: starting a load
//! claims the slot, completion releases it, and any attempt to start while
//! claimed is rejected immediately.
//!
//! # Example
//!
//! ```ignore
//! let mut orders: ListController<OrderSummary> =
//!   ListController::new("orders", cache, fetcher)
//!     .with_params(params)
//!     .with_page_size(20);
//!
//! orders.load_initial(false).await;
//! while orders.state().has_more {
//!   orders.load_more().await;
//! }
//! ```

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use crate::api::client::ApiClient;
use crate::api::keys::{list_family_pattern, list_key};
use crate::api::{ApiResult, Page};
use crate::cache::CacheService;

/// Query parameters for a list endpoint. BTreeMap keeps them sorted, so two
/// parameter sets compare and serialize by content, never by identity.
pub type ListParams = BTreeMap<String, String>;

// ============================================================================
// State machine
// ============================================================================

/// Where the controller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListPhase {
  Idle,
  LoadingInitial,
  Ready,
  LoadingMore,
  Refreshing,
}

/// Observable state of one list surface.
///
/// `items` grows monotonically through `MoreLoaded` only; every other
/// data-bearing event replaces it with a fresh single-page result. `error`
/// is an overlay: it never clears the last good data.
#[derive(Debug, Clone)]
pub struct ListState<T> {
  pub items: Vec<T>,
  pub page: u64,
  pub has_more: bool,
  pub total: u64,
  pub phase: ListPhase,
  pub error: Option<String>,
}

impl<T> Default for ListState<T> {
  fn default() -> Self {
    Self {
      items: Vec::new(),
      page: 1,
      has_more: false,
      total: 0,
      phase: ListPhase::Idle,
      error: None,
    }
  }
}

impl<T> ListState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self.phase, ListPhase::LoadingInitial)
  }

  pub fn is_loading_more(&self) -> bool {
    matches!(self.phase, ListPhase::LoadingMore)
  }

  pub fn is_refreshing(&self) -> bool {
    matches!(self.phase, ListPhase::Refreshing)
  }
}

/// Events driving the state machine.
#[derive(Debug)]
pub enum ListEvent<T> {
  /// Initial fetch started with no usable cache entry
  InitialStarted,
  /// Page 1 served synchronously from cache
  CacheServed(Page<T>),
  /// Page 1 arrived from the network (initial load or refresh)
  PageLoaded(Page<T>),
  /// Next-page fetch started
  MoreStarted,
  /// Next page arrived; items are appended, not replaced
  MoreLoaded(Page<T>),
  /// Refresh of page 1 started; accumulated data stays visible
  RefreshStarted,
  /// Background revalidation of page 1 completed
  Revalidated(Page<T>),
  /// A fetch failed; last good data is preserved
  Failed(String),
  /// Parameters changed; drop everything
  Reset,
}

/// Pure transition function: current state + event -> next state.
pub fn reduce<T: Clone + PartialEq>(state: ListState<T>, event: ListEvent<T>) -> ListState<T> {
  match event {
    ListEvent::InitialStarted => ListState {
      phase: ListPhase::LoadingInitial,
      error: None,
      ..state
    },
    ListEvent::CacheServed(page) | ListEvent::PageLoaded(page) => ListState {
      items: page.items,
      page: page.meta.page,
      has_more: page.meta.has_more,
      total: page.meta.total,
      phase: ListPhase::Ready,
      error: None,
    },
    ListEvent::MoreStarted => ListState {
      phase: ListPhase::LoadingMore,
      ..state
    },
    ListEvent::MoreLoaded(page) => {
      let mut items = state.items;
      items.extend(page.items);
      ListState {
        items,
        page: page.meta.page,
        has_more: page.meta.has_more,
        total: page.meta.total,
        phase: ListPhase::Ready,
        error: None,
      }
    }
    ListEvent::RefreshStarted => ListState {
      phase: ListPhase::Refreshing,
      ..state
    },
    ListEvent::Revalidated(page) => {
      // Only meaningful while still showing the first page; once the user
      // has accumulated more pages a page-1 snapshot must not clobber them.
      // The displayed data is replaced only on structural inequality.
      if state.page != 1 || state.items == page.items {
        state
      } else {
        ListState {
          items: page.items,
          page: page.meta.page,
          has_more: page.meta.has_more,
          total: page.meta.total,
          phase: state.phase,
          error: state.error,
        }
      }
    }
    ListEvent::Failed(message) => ListState {
      phase: ListPhase::Ready,
      error: Some(message),
      ..state
    },
    ListEvent::Reset => ListState::default(),
  }
}

// ============================================================================
// Flight slot
// ============================================================================

/// Non-blocking mutex with a capacity of one: claiming succeeds at most once
/// until the guard drops.
#[derive(Debug, Default)]
struct FlightSlot {
  claimed: Arc<AtomicBool>,
}

struct FlightGuard {
  claimed: Arc<AtomicBool>,
}

impl FlightSlot {
  fn try_claim(&self) -> Option<FlightGuard> {
    if self
      .claimed
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
    {
      Some(FlightGuard {
        claimed: Arc::clone(&self.claimed),
      })
    } else {
      None
    }
  }

  fn is_claimed(&self) -> bool {
    self.claimed.load(Ordering::Acquire)
  }
}

impl Drop for FlightGuard {
  fn drop(&mut self) {
    // Released on success and failure alike
    self.claimed.store(false, Ordering::Release);
  }
}

// ============================================================================
// Page fetcher seam
// ============================================================================

/// Source of pages for one endpoint. Implemented by the API client for
/// production and by scripted fakes in tests.
#[async_trait]
pub trait PageFetcher<T>: Send + Sync {
  async fn fetch_page(&self, params: &ListParams, page: u64, limit: u64) -> ApiResult<Page<T>>;
}

/// `PageFetcher` backed by a list endpoint of the management API.
pub struct EndpointFetcher<T> {
  client: ApiClient,
  endpoint: String,
  _marker: PhantomData<fn() -> T>,
}

impl<T> EndpointFetcher<T> {
  pub fn new(client: ApiClient, endpoint: impl Into<String>) -> Self {
    Self {
      client,
      endpoint: endpoint.into(),
      _marker: PhantomData,
    }
  }
}

#[async_trait]
impl<T: DeserializeOwned + Send + Sync + 'static> PageFetcher<T> for EndpointFetcher<T> {
  async fn fetch_page(&self, params: &ListParams, page: u64, limit: u64) -> ApiResult<Page<T>> {
    self
      .client
      .get_page(&self.endpoint, params, page, limit)
      .await
  }
}

// ============================================================================
// Controller
// ============================================================================

/// Async driver around the list state machine.
pub struct ListController<T> {
  endpoint: String,
  params: ListParams,
  page_size: u64,
  ttl: Duration,
  cache: Arc<CacheService>,
  fetcher: Arc<dyn PageFetcher<T>>,
  state: ListState<T>,
  flight: FlightSlot,
  reval_rx: Option<mpsc::UnboundedReceiver<Page<T>>>,
  refetch_on_foreground: bool,
}

impl<T> ListController<T>
where
  T: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
{
  pub fn new(
    endpoint: impl Into<String>,
    cache: Arc<CacheService>,
    fetcher: Arc<dyn PageFetcher<T>>,
  ) -> Self {
    Self {
      endpoint: endpoint.into(),
      params: ListParams::new(),
      page_size: 20,
      ttl: Duration::from_secs(300),
      cache,
      fetcher,
      state: ListState::default(),
      flight: FlightSlot::default(),
      reval_rx: None,
      refetch_on_foreground: false,
    }
  }

  pub fn with_params(mut self, params: ListParams) -> Self {
    self.params = params;
    self
  }

  pub fn with_page_size(mut self, page_size: u64) -> Self {
    self.page_size = page_size;
    self
  }

  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  /// Re-run `load_initial` when the surface returns to the foreground.
  pub fn with_refetch_on_foreground(mut self, enabled: bool) -> Self {
    self.refetch_on_foreground = enabled;
    self
  }

  pub fn state(&self) -> &ListState<T> {
    &self.state
  }

  pub fn items(&self) -> &[T] {
    &self.state.items
  }

  pub fn error(&self) -> Option<&str> {
    self.state.error.as_deref()
  }

  pub fn params(&self) -> &ListParams {
    &self.params
  }

  fn apply(&mut self, event: ListEvent<T>) {
    let state = std::mem::take(&mut self.state);
    self.state = reduce(state, event);
  }

  /// Load page 1, serving a valid cache entry without any loading state.
  ///
  /// On a cache hit the controller is `Ready` before this returns and a
  /// background fetch revalidates the entry; apply its result via [`poll`].
  /// On a miss (or `force_refresh`) the fetch happens inline and populates
  /// the cache. No-op while another load is in flight.
  ///
  /// [`poll`]: ListController::poll
  pub async fn load_initial(&mut self, force_refresh: bool) {
    let Some(_guard) = self.flight.try_claim() else {
      return;
    };

    let key = list_key(&self.endpoint, &self.params, 1, self.page_size);

    if !force_refresh {
      if let Some(cached) = self.cache.get::<Page<T>>(&key) {
        self.apply(ListEvent::CacheServed(cached));
        self.spawn_revalidation(key);
        return;
      }
    }

    self.apply(ListEvent::InitialStarted);
    match self.fetcher.fetch_page(&self.params, 1, self.page_size).await {
      Ok(page) => {
        self.cache.set(&key, &page, self.ttl);
        self.apply(ListEvent::PageLoaded(page));
      }
      Err(e) => self.apply(ListEvent::Failed(e.to_string())),
    }
  }

  /// Fetch the next page and append it. No-op when there is nothing more or
  /// another load is in flight.
  pub async fn load_more(&mut self) {
    if !self.state.has_more {
      return;
    }
    let Some(_guard) = self.flight.try_claim() else {
      return;
    };

    self.apply(ListEvent::MoreStarted);
    let next = self.state.page + 1;
    let key = list_key(&self.endpoint, &self.params, next, self.page_size);

    match self
      .fetcher
      .fetch_page(&self.params, next, self.page_size)
      .await
    {
      Ok(page) => {
        self.cache.set(&key, &page, self.ttl);
        self.apply(ListEvent::MoreLoaded(page));
      }
      Err(e) => self.apply(ListEvent::Failed(e.to_string())),
    }
  }

  /// Force a re-fetch of page 1, bypassing cache staleness checks.
  /// Accumulated data stays visible until the new page arrives.
  pub async fn refresh(&mut self) {
    let Some(_guard) = self.flight.try_claim() else {
      return;
    };

    self.apply(ListEvent::RefreshStarted);
    let key = list_key(&self.endpoint, &self.params, 1, self.page_size);

    match self.fetcher.fetch_page(&self.params, 1, self.page_size).await {
      Ok(page) => {
        self.cache.set(&key, &page, self.ttl);
        self.apply(ListEvent::PageLoaded(page));
      }
      Err(e) => self.apply(ListEvent::Failed(e.to_string())),
    }
  }

  /// Replace the parameter set: invalidate every cached page of this
  /// endpoint, clear accumulated data, and load page 1 of the new set.
  pub async fn refetch(&mut self, new_params: ListParams) {
    self.params = new_params;
    self.cache.invalidate_pattern(&list_family_pattern(&self.endpoint));
    self.reval_rx = None;
    self.apply(ListEvent::Reset);
    self.load_initial(false).await;
  }

  /// Adopt a (possibly) changed parameter set. Compares by value - a
  /// rebuilt but equal set of parameters does not reset anything.
  pub async fn set_params(&mut self, new_params: ListParams) {
    if new_params == self.params {
      return;
    }
    self.refetch(new_params).await;
  }

  /// Surface returned to the foreground. Re-runs `load_initial` with the
  /// last-used parameters when enabled and nothing is in flight.
  pub async fn on_foreground(&mut self) {
    if !self.refetch_on_foreground || self.flight.is_claimed() {
      return;
    }
    self.load_initial(false).await;
  }

  /// Apply a background revalidation result, if one has arrived.
  ///
  /// Returns `true` if the displayed data changed. Revalidation failures
  /// never reach this point - a successful cached render is not downgraded
  /// by a failed refresh.
  pub fn poll(&mut self) -> bool {
    let Some(rx) = &mut self.reval_rx else {
      return false;
    };

    match rx.try_recv() {
      Ok(page) => {
        self.reval_rx = None;
        let changed = self.state.page == 1 && self.state.items != page.items;
        self.apply(ListEvent::Revalidated(page));
        changed
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        self.reval_rx = None;
        false
      }
    }
  }

  /// Wait for the pending revalidation (if any) and apply it.
  /// Returns `true` if the displayed data changed.
  pub async fn poll_wait(&mut self) -> bool {
    let Some(rx) = &mut self.reval_rx else {
      return false;
    };

    match rx.recv().await {
      Some(page) => {
        self.reval_rx = None;
        let changed = self.state.page == 1 && self.state.items != page.items;
        self.apply(ListEvent::Revalidated(page));
        changed
      }
      None => {
        self.reval_rx = None;
        false
      }
    }
  }

  fn spawn_revalidation(&mut self, key: String) {
    let (tx, rx) = mpsc::unbounded_channel();
    self.reval_rx = Some(rx);

    let fetcher = Arc::clone(&self.fetcher);
    let cache = Arc::clone(&self.cache);
    let params = self.params.clone();
    let page_size = self.page_size;
    let ttl = self.ttl;

    tokio::spawn(async move {
      match fetcher.fetch_page(&params, 1, page_size).await {
        Ok(page) => {
          cache.set(&key, &page, ttl);
          // Receiver may be gone (params changed, controller dropped)
          let _ = tx.send(page);
        }
        Err(e) => {
          // Silently discarded: the cached render stands
          debug!("Background revalidation failed: {}", e);
        }
      }
    });
  }
}
