//! Barcode scan resolution against the server-side item registry.
//!
//! A scanned code has three outcomes: it matches the expected item, it
//! matches a different item, or it is unknown and may be associated with
//! the current item as a registration side effect. Rapid repeated scan
//! events are collapsed by an already-processing flag: while one scan is
//! being resolved or registered, further scans are rejected immediately.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::api::types::BarcodeItem;
use crate::api::{ApiClient, ApiResult};

use super::WorkflowError;

/// Server-side item-barcode registry.
#[async_trait]
pub trait BarcodeRegistry: Send + Sync {
  /// Resolve a scanned code to an item, or `None` when unregistered.
  async fn lookup(&self, code: &str) -> ApiResult<Option<BarcodeItem>>;

  /// Associate a code with an item.
  async fn register(&self, item_id: &str, code: &str) -> ApiResult<BarcodeItem>;
}

#[async_trait]
impl BarcodeRegistry for ApiClient {
  async fn lookup(&self, code: &str) -> ApiResult<Option<BarcodeItem>> {
    self.lookup_barcode(code).await
  }

  async fn register(&self, item_id: &str, code: &str) -> ApiResult<BarcodeItem> {
    self.register_barcode(item_id, code).await
  }
}

/// Result of resolving one scan against an expected item.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
  /// The code belongs to the expected item
  Matched,
  /// The code belongs to some other item; re-scan
  WrongItem { item_id: String, name: String },
  /// The code is not in the registry; offer to associate it
  Unknown,
}

/// One scan session over a registry.
pub struct BarcodeScanner<R> {
  registry: R,
  processing: AtomicBool,
}

impl<R: BarcodeRegistry> BarcodeScanner<R> {
  pub fn new(registry: R) -> Self {
    Self {
      registry,
      processing: AtomicBool::new(false),
    }
  }

  /// Resolve a scanned code against the item the user is counting.
  pub async fn resolve(
    &self,
    code: &str,
    expected_item_id: &str,
  ) -> Result<ScanOutcome, WorkflowError> {
    let _guard = self.claim()?;

    let outcome = match self.registry.lookup(code).await? {
      Some(item) if item.item_id == expected_item_id => ScanOutcome::Matched,
      Some(item) => ScanOutcome::WrongItem {
        item_id: item.item_id,
        name: item.name,
      },
      None => ScanOutcome::Unknown,
    };

    Ok(outcome)
  }

  /// Associate an unknown code with the current item.
  pub async fn register(&self, item_id: &str, code: &str) -> Result<BarcodeItem, WorkflowError> {
    let _guard = self.claim()?;
    Ok(self.registry.register(item_id, code).await?)
  }

  fn claim(&self) -> Result<ProcessingGuard<'_>, WorkflowError> {
    if self
      .processing
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      return Err(WorkflowError::ScanInProgress);
    }
    Ok(ProcessingGuard {
      flag: &self.processing,
    })
  }
}

struct ProcessingGuard<'a> {
  flag: &'a AtomicBool,
}

impl Drop for ProcessingGuard<'_> {
  fn drop(&mut self) {
    self.flag.store(false, Ordering::Release);
  }
}
