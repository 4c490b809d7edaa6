//! Purchase-order counting and receiving workflow.
//!
//! The server owns the order lifecycle (`pending -> counted -> received`,
//! with `cancelled` from either of the first two); the client's job is to
//! collect and pre-validate each transition's payload so a submission that
//! would obviously fail never leaves the device. The server remains the
//! final arbiter and may still reject.

mod barcode;
mod counting;
mod receiving;

pub use barcode::{BarcodeRegistry, BarcodeScanner, ScanOutcome};
pub use counting::{CountSubmission, CountingIssue, CountingLine, CountingSheet};
pub use receiving::{ReceiveSubmission, ReceivingIssue, ReceivingLine, ReceivingSheet};

use thiserror::Error;

use crate::api::types::PurchaseOrderStatus;
use crate::api::ApiError;

/// Failure modes of a workflow step.
///
/// `Invalid` is raised before any network call; `Api` carries the server's
/// message verbatim so the form can be corrected and resubmitted.
#[derive(Debug, Error)]
pub enum WorkflowError {
  #[error("Validation failed:\n{}", .0.join("\n"))]
  Invalid(Vec<String>),

  #[error("Purchase order is {status:?}, cannot {action}")]
  WrongStatus {
    status: PurchaseOrderStatus,
    action: &'static str,
  },

  #[error("No such line item: {item_id}")]
  UnknownLine { item_id: String },

  #[error("A scan is already being processed")]
  ScanInProgress,

  #[error(transparent)]
  Api(#[from] ApiError),
}

pub(crate) fn issue_strings<I: std::fmt::Display>(issues: Vec<I>) -> Vec<String> {
  issues.into_iter().map(|i| i.to_string()).collect()
}
