//! Counting step of the purchase-order workflow.
//!
//! For every line the user enters a counted quantity and confirms physical
//! identity with at least one barcode scan. A short count requires a
//! variance reason; an over count requires a free-text note. The sheet
//! refuses to build a submission until every line passes.

use serde::Serialize;
use std::fmt;

use crate::api::types::{PurchaseOrder, PurchaseOrderStatus, VarianceReason};
use crate::api::ApiClient;

use super::{issue_strings, WorkflowError};

/// Why a counting sheet cannot be submitted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountingIssue {
  /// No confirming scan recorded for the line
  NotScanned { item_id: String, name: String },
  /// No counted quantity entered
  NotCounted { item_id: String, name: String },
  /// Counted short of ordered without a variance reason
  MissingVarianceReason { item_id: String, name: String },
  /// Counted over ordered without a justification note
  MissingOverageNote { item_id: String, name: String },
}

impl fmt::Display for CountingIssue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::NotScanned { name, .. } => write!(f, "{}: scan the item barcode to confirm it", name),
      Self::NotCounted { name, .. } => write!(f, "{}: enter a counted quantity", name),
      Self::MissingVarianceReason { name, .. } => {
        write!(f, "{}: counted less than ordered, pick a variance reason", name)
      }
      Self::MissingOverageNote { name, .. } => {
        write!(f, "{}: counted more than ordered, add a note explaining why", name)
      }
    }
  }
}

/// One line of the counting sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct CountingLine {
  pub item_id: String,
  pub name: String,
  pub barcode: Option<String>,
  pub ordered_qty: f64,
  pub counted_qty: Option<f64>,
  pub variance_reason: Option<VarianceReason>,
  pub note: Option<String>,
  /// At least one confirming barcode scan recorded this session
  pub scanned: bool,
}

/// Payload for the count transition. Built only from a fully valid sheet.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountSubmission {
  pub lines: Vec<CountedLinePayload>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountedLinePayload {
  pub item_id: String,
  pub counted_qty: f64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub variance_reason: Option<VarianceReason>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub note: Option<String>,
}

/// In-progress count of one purchase order.
///
/// Nothing here is persisted: an abandoned count starts over, matching the
/// no-partial-submission contract.
#[derive(Debug, Clone)]
pub struct CountingSheet {
  po_id: String,
  lines: Vec<CountingLine>,
}

impl CountingSheet {
  /// Start counting a pending purchase order.
  pub fn from_order(po: &PurchaseOrder) -> Result<Self, WorkflowError> {
    if !po.status.can_count() {
      return Err(WorkflowError::WrongStatus {
        status: po.status,
        action: "count it",
      });
    }

    Ok(Self {
      po_id: po.id.clone(),
      lines: po
        .lines
        .iter()
        .map(|line| CountingLine {
          item_id: line.item_id.clone(),
          name: line.name.clone(),
          barcode: line.barcode.clone(),
          ordered_qty: line.ordered_qty,
          counted_qty: None,
          variance_reason: None,
          note: None,
          scanned: false,
        })
        .collect(),
    })
  }

  pub fn po_id(&self) -> &str {
    &self.po_id
  }

  pub fn lines(&self) -> &[CountingLine] {
    &self.lines
  }

  fn line_mut(&mut self, item_id: &str) -> Result<&mut CountingLine, WorkflowError> {
    self
      .lines
      .iter_mut()
      .find(|l| l.item_id == item_id)
      .ok_or_else(|| WorkflowError::UnknownLine {
        item_id: item_id.to_string(),
      })
  }

  pub fn record_count(&mut self, item_id: &str, qty: f64) -> Result<(), WorkflowError> {
    let line = self.line_mut(item_id)?;
    line.counted_qty = Some(qty);
    Ok(())
  }

  pub fn set_variance_reason(
    &mut self,
    item_id: &str,
    reason: VarianceReason,
  ) -> Result<(), WorkflowError> {
    self.line_mut(item_id)?.variance_reason = Some(reason);
    Ok(())
  }

  pub fn set_note(&mut self, item_id: &str, note: String) -> Result<(), WorkflowError> {
    self.line_mut(item_id)?.note = Some(note);
    Ok(())
  }

  /// Record a confirming barcode scan for the line.
  pub fn mark_scanned(&mut self, item_id: &str) -> Result<(), WorkflowError> {
    self.line_mut(item_id)?.scanned = true;
    Ok(())
  }

  /// Check every line against the counting constraints.
  pub fn validate(&self) -> Result<(), Vec<CountingIssue>> {
    let mut issues = Vec::new();

    for line in &self.lines {
      if !line.scanned {
        issues.push(CountingIssue::NotScanned {
          item_id: line.item_id.clone(),
          name: line.name.clone(),
        });
      }

      let Some(counted) = line.counted_qty else {
        issues.push(CountingIssue::NotCounted {
          item_id: line.item_id.clone(),
          name: line.name.clone(),
        });
        continue;
      };

      if counted < line.ordered_qty && line.variance_reason.is_none() {
        issues.push(CountingIssue::MissingVarianceReason {
          item_id: line.item_id.clone(),
          name: line.name.clone(),
        });
      }

      if counted > line.ordered_qty
        && line.note.as_deref().map(str::trim).unwrap_or("").is_empty()
      {
        issues.push(CountingIssue::MissingOverageNote {
          item_id: line.item_id.clone(),
          name: line.name.clone(),
        });
      }
    }

    if issues.is_empty() {
      Ok(())
    } else {
      Err(issues)
    }
  }

  /// Build the submission payload, refusing while any line is invalid.
  pub fn submission(&self) -> Result<CountSubmission, Vec<CountingIssue>> {
    self.validate()?;

    Ok(CountSubmission {
      lines: self
        .lines
        .iter()
        .map(|line| CountedLinePayload {
          item_id: line.item_id.clone(),
          counted_qty: line.counted_qty.expect("validated above"),
          variance_reason: line.variance_reason,
          note: line.note.clone(),
        })
        .collect(),
    })
  }

  /// Validate and commit the count transition in a single API call.
  ///
  /// Validation failures never reach the network; server rejections carry
  /// the server's message and leave the sheet populated for retry.
  pub async fn submit(&self, client: &ApiClient) -> Result<PurchaseOrder, WorkflowError> {
    let payload = self.submission().map_err(|i| WorkflowError::Invalid(issue_strings(i)))?;

    let order: PurchaseOrder = client
      .post(&format!("purchase-orders/{}/count", self.po_id), &payload)
      .await?;
    Ok(order)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::PurchaseOrderLine;

  fn order() -> PurchaseOrder {
    PurchaseOrder {
      id: "po-1".into(),
      number: "PO-0042".into(),
      supplier: "Fresh Farms".into(),
      status: PurchaseOrderStatus::Pending,
      created_at: "2024-05-01T10:00:00Z".into(),
      lines: vec![
        PurchaseOrderLine {
          item_id: "tomato".into(),
          name: "Tomatoes".into(),
          barcode: Some("111".into()),
          ordered_qty: 10.0,
          counted_qty: None,
          received_qty: None,
          unit_cost: None,
          variance_reason: None,
          note: None,
        },
        PurchaseOrderLine {
          item_id: "basil".into(),
          name: "Basil".into(),
          barcode: Some("222".into()),
          ordered_qty: 5.0,
          counted_qty: None,
          received_qty: None,
          unit_cost: None,
          variance_reason: None,
          note: None,
        },
      ],
    }
  }

  fn counted_sheet() -> CountingSheet {
    let mut sheet = CountingSheet::from_order(&order()).unwrap();
    for item in ["tomato", "basil"] {
      sheet.mark_scanned(item).unwrap();
    }
    sheet.record_count("tomato", 10.0).unwrap();
    sheet.record_count("basil", 5.0).unwrap();
    sheet
  }

  #[test]
  fn only_pending_orders_can_be_counted() {
    let mut po = order();
    po.status = PurchaseOrderStatus::Counted;
    assert!(matches!(
      CountingSheet::from_order(&po),
      Err(WorkflowError::WrongStatus { .. })
    ));
  }

  #[test]
  fn exact_count_with_scans_is_valid() {
    let sheet = counted_sheet();
    assert!(sheet.validate().is_ok());

    let payload = sheet.submission().unwrap();
    assert_eq!(payload.lines.len(), 2);
    assert_eq!(payload.lines[0].counted_qty, 10.0);
    assert!(payload.lines[0].variance_reason.is_none());
  }

  #[test]
  fn unscanned_line_blocks_submission() {
    let mut sheet = CountingSheet::from_order(&order()).unwrap();
    sheet.mark_scanned("tomato").unwrap();
    sheet.record_count("tomato", 10.0).unwrap();
    sheet.record_count("basil", 5.0).unwrap();

    let issues = sheet.validate().unwrap_err();
    assert_eq!(
      issues,
      vec![CountingIssue::NotScanned {
        item_id: "basil".into(),
        name: "Basil".into(),
      }]
    );
  }

  #[test]
  fn short_count_requires_variance_reason() {
    let mut sheet = counted_sheet();
    sheet.record_count("tomato", 7.0).unwrap();

    let issues = sheet.validate().unwrap_err();
    assert!(issues.contains(&CountingIssue::MissingVarianceReason {
      item_id: "tomato".into(),
      name: "Tomatoes".into(),
    }));

    sheet
      .set_variance_reason("tomato", VarianceReason::Missing)
      .unwrap();
    assert!(sheet.validate().is_ok());
  }

  #[test]
  fn over_count_requires_note() {
    let mut sheet = counted_sheet();
    sheet.record_count("basil", 6.0).unwrap();

    let issues = sheet.validate().unwrap_err();
    assert!(issues.contains(&CountingIssue::MissingOverageNote {
      item_id: "basil".into(),
      name: "Basil".into(),
    }));

    // A whitespace-only note does not count
    sheet.set_note("basil", "   ".into()).unwrap();
    assert!(sheet.validate().is_err());

    sheet.set_note("basil", "supplier packed extra".into()).unwrap();
    assert!(sheet.validate().is_ok());
  }

  #[test]
  fn missing_count_is_reported_once_per_line() {
    let mut sheet = CountingSheet::from_order(&order()).unwrap();
    sheet.mark_scanned("tomato").unwrap();
    sheet.mark_scanned("basil").unwrap();

    let issues = sheet.validate().unwrap_err();
    assert_eq!(issues.len(), 2);
    assert!(matches!(issues[0], CountingIssue::NotCounted { .. }));
  }

  #[tokio::test]
  async fn invalid_sheet_never_reaches_the_network() {
    let sheet = CountingSheet::from_order(&order()).unwrap();

    // Unroutable address: a network attempt would fail as Transport, so an
    // Invalid error proves submit bailed before the call.
    let client = ApiClient::new("http://127.0.0.1:1").unwrap();
    let err = sheet.submit(&client).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Invalid(_)));
  }

  #[test]
  fn unknown_line_is_an_error() {
    let mut sheet = counted_sheet();
    assert!(matches!(
      sheet.record_count("truffle", 1.0),
      Err(WorkflowError::UnknownLine { .. })
    ));
  }
}
