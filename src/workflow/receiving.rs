//! Receiving step of the purchase-order workflow.
//!
//! Receiving converts counted quantities into received quantities against an
//! invoice. The sheet refuses to fall back to ordered quantities: a line
//! that was never counted blocks submission, so receiving cannot bypass
//! counting. Unit costs shown here are a client-side preview only; the
//! server computes the value of record.

use serde::Serialize;
use std::fmt;

use crate::api::types::{PurchaseOrder, PurchaseOrderStatus};
use crate::api::ApiClient;

use super::{issue_strings, WorkflowError};

/// Why a receiving sheet cannot be submitted yet.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceivingIssue {
  /// No invoice image attached
  MissingInvoiceImage,
  /// The line has no recorded count to receive against
  NotCounted { item_id: String, name: String },
  /// Total cost missing or not positive
  NonPositiveCost { item_id: String, name: String },
}

impl fmt::Display for ReceivingIssue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::MissingInvoiceImage => write!(f, "attach the supplier invoice image"),
      Self::NotCounted { name, .. } => {
        write!(f, "{}: no counted quantity on record, count the order first", name)
      }
      Self::NonPositiveCost { name, .. } => {
        write!(f, "{}: enter a total cost greater than zero", name)
      }
    }
  }
}

/// One line of the receiving sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivingLine {
  pub item_id: String,
  pub name: String,
  pub ordered_qty: f64,
  /// Quantity recorded during the counting step; receiving submits exactly
  /// this, never the ordered quantity.
  pub counted_qty: Option<f64>,
  pub total_cost: Option<f64>,
}

impl ReceivingLine {
  /// Non-authoritative unit-cost preview (total / counted).
  pub fn unit_cost_preview(&self) -> Option<f64> {
    match (self.total_cost, self.counted_qty) {
      (Some(total), Some(counted)) if counted > 0.0 => Some(total / counted),
      _ => None,
    }
  }
}

/// Payload for the receive transition. Built only from a fully valid sheet.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveSubmission {
  pub invoice_image: String,
  pub lines: Vec<ReceivedLinePayload>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedLinePayload {
  pub item_id: String,
  pub received_qty: f64,
  pub total_cost: f64,
}

/// In-progress receipt of one counted purchase order.
#[derive(Debug, Clone)]
pub struct ReceivingSheet {
  po_id: String,
  invoice_image: Option<String>,
  lines: Vec<ReceivingLine>,
}

impl ReceivingSheet {
  /// Start receiving a counted purchase order.
  pub fn from_order(po: &PurchaseOrder) -> Result<Self, WorkflowError> {
    if !po.status.can_receive() {
      return Err(WorkflowError::WrongStatus {
        status: po.status,
        action: "receive it",
      });
    }

    Ok(Self {
      po_id: po.id.clone(),
      invoice_image: None,
      lines: po
        .lines
        .iter()
        .map(|line| ReceivingLine {
          item_id: line.item_id.clone(),
          name: line.name.clone(),
          ordered_qty: line.ordered_qty,
          counted_qty: line.counted_qty,
          total_cost: None,
        })
        .collect(),
    })
  }

  pub fn po_id(&self) -> &str {
    &self.po_id
  }

  pub fn lines(&self) -> &[ReceivingLine] {
    &self.lines
  }

  /// Attach the captured/selected invoice image reference.
  pub fn attach_invoice(&mut self, image_ref: String) {
    self.invoice_image = Some(image_ref);
  }

  pub fn set_total_cost(&mut self, item_id: &str, total_cost: f64) -> Result<(), WorkflowError> {
    let line = self
      .lines
      .iter_mut()
      .find(|l| l.item_id == item_id)
      .ok_or_else(|| WorkflowError::UnknownLine {
        item_id: item_id.to_string(),
      })?;
    line.total_cost = Some(total_cost);
    Ok(())
  }

  /// Check the invoice and every line against the receiving constraints.
  pub fn validate(&self) -> Result<(), Vec<ReceivingIssue>> {
    let mut issues = Vec::new();

    if self
      .invoice_image
      .as_deref()
      .map(str::trim)
      .unwrap_or("")
      .is_empty()
    {
      issues.push(ReceivingIssue::MissingInvoiceImage);
    }

    for line in &self.lines {
      if line.counted_qty.is_none() {
        issues.push(ReceivingIssue::NotCounted {
          item_id: line.item_id.clone(),
          name: line.name.clone(),
        });
      }

      if line.total_cost.map(|c| c <= 0.0).unwrap_or(true) {
        issues.push(ReceivingIssue::NonPositiveCost {
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

  /// Build the submission payload; received quantity is always the counted
  /// quantity.
  pub fn submission(&self) -> Result<ReceiveSubmission, Vec<ReceivingIssue>> {
    self.validate()?;

    Ok(ReceiveSubmission {
      invoice_image: self.invoice_image.clone().expect("validated above"),
      lines: self
        .lines
        .iter()
        .map(|line| ReceivedLinePayload {
          item_id: line.item_id.clone(),
          received_qty: line.counted_qty.expect("validated above"),
          total_cost: line.total_cost.expect("validated above"),
        })
        .collect(),
    })
  }

  /// Validate and commit the receive transition in a single API call.
  pub async fn submit(&self, client: &ApiClient) -> Result<PurchaseOrder, WorkflowError> {
    let payload = self.submission().map_err(|i| WorkflowError::Invalid(issue_strings(i)))?;

    let order: PurchaseOrder = client
      .post(&format!("purchase-orders/{}/receive", self.po_id), &payload)
      .await?;
    Ok(order)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::PurchaseOrderLine;

  fn counted_order() -> PurchaseOrder {
    PurchaseOrder {
      id: "po-1".into(),
      number: "PO-0042".into(),
      supplier: "Fresh Farms".into(),
      status: PurchaseOrderStatus::Counted,
      created_at: "2024-05-01T10:00:00Z".into(),
      lines: vec![
        PurchaseOrderLine {
          item_id: "tomato".into(),
          name: "Tomatoes".into(),
          barcode: Some("111".into()),
          ordered_qty: 10.0,
          counted_qty: Some(8.0),
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
          counted_qty: Some(5.0),
          received_qty: None,
          unit_cost: None,
          variance_reason: None,
          note: None,
        },
      ],
    }
  }

  fn ready_sheet() -> ReceivingSheet {
    let mut sheet = ReceivingSheet::from_order(&counted_order()).unwrap();
    sheet.attach_invoice("invoices/po-0042.jpg".into());
    sheet.set_total_cost("tomato", 16.0).unwrap();
    sheet.set_total_cost("basil", 10.0).unwrap();
    sheet
  }

  #[test]
  fn only_counted_orders_can_be_received() {
    let mut po = counted_order();
    po.status = PurchaseOrderStatus::Pending;
    assert!(matches!(
      ReceivingSheet::from_order(&po),
      Err(WorkflowError::WrongStatus { .. })
    ));
  }

  #[test]
  fn missing_invoice_blocks_submission() {
    let mut sheet = ReceivingSheet::from_order(&counted_order()).unwrap();
    sheet.set_total_cost("tomato", 16.0).unwrap();
    sheet.set_total_cost("basil", 10.0).unwrap();

    let issues = sheet.validate().unwrap_err();
    assert_eq!(issues, vec![ReceivingIssue::MissingInvoiceImage]);
  }

  #[test]
  fn non_positive_cost_blocks_submission() {
    let mut sheet = ready_sheet();
    sheet.set_total_cost("basil", 0.0).unwrap();

    let issues = sheet.validate().unwrap_err();
    assert_eq!(
      issues,
      vec![ReceivingIssue::NonPositiveCost {
        item_id: "basil".into(),
        name: "Basil".into(),
      }]
    );
  }

  #[test]
  fn received_qty_is_counted_never_ordered() {
    let payload = ready_sheet().submission().unwrap();

    // tomato was ordered at 10 but counted at 8
    assert_eq!(payload.lines[0].received_qty, 8.0);
    assert_eq!(payload.lines[1].received_qty, 5.0);
  }

  #[test]
  fn uncounted_line_cannot_be_received() {
    let mut po = counted_order();
    po.lines[1].counted_qty = None;

    let mut sheet = ReceivingSheet::from_order(&po).unwrap();
    sheet.attach_invoice("invoices/po-0042.jpg".into());
    sheet.set_total_cost("tomato", 16.0).unwrap();
    sheet.set_total_cost("basil", 10.0).unwrap();

    let issues = sheet.validate().unwrap_err();
    assert!(issues.contains(&ReceivingIssue::NotCounted {
      item_id: "basil".into(),
      name: "Basil".into(),
    }));
  }

  #[test]
  fn unit_cost_preview_is_total_over_counted() {
    let sheet = ready_sheet();
    assert_eq!(sheet.lines()[0].unit_cost_preview(), Some(2.0));

    let line = ReceivingLine {
      item_id: "x".into(),
      name: "X".into(),
      ordered_qty: 1.0,
      counted_qty: None,
      total_cost: Some(5.0),
    };
    assert_eq!(line.unit_cost_preview(), None);
  }

  #[tokio::test]
  async fn invalid_sheet_never_reaches_the_network() {
    let sheet = ReceivingSheet::from_order(&counted_order()).unwrap();
    let client = ApiClient::new("http://127.0.0.1:1").unwrap();

    let err = sheet.submit(&client).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Invalid(_)));
  }
}
