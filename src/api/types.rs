use serde::{Deserialize, Serialize};

/// Summary of an order for list views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
  pub id: String,
  pub number: String,
  pub status: String,
  pub customer: Option<String>,
  pub total: f64,
  pub placed_at: String,
}

/// Store product as sold at the POS
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
  pub id: String,
  pub name: String,
  pub sku: Option<String>,
  pub barcode: Option<String>,
  pub price: f64,
  pub active: bool,
}

/// Inventory item tracked by the stock module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
  pub id: String,
  pub name: String,
  pub unit: String,
  pub barcode: Option<String>,
}

/// Current stock level for an inventory item at the selected branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLevel {
  pub item_id: String,
  pub name: String,
  pub unit: String,
  pub quantity: f64,
  pub reorder_level: Option<f64>,
}

/// Ticket shown on the kitchen display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KitchenTicket {
  pub id: String,
  pub order_number: String,
  pub station: Option<String>,
  pub items: Vec<String>,
  pub status: String,
  pub placed_at: String,
}

/// Lifecycle of a purchase order. Forward transitions are committed one API
/// call at a time; cancellation is only possible before receiving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseOrderStatus {
  Pending,
  Counted,
  Received,
  Cancelled,
}

impl PurchaseOrderStatus {
  pub fn can_count(self) -> bool {
    self == PurchaseOrderStatus::Pending
  }

  pub fn can_receive(self) -> bool {
    self == PurchaseOrderStatus::Counted
  }

  pub fn can_cancel(self) -> bool {
    matches!(
      self,
      PurchaseOrderStatus::Pending | PurchaseOrderStatus::Counted
    )
  }
}

/// Justification recorded when a counted quantity falls short of the ordered
/// quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarianceReason {
  Missing,
  Canceled,
  Rejected,
}

/// One line of a purchase order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrderLine {
  pub item_id: String,
  pub name: String,
  pub barcode: Option<String>,
  pub ordered_qty: f64,
  pub counted_qty: Option<f64>,
  pub received_qty: Option<f64>,
  pub unit_cost: Option<f64>,
  pub variance_reason: Option<VarianceReason>,
  pub note: Option<String>,
}

/// Purchase order with its lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrder {
  pub id: String,
  pub number: String,
  pub supplier: String,
  pub status: PurchaseOrderStatus,
  pub created_at: String,
  // List endpoints omit lines; detail includes them
  #[serde(default)]
  pub lines: Vec<PurchaseOrderLine>,
}

/// Inventory item resolved from a scanned barcode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarcodeItem {
  pub item_id: String,
  pub name: String,
  pub barcode: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_transition_gates() {
    assert!(PurchaseOrderStatus::Pending.can_count());
    assert!(!PurchaseOrderStatus::Counted.can_count());

    assert!(PurchaseOrderStatus::Counted.can_receive());
    assert!(!PurchaseOrderStatus::Pending.can_receive());
    assert!(!PurchaseOrderStatus::Received.can_receive());

    assert!(PurchaseOrderStatus::Pending.can_cancel());
    assert!(PurchaseOrderStatus::Counted.can_cancel());
    assert!(!PurchaseOrderStatus::Received.can_cancel());
    assert!(!PurchaseOrderStatus::Cancelled.can_cancel());
  }

  #[test]
  fn variance_reason_wire_names() {
    assert_eq!(
      serde_json::to_string(&VarianceReason::Missing).unwrap(),
      "\"missing\""
    );
    assert_eq!(
      serde_json::from_str::<VarianceReason>("\"rejected\"").unwrap(),
      VarianceReason::Rejected
    );
  }
}
