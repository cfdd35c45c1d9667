use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Purchase order lifecycle status.
///
/// `Partial` and `Received` are reachable only through the receiving
/// workflow; `Cancelled` from any state except `Received`/`Cancelled`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PurchaseOrderStatus {
    Draft,
    Ordered,
    Partial,
    Received,
    Cancelled,
}

impl PurchaseOrderStatus {
    /// Statuses in which goods may be received against the order.
    pub fn is_receivable(self) -> bool {
        matches!(self, PurchaseOrderStatus::Ordered | PurchaseOrderStatus::Partial)
    }

    pub fn is_cancellable(self) -> bool {
        !matches!(self, PurchaseOrderStatus::Received | PurchaseOrderStatus::Cancelled)
    }
}

/// One product entry on a purchase order.
///
/// `qty_ordered` is immutable once the order leaves draft; `qty_received`
/// is mutated only by the receiving workflow and never decreases.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrderItem {
    pub id: Uuid,
    pub purchase_order_id: Uuid,
    pub product_id: Uuid,
    pub qty_ordered: i32,
    pub qty_received: i32,
    pub unit_price: Option<Decimal>,
    pub line_total: Option<Decimal>,
    pub remark: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseOrderItem {
    pub fn remaining(&self) -> i32 {
        self.qty_ordered - self.qty_received
    }

    pub fn is_fully_received(&self) -> bool {
        self.qty_received >= self.qty_ordered
    }
}

/// Line total for a quantity at an optional unit price. None when the
/// line is unpriced.
pub fn line_total(qty_ordered: i32, unit_price: Option<Decimal>) -> Option<Decimal> {
    unit_price.map(|price| price * Decimal::from(qty_ordered))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: Uuid,
    pub po_number: String,
    pub supplier_id: Option<Uuid>,
    pub status: PurchaseOrderStatus,
    pub placed_at: Option<DateTime<Utc>>,
    pub expected_arrival: Option<NaiveDate>,
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub created_by: Uuid,
    /// Items in creation order; the order carries no semantic meaning.
    pub items: Vec<PurchaseOrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseOrder {
    pub fn item(&self, item_id: Uuid) -> Option<&PurchaseOrderItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    /// Status as a pure function of item quantities, for an order that has
    /// left draft. `Received` iff every item is fully received, `Partial`
    /// if anything has been received, else `Ordered`.
    pub fn derive_receiving_status(&self) -> PurchaseOrderStatus {
        if !self.items.is_empty() && self.items.iter().all(|i| i.is_fully_received()) {
            PurchaseOrderStatus::Received
        } else if self.items.iter().any(|i| i.qty_received > 0) {
            PurchaseOrderStatus::Partial
        } else {
            PurchaseOrderStatus::Ordered
        }
    }

    /// Aggregate total: sum of priced line totals.
    pub fn recompute_total(&mut self) {
        self.total_amount = self
            .items
            .iter()
            .filter_map(|i| i.line_total)
            .sum::<Decimal>();
    }
}
