use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::purchase_order::{PurchaseOrder, PurchaseOrderItem, PurchaseOrderStatus};
use crate::models::stock::{
    Location, NewProductBatch, ProductBatch, StockReceipt, StockReceiptOutcome,
};

pub mod memory;

pub use memory::{InMemoryPurchaseOrderStore, InMemoryStockStore};

/// One item-level quantity credit applied during reconciliation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReceiptIncrement {
    pub item_id: Uuid,
    pub qty: i32,
}

/// Persisted purchase orders and their items: atomic read/update
/// primitives, no business logic.
#[async_trait]
pub trait PurchaseOrderStore: Send + Sync {
    async fn insert(&self, order: PurchaseOrder) -> Result<PurchaseOrder, ServiceError>;

    async fn find_by_id(&self, order_id: Uuid) -> Result<Option<PurchaseOrder>, ServiceError>;

    /// Items of `order_id` matching `item_ids`. Ids not belonging to the
    /// order are simply absent from the result.
    async fn find_items(
        &self,
        order_id: Uuid,
        item_ids: &[Uuid],
    ) -> Result<Vec<PurchaseOrderItem>, ServiceError>;

    /// Applies the given quantity increments and recomputes the order
    /// status in one atomic operation. Implementations must re-validate
    /// status, item ownership, and over-receive inside the same critical
    /// section so the write can never land on a changed order.
    async fn apply_receipt_increments(
        &self,
        order_id: Uuid,
        increments: &[ReceiptIncrement],
    ) -> Result<PurchaseOrder, ServiceError>;

    async fn set_status(
        &self,
        order_id: Uuid,
        status: PurchaseOrderStatus,
    ) -> Result<PurchaseOrder, ServiceError>;

    /// Replaces the stored order with the given aggregate.
    async fn update(&self, order: PurchaseOrder) -> Result<PurchaseOrder, ServiceError>;

    async fn add_items(
        &self,
        order_id: Uuid,
        items: Vec<PurchaseOrderItem>,
    ) -> Result<PurchaseOrder, ServiceError>;

    async fn remove_items(
        &self,
        order_id: Uuid,
        item_ids: &[Uuid],
    ) -> Result<PurchaseOrder, ServiceError>;

    async fn list(&self) -> Result<Vec<PurchaseOrder>, ServiceError>;
}

/// Lookup and creation of the operational stock records the receiving
/// workflow resolves on the fly.
#[async_trait]
pub trait StockLookup: Send + Sync {
    /// The system default location: code or name equal to the configured
    /// default (case-insensitive), else the earliest-created location.
    /// None when no location exists at all.
    async fn find_default_location(&self) -> Result<Option<Location>, ServiceError>;

    async fn find_location(&self, location_id: Uuid) -> Result<Option<Location>, ServiceError>;

    async fn find_batch(&self, batch_id: Uuid) -> Result<Option<ProductBatch>, ServiceError>;

    async fn create_batch(&self, batch: NewProductBatch) -> Result<ProductBatch, ServiceError>;

    /// Adjusts a batch's on-hand quantity by `delta` as a result of a
    /// stock movement.
    async fn adjust_batch_quantity(
        &self,
        batch_id: Uuid,
        delta: i32,
    ) -> Result<ProductBatch, ServiceError>;
}

/// The inventory subsystem's receipt contract.
///
/// Calling twice with the same `idempotency_key` (and same batch,
/// location, quantity) must return `idempotent = true` on the second call
/// and must not double-apply the stock change.
#[async_trait]
pub trait InventoryReceiptGateway: Send + Sync {
    async fn receive(&self, receipt: StockReceipt) -> Result<StockReceiptOutcome, ServiceError>;
}
