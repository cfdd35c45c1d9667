use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::purchase_order::{PurchaseOrder, PurchaseOrderItem, PurchaseOrderStatus};
use crate::models::stock::{Location, NewProductBatch, ProductBatch};

use super::{PurchaseOrderStore, ReceiptIncrement, StockLookup};

/// DashMap-backed purchase order store for embedding and tests.
///
/// Each mutating operation works on a single map entry while holding its
/// shard lock, which gives the atomicity the store contract requires
/// without a database.
#[derive(Debug, Default)]
pub struct InMemoryPurchaseOrderStore {
    orders: DashMap<Uuid, PurchaseOrder>,
}

impl InMemoryPurchaseOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PurchaseOrderStore for InMemoryPurchaseOrderStore {
    async fn insert(&self, order: PurchaseOrder) -> Result<PurchaseOrder, ServiceError> {
        self.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn find_by_id(&self, order_id: Uuid) -> Result<Option<PurchaseOrder>, ServiceError> {
        Ok(self.orders.get(&order_id).map(|o| o.value().clone()))
    }

    async fn find_items(
        &self,
        order_id: Uuid,
        item_ids: &[Uuid],
    ) -> Result<Vec<PurchaseOrderItem>, ServiceError> {
        let order = self
            .orders
            .get(&order_id)
            .ok_or_else(|| ServiceError::not_found("purchase order", order_id))?;
        Ok(order
            .items
            .iter()
            .filter(|i| item_ids.contains(&i.id))
            .cloned()
            .collect())
    }

    async fn apply_receipt_increments(
        &self,
        order_id: Uuid,
        increments: &[ReceiptIncrement],
    ) -> Result<PurchaseOrder, ServiceError> {
        let mut entry = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| ServiceError::not_found("purchase order", order_id))?;
        let order = entry.value_mut();

        // Re-validate against the stored state; the caller's snapshot may
        // be stale by the time the write lands. Increments for the same
        // item accumulate against its remaining allowance.
        if !order.status.is_receivable() {
            return Err(ServiceError::invalid_state(format!(
                "purchase order {} is {} and cannot accept receipts",
                order_id, order.status
            )));
        }
        let mut projected: HashMap<Uuid, i32> = HashMap::new();
        for inc in increments {
            let item = order
                .items
                .iter()
                .find(|i| i.id == inc.item_id)
                .ok_or_else(|| {
                    ServiceError::invalid_request(format!(
                        "item {} does not belong to purchase order {}",
                        inc.item_id, order_id
                    ))
                })?;
            let already = projected.get(&inc.item_id).copied().unwrap_or(0);
            if item.qty_received + already + inc.qty > item.qty_ordered {
                return Err(ServiceError::OverReceive {
                    item_id: item.id,
                    requested: inc.qty,
                    remaining: item.remaining() - already,
                });
            }
            *projected.entry(inc.item_id).or_insert(0) += inc.qty;
        }

        let now = Utc::now();
        for inc in increments {
            let item = order
                .items
                .iter_mut()
                .find(|i| i.id == inc.item_id)
                .ok_or_else(|| {
                    ServiceError::invalid_request(format!(
                        "item {} does not belong to purchase order {}",
                        inc.item_id, order_id
                    ))
                })?;
            item.qty_received += inc.qty;
            item.updated_at = now;
        }
        order.status = order.derive_receiving_status();
        order.updated_at = now;

        Ok(order.clone())
    }

    async fn set_status(
        &self,
        order_id: Uuid,
        status: PurchaseOrderStatus,
    ) -> Result<PurchaseOrder, ServiceError> {
        let mut entry = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| ServiceError::not_found("purchase order", order_id))?;
        let order = entry.value_mut();
        order.status = status;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn update(&self, mut order: PurchaseOrder) -> Result<PurchaseOrder, ServiceError> {
        let mut entry = self
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| ServiceError::not_found("purchase order", order.id))?;
        order.updated_at = Utc::now();
        order.recompute_total();
        *entry.value_mut() = order.clone();
        Ok(order)
    }

    async fn add_items(
        &self,
        order_id: Uuid,
        items: Vec<PurchaseOrderItem>,
    ) -> Result<PurchaseOrder, ServiceError> {
        let mut entry = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| ServiceError::not_found("purchase order", order_id))?;
        let order = entry.value_mut();
        order.items.extend(items);
        order.recompute_total();
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn remove_items(
        &self,
        order_id: Uuid,
        item_ids: &[Uuid],
    ) -> Result<PurchaseOrder, ServiceError> {
        let mut entry = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| ServiceError::not_found("purchase order", order_id))?;
        let order = entry.value_mut();
        order.items.retain(|i| !item_ids.contains(&i.id));
        order.recompute_total();
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn list(&self) -> Result<Vec<PurchaseOrder>, ServiceError> {
        let mut orders: Vec<PurchaseOrder> =
            self.orders.iter().map(|o| o.value().clone()).collect();
        orders.sort_by_key(|o| (o.created_at, o.id));
        Ok(orders)
    }
}

/// DashMap-backed location/batch store.
#[derive(Debug)]
pub struct InMemoryStockStore {
    locations: DashMap<Uuid, Location>,
    batches: DashMap<Uuid, ProductBatch>,
    default_code: String,
}

impl Default for InMemoryStockStore {
    fn default() -> Self {
        Self::with_default_code("DEFAULT")
    }
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The code (and name) recognized as the system default location.
    pub fn with_default_code(code: &str) -> Self {
        Self {
            locations: DashMap::new(),
            batches: DashMap::new(),
            default_code: code.to_string(),
        }
    }

    pub fn insert_location(&self, location: Location) -> Location {
        self.locations.insert(location.id, location.clone());
        location
    }

    pub fn add_location(&self, code: &str, name: &str) -> Location {
        self.insert_location(Location {
            id: Uuid::new_v4(),
            code: code.to_string(),
            name: name.to_string(),
            warehouse_id: None,
            created_at: Utc::now(),
        })
    }
}

#[async_trait]
impl StockLookup for InMemoryStockStore {
    async fn find_default_location(&self) -> Result<Option<Location>, ServiceError> {
        let mut named_default: Option<Location> = None;
        let mut earliest: Option<Location> = None;

        for entry in self.locations.iter() {
            let loc = entry.value();
            let is_default = loc.code.eq_ignore_ascii_case(&self.default_code)
                || loc.name.eq_ignore_ascii_case(&self.default_code);
            if is_default {
                match &named_default {
                    Some(current) if (current.created_at, current.id) <= (loc.created_at, loc.id) => {}
                    _ => named_default = Some(loc.clone()),
                }
            }
            match &earliest {
                Some(current) if (current.created_at, current.id) <= (loc.created_at, loc.id) => {}
                _ => earliest = Some(loc.clone()),
            }
        }

        Ok(named_default.or(earliest))
    }

    async fn find_location(&self, location_id: Uuid) -> Result<Option<Location>, ServiceError> {
        Ok(self.locations.get(&location_id).map(|l| l.value().clone()))
    }

    async fn find_batch(&self, batch_id: Uuid) -> Result<Option<ProductBatch>, ServiceError> {
        Ok(self.batches.get(&batch_id).map(|b| b.value().clone()))
    }

    async fn create_batch(&self, batch: NewProductBatch) -> Result<ProductBatch, ServiceError> {
        let created = ProductBatch {
            id: Uuid::new_v4(),
            product_id: batch.product_id,
            batch_no: batch.batch_no,
            quantity: batch.initial_quantity,
            created_at: Utc::now(),
        };
        self.batches.insert(created.id, created.clone());
        Ok(created)
    }

    async fn adjust_batch_quantity(
        &self,
        batch_id: Uuid,
        delta: i32,
    ) -> Result<ProductBatch, ServiceError> {
        let mut entry = self
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| ServiceError::not_found("product batch", batch_id))?;
        let batch = entry.value_mut();
        batch.quantity += delta;
        Ok(batch.clone())
    }
}
