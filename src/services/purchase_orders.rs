use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::purchase_order::{
    line_total, PurchaseOrder, PurchaseOrderItem, PurchaseOrderStatus,
};
use crate::models::stock::StockReceipt;
use crate::repositories::{InventoryReceiptGateway, PurchaseOrderStore, ReceiptIncrement};
use crate::services::allocation::{AllocationService, ResolvedBatch};

/// One line of a receive request: which item, how much, and where the
/// stock lands. Location and batch may be omitted; the engine resolves
/// them. The idempotency key identifies the physical receipt event and
/// makes retries of the whole call safe.
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct ReceiptLine {
    pub item_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub location_id: Option<Uuid>,
    pub batch_id: Option<Uuid>,
    pub received_by: Uuid,
    #[validate(length(min = 1))]
    pub idempotency_key: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct NewOrderItem {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub qty_ordered: i32,
    pub unit_price: Option<Decimal>,
    pub remark: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub supplier_id: Option<Uuid>,
    pub placed_at: Option<DateTime<Utc>>,
    pub expected_arrival: Option<NaiveDate>,
    pub notes: Option<String>,
    #[validate]
    pub items: Vec<NewOrderItem>,
    pub created_by: Uuid,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderItemPatch {
    pub id: Uuid,
    pub qty_ordered: Option<i32>,
    pub unit_price: Option<Decimal>,
    pub remark: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpdateOrderRequest {
    pub supplier_id: Option<Uuid>,
    pub placed_at: Option<DateTime<Utc>>,
    pub expected_arrival: Option<NaiveDate>,
    pub notes: Option<String>,
    pub items: Option<Vec<OrderItemPatch>>,
}

/// Per-line result of the delegation phase, kept so reconciliation can
/// credit exactly the fresh effects.
struct AppliedLine {
    item_id: Uuid,
    quantity: i32,
    batch_id: Uuid,
    location_id: Uuid,
    idempotent: bool,
}

/// Purchase order lifecycle engine.
///
/// Owns the order state machine and the receiving workflow: validation,
/// per-line resolution, delegation to the inventory receipt gateway, and
/// reconciliation of received quantities back into the order. The
/// inventory effect and the order-state effect live in different
/// subsystems and cannot share a transaction, so the workflow validates
/// everything before the first effect, relies on the gateway's
/// idempotency for replays, and treats the order update as the single
/// point of truth for what counted.
pub struct PurchaseOrderService {
    store: Arc<dyn PurchaseOrderStore>,
    gateway: Arc<dyn InventoryReceiptGateway>,
    allocation: Arc<AllocationService>,
    event_sender: Option<EventSender>,
    receive_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl PurchaseOrderService {
    pub fn new(
        store: Arc<dyn PurchaseOrderStore>,
        gateway: Arc<dyn InventoryReceiptGateway>,
        allocation: Arc<AllocationService>,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            store,
            gateway,
            allocation,
            event_sender,
            receive_locks: DashMap::new(),
        }
    }

    fn order_lock(&self, order_id: Uuid) -> Arc<Mutex<()>> {
        self.receive_locks
            .entry(order_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn generate_po_number() -> String {
        let rand6 = Uuid::new_v4().simple().to_string()[..6].to_uppercase();
        format!("PO-{}-{}", Utc::now().format("%Y%m"), rand6)
    }

    async fn require(&self, order_id: Uuid) -> Result<PurchaseOrder, ServiceError> {
        self.store
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("purchase order", order_id))
    }

    /// Creates a draft purchase order with a generated order number.
    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateOrderRequest) -> Result<PurchaseOrder, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let items = request
            .items
            .iter()
            .map(|it| PurchaseOrderItem {
                id: Uuid::new_v4(),
                purchase_order_id: order_id,
                product_id: it.product_id,
                qty_ordered: it.qty_ordered,
                qty_received: 0,
                unit_price: it.unit_price,
                line_total: line_total(it.qty_ordered, it.unit_price),
                remark: it.remark.clone(),
                created_at: now,
                updated_at: now,
            })
            .collect();

        let mut order = PurchaseOrder {
            id: order_id,
            po_number: Self::generate_po_number(),
            supplier_id: request.supplier_id,
            status: PurchaseOrderStatus::Draft,
            placed_at: request.placed_at,
            expected_arrival: request.expected_arrival,
            total_amount: Decimal::ZERO,
            notes: request.notes,
            created_by: request.created_by,
            items,
            created_at: now,
            updated_at: now,
        };
        order.recompute_total();

        let created = self.store.insert(order).await?;
        info!(order_id = %created.id, po_number = %created.po_number, "purchase order created");
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(Event::PurchaseOrderCreated(created.id)).await;
        }
        Ok(created)
    }

    pub async fn get(&self, order_id: Uuid) -> Result<PurchaseOrder, ServiceError> {
        self.require(order_id).await
    }

    pub async fn list(&self) -> Result<Vec<PurchaseOrder>, ServiceError> {
        self.store.list().await
    }

    /// Submits a draft order, moving it to `Ordered`.
    #[instrument(skip(self))]
    pub async fn submit(&self, order_id: Uuid) -> Result<PurchaseOrder, ServiceError> {
        let order = self.require(order_id).await?;
        if order.status != PurchaseOrderStatus::Draft {
            return Err(ServiceError::invalid_state(format!(
                "only draft purchase orders can be submitted; {} is {}",
                order_id, order.status
            )));
        }
        let updated = self
            .store
            .set_status(order_id, PurchaseOrderStatus::Ordered)
            .await?;
        info!(order_id = %order_id, "purchase order submitted");
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(Event::PurchaseOrderSubmitted(order_id)).await;
        }
        Ok(updated)
    }

    /// Cancels an order from any state except `Received`/`Cancelled`. The
    /// reason, if given, is appended to the order notes.
    #[instrument(skip(self, reason))]
    pub async fn cancel(
        &self,
        order_id: Uuid,
        reason: Option<String>,
    ) -> Result<PurchaseOrder, ServiceError> {
        let mut order = self.require(order_id).await?;
        if !order.status.is_cancellable() {
            return Err(ServiceError::invalid_state(format!(
                "cannot cancel purchase order {} in status {}",
                order_id, order.status
            )));
        }
        order.status = PurchaseOrderStatus::Cancelled;
        if let Some(text) = &reason {
            order.notes = Some(match order.notes.take() {
                Some(notes) => format!("{}\nCancelled: {}", notes, text),
                None => format!("Cancelled: {}", text),
            });
        }
        let updated = self.store.update(order).await?;
        info!(order_id = %order_id, "purchase order cancelled");
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::PurchaseOrderCancelled { order_id, reason })
                .await;
        }
        Ok(updated)
    }

    /// Updates order fields and existing items. Draft only; line totals
    /// and the aggregate total are recomputed.
    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        order_id: Uuid,
        request: UpdateOrderRequest,
    ) -> Result<PurchaseOrder, ServiceError> {
        let mut order = self.require(order_id).await?;
        if order.status != PurchaseOrderStatus::Draft {
            return Err(ServiceError::invalid_state(format!(
                "only draft purchase orders can be updated; {} is {}",
                order_id, order.status
            )));
        }

        if let Some(supplier_id) = request.supplier_id {
            order.supplier_id = Some(supplier_id);
        }
        if let Some(placed_at) = request.placed_at {
            order.placed_at = Some(placed_at);
        }
        if let Some(expected_arrival) = request.expected_arrival {
            order.expected_arrival = Some(expected_arrival);
        }
        if let Some(notes) = request.notes {
            order.notes = Some(notes);
        }

        if let Some(patches) = request.items {
            let now = Utc::now();
            for patch in patches {
                let item = order
                    .items
                    .iter_mut()
                    .find(|i| i.id == patch.id)
                    .ok_or_else(|| {
                        ServiceError::invalid_request(format!(
                            "item {} not found in purchase order {}",
                            patch.id, order_id
                        ))
                    })?;
                if let Some(qty) = patch.qty_ordered {
                    if qty < 1 {
                        return Err(ServiceError::ValidationError(
                            "qty_ordered must be positive".into(),
                        ));
                    }
                    item.qty_ordered = qty;
                }
                if let Some(price) = patch.unit_price {
                    item.unit_price = Some(price);
                }
                if let Some(remark) = patch.remark {
                    item.remark = Some(remark);
                }
                item.line_total = line_total(item.qty_ordered, item.unit_price);
                item.updated_at = now;
            }
        }

        order.recompute_total();
        self.store.update(order).await
    }

    /// Adds items to a draft order.
    #[instrument(skip(self, items))]
    pub async fn add_items(
        &self,
        order_id: Uuid,
        items: Vec<NewOrderItem>,
    ) -> Result<PurchaseOrder, ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::invalid_request("no items to add"));
        }
        for item in &items {
            item.validate()
                .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        }
        let order = self.require(order_id).await?;
        if order.status != PurchaseOrderStatus::Draft {
            return Err(ServiceError::invalid_state(format!(
                "items can only be added to draft purchase orders; {} is {}",
                order_id, order.status
            )));
        }

        let now = Utc::now();
        let rows = items
            .iter()
            .map(|it| PurchaseOrderItem {
                id: Uuid::new_v4(),
                purchase_order_id: order_id,
                product_id: it.product_id,
                qty_ordered: it.qty_ordered,
                qty_received: 0,
                unit_price: it.unit_price,
                line_total: line_total(it.qty_ordered, it.unit_price),
                remark: it.remark.clone(),
                created_at: now,
                updated_at: now,
            })
            .collect();
        self.store.add_items(order_id, rows).await
    }

    /// Removes items from a draft order; every id must belong to it.
    #[instrument(skip(self, item_ids))]
    pub async fn remove_items(
        &self,
        order_id: Uuid,
        item_ids: &[Uuid],
    ) -> Result<PurchaseOrder, ServiceError> {
        if item_ids.is_empty() {
            return Err(ServiceError::invalid_request("no items to remove"));
        }
        let order = self.require(order_id).await?;
        if order.status != PurchaseOrderStatus::Draft {
            return Err(ServiceError::invalid_state(format!(
                "items can only be removed from draft purchase orders; {} is {}",
                order_id, order.status
            )));
        }
        for item_id in item_ids {
            if order.item(*item_id).is_none() {
                return Err(ServiceError::invalid_request(format!(
                    "item {} not found in purchase order {}",
                    item_id, order_id
                )));
            }
        }
        self.store.remove_items(order_id, item_ids).await
    }

    /// Receives physical stock against an order.
    ///
    /// All preconditions are checked against a pre-call snapshot before
    /// the first gateway call, so a doomed request leaves no external
    /// side effect. Each line then produces exactly one gateway call;
    /// only lines whose outcome was a fresh effect are credited to the
    /// order, in one atomic store write that also recomputes the status.
    /// When every line is a replay, the order is returned unchanged and
    /// no store write happens, making the whole call idempotent.
    #[instrument(skip(self, lines), fields(order_id = %order_id, line_count = lines.len()))]
    pub async fn receive(
        &self,
        order_id: Uuid,
        lines: Vec<ReceiptLine>,
    ) -> Result<PurchaseOrder, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::invalid_request("no receipt lines provided"));
        }
        for line in &lines {
            line.validate()
                .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        }

        // Concurrent receives for the same order would race the
        // increment-then-recompute step; serialize them per order id.
        let lock = self.order_lock(order_id);
        let _guard = lock.lock().await;

        let order = self.require(order_id).await?;
        if !order.status.is_receivable() {
            return Err(ServiceError::invalid_state(format!(
                "purchase order {} is {} and cannot be received",
                order_id, order.status
            )));
        }

        let item_ids: Vec<Uuid> = lines.iter().map(|l| l.item_id).collect();
        let mut unique_ids = item_ids.clone();
        unique_ids.sort_unstable();
        unique_ids.dedup();
        let items = self.store.find_items(order_id, &item_ids).await?;
        if items.len() != unique_ids.len() {
            return Err(ServiceError::invalid_request(format!(
                "some receipt lines reference items that do not belong to purchase order {}",
                order_id
            )));
        }
        let items_by_id: HashMap<Uuid, &PurchaseOrderItem> =
            items.iter().map(|i| (i.id, i)).collect();

        // Over-receive check against the snapshot, before any gateway
        // call. Multiple lines for one item accumulate against its
        // remaining allowance.
        let mut pending: HashMap<Uuid, i32> = HashMap::new();
        for line in &lines {
            let item = items_by_id[&line.item_id];
            let already_pending = pending.get(&line.item_id).copied().unwrap_or(0);
            let remaining = item.remaining() - already_pending;
            if line.quantity > remaining {
                return Err(ServiceError::OverReceive {
                    item_id: item.id,
                    requested: line.quantity,
                    remaining,
                });
            }
            *pending.entry(line.item_id).or_insert(0) += line.quantity;
        }

        // Delegation: exactly one gateway call per line, in input order.
        let mut applied: Vec<AppliedLine> = Vec::with_capacity(lines.len());
        for line in &lines {
            let item = items_by_id[&line.item_id];
            let location = self.allocation.resolve_location(line.location_id).await?;
            let batch = self
                .allocation
                .resolve_batch(
                    line.batch_id,
                    item.product_id,
                    item.id,
                    Some(order.po_number.as_str()),
                )
                .await?;
            if let ResolvedBatch::Created(created) = &batch {
                if let Some(sender) = &self.event_sender {
                    sender
                        .send_or_log(Event::BatchCreated {
                            batch_id: created.id,
                            product_id: created.product_id,
                            batch_no: created.batch_no.clone(),
                        })
                        .await;
                }
            }

            let outcome = self
                .gateway
                .receive(StockReceipt {
                    batch_id: batch.batch_id(),
                    location_id: location.location_id(),
                    quantity: line.quantity,
                    received_by: Some(line.received_by),
                    idempotency_key: line.idempotency_key.clone(),
                })
                .await?;
            if outcome.idempotent {
                info!(item_id = %line.item_id, "receipt line was an idempotent replay");
            }
            applied.push(AppliedLine {
                item_id: line.item_id,
                quantity: line.quantity,
                batch_id: batch.batch_id(),
                location_id: location.location_id(),
                idempotent: outcome.idempotent,
            });
        }

        // Reconciliation: credit only fresh effects, atomically.
        let fresh: Vec<&AppliedLine> = applied.iter().filter(|l| !l.idempotent).collect();
        if fresh.is_empty() {
            info!(order_id = %order_id, "every receipt line was previously applied; order unchanged");
            return Ok(order);
        }

        let increments: Vec<ReceiptIncrement> = fresh
            .iter()
            .map(|l| ReceiptIncrement {
                item_id: l.item_id,
                qty: l.quantity,
            })
            .collect();
        let updated = match self.store.apply_receipt_increments(order_id, &increments).await {
            Ok(updated) => updated,
            Err(e) => {
                // The inventory effect is already durable and out of this
                // engine's transactional reach; no undo is attempted.
                error!(order_id = %order_id, error = %e, "order update failed after inventory receipt");
                return Err(ServiceError::ReconciliationFailed(e.to_string()));
            }
        };

        if let Some(sender) = &self.event_sender {
            for line in &fresh {
                sender
                    .send_or_log(Event::PurchaseOrderReceived {
                        order_id,
                        item_id: line.item_id,
                        quantity: line.quantity,
                        batch_id: line.batch_id,
                        location_id: line.location_id,
                    })
                    .await;
            }
            if updated.status != order.status {
                sender
                    .send_or_log(Event::PurchaseOrderStatusChanged {
                        order_id,
                        old_status: order.status.to_string(),
                        new_status: updated.status.to_string(),
                    })
                    .await;
            }
        }
        info!(
            order_id = %order_id,
            status = %updated.status,
            fresh = fresh.len(),
            replayed = applied.len() - fresh.len(),
            "purchase order receipt applied"
        );
        Ok(updated)
    }
}
