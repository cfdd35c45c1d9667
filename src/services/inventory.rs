use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::stock::{
    StockMovement, StockMovementType, StockReceipt, StockReceiptOutcome,
};
use crate::repositories::{InventoryReceiptGateway, StockLookup};

/// One physical dispatch request, the mirror of [`StockReceipt`].
#[derive(Clone, Debug, PartialEq)]
pub struct StockDispatch {
    pub batch_id: Uuid,
    pub location_id: Uuid,
    pub quantity: i32,
    pub dispatched_by: Option<Uuid>,
    pub idempotency_key: String,
}

/// The inventory subsystem: stock levels per (batch, location), a durable
/// movement log, and an idempotency index over caller-supplied keys.
///
/// Replaying a key returns the original movement without touching stock,
/// which is what makes the purchase order receiving workflow retry-safe.
pub struct InventoryService {
    stock: Arc<dyn StockLookup>,
    levels: DashMap<(Uuid, Uuid), i32>,
    movements: DashMap<Uuid, StockMovement>,
    movements_by_key: DashMap<String, Uuid>,
    event_sender: Option<EventSender>,
}

enum KeyClaim {
    Fresh,
    Replayed(Uuid),
}

impl InventoryService {
    pub fn new(stock: Arc<dyn StockLookup>, event_sender: Option<EventSender>) -> Self {
        Self {
            stock,
            levels: DashMap::new(),
            movements: DashMap::new(),
            movements_by_key: DashMap::new(),
            event_sender,
        }
    }

    /// Claims an idempotency key for a new movement id. Exactly one caller
    /// per key ever sees `Fresh`; everyone else gets the movement that won.
    fn claim_key(&self, key: &str, movement_id: Uuid) -> KeyClaim {
        match self.movements_by_key.entry(key.to_string()) {
            Entry::Occupied(existing) => KeyClaim::Replayed(*existing.get()),
            Entry::Vacant(slot) => {
                slot.insert(movement_id);
                KeyClaim::Fresh
            }
        }
    }

    async fn check_references(
        &self,
        batch_id: Uuid,
        location_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::invalid_request(
                "movement quantity must be positive",
            ));
        }
        self.stock
            .find_batch(batch_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("product batch", batch_id))?;
        self.stock
            .find_location(location_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("location", location_id))?;
        Ok(())
    }

    /// Records a stock receipt. Idempotent on the caller-supplied key.
    #[instrument(skip(self, receipt), fields(batch_id = %receipt.batch_id, location_id = %receipt.location_id, quantity = receipt.quantity))]
    pub async fn receive_stock(
        &self,
        receipt: StockReceipt,
    ) -> Result<StockReceiptOutcome, ServiceError> {
        self.check_references(receipt.batch_id, receipt.location_id, receipt.quantity)
            .await?;

        let movement_id = Uuid::new_v4();
        if let KeyClaim::Replayed(existing) = self.claim_key(&receipt.idempotency_key, movement_id)
        {
            info!(movement_id = %existing, "stock receipt replayed idempotently");
            return Ok(StockReceiptOutcome {
                idempotent: true,
                movement_id: existing,
            });
        }

        let movement = StockMovement {
            id: movement_id,
            batch_id: receipt.batch_id,
            location_id: receipt.location_id,
            movement_type: StockMovementType::Receipt,
            quantity: receipt.quantity,
            created_by: receipt.received_by,
            idempotency_key: Some(receipt.idempotency_key.clone()),
            created_at: Utc::now(),
        };
        self.movements.insert(movement_id, movement);
        *self
            .levels
            .entry((receipt.batch_id, receipt.location_id))
            .or_insert(0) += receipt.quantity;
        self.stock
            .adjust_batch_quantity(receipt.batch_id, receipt.quantity)
            .await?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::StockReceived {
                    movement_id,
                    batch_id: receipt.batch_id,
                    location_id: receipt.location_id,
                    quantity: receipt.quantity,
                })
                .await;
        }
        info!(%movement_id, "stock received");

        Ok(StockReceiptOutcome {
            idempotent: false,
            movement_id,
        })
    }

    /// Records a stock dispatch, failing when the (batch, location) level
    /// cannot cover the quantity. Same idempotency contract as receive.
    #[instrument(skip(self, dispatch), fields(batch_id = %dispatch.batch_id, location_id = %dispatch.location_id, quantity = dispatch.quantity))]
    pub async fn dispatch_stock(
        &self,
        dispatch: StockDispatch,
    ) -> Result<StockReceiptOutcome, ServiceError> {
        self.check_references(dispatch.batch_id, dispatch.location_id, dispatch.quantity)
            .await?;

        let movement_id = Uuid::new_v4();
        if let KeyClaim::Replayed(existing) =
            self.claim_key(&dispatch.idempotency_key, movement_id)
        {
            info!(movement_id = %existing, "stock dispatch replayed idempotently");
            return Ok(StockReceiptOutcome {
                idempotent: true,
                movement_id: existing,
            });
        }

        {
            let mut level = self
                .levels
                .entry((dispatch.batch_id, dispatch.location_id))
                .or_insert(0);
            if *level < dispatch.quantity {
                // Release the key so a later, covered dispatch may reuse it.
                drop(level);
                self.movements_by_key.remove(&dispatch.idempotency_key);
                return Err(ServiceError::InsufficientStock(format!(
                    "batch {} at location {} cannot cover a dispatch of {}",
                    dispatch.batch_id, dispatch.location_id, dispatch.quantity
                )));
            }
            *level -= dispatch.quantity;
        }

        let movement = StockMovement {
            id: movement_id,
            batch_id: dispatch.batch_id,
            location_id: dispatch.location_id,
            movement_type: StockMovementType::Dispatch,
            quantity: dispatch.quantity,
            created_by: dispatch.dispatched_by,
            idempotency_key: Some(dispatch.idempotency_key.clone()),
            created_at: Utc::now(),
        };
        self.movements.insert(movement_id, movement);
        self.stock
            .adjust_batch_quantity(dispatch.batch_id, -dispatch.quantity)
            .await?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::StockDispatched {
                    movement_id,
                    batch_id: dispatch.batch_id,
                    location_id: dispatch.location_id,
                    quantity: dispatch.quantity,
                })
                .await;
        }
        info!(%movement_id, "stock dispatched");

        Ok(StockReceiptOutcome {
            idempotent: false,
            movement_id,
        })
    }

    /// On-hand quantity for a batch at a location.
    pub fn on_hand(&self, batch_id: Uuid, location_id: Uuid) -> i32 {
        self.levels
            .get(&(batch_id, location_id))
            .map(|l| *l)
            .unwrap_or(0)
    }

    pub fn movement(&self, movement_id: Uuid) -> Option<StockMovement> {
        self.movements.get(&movement_id).map(|m| m.value().clone())
    }

    pub fn movement_by_key(&self, key: &str) -> Option<StockMovement> {
        let movement_id = self.movements_by_key.get(key).map(|id| *id)?;
        self.movement(movement_id)
    }
}

#[async_trait]
impl InventoryReceiptGateway for InventoryService {
    async fn receive(&self, receipt: StockReceipt) -> Result<StockReceiptOutcome, ServiceError> {
        self.receive_stock(receipt).await
    }
}
