use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::errors::ServiceError;

/// Domain events emitted by the services after an effect has been applied.
///
/// Delivery is fire-and-forget from the emitting service's point of view;
/// processing them (webhooks, projections, notifications) is the
/// embedder's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    PurchaseOrderCreated(Uuid),
    PurchaseOrderSubmitted(Uuid),
    PurchaseOrderCancelled {
        order_id: Uuid,
        reason: Option<String>,
    },
    PurchaseOrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    /// One receipt line was durably credited to an order item. Emitted only
    /// for fresh stock effects, never for idempotent replays.
    PurchaseOrderReceived {
        order_id: Uuid,
        item_id: Uuid,
        quantity: i32,
        batch_id: Uuid,
        location_id: Uuid,
    },
    BatchCreated {
        batch_id: Uuid,
        product_id: Uuid,
        batch_no: String,
    },
    StockReceived {
        movement_id: Uuid,
        batch_id: Uuid,
        location_id: Uuid,
        quantity: i32,
    },
    StockDispatched {
        movement_id: Uuid,
        batch_id: Uuid,
        location_id: Uuid,
        quantity: i32,
    },
    Generic {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

/// Sending half of the event channel, cloned into each service.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, failing if the channel is closed or full.
    pub async fn send(&self, event: Event) -> Result<(), ServiceError> {
        self.sender
            .send(event)
            .await
            .map_err(|e| ServiceError::EventError(format!("failed to send event: {}", e)))
    }

    /// Sends an event, logging instead of failing. Business operations use
    /// this form: a dropped event never fails an already-applied effect.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("event delivery failed: {}", e);
        }
    }
}

/// Creates an event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}
