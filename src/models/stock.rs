use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A physical stock location within a warehouse.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub warehouse_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A batch (lot) of a product tracked through inventory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductBatch {
    pub id: Uuid,
    pub product_id: Uuid,
    pub batch_no: String,
    /// On-hand quantity across locations; adjusted by stock movements,
    /// not by batch creation.
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a batch record. The id is assigned by the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewProductBatch {
    pub product_id: Uuid,
    pub batch_no: String,
    pub initial_quantity: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StockMovementType {
    Receipt,
    Dispatch,
}

/// A durable record of one stock change at a location.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub location_id: Uuid,
    pub movement_type: StockMovementType,
    pub quantity: i32,
    pub created_by: Option<Uuid>,
    /// Caller-supplied key making the movement replay-safe; unique per
    /// physical stock event.
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One physical receipt request handed to the inventory subsystem.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StockReceipt {
    pub batch_id: Uuid,
    pub location_id: Uuid,
    pub quantity: i32,
    pub received_by: Option<Uuid>,
    pub idempotency_key: String,
}

/// Outcome of an inventory receipt call. A returned outcome implies the
/// stock state matches the request; `idempotent` distinguishes a fresh
/// effect from the replay of a previously-applied key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StockReceiptOutcome {
    pub idempotent: bool,
    pub movement_id: Uuid,
}
