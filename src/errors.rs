use serde::Serialize;
use uuid::Uuid;

/// Crate-wide service error.
///
/// Every failure the purchase order and inventory services can surface is
/// one of these variants. Precondition failures (`NotFound`,
/// `InvalidRequest`, `InvalidState`, `OverReceive`) are raised before any
/// external side effect; the remaining variants describe failures
/// discovered mid-flight and carry enough context for the caller to decide
/// whether a retry is safe.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The operation is not legal for the order's current status.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Receiving the requested quantity would exceed the ordered quantity.
    #[error(
        "Over-receive: item {item_id} has {remaining} remaining but {requested} was requested"
    )]
    OverReceive {
        item_id: Uuid,
        requested: i32,
        remaining: i32,
    },

    /// No stock location could be resolved for a receipt line that omitted
    /// one. Raised during resolution, after validation has already passed.
    #[error("No location available: create a location first or provide a location id")]
    NoLocationAvailable,

    #[error("Batch creation failed: {0}")]
    BatchCreationFailed(String),

    /// The order-state write failed after the inventory subsystem already
    /// recorded a fresh stock effect. The inventory side is idempotent, so
    /// retrying the whole receive call is safe; replayed lines will not be
    /// double-counted.
    #[error("Reconciliation failed: {0}; inventory was recorded - safe to retry the receive")]
    ReconciliationFailed(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Event error: {0}")]
    EventError(String),
}

impl ServiceError {
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        ServiceError::NotFound(format!("{} {} not found", entity, id))
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        ServiceError::InvalidRequest(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        ServiceError::InvalidState(msg.into())
    }

    /// True when retrying the same call cannot double-apply any effect.
    pub fn is_retry_safe(&self) -> bool {
        matches!(self, ServiceError::ReconciliationFailed(_))
    }
}
