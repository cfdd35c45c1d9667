//! Stockroom
//!
//! Warehouse back office core for procurement: purchase order lifecycle,
//! the receiving workflow, and the stock movements it produces.
//!
//! The crate is a library; it exposes the purchase order service surface
//! (`receive`, `submit`, `cancel`, `update`, `add_items`, `remove_items`,
//! `get`, `list`) to a thin request layer that lives outside this crate.
//! Persistence and the physical inventory subsystem sit behind the
//! collaborator traits in [`repositories`]; in-memory reference
//! implementations are provided for embedding and testing.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod errors;
pub mod events;
pub mod logging;
pub mod models;
pub mod repositories;
pub mod services;

pub use config::AppConfig;
pub use errors::ServiceError;
pub use events::{Event, EventSender};
pub use models::purchase_order::{PurchaseOrder, PurchaseOrderItem, PurchaseOrderStatus};
pub use models::stock::{
    Location, ProductBatch, StockMovement, StockMovementType, StockReceipt, StockReceiptOutcome,
};
pub use repositories::{InventoryReceiptGateway, PurchaseOrderStore, ReceiptIncrement, StockLookup};
pub use services::allocation::{AllocationService, ResolvedBatch, ResolvedLocation};
pub use services::inventory::InventoryService;
pub use services::purchase_orders::{PurchaseOrderService, ReceiptLine};
