#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use stockroom::services::purchase_orders::{CreateOrderRequest, NewOrderItem, ReceiptLine};
use stockroom::{
    AllocationService, AppConfig, InventoryReceiptGateway, InventoryService,
    PurchaseOrder, PurchaseOrderService, PurchaseOrderStore, ReceiptIncrement, ServiceError,
    StockReceipt, StockReceiptOutcome,
};
use stockroom::models::purchase_order::PurchaseOrderItem;
use stockroom::models::purchase_order::PurchaseOrderStatus;
use stockroom::repositories::{InMemoryPurchaseOrderStore, InMemoryStockStore};

/// Gateway wrapper that counts calls before delegating to the real
/// inventory subsystem.
pub struct CountingGateway {
    inner: Arc<InventoryService>,
    pub calls: AtomicUsize,
}

impl CountingGateway {
    pub fn new(inner: Arc<InventoryService>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InventoryReceiptGateway for CountingGateway {
    async fn receive(&self, receipt: StockReceipt) -> Result<StockReceiptOutcome, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.receive(receipt).await
    }
}

/// Store wrapper that counts reconciliation writes and can be told to
/// fail the next one, for exercising the failure-after-effect path.
pub struct InstrumentedStore {
    inner: Arc<InMemoryPurchaseOrderStore>,
    pub apply_calls: AtomicUsize,
    pub fail_next_apply: AtomicBool,
}

impl InstrumentedStore {
    pub fn new(inner: Arc<InMemoryPurchaseOrderStore>) -> Self {
        Self {
            inner,
            apply_calls: AtomicUsize::new(0),
            fail_next_apply: AtomicBool::new(false),
        }
    }

    pub fn apply_count(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    pub fn fail_next_apply(&self) {
        self.fail_next_apply.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PurchaseOrderStore for InstrumentedStore {
    async fn insert(&self, order: PurchaseOrder) -> Result<PurchaseOrder, ServiceError> {
        self.inner.insert(order).await
    }

    async fn find_by_id(&self, order_id: Uuid) -> Result<Option<PurchaseOrder>, ServiceError> {
        self.inner.find_by_id(order_id).await
    }

    async fn find_items(
        &self,
        order_id: Uuid,
        item_ids: &[Uuid],
    ) -> Result<Vec<PurchaseOrderItem>, ServiceError> {
        self.inner.find_items(order_id, item_ids).await
    }

    async fn apply_receipt_increments(
        &self,
        order_id: Uuid,
        increments: &[ReceiptIncrement],
    ) -> Result<PurchaseOrder, ServiceError> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_apply.swap(false, Ordering::SeqCst) {
            return Err(ServiceError::InvalidRequest(
                "simulated store outage".into(),
            ));
        }
        self.inner.apply_receipt_increments(order_id, increments).await
    }

    async fn set_status(
        &self,
        order_id: Uuid,
        status: PurchaseOrderStatus,
    ) -> Result<PurchaseOrder, ServiceError> {
        self.inner.set_status(order_id, status).await
    }

    async fn update(&self, order: PurchaseOrder) -> Result<PurchaseOrder, ServiceError> {
        self.inner.update(order).await
    }

    async fn add_items(
        &self,
        order_id: Uuid,
        items: Vec<PurchaseOrderItem>,
    ) -> Result<PurchaseOrder, ServiceError> {
        self.inner.add_items(order_id, items).await
    }

    async fn remove_items(
        &self,
        order_id: Uuid,
        item_ids: &[Uuid],
    ) -> Result<PurchaseOrder, ServiceError> {
        self.inner.remove_items(order_id, item_ids).await
    }

    async fn list(&self) -> Result<Vec<PurchaseOrder>, ServiceError> {
        self.inner.list().await
    }
}

/// Fully wired test fixture: in-memory stores, the real inventory
/// subsystem behind a counting gateway, and the purchase order service.
pub struct TestContext {
    pub orders: Arc<InstrumentedStore>,
    pub stock: Arc<InMemoryStockStore>,
    pub inventory: Arc<InventoryService>,
    pub gateway: Arc<CountingGateway>,
    pub service: PurchaseOrderService,
}

pub fn context() -> TestContext {
    let orders = Arc::new(InstrumentedStore::new(Arc::new(
        InMemoryPurchaseOrderStore::new(),
    )));
    let stock = Arc::new(InMemoryStockStore::new());
    let inventory = Arc::new(InventoryService::new(stock.clone(), None));
    let gateway = Arc::new(CountingGateway::new(inventory.clone()));
    let allocation = Arc::new(AllocationService::new(stock.clone(), &AppConfig::default()));
    let service = PurchaseOrderService::new(
        orders.clone(),
        gateway.clone(),
        allocation,
        None,
    );
    TestContext {
        orders,
        stock,
        inventory,
        gateway,
        service,
    }
}

/// Creates a draft order with one item per `(qty_ordered, unit_price)`.
pub async fn draft_order(
    ctx: &TestContext,
    items: &[(i32, Option<Decimal>)],
) -> PurchaseOrder {
    ctx.service
        .create(CreateOrderRequest {
            supplier_id: Some(Uuid::new_v4()),
            placed_at: None,
            expected_arrival: None,
            notes: None,
            items: items
                .iter()
                .map(|(qty, price)| NewOrderItem {
                    product_id: Uuid::new_v4(),
                    qty_ordered: *qty,
                    unit_price: *price,
                    remark: None,
                })
                .collect(),
            created_by: Uuid::new_v4(),
        })
        .await
        .expect("create draft order")
}

/// Creates and submits an order, leaving it receivable.
pub async fn ordered_order(
    ctx: &TestContext,
    items: &[(i32, Option<Decimal>)],
) -> PurchaseOrder {
    let order = draft_order(ctx, items).await;
    ctx.service.submit(order.id).await.expect("submit order")
}

pub fn receipt_line(item_id: Uuid, quantity: i32, key: &str) -> ReceiptLine {
    ReceiptLine {
        item_id,
        quantity,
        location_id: None,
        batch_id: None,
        received_by: Uuid::new_v4(),
        idempotency_key: key.to_string(),
    }
}
