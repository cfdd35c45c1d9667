mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use uuid::Uuid;

use common::{context, draft_order, ordered_order, receipt_line};
use stockroom::models::purchase_order::PurchaseOrderStatus;
use stockroom::services::purchase_orders::{NewOrderItem, OrderItemPatch, UpdateOrderRequest};
use stockroom::ServiceError;

#[tokio::test]
async fn create_builds_a_draft_with_number_and_totals() {
    let ctx = context();
    let order = draft_order(&ctx, &[(2, Some(dec!(10.00))), (3, None)]).await;

    assert_eq!(order.status, PurchaseOrderStatus::Draft);
    assert!(order.po_number.starts_with("PO-"));
    assert_eq!(order.items.len(), 2);
    assert_eq!(order.items[0].line_total, Some(dec!(20.00)));
    assert_eq!(order.items[1].line_total, None);
    assert_eq!(order.total_amount, dec!(20.00));
}

#[tokio::test]
async fn create_rejects_non_positive_quantities() {
    let ctx = context();
    let err = ctx
        .service
        .create(stockroom::services::purchase_orders::CreateOrderRequest {
            supplier_id: None,
            placed_at: None,
            expected_arrival: None,
            notes: None,
            items: vec![NewOrderItem {
                product_id: Uuid::new_v4(),
                qty_ordered: 0,
                unit_price: None,
                remark: None,
            }],
            created_by: Uuid::new_v4(),
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn submit_moves_draft_to_ordered_exactly_once() {
    let ctx = context();
    let order = draft_order(&ctx, &[(5, None)]).await;

    let submitted = ctx.service.submit(order.id).await.unwrap();
    assert_eq!(submitted.status, PurchaseOrderStatus::Ordered);

    let err = ctx.service.submit(order.id).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidState(_));

    let err = ctx.service.submit(Uuid::new_v4()).await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn cancel_is_blocked_for_received_and_cancelled_orders() {
    let ctx = context();
    ctx.stock.add_location("DEFAULT", "Receiving dock");

    // Draft and ordered orders cancel fine; the reason lands in notes.
    let draft = draft_order(&ctx, &[(5, None)]).await;
    let cancelled = ctx
        .service
        .cancel(draft.id, Some("supplier discontinued".into()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, PurchaseOrderStatus::Cancelled);
    assert!(cancelled.notes.unwrap().contains("supplier discontinued"));

    let err = ctx.service.cancel(draft.id, None).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidState(_));

    // A fully received order cannot be cancelled.
    let done = ordered_order(&ctx, &[(2, None)]).await;
    ctx.service
        .receive(done.id, vec![receipt_line(done.items[0].id, 2, "k1")])
        .await
        .unwrap();
    let err = ctx.service.cancel(done.id, None).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidState(_));

    // Partially received orders still can.
    let partial = ordered_order(&ctx, &[(2, None)]).await;
    ctx.service
        .receive(partial.id, vec![receipt_line(partial.items[0].id, 1, "k2")])
        .await
        .unwrap();
    let cancelled = ctx.service.cancel(partial.id, None).await.unwrap();
    assert_eq!(cancelled.status, PurchaseOrderStatus::Cancelled);
}

#[tokio::test]
async fn update_is_draft_only_and_recomputes_totals() {
    let ctx = context();
    let order = draft_order(&ctx, &[(2, Some(dec!(10.00)))]).await;
    let item_id = order.items[0].id;

    let updated = ctx
        .service
        .update(
            order.id,
            UpdateOrderRequest {
                notes: Some("rush order".into()),
                items: Some(vec![OrderItemPatch {
                    id: item_id,
                    qty_ordered: Some(4),
                    unit_price: Some(dec!(9.50)),
                    remark: Some("blue variant".into()),
                }]),
                ..UpdateOrderRequest::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.notes.as_deref(), Some("rush order"));
    assert_eq!(updated.items[0].qty_ordered, 4);
    assert_eq!(updated.items[0].line_total, Some(dec!(38.00)));
    assert_eq!(updated.total_amount, dec!(38.00));

    // Unknown item reference fails.
    let err = ctx
        .service
        .update(
            order.id,
            UpdateOrderRequest {
                items: Some(vec![OrderItemPatch {
                    id: Uuid::new_v4(),
                    qty_ordered: Some(1),
                    unit_price: None,
                    remark: None,
                }]),
                ..UpdateOrderRequest::default()
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidRequest(_));

    // Once submitted, update is refused; ordered quantities are frozen.
    ctx.service.submit(order.id).await.unwrap();
    let err = ctx
        .service
        .update(order.id, UpdateOrderRequest::default())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidState(_));
}

#[tokio::test]
async fn items_can_only_be_added_or_removed_while_draft() {
    let ctx = context();
    let order = draft_order(&ctx, &[(2, Some(dec!(5.00)))]).await;

    let updated = ctx
        .service
        .add_items(
            order.id,
            vec![NewOrderItem {
                product_id: Uuid::new_v4(),
                qty_ordered: 3,
                unit_price: Some(dec!(2.00)),
                remark: None,
            }],
        )
        .await
        .unwrap();
    assert_eq!(updated.items.len(), 2);
    assert_eq!(updated.total_amount, dec!(16.00));

    let added_id = updated.items[1].id;
    let updated = ctx.service.remove_items(order.id, &[added_id]).await.unwrap();
    assert_eq!(updated.items.len(), 1);
    assert_eq!(updated.total_amount, dec!(10.00));

    // Removing an item that is not on the order fails.
    let err = ctx
        .service
        .remove_items(order.id, &[Uuid::new_v4()])
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidRequest(_));

    // After submit both operations are refused.
    ctx.service.submit(order.id).await.unwrap();
    let err = ctx
        .service
        .add_items(
            order.id,
            vec![NewOrderItem {
                product_id: Uuid::new_v4(),
                qty_ordered: 1,
                unit_price: None,
                remark: None,
            }],
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidState(_));

    let remaining_id = ctx.service.get(order.id).await.unwrap().items[0].id;
    let err = ctx
        .service
        .remove_items(order.id, &[remaining_id])
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidState(_));
}

#[tokio::test]
async fn list_returns_orders_in_creation_order() {
    let ctx = context();
    let first = draft_order(&ctx, &[(1, None)]).await;
    let second = draft_order(&ctx, &[(1, None)]).await;

    let orders = ctx.service.list().await.unwrap();
    let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let first_pos = ids.iter().position(|id| *id == first.id).unwrap();
    let second_pos = ids.iter().position(|id| *id == second.id).unwrap();
    assert!(first_pos < second_pos);
}

#[tokio::test]
async fn get_surfaces_not_found() {
    let ctx = context();
    let err = ctx.service.get(Uuid::new_v4()).await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}
