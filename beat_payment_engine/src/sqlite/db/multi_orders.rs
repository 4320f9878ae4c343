use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{MultiItemOrder, NewOrderItem, OrderId, OrderItem, OrderStatus},
    sqlite::db::orders::conditional_transition_sql,
    traits::{MultiOrderSettlement, PaymentGatewayError, TransitionUpdate},
};

pub async fn fetch_multi_order_by_id(
    id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<MultiItemOrder>, sqlx::Error> {
    let order: Option<MultiItemOrder> =
        sqlx::query_as("SELECT * FROM multi_item_orders WHERE id = $1").bind(id.as_str()).fetch_optional(&mut *conn).await?;
    attach_items(order, conn).await
}

pub async fn fetch_multi_order_by_session_id(
    session_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<MultiItemOrder>, sqlx::Error> {
    let order: Option<MultiItemOrder> = sqlx::query_as("SELECT * FROM multi_item_orders WHERE session_id = $1")
        .bind(session_id)
        .fetch_optional(&mut *conn)
        .await?;
    attach_items(order, conn).await
}

pub async fn fetch_multi_order_by_payment_intent(
    intent_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<MultiItemOrder>, sqlx::Error> {
    let order: Option<MultiItemOrder> = sqlx::query_as("SELECT * FROM multi_item_orders WHERE payment_intent_id = $1")
        .bind(intent_id)
        .fetch_optional(&mut *conn)
        .await?;
    attach_items(order, conn).await
}

pub async fn fetch_order_items(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    let items = sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(items)
}

async fn attach_items(
    order: Option<MultiItemOrder>,
    conn: &mut SqliteConnection,
) -> Result<Option<MultiItemOrder>, sqlx::Error> {
    match order {
        Some(mut order) => {
            order.items = fetch_order_items(&order.id, conn).await?;
            Ok(Some(order))
        },
        None => Ok(None),
    }
}

/// Settles a multi-item order inside the caller's transaction.
///
/// The status write is guarded on `Pending` (compare-and-swap); when the guard holds, the entire item collection is
/// replaced (delete-all, insert-new) and the recomputed totals and customer fields are written. When the guard
/// fails, nothing at all is written and `None` is returned.
pub async fn settle_multi_order(
    id: &OrderId,
    settlement: MultiOrderSettlement,
    conn: &mut SqliteConnection,
) -> Result<Option<MultiItemOrder>, PaymentGatewayError> {
    let order: Option<MultiItemOrder> = sqlx::query_as(
        r#"
            UPDATE multi_item_orders SET
                status = $1,
                updated_at = CURRENT_TIMESTAMP,
                paid_at = $2,
                session_id = COALESCE($3, session_id),
                payment_intent_id = COALESCE($4, payment_intent_id),
                customer_email = COALESCE($5, customer_email),
                customer_name = COALESCE($6, customer_name),
                customer_phone = COALESCE($7, customer_phone),
                total_amount = $8,
                currency = COALESCE($9, currency),
                payment_method = COALESCE($10, payment_method)
            WHERE id = $11 AND status = 'Pending'
            RETURNING *;
        "#,
    )
    .bind(OrderStatus::Paid)
    .bind(settlement.paid_at)
    .bind(settlement.session_id)
    .bind(settlement.payment_intent_id)
    .bind(settlement.contact.email)
    .bind(settlement.contact.name)
    .bind(settlement.contact.phone)
    .bind(settlement.total_amount)
    .bind(settlement.currency)
    .bind(settlement.payment_method)
    .bind(id.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    let Some(mut order) = order else {
        return Ok(None);
    };
    replace_order_items(id, settlement.items, &mut *conn).await?;
    order.items = fetch_order_items(id, conn).await?;
    debug!("📝️ Multi-item order {} settled with {} items", order.id, order.items.len());
    Ok(Some(order))
}

async fn replace_order_items(
    order_id: &OrderId,
    items: Vec<NewOrderItem>,
    conn: &mut SqliteConnection,
) -> Result<(), PaymentGatewayError> {
    sqlx::query("DELETE FROM order_items WHERE order_id = $1").bind(order_id.as_str()).execute(&mut *conn).await?;
    for item in items {
        sqlx::query(
            r#"
                INSERT INTO order_items (order_id, beat_id, quantity, unit_price, total_price, license_type)
                VALUES ($1, $2, $3, $4, $5, $6);
            "#,
        )
        .bind(order_id.as_str())
        .bind(item.beat_id)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.total_price)
        .bind(item.license_type)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// As [`crate::sqlite::db::orders::update_order_status`], for the multi-item table.
pub async fn update_multi_order_status(
    id: &OrderId,
    expected: &[OrderStatus],
    update: TransitionUpdate,
    conn: &mut SqliteConnection,
) -> Result<Option<MultiItemOrder>, PaymentGatewayError> {
    let Some(sql) = conditional_transition_sql("multi_item_orders", expected, update.new_status) else {
        return Err(PaymentGatewayError::IllegalStatusChange(format!(
            "no timestamp column for a transition to {}",
            update.new_status
        )));
    };
    let order: Option<MultiItemOrder> = sqlx::query_as(&sql)
        .bind(update.new_status)
        .bind(update.timestamp)
        .bind(update.cancel_reason)
        .bind(update.failure_code)
        .bind(update.failure_reason)
        .bind(update.dispute_id)
        .bind(update.dispute_reason)
        .bind(update.refund_id)
        .bind(update.refund_amount)
        .bind(id.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    attach_items(order, conn).await.map_err(PaymentGatewayError::from)
}
