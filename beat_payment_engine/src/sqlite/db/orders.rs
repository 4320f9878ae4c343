use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderStatus},
    traits::{PaidOrderUpdate, PaymentGatewayError, TransitionUpdate},
};

pub async fn fetch_order_by_id(id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

/// Lookup by the stored checkout-session reference.
pub async fn fetch_order_by_payment_id(
    payment_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE payment_id = $1").bind(payment_id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_payment_intent(
    intent_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE payment_intent_id = $1")
        .bind(intent_id)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Inserts a brand-new synthesized order. Fails with [`PaymentGatewayError::OrderAlreadyExists`] if an order with
/// the same id or payment reference is already stored, so redelivered completion events collide instead of
/// duplicating a payment.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, PaymentGatewayError> {
    if let Some(existing) = fetch_order_by_id(&order.id, &mut *conn).await? {
        return Err(PaymentGatewayError::OrderAlreadyExists(existing.id));
    }
    if let Some(payment_id) = &order.payment_id {
        if let Some(existing) = fetch_order_by_payment_id(payment_id, &mut *conn).await? {
            return Err(PaymentGatewayError::OrderAlreadyExists(existing.id));
        }
    }
    let usage_rights = sqlx::types::Json(order.license_type.usage_rights());
    let inserted: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                id,
                customer_email,
                customer_name,
                customer_phone,
                total_amount,
                currency,
                payment_method,
                payment_id,
                payment_intent_id,
                license_type,
                usage_rights,
                beat_id,
                status,
                paid_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *;
        "#,
    )
    .bind(order.id.as_str())
    .bind(order.customer_email)
    .bind(order.customer_name)
    .bind(order.customer_phone)
    .bind(order.total_amount)
    .bind(order.currency)
    .bind(order.payment_method)
    .bind(order.payment_id)
    .bind(order.payment_intent_id)
    .bind(order.license_type)
    .bind(usage_rights)
    .bind(order.beat_id)
    .bind(order.status)
    .bind(order.paid_at)
    .fetch_one(conn)
    .await?;
    debug!("📝️ Order {} inserted", inserted.id);
    Ok(inserted)
}

/// Conditionally marks an order as paid. The `status = 'Pending'` guard in the WHERE clause is the compare-and-swap
/// that keeps redelivered and concurrent completion events from double-settling; a failed guard returns `None` and
/// writes nothing.
pub async fn mark_order_paid(
    id: &OrderId,
    update: PaidOrderUpdate,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, PaymentGatewayError> {
    let usage_rights = sqlx::types::Json(update.usage_rights);
    let order: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders SET
                status = $1,
                updated_at = CURRENT_TIMESTAMP,
                paid_at = $2,
                payment_id = COALESCE($3, payment_id),
                payment_intent_id = COALESCE($4, payment_intent_id),
                customer_email = COALESCE($5, customer_email),
                customer_name = COALESCE($6, customer_name),
                customer_phone = COALESCE($7, customer_phone),
                total_amount = COALESCE($8, total_amount),
                currency = COALESCE($9, currency),
                payment_method = COALESCE($10, payment_method),
                license_type = COALESCE($11, license_type),
                usage_rights = $12
            WHERE id = $13 AND status = 'Pending'
            RETURNING *;
        "#,
    )
    .bind(OrderStatus::Paid)
    .bind(update.paid_at)
    .bind(update.payment_id)
    .bind(update.payment_intent_id)
    .bind(update.contact.email)
    .bind(update.contact.name)
    .bind(update.contact.phone)
    .bind(update.total_amount)
    .bind(update.currency)
    .bind(update.payment_method)
    .bind(update.license_type)
    .bind(usage_rights)
    .bind(id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Conditionally applies a non-payment transition. The `status IN (...)` guard is the compare-and-swap; only the
/// side-channel columns relevant to the new status are provided by the caller, the rest stay untouched via
/// COALESCE.
pub async fn update_order_status(
    id: &OrderId,
    expected: &[OrderStatus],
    update: TransitionUpdate,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, PaymentGatewayError> {
    let Some(sql) = conditional_transition_sql("orders", expected, update.new_status) else {
        return Err(PaymentGatewayError::IllegalStatusChange(format!(
            "no timestamp column for a transition to {}",
            update.new_status
        )));
    };
    let order: Option<Order> = sqlx::query_as(&sql)
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
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Builds the guarded UPDATE statement shared by the single- and multi-item tables. Returns `None` for statuses
/// the gateway event flow never transitions to (`Pending`, `Completed`).
pub(crate) fn conditional_transition_sql(
    table: &str,
    expected: &[OrderStatus],
    new_status: OrderStatus,
) -> Option<String> {
    let ts_column = match new_status {
        OrderStatus::Paid => "paid_at",
        OrderStatus::Cancelled => "cancelled_at",
        OrderStatus::Failed => "failed_at",
        OrderStatus::Disputed => "disputed_at",
        OrderStatus::Refunded => "refunded_at",
        OrderStatus::Pending | OrderStatus::Completed => return None,
    };
    let statuses = expected.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",");
    Some(format!(
        "UPDATE {table} SET \
            status = $1, \
            updated_at = CURRENT_TIMESTAMP, \
            {ts_column} = $2, \
            cancel_reason = COALESCE($3, cancel_reason), \
            failure_code = COALESCE($4, failure_code), \
            failure_reason = COALESCE($5, failure_reason), \
            dispute_id = COALESCE($6, dispute_id), \
            dispute_reason = COALESCE($7, dispute_reason), \
            refund_id = COALESCE($8, refund_id), \
            refund_amount = COALESCE($9, refund_amount) \
         WHERE id = $10 AND status IN ({statuses}) \
         RETURNING *"
    ))
}
