use bpg_common::Money;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::{LicenseType, MultiItemOrder, NewOrder, NewOrderItem, Order, OrderId, OrderStatus};

/// This trait defines the persistent-store behaviour backends must provide for the payment engine.
///
/// This behaviour includes:
/// * Resolving payment references (order id, session id, payment intent id) to stored orders.
/// * Conditional, compare-and-swap status transitions so concurrent or redelivered webhook events cannot move an
///   order along an illegal edge or regress a terminal state.
/// * Replacing a multi-item order's item collection as one atomic unit.
/// * Creating the synthesized safety-net order when a completion event matches nothing.
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    async fn fetch_order_by_id(&self, id: &OrderId) -> Result<Option<Order>, PaymentGatewayError>;

    async fn fetch_multi_order_by_id(&self, id: &OrderId) -> Result<Option<MultiItemOrder>, PaymentGatewayError>;

    /// Lookup by the stored checkout-session reference (`payment_id` on single-item orders).
    async fn fetch_order_by_payment_id(&self, payment_id: &str) -> Result<Option<Order>, PaymentGatewayError>;

    /// Lookup by the stored checkout-session reference (`session_id` on multi-item orders).
    async fn fetch_multi_order_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<MultiItemOrder>, PaymentGatewayError>;

    async fn fetch_order_by_payment_intent(&self, intent_id: &str) -> Result<Option<Order>, PaymentGatewayError>;

    async fn fetch_multi_order_by_payment_intent(
        &self,
        intent_id: &str,
    ) -> Result<Option<MultiItemOrder>, PaymentGatewayError>;

    /// Insert a brand-new order synthesized from a gateway session snapshot. Fails if an order with the same id or
    /// payment reference already exists (one payment reference maps to at most one order).
    async fn insert_synthesized_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError>;

    /// Conditionally mark a single-item order as paid.
    ///
    /// The write only happens if the order's current status is `Pending` (compare-and-swap). Returns `None` when
    /// the guard fails, which is how stale redeliveries are dropped without racing.
    async fn mark_order_paid(&self, id: &OrderId, update: PaidOrderUpdate) -> Result<Option<Order>, PaymentGatewayError>;

    /// Atomically settle a multi-item order: replace the entire item collection (delete-all, insert-new), overwrite
    /// the computed totals and customer fields, and set the status to `Paid` — all in one transaction, conditional
    /// on the current status being `Pending`.
    async fn settle_multi_order(
        &self,
        id: &OrderId,
        settlement: MultiOrderSettlement,
    ) -> Result<Option<MultiItemOrder>, PaymentGatewayError>;

    /// Conditionally apply a non-payment transition (cancel, fail, dispute, refund) to a single-item order. The
    /// write only happens if the current status is one of `expected`; returns `None` when the guard fails.
    async fn update_order_status(
        &self,
        id: &OrderId,
        expected: &[OrderStatus],
        update: TransitionUpdate,
    ) -> Result<Option<Order>, PaymentGatewayError>;

    /// As [`update_order_status`], for multi-item orders.
    async fn update_multi_order_status(
        &self,
        id: &OrderId,
        expected: &[OrderStatus],
        update: TransitionUpdate,
    ) -> Result<Option<MultiItemOrder>, PaymentGatewayError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        Ok(())
    }
}

//--------------------------------------     ContactUpdate     -------------------------------------------------------
/// Customer contact fields as reported by the gateway at payment time. Merged over the stored values, preferring
/// the freshest non-null gateway value.
#[derive(Debug, Clone, Default)]
pub struct ContactUpdate {
    pub email: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
}

//--------------------------------------    PaidOrderUpdate    -------------------------------------------------------
/// The full set of side-channel writes accompanying a `Pending -> Paid` transition on a single-item order.
#[derive(Debug, Clone)]
pub struct PaidOrderUpdate {
    pub paid_at: DateTime<Utc>,
    pub payment_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub contact: ContactUpdate,
    pub total_amount: Option<Money>,
    pub currency: Option<String>,
    pub payment_method: Option<String>,
    pub license_type: Option<LicenseType>,
    pub usage_rights: Vec<String>,
}

//--------------------------------------  MultiOrderSettlement -------------------------------------------------------
/// The full set of writes accompanying a multi-item reconciliation: the replacement item collection plus the
/// recomputed totals.
#[derive(Debug, Clone)]
pub struct MultiOrderSettlement {
    pub paid_at: DateTime<Utc>,
    pub session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub contact: ContactUpdate,
    pub total_amount: Money,
    pub currency: Option<String>,
    pub payment_method: Option<String>,
    pub items: Vec<NewOrderItem>,
}

//--------------------------------------   TransitionUpdate    -------------------------------------------------------
/// Side-channel fields for the non-payment transitions. Only the fields relevant to `new_status` are set; the rest
/// stay `None` and are left untouched in storage.
#[derive(Debug, Clone)]
pub struct TransitionUpdate {
    pub new_status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    pub cancel_reason: Option<String>,
    pub failure_code: Option<String>,
    pub failure_reason: Option<String>,
    pub dispute_id: Option<String>,
    pub dispute_reason: Option<String>,
    pub refund_id: Option<String>,
    pub refund_amount: Option<Money>,
}

impl TransitionUpdate {
    pub fn new(new_status: OrderStatus, timestamp: DateTime<Utc>) -> Self {
        Self {
            new_status,
            timestamp,
            cancel_reason: None,
            failure_code: None,
            failure_reason: None,
            dispute_id: None,
            dispute_reason: None,
            refund_id: None,
            refund_amount: None,
        }
    }

    pub fn cancelled(timestamp: DateTime<Utc>, reason: &str) -> Self {
        Self { cancel_reason: Some(reason.to_string()), ..Self::new(OrderStatus::Cancelled, timestamp) }
    }

    pub fn failed(timestamp: DateTime<Utc>, code: Option<String>, reason: Option<String>) -> Self {
        Self { failure_code: code, failure_reason: reason, ..Self::new(OrderStatus::Failed, timestamp) }
    }

    pub fn disputed(timestamp: DateTime<Utc>, dispute_id: String, reason: Option<String>) -> Self {
        Self { dispute_id: Some(dispute_id), dispute_reason: reason, ..Self::new(OrderStatus::Disputed, timestamp) }
    }

    pub fn refunded(timestamp: DateTime<Utc>, refund_id: Option<String>, amount: Option<Money>) -> Self {
        Self { refund_id, refund_amount: amount, ..Self::new(OrderStatus::Refunded, timestamp) }
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentGatewayError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("Cannot insert order, since it already exists with id {0}")]
    OrderAlreadyExists(OrderId),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Illegal order status transition: {0}")]
    IllegalStatusChange(String),
}

impl From<sqlx::Error> for PaymentGatewayError {
    fn from(e: sqlx::Error) -> Self {
        PaymentGatewayError::DatabaseError(e.to_string())
    }
}
