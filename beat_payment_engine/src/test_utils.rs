//! Shared mocks and fixtures for the engine's unit tests.

use bpg_common::Money;
use chrono::Utc;
use mockall::mock;
use serde_json::Value;
use sqlx::types::Json;

use crate::{
    db_types::{
        Beat,
        LicenseType,
        MultiItemOrder,
        NewOrder,
        Order,
        OrderId,
        OrderStatus,
    },
    order_flow::objects::SessionItems,
    traits::{
        CatalogError,
        CatalogReader,
        EmailTemplate,
        GatewayClient,
        GatewayError,
        MultiOrderSettlement,
        NotificationError,
        NotificationService,
        PaidOrderUpdate,
        PaymentGatewayDatabase,
        PaymentGatewayError,
        TransitionUpdate,
    },
};

mock! {
    pub Db {}
    impl Clone for Db {
        fn clone(&self) -> Self;
    }
    impl PaymentGatewayDatabase for Db {
        fn url(&self) -> &str;
        async fn fetch_order_by_id(&self, id: &OrderId) -> Result<Option<Order>, PaymentGatewayError>;
        async fn fetch_multi_order_by_id(&self, id: &OrderId) -> Result<Option<MultiItemOrder>, PaymentGatewayError>;
        async fn fetch_order_by_payment_id(&self, payment_id: &str) -> Result<Option<Order>, PaymentGatewayError>;
        async fn fetch_multi_order_by_session_id(
            &self,
            session_id: &str,
        ) -> Result<Option<MultiItemOrder>, PaymentGatewayError>;
        async fn fetch_order_by_payment_intent(&self, intent_id: &str) -> Result<Option<Order>, PaymentGatewayError>;
        async fn fetch_multi_order_by_payment_intent(
            &self,
            intent_id: &str,
        ) -> Result<Option<MultiItemOrder>, PaymentGatewayError>;
        async fn insert_synthesized_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError>;
        async fn mark_order_paid(
            &self,
            id: &OrderId,
            update: PaidOrderUpdate,
        ) -> Result<Option<Order>, PaymentGatewayError>;
        async fn settle_multi_order(
            &self,
            id: &OrderId,
            settlement: MultiOrderSettlement,
        ) -> Result<Option<MultiItemOrder>, PaymentGatewayError>;
        async fn update_order_status(
            &self,
            id: &OrderId,
            expected: &[OrderStatus],
            update: TransitionUpdate,
        ) -> Result<Option<Order>, PaymentGatewayError>;
        async fn update_multi_order_status(
            &self,
            id: &OrderId,
            expected: &[OrderStatus],
            update: TransitionUpdate,
        ) -> Result<Option<MultiItemOrder>, PaymentGatewayError>;
        async fn close(&mut self) -> Result<(), PaymentGatewayError>;
    }
}

mock! {
    pub Catalog {}
    impl Clone for Catalog {
        fn clone(&self) -> Self;
    }
    impl CatalogReader for Catalog {
        async fn fetch_beat(&self, beat_id: &str) -> Result<Option<Beat>, CatalogError>;
    }
}

mock! {
    pub Gateway {}
    impl Clone for Gateway {
        fn clone(&self) -> Self;
    }
    impl GatewayClient for Gateway {
        async fn fetch_session_items(&self, session_id: &str) -> Result<SessionItems, GatewayError>;
    }
}

mock! {
    pub Notifier {}
    impl Clone for Notifier {
        fn clone(&self) -> Self;
    }
    impl NotificationService for Notifier {
        async fn send(&self, recipient: &str, template: EmailTemplate, data: Value) -> Result<(), NotificationError>;
    }
}

pub fn make_order(id: &str) -> Order {
    let now = Utc::now();
    Order {
        id: OrderId(id.to_string()),
        customer_email: "customer@example.com".to_string(),
        customer_name: None,
        customer_phone: None,
        total_amount: Money::from_cents(2999),
        currency: "USD".to_string(),
        payment_method: None,
        payment_id: None,
        payment_intent_id: None,
        license_type: LicenseType::Basic,
        usage_rights: Json(Vec::new()),
        beat_id: "beat-1".to_string(),
        status: OrderStatus::Pending,
        created_at: now,
        updated_at: now,
        paid_at: None,
        cancelled_at: None,
        cancel_reason: None,
        failed_at: None,
        failure_code: None,
        failure_reason: None,
        disputed_at: None,
        dispute_id: None,
        dispute_reason: None,
        refunded_at: None,
        refund_id: None,
        refund_amount: None,
    }
}

pub fn make_multi_order(id: &str) -> MultiItemOrder {
    let now = Utc::now();
    MultiItemOrder {
        id: OrderId(id.to_string()),
        customer_email: "customer@example.com".to_string(),
        customer_name: None,
        customer_phone: None,
        total_amount: Money::default(),
        currency: "USD".to_string(),
        payment_method: None,
        session_id: None,
        payment_intent_id: None,
        status: OrderStatus::Pending,
        items: Vec::new(),
        created_at: now,
        updated_at: now,
        paid_at: None,
        cancelled_at: None,
        cancel_reason: None,
        failed_at: None,
        failure_code: None,
        failure_reason: None,
        disputed_at: None,
        dispute_id: None,
        dispute_reason: None,
        refunded_at: None,
        refund_id: None,
        refund_amount: None,
    }
}

pub fn make_beat(id: &str) -> Beat {
    Beat {
        id: id.to_string(),
        title: format!("Beat {id}"),
        price_basic: Money::from_cents(2999),
        price_premium: Money::from_cents(4999),
        price_unlimited: Money::from_cents(9999),
    }
}
