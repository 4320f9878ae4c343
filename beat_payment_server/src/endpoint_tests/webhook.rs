use actix_web::{http::StatusCode, test, test::TestRequest, web, web::ServiceConfig, App};
use beat_payment_engine::{db_types::OrderStatus, traits::PaymentGatewayError, OrderFlowApi};

use super::{
    helpers::{post_webhook, sign, test_config, TEST_WEBHOOK_SECRET},
    mocks::{pending_order, MockCatalog, MockDb, MockGateway, MockNotifier},
};
use crate::routes::stripe_webhook;

type MockFlow = OrderFlowApi<MockDb, MockCatalog, MockGateway, MockNotifier>;

const COMPLETION_JSON: &[u8] = br#"{
    "id": "evt_1",
    "type": "checkout.session.completed",
    "data": { "object": {
        "id": "cs_1",
        "payment_intent": "pi_1",
        "amount_total": 2999,
        "currency": "usd",
        "payment_method_types": ["card"],
        "customer_details": { "email": "customer@example.com" },
        "metadata": { "beat_id": "beat-1", "license_type": "basic" }
    } }
}"#;

fn register(cfg: &mut ServiceConfig, api: MockFlow) {
    cfg.app_data(web::Data::new(api)).app_data(web::Data::new(test_config())).service(
        web::resource("/webhook/stripe")
            .route(web::post().to(stripe_webhook::<MockDb, MockCatalog, MockGateway, MockNotifier>)),
    );
}

fn configure_paid_path(cfg: &mut ServiceConfig) {
    let mut db = MockDb::new();
    db.expect_fetch_multi_order_by_session_id().returning(|_| Ok(None));
    db.expect_fetch_order_by_payment_id()
        .withf(|sid| sid == "cs_1")
        .returning(|_| Ok(Some(pending_order("ord-1"))));
    db.expect_mark_order_paid().returning(|id, update| {
        let mut order = pending_order(id.as_str());
        order.status = OrderStatus::Paid;
        order.paid_at = Some(update.paid_at);
        Ok(Some(order))
    });
    let mut notifier = MockNotifier::new();
    notifier.expect_send().times(1).returning(|_, _, _| Ok(()));
    register(cfg, OrderFlowApi::new(db, MockCatalog::new(), MockGateway::new(), notifier));
}

/// Any call into the collaborators would panic, so these tests also prove nothing runs before verification.
fn configure_untouched(cfg: &mut ServiceConfig) {
    register(cfg, OrderFlowApi::new(MockDb::new(), MockCatalog::new(), MockGateway::new(), MockNotifier::new()));
}

fn configure_broken_backend(cfg: &mut ServiceConfig) {
    let mut db = MockDb::new();
    db.expect_fetch_multi_order_by_session_id()
        .returning(|_| Err(PaymentGatewayError::DatabaseError("the database is on fire".to_string())));
    register(cfg, OrderFlowApi::new(db, MockCatalog::new(), MockGateway::new(), MockNotifier::new()));
}

#[actix_web::test]
async fn valid_completion_event_is_processed_and_acknowledged() {
    let _ = env_logger::try_init().ok();
    let sig = sign(COMPLETION_JSON, TEST_WEBHOOK_SECRET);
    let (status, body) = post_webhook(COMPLETION_JSON, Some(&sig), configure_paid_path).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"received":true}"#);
}

#[actix_web::test]
async fn missing_signature_header_is_rejected() {
    let _ = env_logger::try_init().ok();
    let (status, body) = post_webhook(COMPLETION_JSON, None, configure_untouched).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Webhook signature rejected"));
}

#[actix_web::test]
async fn wrong_secret_is_rejected() {
    let _ = env_logger::try_init().ok();
    let sig = sign(COMPLETION_JSON, "whsec_somebody_elses_secret");
    let (status, _) = post_webhook(COMPLETION_JSON, Some(&sig), configure_untouched).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn tampered_payload_is_rejected() {
    let _ = env_logger::try_init().ok();
    let sig = sign(COMPLETION_JSON, TEST_WEBHOOK_SECRET);
    let mut tampered = COMPLETION_JSON.to_vec();
    let needle = tampered.iter().position(|b| *b == b'2').unwrap();
    tampered[needle] = b'9';
    let (status, _) = post_webhook(&tampered, Some(&sig), configure_untouched).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn non_post_methods_are_not_allowed() {
    let _ = env_logger::try_init().ok();
    let service = test::init_service(App::new().configure(configure_untouched)).await;
    for req in [TestRequest::get(), TestRequest::put(), TestRequest::delete()] {
        let res = test::call_service(&service, req.uri("/webhook/stripe").to_request()).await;
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}

#[actix_web::test]
async fn unknown_event_kind_is_acknowledged_without_processing() {
    let _ = env_logger::try_init().ok();
    let body = br#"{"id":"evt_2","type":"customer.created","data":{"object":{"id":"cus_1"}}}"#;
    let sig = sign(body, TEST_WEBHOOK_SECRET);
    let (status, response) = post_webhook(body, Some(&sig), configure_untouched).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, r#"{"received":true}"#);
}

#[actix_web::test]
async fn succeeded_intent_is_acknowledged_without_processing() {
    let _ = env_logger::try_init().ok();
    let body = br#"{"id":"evt_3","type":"payment_intent.succeeded","data":{"object":{"id":"pi_1"}}}"#;
    let sig = sign(body, TEST_WEBHOOK_SECRET);
    let (status, response) = post_webhook(body, Some(&sig), configure_untouched).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, r#"{"received":true}"#);
}

#[actix_web::test]
async fn backend_failure_still_acknowledges_the_delivery() {
    let _ = env_logger::try_init().ok();
    let sig = sign(COMPLETION_JSON, TEST_WEBHOOK_SECRET);
    let (status, response) = post_webhook(COMPLETION_JSON, Some(&sig), configure_broken_backend).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, r#"{"received":true}"#);
}
