use actix_web::{body::MessageBody, http::StatusCode, test, test::TestRequest, web::ServiceConfig, App};
use bpg_common::Secret;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use stripe_tools::SIGNATURE_HEADER;

use crate::config::ServerConfig;

pub const TEST_WEBHOOK_SECRET: &str = "whsec_endpoint_test_secret";

pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.stripe.webhook_secret = Secret::new(TEST_WEBHOOK_SECRET.to_string());
    config
}

/// Builds a `Stripe-Signature` header for `payload`, signed with `secret` at the current time.
pub fn sign(payload: &[u8], secret: &str) -> String {
    let ts = chrono::Utc::now().timestamp();
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any size");
    mac.update(format!("{ts}.").as_bytes());
    mac.update(payload);
    let hex: String = mac.finalize().into_bytes().iter().map(|b| format!("{b:02x}")).collect();
    format!("t={ts},v1={hex}")
}

pub async fn post_webhook(
    body: &[u8],
    sig_header: Option<&str>,
    configure: fn(&mut ServiceConfig),
) -> (StatusCode, String) {
    let mut req = TestRequest::post().uri("/webhook/stripe").set_payload(body.to_vec());
    if let Some(sig) = sig_header {
        req = req.insert_header((SIGNATURE_HEADER, sig));
    }
    let app = App::new().configure(configure);
    let service = test::init_service(app).await;
    let res = test::call_service(&service, req.to_request()).await;
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    (status, body)
}
