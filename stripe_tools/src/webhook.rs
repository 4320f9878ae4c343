//! Webhook signature verification and event decoding.
//!
//! The gateway signs each delivery with an HMAC-SHA256 over `"{timestamp}.{raw body}"`, keyed with the endpoint's
//! signing secret, and sends the result in the `Stripe-Signature` header as `t=<ts>,v1=<hex>[,v1=<hex>...]`.
//!
//! Verification MUST run over the exact raw bytes as they arrived on the wire. Re-parsing or re-serializing the body
//! before this step silently invalidates the signature, so callers hand in the untouched request body.

use hmac::{Hmac, Mac};
use log::*;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

use crate::{
    data_objects::{Charge, CheckoutSession, Dispute, PaymentIntent},
    error::WebhookError,
};

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Deliveries older than this (per the signed timestamp) are rejected to blunt replay attacks.
const DEFAULT_TOLERANCE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

/// A verified, decoded webhook delivery: the event's own delivery identity plus the typed payload.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    pub payload: EventPayload,
}

/// The tagged union of gateway notifications this system reacts to. Unknown kinds route to `Unhandled` rather than
/// failing, so new gateway event types never break the endpoint.
#[derive(Debug, Clone)]
pub enum EventPayload {
    SessionCompleted(Box<CheckoutSession>),
    SessionExpired(Box<CheckoutSession>),
    PaymentSucceeded(Box<PaymentIntent>),
    PaymentFailed(Box<PaymentIntent>),
    DisputeCreated(Box<Dispute>),
    ChargeRefunded(Box<Charge>),
    Unhandled { kind: String },
}

#[derive(Deserialize)]
struct EventEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Deserialize)]
struct EventData {
    object: Value,
}

/// Verify the signature header against the raw payload bytes and decode the event.
pub fn construct_event(payload: &[u8], sig_header: &str, secret: &str) -> Result<WebhookEvent, WebhookError> {
    verify_signature(payload, sig_header, secret, Some(DEFAULT_TOLERANCE_SECS))?;
    decode_event(payload)
}

/// Verify that `sig_header` carries a valid signature for `payload`. If `tolerance_secs` is given, the signed
/// timestamp must be within that many seconds of the current time.
pub fn verify_signature(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
    tolerance_secs: Option<i64>,
) -> Result<(), WebhookError> {
    let (timestamp, candidates) = parse_signature_header(sig_header)?;
    if let Some(tolerance) = tolerance_secs {
        let age = chrono::Utc::now().timestamp() - timestamp;
        if age > tolerance {
            warn!("🔐️ Rejecting webhook delivery with a {age}s old signature timestamp");
            return Err(WebhookError::StaleTimestamp(age));
        }
    }
    // Mac::verify_slice compares in constant time, so the check leaks nothing about the expected digest.
    let verified = candidates.iter().any(|candidate| {
        let Ok(sig) = hex::decode(candidate) else {
            return false;
        };
        mac_for(payload, timestamp, secret).verify_slice(&sig).is_ok()
    });
    if verified {
        trace!("🔐️ Webhook signature check ✅️");
        Ok(())
    } else {
        warn!("🔐️ Webhook signature mismatch. Denying delivery.");
        Err(WebhookError::SignatureMismatch)
    }
}

fn parse_signature_header(header: &str) -> Result<(i64, Vec<String>), WebhookError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            return Err(WebhookError::MalformedHeader(format!("element without '=': {part}")));
        };
        match key {
            "t" => {
                let ts = value
                    .parse::<i64>()
                    .map_err(|e| WebhookError::MalformedHeader(format!("invalid timestamp {value}: {e}")))?;
                timestamp = Some(ts);
            },
            "v1" => candidates.push(value.to_string()),
            // v0 and any future scheme ids are ignored
            _ => {},
        }
    }
    let timestamp = timestamp.ok_or_else(|| WebhookError::MalformedHeader("no timestamp element".to_string()))?;
    if candidates.is_empty() {
        return Err(WebhookError::MalformedHeader("no v1 signature element".to_string()));
    }
    Ok((timestamp, candidates))
}

fn mac_for(payload: &[u8], timestamp: i64, secret: &str) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any size");
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    mac
}

fn decode_event(payload: &[u8]) -> Result<WebhookEvent, WebhookError> {
    let envelope: EventEnvelope =
        serde_json::from_slice(payload).map_err(|e| WebhookError::PayloadError(e.to_string()))?;
    let EventEnvelope { id, event_type, data } = envelope;
    let object = data.object;
    let payload = match event_type.as_str() {
        "checkout.session.completed" => EventPayload::SessionCompleted(decode_object(object)?),
        "checkout.session.expired" => EventPayload::SessionExpired(decode_object(object)?),
        "payment_intent.succeeded" => EventPayload::PaymentSucceeded(decode_object(object)?),
        "payment_intent.payment_failed" => EventPayload::PaymentFailed(decode_object(object)?),
        "charge.dispute.created" => EventPayload::DisputeCreated(decode_object(object)?),
        "charge.refunded" => EventPayload::ChargeRefunded(decode_object(object)?),
        _ => EventPayload::Unhandled { kind: event_type.clone() },
    };
    Ok(WebhookEvent { id, event_type, payload })
}

fn decode_object<T: serde::de::DeserializeOwned>(object: Value) -> Result<Box<T>, WebhookError> {
    serde_json::from_value(object).map(Box::new).map_err(|e| WebhookError::PayloadError(e.to_string()))
}
