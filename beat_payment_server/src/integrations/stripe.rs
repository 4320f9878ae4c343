//! Conversions from gateway wire objects into the engine's gateway-neutral snapshots, plus the outbound
//! [`GatewayClient`] implementation over the REST API.
//!
//! Metadata conventions, written by the checkout-initiation flow:
//! * `order_id` on the session carries our own order reference.
//! * `beat_id` and `license_type` on the session identify single-item purchases.
//! * `license_types` on the session is a JSON object mapping the gateway's price ids to license tiers for
//!   multi-item carts (the gateway's native line item has no license-type field).
//! * `beat_id` on a product links it back to the catalog.

use std::collections::HashMap;

use beat_payment_engine::{
    db_types::{LicenseType, OrderId},
    order_flow::objects::{
        CheckoutSnapshot,
        DisputeSnapshot,
        ItemSnapshot,
        LicenseMapEntry,
        PaymentFailureSnapshot,
        ProductSnapshot,
        RefundRecord,
        RefundSnapshot,
        SessionItems,
    },
    traits::{ContactUpdate, GatewayClient, GatewayError},
};
use bpg_common::Money;
use log::*;
use stripe_tools::{Charge, CheckoutSession, Dispute, LineItem, PaymentIntent, StripeApi};

const ORDER_ID_KEY: &str = "order_id";
const BEAT_ID_KEY: &str = "beat_id";
const LICENSE_TYPE_KEY: &str = "license_type";
const LICENSE_MAP_KEY: &str = "license_types";

pub fn checkout_snapshot(session: &CheckoutSession) -> CheckoutSnapshot {
    let contact = ContactUpdate {
        email: session
            .customer_details
            .as_ref()
            .and_then(|d| d.email.clone())
            .or_else(|| session.customer_email.clone()),
        name: session.customer_details.as_ref().and_then(|d| d.name.clone()),
        phone: session.customer_details.as_ref().and_then(|d| d.phone.clone()),
    };
    let license_type = session.metadata.get(LICENSE_TYPE_KEY).and_then(|s| parse_license(s));
    CheckoutSnapshot {
        session_id: session.id.clone(),
        payment_intent_id: session.payment_intent.clone(),
        order_ref: session.metadata.get(ORDER_ID_KEY).cloned().map(OrderId),
        contact,
        amount_total: session.amount_total.map(Money::from_cents),
        currency: session.currency.clone().map(|c| c.to_ascii_uppercase()),
        payment_method: session.payment_method_types.first().cloned(),
        beat_id: session.metadata.get(BEAT_ID_KEY).cloned(),
        license_type,
    }
}

pub fn failure_snapshot(intent: &PaymentIntent) -> PaymentFailureSnapshot {
    let error = intent.last_payment_error.as_ref();
    PaymentFailureSnapshot {
        payment_intent_id: Some(intent.id.clone()),
        order_ref: intent.metadata.get(ORDER_ID_KEY).cloned().map(OrderId),
        session_id: None,
        failure_code: error.and_then(|e| e.code.clone()),
        failure_reason: error.and_then(|e| e.message.clone()),
    }
}

pub fn dispute_snapshot(dispute: &Dispute) -> DisputeSnapshot {
    DisputeSnapshot {
        dispute_id: dispute.id.clone(),
        payment_intent_id: dispute.payment_intent_id().map(String::from),
        order_ref: dispute.metadata.get(ORDER_ID_KEY).cloned().map(OrderId),
        reason: dispute.reason.clone(),
    }
}

pub fn refund_snapshot(charge: &Charge) -> RefundSnapshot {
    let refunds = charge
        .refunds
        .as_ref()
        .map(|list| {
            list.data.iter().map(|r| RefundRecord { id: r.id.clone(), amount: Money::from_cents(r.amount) }).collect()
        })
        .unwrap_or_default();
    RefundSnapshot {
        payment_intent_id: charge.payment_intent_id().map(String::from),
        order_ref: charge.metadata.get(ORDER_ID_KEY).cloned().map(OrderId),
        refunds,
    }
}

fn parse_license(value: &str) -> Option<LicenseType> {
    match value.parse::<LicenseType>() {
        Ok(license) => Some(license),
        Err(e) => {
            warn!("🛍️️ Unrecognised license tier in gateway metadata. {e}");
            None
        },
    }
}

fn item_snapshot(item: &LineItem) -> ItemSnapshot {
    let price = item.price.as_ref();
    let product = price.and_then(|p| p.product.as_ref()).and_then(|p| p.as_object()).map(|product| ProductSnapshot {
        id: product.id.clone(),
        deleted: product.deleted,
        beat_id: product.metadata.get(BEAT_ID_KEY).cloned(),
    });
    ItemSnapshot {
        price_id: price.map(|p| p.id.clone()).unwrap_or_default(),
        quantity: item.quantity.unwrap_or(1),
        unit_amount: price.and_then(|p| p.unit_amount).map(Money::from_cents),
        product,
    }
}

fn license_map(metadata: &HashMap<String, String>) -> Vec<LicenseMapEntry> {
    let Some(raw) = metadata.get(LICENSE_MAP_KEY) else {
        return Vec::new();
    };
    let parsed: HashMap<String, String> = match serde_json::from_str(raw) {
        Ok(map) => map,
        Err(e) => {
            warn!("🛍️️ Could not parse the session's license map: {e}. All items fall back to the base tier.");
            return Vec::new();
        },
    };
    parsed
        .into_iter()
        .filter_map(|(price_id, tier)| parse_license(&tier).map(|license_type| LicenseMapEntry { price_id, license_type }))
        .collect()
}

/// The engine's outbound gateway interface, backed by the REST API.
#[derive(Clone)]
pub struct StripeGateway {
    api: StripeApi,
}

impl StripeGateway {
    pub fn new(api: StripeApi) -> Self {
        Self { api }
    }
}

impl GatewayClient for StripeGateway {
    async fn fetch_session_items(&self, session_id: &str) -> Result<SessionItems, GatewayError> {
        let session =
            self.api.retrieve_session(session_id).await.map_err(|e| GatewayError::ApiError(e.to_string()))?;
        let Some(line_items) = session.line_items else {
            return Err(GatewayError::MalformedSession(format!("session {session_id} came back without line items")));
        };
        let items = line_items.data.iter().map(item_snapshot).collect();
        let license_map = license_map(&session.metadata);
        Ok(SessionItems { items, license_map })
    }
}
