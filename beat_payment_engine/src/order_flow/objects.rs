//! Gateway-neutral snapshots of webhook payloads.
//!
//! The transport layer converts whatever the gateway delivered into these types before calling the engine, so the
//! state machine and reconciler never see gateway SDK types.

use bpg_common::Money;

use crate::{
    db_types::{LicenseType, MultiItemOrder, Order, OrderId},
    traits::ContactUpdate,
};

//--------------------------------------      MatchRefs        -------------------------------------------------------
/// The reference bundle the order matcher resolves, in priority order: explicit order id from the gateway metadata,
/// then the stored session reference, then (for failure/dispute/refund events only) the payment intent.
#[derive(Debug, Clone, Default)]
pub struct MatchRefs {
    pub order_ref: Option<OrderId>,
    pub session_id: Option<String>,
    pub payment_intent_id: Option<String>,
}

/// The matcher's verdict.
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    Multi(MultiItemOrder),
    Single(Order),
    Unmatched,
}

//--------------------------------------   CheckoutSnapshot    -------------------------------------------------------
/// Everything a `session-completed` event tells us about the checkout, minus the line items (which require a
/// follow-up gateway call).
#[derive(Debug, Clone)]
pub struct CheckoutSnapshot {
    pub session_id: String,
    pub payment_intent_id: Option<String>,
    /// The order id the checkout-initiation flow wrote into the session metadata, if it survived.
    pub order_ref: Option<OrderId>,
    pub contact: ContactUpdate,
    pub amount_total: Option<Money>,
    pub currency: Option<String>,
    pub payment_method: Option<String>,
    /// Single-item checkouts carry the beat reference in the session metadata.
    pub beat_id: Option<String>,
    pub license_type: Option<LicenseType>,
}

impl CheckoutSnapshot {
    pub fn match_refs(&self) -> MatchRefs {
        MatchRefs {
            order_ref: self.order_ref.clone(),
            session_id: Some(self.session_id.clone()),
            payment_intent_id: self.payment_intent_id.clone(),
        }
    }
}

//--------------------------------------     SessionItems      -------------------------------------------------------
/// The expanded line items of a checkout session, plus the session-level price-reference to license-type map. The
/// gateway's native line item has no license-type field, so the tier travels in this parallel array.
#[derive(Debug, Clone, Default)]
pub struct SessionItems {
    pub items: Vec<ItemSnapshot>,
    pub license_map: Vec<LicenseMapEntry>,
}

#[derive(Debug, Clone)]
pub struct ItemSnapshot {
    /// The gateway's price reference for this line item.
    pub price_id: String,
    pub quantity: i64,
    /// Unit price, as the gateway's minor-unit integer amount.
    pub unit_amount: Option<Money>,
    pub product: Option<ProductSnapshot>,
}

#[derive(Debug, Clone)]
pub struct ProductSnapshot {
    pub id: String,
    pub deleted: bool,
    /// From the product metadata; absent when the product was not created by the catalog upload flow.
    pub beat_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LicenseMapEntry {
    pub price_id: String,
    pub license_type: LicenseType,
}

//--------------------------------------   Failure snapshots   -------------------------------------------------------
#[derive(Debug, Clone, Default)]
pub struct PaymentFailureSnapshot {
    pub payment_intent_id: Option<String>,
    pub order_ref: Option<OrderId>,
    pub session_id: Option<String>,
    pub failure_code: Option<String>,
    pub failure_reason: Option<String>,
}

impl PaymentFailureSnapshot {
    pub fn match_refs(&self) -> MatchRefs {
        MatchRefs {
            order_ref: self.order_ref.clone(),
            session_id: self.session_id.clone(),
            payment_intent_id: self.payment_intent_id.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DisputeSnapshot {
    pub dispute_id: String,
    pub payment_intent_id: Option<String>,
    pub order_ref: Option<OrderId>,
    pub reason: Option<String>,
}

impl DisputeSnapshot {
    pub fn match_refs(&self) -> MatchRefs {
        MatchRefs {
            order_ref: self.order_ref.clone(),
            session_id: None,
            payment_intent_id: self.payment_intent_id.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefundRecord {
    pub id: String,
    pub amount: Money,
}

#[derive(Debug, Clone, Default)]
pub struct RefundSnapshot {
    pub payment_intent_id: Option<String>,
    pub order_ref: Option<OrderId>,
    /// The gateway's refund list, in delivery order. Only the first record is applied to the order.
    pub refunds: Vec<RefundRecord>,
}

impl RefundSnapshot {
    pub fn match_refs(&self) -> MatchRefs {
        MatchRefs {
            order_ref: self.order_ref.clone(),
            session_id: None,
            payment_intent_id: self.payment_intent_id.clone(),
        }
    }
}

//--------------------------------------       Outcomes        -------------------------------------------------------
/// What a `session-completed` event ended up doing.
#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    /// A pending single-item order was marked paid.
    SinglePaid(Order),
    /// A pending multi-item order was reconciled and settled.
    MultiSettled(MultiItemOrder),
    /// No matching order was found; a brand-new order was synthesized from the session snapshot.
    Synthesized(Order),
    /// The order was not in a state that allowed the transition (typically a redelivery). Nothing was written.
    AlreadyProcessed,
    /// Zero line items survived reconciliation filtering. Nothing was written.
    AbandonedEmptyReconciliation,
}

/// What a non-completion event ended up doing.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    Single(Order),
    Multi(MultiItemOrder),
    /// The matched order's current status did not permit the transition; dropped.
    Stale,
    /// No order matched the event's references; dropped.
    Unmatched,
}
