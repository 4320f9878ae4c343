//! Resolves a payment-reference bundle to a stored order.

use log::*;

use crate::{
    order_flow::objects::{MatchOutcome, MatchRefs},
    traits::{PaymentGatewayDatabase, PaymentGatewayError},
};

/// Resolve `refs` against the store, in priority order:
/// 1. An explicit order id from the gateway metadata, by primary key — multi-item orders first, then single.
/// 2. The stored checkout-session reference.
/// 3. Only when `include_payment_intent` is set (failure/dispute/refund events, whose payloads carry no session),
///    the payment intent id, across both collections.
pub async fn resolve_order<B: PaymentGatewayDatabase>(
    db: &B,
    refs: &MatchRefs,
    include_payment_intent: bool,
) -> Result<MatchOutcome, PaymentGatewayError> {
    if let Some(order_id) = &refs.order_ref {
        if let Some(multi) = db.fetch_multi_order_by_id(order_id).await? {
            trace!("🔄️ Matched multi-item order {order_id} by metadata order id");
            return Ok(MatchOutcome::Multi(multi));
        }
        if let Some(order) = db.fetch_order_by_id(order_id).await? {
            trace!("🔄️ Matched order {order_id} by metadata order id");
            return Ok(MatchOutcome::Single(order));
        }
        debug!("🔄️ Metadata order id {order_id} matched nothing; falling back to payment references");
    }
    if let Some(session_id) = &refs.session_id {
        if let Some(multi) = db.fetch_multi_order_by_session_id(session_id).await? {
            trace!("🔄️ Matched multi-item order {} by session reference", multi.id);
            return Ok(MatchOutcome::Multi(multi));
        }
        if let Some(order) = db.fetch_order_by_payment_id(session_id).await? {
            trace!("🔄️ Matched order {} by session reference", order.id);
            return Ok(MatchOutcome::Single(order));
        }
    }
    if include_payment_intent {
        if let Some(intent_id) = &refs.payment_intent_id {
            if let Some(multi) = db.fetch_multi_order_by_payment_intent(intent_id).await? {
                trace!("🔄️ Matched multi-item order {} by payment intent", multi.id);
                return Ok(MatchOutcome::Multi(multi));
            }
            if let Some(order) = db.fetch_order_by_payment_intent(intent_id).await? {
                trace!("🔄️ Matched order {} by payment intent", order.id);
                return Ok(MatchOutcome::Single(order));
            }
        }
    }
    Ok(MatchOutcome::Unmatched)
}
