use thiserror::Error;

use crate::order_flow::objects::SessionItems;

/// Outbound interface to the payment gateway.
///
/// The webhook payload carries only a session reference; the expanded line items needed for multi-item
/// reconciliation have to be fetched with a follow-up call. Injecting this as a trait keeps the engine free of any
/// gateway SDK types and lets tests stub the round trip.
#[allow(async_fn_in_trait)]
pub trait GatewayClient: Clone {
    /// Retrieve the session's expanded line items together with the session-level price-reference to license-type
    /// map (the gateway's native line item has no license-type field).
    async fn fetch_session_items(&self, session_id: &str) -> Result<SessionItems, GatewayError>;
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Gateway API call failed: {0}")]
    ApiError(String),
    #[error("The gateway returned a session this engine cannot use: {0}")]
    MalformedSession(String),
}
