use std::fmt::Display;

use serde_json::Value;
use thiserror::Error;

/// The customer-facing email templates this core can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailTemplate {
    PaymentConfirmation,
    PaymentFailed,
    DisputeOpened,
    RefundProcessed,
}

impl Display for EmailTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slug = match self {
            EmailTemplate::PaymentConfirmation => "payment_confirmation",
            EmailTemplate::PaymentFailed => "payment_failed",
            EmailTemplate::DisputeOpened => "dispute_opened",
            EmailTemplate::RefundProcessed => "refund_processed",
        };
        write!(f, "{slug}")
    }
}

/// Fire-and-forget notification collaborator. Implementations may fail; the order flow absorbs every failure and
/// never lets a send error roll back an already-committed order mutation.
#[allow(async_fn_in_trait)]
pub trait NotificationService: Clone {
    async fn send(&self, recipient: &str, template: EmailTemplate, data: Value) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, Error)]
pub enum NotificationError {
    #[error("Could not send notification: {0}")]
    SendFailure(String),
}
