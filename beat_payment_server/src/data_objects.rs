use serde::{Deserialize, Serialize};

/// The acknowledgement body every routed webhook delivery gets. Anything other than a 2xx makes the gateway
/// redeliver, so handler-level problems are logged rather than surfaced here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
}

impl WebhookAck {
    pub fn ok() -> Self {
        Self { received: true }
    }
}
