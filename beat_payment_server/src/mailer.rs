//! HTTP mail relay client.
//!
//! Customer notifications go out through a JSON mail API (template id plus substitution data). The engine treats
//! the mailer as fire-and-forget, so every failure here ends as a log line, never as a failed webhook.

use std::sync::Arc;

use beat_payment_engine::traits::{EmailTemplate, NotificationError, NotificationService};
use log::*;
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::MailerConfig;

#[derive(Clone)]
pub struct HttpMailer {
    config: MailerConfig,
    client: Arc<Client>,
}

impl HttpMailer {
    pub fn new(config: MailerConfig) -> Self {
        let client = Arc::new(Client::new());
        Self { config, client }
    }
}

impl NotificationService for HttpMailer {
    async fn send(&self, recipient: &str, template: EmailTemplate, data: Value) -> Result<(), NotificationError> {
        if !self.config.enabled {
            info!("✉️ Mailer disabled. Dropping {template} notification for {recipient}. Data: {data}");
            return Ok(());
        }
        let body = json!({
            "from": self.config.from_address,
            "to": recipient,
            "template": template.to_string(),
            "data": data,
        });
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(self.config.api_key.reveal())
            .json(&body)
            .send()
            .await
            .map_err(|e| NotificationError::SendFailure(e.to_string()))?;
        if response.status().is_success() {
            debug!("✉️ Sent {template} notification to {recipient}");
            Ok(())
        } else {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            Err(NotificationError::SendFailure(format!("mail relay returned {status}: {message}")))
        }
    }
}
