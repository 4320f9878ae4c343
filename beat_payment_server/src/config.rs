use std::env;

use bpg_common::{helpers::parse_boolean_flag, Secret};
use log::*;
use stripe_tools::StripeConfig;

const DEFAULT_BPG_HOST: &str = "127.0.0.1";
const DEFAULT_BPG_PORT: u16 = 8360;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Payment gateway credentials: API key, webhook signing secret, API version.
    pub stripe: StripeConfig,
    /// Outbound customer-notification mailer.
    pub mailer: MailerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_BPG_HOST.to_string(),
            port: DEFAULT_BPG_PORT,
            database_url: String::default(),
            stripe: StripeConfig::default(),
            mailer: MailerConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("BPG_HOST").ok().unwrap_or_else(|| DEFAULT_BPG_HOST.into());
        let port = env::var("BPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for BPG_PORT. {e} Using the default, {DEFAULT_BPG_PORT}, instead."
                    );
                    DEFAULT_BPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_BPG_PORT);
        let database_url = env::var("BPG_DATABASE_URL").unwrap_or_else(|_| {
            error!("🪛️ BPG_DATABASE_URL is not set. Please set it to the db url for the server.");
            String::default()
        });
        let stripe = StripeConfig::new_from_env_or_default();
        let mailer = MailerConfig::from_env_or_default();
        Self { host, port, database_url, stripe, mailer }
    }
}

/// Configuration for the HTTP mail relay used for customer notifications. When no endpoint is configured, sends are
/// logged and dropped, which keeps development environments from needing a mail account.
#[derive(Clone, Debug, Default)]
pub struct MailerConfig {
    pub endpoint: String,
    pub api_key: Secret<String>,
    pub from_address: String,
    pub enabled: bool,
}

impl MailerConfig {
    pub fn from_env_or_default() -> Self {
        let endpoint = env::var("BPG_MAILER_URL").unwrap_or_else(|_| {
            info!("🪛️ BPG_MAILER_URL is not set. Customer notifications will be logged and dropped.");
            String::default()
        });
        let api_key = Secret::new(env::var("BPG_MAILER_API_KEY").unwrap_or_default());
        let from_address =
            env::var("BPG_MAILER_FROM").unwrap_or_else(|_| "orders@example-beats.com".to_string());
        let enabled = parse_boolean_flag(env::var("BPG_MAILER_ENABLED").ok(), !endpoint.is_empty());
        Self { endpoint, api_key, from_address, enabled }
    }
}
