use bpg_common::Secret;
use log::*;

#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// The secret API key (`sk_...`) used to authenticate outbound calls against the gateway.
    pub secret_key: Secret<String>,
    /// The webhook endpoint signing secret (`whsec_...`).
    pub webhook_secret: Secret<String>,
    pub api_version: String,
    /// Base URL of the gateway REST API. Overridable so tests can point at a local stub.
    pub api_base: String,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: Secret::new(String::default()),
            webhook_secret: Secret::new(String::default()),
            api_version: DEFAULT_API_VERSION.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

const DEFAULT_API_BASE: &str = "https://api.stripe.com";
const DEFAULT_API_VERSION: &str = "2024-06-20";

impl StripeConfig {
    pub fn new_from_env_or_default() -> Self {
        let secret_key = Secret::new(std::env::var("BPG_STRIPE_SECRET_KEY").unwrap_or_else(|_| {
            warn!("BPG_STRIPE_SECRET_KEY not set, outbound gateway calls will fail");
            "sk_test_00000000000000".to_string()
        }));
        let webhook_secret = Secret::new(std::env::var("BPG_STRIPE_WEBHOOK_SECRET").unwrap_or_else(|_| {
            warn!("BPG_STRIPE_WEBHOOK_SECRET not set, webhook signature checks will fail");
            "whsec_00000000000000".to_string()
        }));
        let api_version = std::env::var("BPG_STRIPE_API_VERSION").unwrap_or_else(|_| {
            warn!("BPG_STRIPE_API_VERSION not set, using {DEFAULT_API_VERSION} as default");
            DEFAULT_API_VERSION.to_string()
        });
        let api_base = std::env::var("BPG_STRIPE_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        Self { secret_key, webhook_secret, api_version, api_base }
    }
}
