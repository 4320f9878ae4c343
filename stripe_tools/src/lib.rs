mod api;
mod config;
mod error;
mod webhook;

mod data_objects;

pub use api::StripeApi;
pub use config::StripeConfig;
pub use data_objects::{
    Charge,
    CheckoutSession,
    CustomerDetails,
    Dispute,
    Expandable,
    LineItem,
    PaymentIntent,
    Price,
    Product,
    Refund,
};
pub use error::{StripeApiError, WebhookError};
pub use webhook::{construct_event, verify_signature, EventPayload, WebhookEvent, SIGNATURE_HEADER};
