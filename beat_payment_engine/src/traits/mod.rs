//! The abstract interfaces the engine is written against.
//!
//! [`PaymentGatewayDatabase`] is implemented by persistent backends (currently SQLite). [`CatalogReader`] is the
//! read-only boundary to the beat catalog. [`GatewayClient`] is the constructor-injected outbound interface to the
//! payment gateway, and [`NotificationService`] is the fire-and-forget customer mail collaborator.

mod catalog;
mod gateway;
mod notifications;
mod payment_gateway_database;

pub use catalog::{CatalogError, CatalogReader};
pub use gateway::{GatewayClient, GatewayError};
pub use notifications::{EmailTemplate, NotificationError, NotificationService};
pub use payment_gateway_database::{
    ContactUpdate,
    MultiOrderSettlement,
    PaidOrderUpdate,
    PaymentGatewayDatabase,
    PaymentGatewayError,
    TransitionUpdate,
};
