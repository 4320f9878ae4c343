//! # The beat store payment engine
//!
//! This crate is the transport-agnostic core of the payment gateway. It holds the order state machine, the
//! payment-reference matcher, the line-item reconciler and the storage abstraction; it knows nothing about HTTP,
//! webhook signatures or any gateway SDK. The server crate feeds it gateway-neutral snapshots and it answers with
//! explicit outcomes.
//!
//! The rules it enforces:
//! * Orders only ever move along the legal edges of [`db_types::OrderStatus::can_transition_to`]. Terminal states
//!   never regress, no matter how late or how often the gateway redelivers an event.
//! * Every status write is conditional on the order's current status, so concurrent deliveries settle an order
//!   exactly once.
//! * A completed payment is never silently dropped. If no stored order matches, a new one is synthesized from the
//!   session snapshot.
//! * Notifications are best-effort. A failed send is logged and absorbed, never letting a mailer outage roll back
//!   a committed order mutation.

pub mod db_types;
pub mod order_flow;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use order_flow::{OrderFlowApi, OrderFlowError};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

#[cfg(test)]
pub(crate) mod test_utils;
