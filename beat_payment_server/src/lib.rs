//! # Beat payment server
//! This crate hosts the HTTP edge of the payment gateway. It is responsible for:
//! * Listening for incoming webhook deliveries from the payment gateway.
//! * Verifying each delivery's signature against the raw body bytes before anything else touches them.
//! * Converting the wire payloads into engine snapshots and handing them to the order flow.
//! * Sending customer notifications through the HTTP mail relay.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/webhook/stripe`: The webhook route for receiving payment events from the gateway.

pub mod config;
pub mod data_objects;
pub mod errors;
pub mod integrations;
pub mod mailer;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
