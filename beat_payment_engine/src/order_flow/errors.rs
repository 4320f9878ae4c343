use thiserror::Error;

use crate::traits::{CatalogError, GatewayError, PaymentGatewayError};

#[derive(Debug, Error)]
pub enum OrderFlowError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] PaymentGatewayError),
    #[error("Catalog error: {0}")]
    CatalogError(#[from] CatalogError),
    #[error("Gateway error: {0}")]
    GatewayError(#[from] GatewayError),
}
