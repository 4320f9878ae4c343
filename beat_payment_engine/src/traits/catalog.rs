use thiserror::Error;

use crate::db_types::Beat;

/// Read-only access to the beat catalog, keyed by beat id. The catalog is owned by another subsystem; this core
/// never writes to it.
#[allow(async_fn_in_trait)]
pub trait CatalogReader: Clone {
    async fn fetch_beat(&self, beat_id: &str) -> Result<Option<Beat>, CatalogError>;
}

#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("Catalog lookup failed: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for CatalogError {
    fn from(e: sqlx::Error) -> Self {
        CatalogError::DatabaseError(e.to_string())
    }
}
