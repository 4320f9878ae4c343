//! Line-item reconciliation for multi-item purchases.
//!
//! Each gateway line item is resolved to a catalog beat and a license tier. Items that cannot be resolved are
//! skipped with an explicit, logged reason rather than aborting the whole order; the skip reasons are accumulated
//! into the report so callers (and tests) can see exactly what was dropped and why.

use std::fmt::Display;

use bpg_common::Money;
use log::*;

use crate::{
    db_types::NewOrderItem,
    order_flow::objects::{ItemSnapshot, SessionItems},
    traits::{CatalogError, CatalogReader},
};

#[derive(Debug, Clone)]
pub enum SkipReason {
    /// The line item's product was not expanded or no longer exists on the gateway.
    ProductMissing,
    /// The product exists but is flagged deleted on the gateway.
    ProductDeleted(String),
    /// The product metadata carries no beat reference.
    MissingBeatId(String),
    /// The referenced beat is not in the catalog.
    BeatNotFound { product_id: String, beat_id: String },
    /// The gateway reported no unit amount for the price.
    MissingUnitAmount(String),
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::ProductMissing => write!(f, "product missing from line item"),
            SkipReason::ProductDeleted(id) => write!(f, "product {id} is deleted on the gateway"),
            SkipReason::MissingBeatId(id) => write!(f, "product {id} has no beat_id metadata"),
            SkipReason::BeatNotFound { product_id, beat_id } => {
                write!(f, "beat {beat_id} (product {product_id}) not found in catalog")
            },
            SkipReason::MissingUnitAmount(price) => write!(f, "price {price} has no unit amount"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SkippedItem {
    pub price_id: String,
    pub reason: SkipReason,
}

/// The outcome of reconciling one session's line items. `total_amount` is the exact minor-unit sum over the
/// surviving items; skipped items contribute nothing to it.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationReport {
    pub items: Vec<NewOrderItem>,
    pub skipped: Vec<SkippedItem>,
    pub total_amount: Money,
}

impl ReconciliationReport {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Resolve every line item in `session` against the catalog.
///
/// Partial-data problems (deleted product, missing beat reference, unknown beat) skip the item with a warning;
/// only catalog I/O failures propagate as errors.
pub async fn reconcile_line_items<C: CatalogReader>(
    catalog: &C,
    session: &SessionItems,
) -> Result<ReconciliationReport, CatalogError> {
    let mut report = ReconciliationReport::default();
    for item in &session.items {
        match resolve_item(catalog, item, session).await? {
            Ok(resolved) => {
                report.total_amount += resolved.total_price;
                report.items.push(resolved);
            },
            Err(reason) => {
                warn!("🧾️ Skipping line item {}: {reason}", item.price_id);
                report.skipped.push(SkippedItem { price_id: item.price_id.clone(), reason });
            },
        }
    }
    Ok(report)
}

async fn resolve_item<C: CatalogReader>(
    catalog: &C,
    item: &ItemSnapshot,
    session: &SessionItems,
) -> Result<Result<NewOrderItem, SkipReason>, CatalogError> {
    let Some(product) = &item.product else {
        return Ok(Err(SkipReason::ProductMissing));
    };
    if product.deleted {
        return Ok(Err(SkipReason::ProductDeleted(product.id.clone())));
    }
    let Some(beat_id) = &product.beat_id else {
        return Ok(Err(SkipReason::MissingBeatId(product.id.clone())));
    };
    if catalog.fetch_beat(beat_id).await?.is_none() {
        return Ok(Err(SkipReason::BeatNotFound { product_id: product.id.clone(), beat_id: beat_id.clone() }));
    }
    let Some(unit_price) = item.unit_amount else {
        return Ok(Err(SkipReason::MissingUnitAmount(item.price_id.clone())));
    };
    let license_type = session
        .license_map
        .iter()
        .find(|entry| entry.price_id == item.price_id)
        .map(|entry| entry.license_type)
        .unwrap_or_default();
    let total_price = unit_price * item.quantity;
    Ok(Ok(NewOrderItem { beat_id: beat_id.clone(), quantity: item.quantity, unit_price, total_price, license_type }))
}
