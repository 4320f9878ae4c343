//! `SqliteDatabase` is a concrete implementation of a beat payment engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements the storage traits defined in the [`crate::traits`]
//! module.
use std::fmt::Debug;

use log::*;
use sqlx::SqlitePool;

use super::db::{beats, db_url, multi_orders, new_pool, orders};
use crate::{
    db_types::{Beat, MultiItemOrder, NewOrder, Order, OrderId, OrderStatus},
    traits::{
        CatalogError,
        CatalogReader,
        MultiOrderSettlement,
        PaidOrderUpdate,
        PaymentGatewayDatabase,
        PaymentGatewayError,
        TransitionUpdate,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl PaymentGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn fetch_order_by_id(&self, id: &OrderId) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_id(id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_multi_order_by_id(&self, id: &OrderId) -> Result<Option<MultiItemOrder>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = multi_orders::fetch_multi_order_by_id(id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_payment_id(&self, payment_id: &str) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_payment_id(payment_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_multi_order_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<MultiItemOrder>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = multi_orders::fetch_multi_order_by_session_id(session_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_payment_intent(&self, intent_id: &str) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_payment_intent(intent_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_multi_order_by_payment_intent(
        &self,
        intent_id: &str,
    ) -> Result<Option<MultiItemOrder>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = multi_orders::fetch_multi_order_by_payment_intent(intent_id, &mut conn).await?;
        Ok(order)
    }

    async fn insert_synthesized_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, &mut tx).await?;
        tx.commit().await?;
        debug!("📝️ Synthesized order {} saved", order.id);
        Ok(order)
    }

    async fn mark_order_paid(
        &self,
        id: &OrderId,
        update: PaidOrderUpdate,
    ) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        orders::mark_order_paid(id, update, &mut conn).await
    }

    /// The status guard, item replacement and total overwrite happen in one transaction; a failed guard rolls the
    /// whole settlement back untouched.
    async fn settle_multi_order(
        &self,
        id: &OrderId,
        settlement: MultiOrderSettlement,
    ) -> Result<Option<MultiItemOrder>, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let order = multi_orders::settle_multi_order(id, settlement, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn update_order_status(
        &self,
        id: &OrderId,
        expected: &[OrderStatus],
        update: TransitionUpdate,
    ) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        orders::update_order_status(id, expected, update, &mut conn).await
    }

    async fn update_multi_order_status(
        &self,
        id: &OrderId,
        expected: &[OrderStatus],
        update: TransitionUpdate,
    ) -> Result<Option<MultiItemOrder>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        multi_orders::update_multi_order_status(id, expected, update, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        self.pool.close().await;
        Ok(())
    }
}

impl CatalogReader for SqliteDatabase {
    async fn fetch_beat(&self, beat_id: &str) -> Result<Option<Beat>, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        let beat = beats::fetch_beat(beat_id, &mut conn).await?;
        Ok(beat)
    }
}
