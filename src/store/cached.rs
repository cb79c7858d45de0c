use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::warn;
use uuid::Uuid;

use crate::cache::CacheBackend;
use crate::errors::ServiceError;
use crate::models::Order;

use super::{NewOrder, OrderFilter, OrderPatch, OrderStore};

/// Decorator that caches `list` results keyed by the serialized filter.
///
/// Every write goes through the decorator and invalidates the whole cache,
/// so readers never observe an order in a pre-write state for longer than
/// one in-flight request. Point lookups stay uncached: they are already a
/// single primary-key fetch.
pub struct CachedOrderStore {
    inner: Arc<dyn OrderStore>,
    cache: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl CachedOrderStore {
    pub fn new(inner: Arc<dyn OrderStore>, cache: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }

    async fn invalidate(&self) {
        if let Err(e) = self.cache.clear().await {
            // Never fail a write because the cache misbehaved.
            warn!(error = %e, "failed to invalidate order list cache");
        }
    }
}

#[async_trait]
impl OrderStore for CachedOrderStore {
    async fn create(&self, order: NewOrder) -> Result<Order, ServiceError> {
        let created = self.inner.create(order).await?;
        self.invalidate().await;
        Ok(created)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Order>, ServiceError> {
        self.inner.get_by_id(id).await
    }

    async fn get_by_order_number(
        &self,
        order_number: &str,
    ) -> Result<Option<Order>, ServiceError> {
        self.inner.get_by_order_number(order_number).await
    }

    async fn get_by_user_and_week(
        &self,
        user_id: Uuid,
        week_start: NaiveDate,
    ) -> Result<Option<Order>, ServiceError> {
        self.inner.get_by_user_and_week(user_id, week_start).await
    }

    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, ServiceError> {
        let key = filter.cache_key()?;

        match self.cache.get(&key).await {
            Ok(Some(cached)) => match serde_json::from_str::<Vec<Order>>(&cached) {
                Ok(orders) => return Ok(orders),
                Err(e) => warn!(error = %e, "discarding undeserializable cached order list"),
            },
            Ok(None) => {}
            Err(e) => warn!(error = %e, "order list cache read failed"),
        }

        let orders = self.inner.list(filter).await?;

        let serialized = serde_json::to_string(&orders)?;
        if let Err(e) = self.cache.set(&key, &serialized, Some(self.ttl)).await {
            warn!(error = %e, "order list cache write failed");
        }
        Ok(orders)
    }

    async fn update(&self, id: Uuid, patch: OrderPatch) -> Result<Order, ServiceError> {
        let updated = self.inner.update(id, patch).await?;
        self.invalidate().await;
        Ok(updated)
    }
}
