//! Persistence contract for orders, implementation-agnostic over the
//! actual database. Services only ever see the [`OrderStore`] trait.

pub mod cached;
pub mod memory;
pub mod sea_orm_store;
pub mod timestamps;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{DaySelection, Order, OrderStatus, UserRole};

pub use cached::CachedOrderStore;
pub use memory::InMemoryOrderStore;
pub use sea_orm_store::SeaOrmOrderStore;
pub use timestamps::parse_stored_timestamp;

/// Fields the caller supplies at creation; everything else (id, number,
/// status, timestamps, version) is assigned by the store.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub user_role: UserRole,
    pub week_start: NaiveDate,
    pub selections: Vec<DaySelection>,
    pub total: i64,
    pub currency: String,
}

/// Filter for order listings. Serialized form doubles as the cache key.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OrderFilter {
    pub user_id: Option<Uuid>,
    pub week_start: Option<NaiveDate>,
    pub statuses: Option<Vec<OrderStatus>>,
    pub transaction_ref: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
}

impl OrderFilter {
    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn with_week(mut self, week_start: NaiveDate) -> Self {
        self.week_start = Some(week_start);
        self
    }

    pub fn with_statuses(mut self, statuses: Vec<OrderStatus>) -> Self {
        self.statuses = Some(statuses);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// In-memory predicate; the SQL implementation translates the same
    /// semantics into query conditions.
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(user_id) = self.user_id {
            if order.user_id != user_id {
                return false;
            }
        }
        if let Some(week_start) = self.week_start {
            if order.week_start != week_start {
                return false;
            }
        }
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&order.status) {
                return false;
            }
        }
        if let Some(transaction_ref) = &self.transaction_ref {
            if order.payment_transaction_id.as_deref() != Some(transaction_ref.as_str()) {
                return false;
            }
        }
        if let Some(from) = self.created_from {
            if order.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.created_to {
            if order.created_at > to {
                return false;
            }
        }
        true
    }

    pub fn cache_key(&self) -> Result<String, ServiceError> {
        Ok(format!("orders:list:{}", serde_json::to_string(self)?))
    }
}

/// Partial update applied by [`OrderStore::update`].
///
/// Double-`Option` fields distinguish "leave untouched" (`None`) from
/// "set to this value or clear" (`Some(..)`). Status, timestamps and the
/// transaction reference are only ever patched together by the lifecycle
/// state machine; selections/total only by the amend operation.
#[derive(Clone, Debug, Default)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub paid_at: Option<Option<DateTime<Utc>>>,
    pub cancelled_at: Option<Option<DateTime<Utc>>>,
    pub payment_transaction_id: Option<Option<String>>,
    pub gateway_metadata: Option<serde_json::Value>,
    pub selections: Option<Vec<DaySelection>>,
    pub total: Option<i64>,
    /// When set, the update fails with `ConcurrentModification` unless the
    /// persisted version still matches.
    pub expected_version: Option<i32>,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order in `pending`. Fails if the selection list is
    /// empty: a zero-item order must never exist in the store.
    async fn create(&self, order: NewOrder) -> Result<Order, ServiceError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Order>, ServiceError>;

    async fn get_by_order_number(&self, order_number: &str)
        -> Result<Option<Order>, ServiceError>;

    /// Most recent non-terminal order for the user and week, if any.
    async fn get_by_user_and_week(
        &self,
        user_id: Uuid,
        week_start: NaiveDate,
    ) -> Result<Option<Order>, ServiceError>;

    /// Orders matching the filter, newest first.
    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, ServiceError>;

    /// Applies a partial update. `NotFound` for unknown ids,
    /// `ConcurrentModification` on version mismatch.
    async fn update(&self, id: Uuid, patch: OrderPatch) -> Result<Order, ServiceError>;
}

/// Human-facing order reference derived from the id; shows up in the
/// provider's "description" field and in support conversations.
pub(crate) fn order_number_for(id: Uuid) -> String {
    format!("ORD-{}", id.to_string()[..8].to_uppercase())
}
