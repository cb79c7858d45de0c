use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{Order, OrderStatus};

use super::{order_number_for, NewOrder, OrderFilter, OrderPatch, OrderStore};

/// Dashmap-backed store used by the test suite and ephemeral deployments.
/// Shares the contract (and the contract tests) with the SQL store.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: DashMap<Uuid, Order>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted_newest_first(mut orders: Vec<Order>) -> Vec<Order> {
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: NewOrder) -> Result<Order, ServiceError> {
        if order.selections.is_empty() {
            return Err(ServiceError::ValidationError(
                "order must contain at least one selection".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        let created = Order {
            id,
            order_number: order_number_for(id),
            user_id: order.user_id,
            user_role: order.user_role,
            week_start: order.week_start,
            selections: order.selections,
            total: order.total,
            currency: order.currency,
            status: OrderStatus::Pending,
            payment_transaction_id: None,
            gateway_metadata: None,
            legacy_description: None,
            created_at: Utc::now(),
            updated_at: None,
            paid_at: None,
            cancelled_at: None,
            version: 1,
        };
        self.orders.insert(id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Order>, ServiceError> {
        Ok(self.orders.get(&id).map(|entry| entry.clone()))
    }

    async fn get_by_order_number(
        &self,
        order_number: &str,
    ) -> Result<Option<Order>, ServiceError> {
        Ok(self
            .orders
            .iter()
            .find(|entry| entry.order_number == order_number)
            .map(|entry| entry.clone()))
    }

    async fn get_by_user_and_week(
        &self,
        user_id: Uuid,
        week_start: NaiveDate,
    ) -> Result<Option<Order>, ServiceError> {
        let candidates: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| {
                entry.user_id == user_id
                    && entry.week_start == week_start
                    && !entry.status.is_terminal()
            })
            .map(|entry| entry.clone())
            .collect();
        Ok(Self::sorted_newest_first(candidates).into_iter().next())
    }

    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, ServiceError> {
        let matching: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.clone())
            .collect();

        let mut sorted = Self::sorted_newest_first(matching);
        if let Some(limit) = filter.limit {
            sorted.truncate(limit as usize);
        }
        Ok(sorted)
    }

    async fn update(&self, id: Uuid, patch: OrderPatch) -> Result<Order, ServiceError> {
        let mut entry = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;

        if let Some(expected) = patch.expected_version {
            if entry.version != expected {
                return Err(ServiceError::ConcurrentModification(id));
            }
        }

        if let Some(selections) = &patch.selections {
            if selections.is_empty() {
                return Err(ServiceError::ValidationError(
                    "order must contain at least one selection".to_string(),
                ));
            }
        }

        let order = entry.value_mut();
        if let Some(status) = patch.status {
            order.status = status;
        }
        if let Some(paid_at) = patch.paid_at {
            order.paid_at = paid_at;
        }
        if let Some(cancelled_at) = patch.cancelled_at {
            order.cancelled_at = cancelled_at;
        }
        if let Some(transaction_ref) = patch.payment_transaction_id {
            order.payment_transaction_id = transaction_ref;
        }
        if let Some(metadata) = patch.gateway_metadata {
            order.gateway_metadata = Some(metadata);
        }
        if let Some(selections) = patch.selections {
            order.selections = selections;
        }
        if let Some(total) = patch.total {
            order.total = total;
        }
        order.updated_at = Some(Utc::now());
        order.version += 1;

        Ok(order.clone())
    }
}
