use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::Order;
use crate::services::lifecycle::{self, LifecycleEvent, Transition};
use crate::services::pricing::PriceTable;
use crate::services::selections::{self, RawDaySelection};
use crate::services::totals;
use crate::store::{NewOrder, OrderFilter, OrderPatch, OrderStore};

/// Service for order persistence, amendment and lifecycle transitions.
///
/// All status mutations route through [`OrderService::apply_transition`]
/// so the state machine is the only writer of status and its paired
/// timestamp fields.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    event_sender: Option<Arc<EventSender>>,
    prices: PriceTable,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        event_sender: Option<Arc<EventSender>>,
        prices: PriceTable,
    ) -> Self {
        Self {
            store,
            event_sender,
            prices,
        }
    }

    pub fn prices(&self) -> &PriceTable {
        &self.prices
    }

    /// Persists a new order in `pending`.
    #[instrument(skip(self, order), fields(user_id = %order.user_id, week_start = %order.week_start))]
    pub async fn create_order(&self, order: NewOrder) -> Result<Order, ServiceError> {
        let created = self.store.create(order).await?;
        info!(order_id = %created.id, order_number = %created.order_number, "order created");
        self.emit(Event::OrderCreated(created.id)).await;
        Ok(created)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, ServiceError> {
        self.store.get_by_id(order_id).await
    }

    pub async fn require_order(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        self.store
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Resolves an identifier that may be an order id or an order number.
    pub async fn resolve_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Order>, ServiceError> {
        if let Ok(id) = Uuid::parse_str(reference) {
            return self.store.get_by_id(id).await;
        }
        self.store.get_by_order_number(reference).await
    }

    pub async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, ServiceError> {
        self.store.list(filter).await
    }

    /// Most recent non-terminal order for the user and week, if any. The
    /// UI uses this to resume an in-flight order instead of starting over.
    pub async fn current_order_for_week(
        &self,
        user_id: Uuid,
        week_start: NaiveDate,
    ) -> Result<Option<Order>, ServiceError> {
        self.store.get_by_user_and_week(user_id, week_start).await
    }

    /// Rewrites the selections of a still-`pending` order, recomputing
    /// the total from the price table.
    #[instrument(skip(self, raw_selections), fields(order_id = %order_id))]
    pub async fn amend_pending(
        &self,
        order_id: Uuid,
        raw_selections: &[RawDaySelection],
    ) -> Result<Order, ServiceError> {
        let order = self.require_order(order_id).await?;
        if !order.is_amendable() {
            return Err(ServiceError::InvalidOperation(format!(
                "selections can only be amended while pending, order is {}",
                order.status
            )));
        }

        let sanitized =
            selections::sanitize(raw_selections, order.user_role, order.week_start)?;
        let total = totals::compute(&sanitized, order.user_role, &self.prices)?;

        let amended = self
            .store
            .update(
                order_id,
                OrderPatch {
                    selections: Some(sanitized),
                    total: Some(total),
                    expected_version: Some(order.version),
                    ..OrderPatch::default()
                },
            )
            .await?;

        info!(order_id = %order_id, total, "pending order amended");
        self.emit(Event::OrderAmended(order_id)).await;
        Ok(amended)
    }

    /// Runs a lifecycle event against an order snapshot and persists the
    /// resulting patch. Returns the order in its latest known state.
    pub async fn apply_transition(
        &self,
        order: &Order,
        event: &LifecycleEvent,
    ) -> Result<Order, ServiceError> {
        match lifecycle::apply(order, event, chrono::Utc::now())? {
            Transition::NoOp => Ok(order.clone()),
            Transition::Audit(patch) => {
                warn!(
                    order_id = %order.id,
                    status = %order.status,
                    "gateway outcome recorded for audit without a status change"
                );
                self.store.update(order.id, patch).await
            }
            Transition::Apply { from, to, patch } => {
                let updated = self.store.update(order.id, patch).await?;
                info!(order_id = %order.id, %from, %to, "order status changed");

                self.emit(Event::OrderStatusChanged {
                    order_id: order.id,
                    old_status: from,
                    new_status: to,
                })
                .await;
                match event {
                    LifecycleEvent::PaymentStarted { transaction_ref } => {
                        self.emit(Event::PaymentIntentCreated {
                            order_id: order.id,
                            transaction_ref: transaction_ref.clone(),
                        })
                        .await;
                    }
                    LifecycleEvent::GatewayApproved { .. } => {
                        self.emit(Event::PaymentCaptured(order.id)).await;
                    }
                    LifecycleEvent::GatewayDeclined { .. } => {
                        self.emit(Event::PaymentFailed(order.id)).await;
                    }
                    _ => {}
                }

                Ok(updated)
            }
        }
    }

    /// Administrative override: reopen an order for editing/repayment.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn admin_reset(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        let order = self.require_order(order_id).await?;
        self.apply_transition(&order, &LifecycleEvent::AdminReset)
            .await
    }

    /// Administrative override: cancel an order in any non-cancelled state.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn admin_cancel(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        let order = self.require_order(order_id).await?;
        self.apply_transition(&order, &LifecycleEvent::AdminCancel)
            .await
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "failed to send event");
            }
        }
    }
}
