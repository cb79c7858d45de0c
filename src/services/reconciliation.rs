//! Checkout orchestration and payment reconciliation.
//!
//! This is the top of the order-processing core: it wires the sanitizer,
//! the duplicate guard, the total calculator and the store together at
//! checkout, and re-derives an order's true payment state from provider
//! callbacks, user returns from the hosted checkout page, and manual
//! confirmation when a webhook never arrives.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::gateway::{GatewayCallback, PaymentGateway, PaymentIntentRequest, PaymentOutcome};
use crate::models::{is_week_start, Order, OrderStatus, UserRole};
use crate::services::duplicate_guard::{self, PaidSlots};
use crate::services::lifecycle::LifecycleEvent;
use crate::services::orders::OrderService;
use crate::services::selections::{self, RawDaySelection};
use crate::services::totals;
use crate::store::{NewOrder, OrderFilter};

/// How often a callback application is retried when it loses a version
/// race. The state machine is idempotent, so re-running it against the
/// fresh snapshot is always safe.
const TRANSITION_RETRIES: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    pub user_id: Uuid,
    pub user_role: UserRole,
    #[validate(length(min = 1, message = "Customer name is required"))]
    pub customer_name: String,
    #[validate(email)]
    pub customer_email: String,
    /// Registered children of a guardian account; empty for staff.
    #[serde(default)]
    pub children: Vec<String>,
    pub week_start: chrono::NaiveDate,
    pub selections: Vec<RawDaySelection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub order_number: String,
    pub total: i64,
    pub currency: String,
    pub status: OrderStatus,
    /// Where to send the customer to complete payment.
    pub redirect_url: String,
}

/// Query parameters the provider (or the UI) appends when the customer
/// returns from the hosted checkout page. Providers differ in what they
/// echo back; every field is optional.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ReturnQuery {
    /// Provider status hint; presentation only, never trusted for state.
    pub status: Option<String>,
    /// Order id or order number.
    pub order: Option<String>,
    pub transaction_ref: Option<String>,
    /// Set when the customer abandoned the hosted checkout page.
    pub cancelled: Option<bool>,
}

/// Human-presentable payment outcome for the return/status page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReturnOutcome {
    Paid,
    Cancelled,
    Processing,
    Pending,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentReturnView {
    pub outcome: ReturnOutcome,
    pub order: Order,
}

pub struct PaymentReconciler {
    orders: Arc<OrderService>,
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
    /// How long an order must wait in `processing_payment` before manual
    /// confirmation is allowed.
    reconcile_grace: Duration,
}

impl PaymentReconciler {
    pub fn new(
        orders: Arc<OrderService>,
        gateway: Arc<dyn PaymentGateway>,
        currency: String,
        reconcile_grace: Duration,
    ) -> Self {
        Self {
            orders,
            gateway,
            currency,
            reconcile_grace,
        }
    }

    /// Runs a full checkout: validate, sanitize, guard against double
    /// payment, price, persist, create the gateway intent.
    ///
    /// A gateway failure leaves the order `pending` and is surfaced to the
    /// caller; retrying the checkout reuses that pending order instead of
    /// stacking a new one per attempt.
    #[instrument(skip(self, request), fields(user_id = %request.user_id, week_start = %request.week_start))]
    pub async fn checkout(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutResponse, ServiceError> {
        request.validate()?;
        if request.user_role == UserRole::Guardian && request.children.is_empty() {
            return Err(ServiceError::ValidationError(
                "guardian accounts need at least one registered child".to_string(),
            ));
        }
        if !is_week_start(request.week_start) {
            return Err(ServiceError::ValidationError(
                "week_start must be a Monday".to_string(),
            ));
        }

        let sanitized =
            selections::sanitize(&request.selections, request.user_role, request.week_start)?;

        // Only paid orders block slots; pending/processing/cancelled never do.
        let paid_orders = self
            .orders
            .list_orders(
                &OrderFilter::for_user(request.user_id)
                    .with_week(request.week_start)
                    .with_statuses(vec![OrderStatus::Paid]),
            )
            .await?;
        let paid_slots = PaidSlots::from_paid_orders(&paid_orders);
        duplicate_guard::ensure_no_conflicts(&sanitized, &paid_slots)?;

        let total = totals::compute(&sanitized, request.user_role, self.orders.prices())?;

        let order = match self.reusable_pending_order(&request).await? {
            Some(existing) => {
                info!(order_id = %existing.id, "reusing pending order from an earlier checkout attempt");
                self.orders
                    .amend_pending(existing.id, &request.selections)
                    .await?
            }
            None => {
                self.orders
                    .create_order(NewOrder {
                        user_id: request.user_id,
                        user_role: request.user_role,
                        week_start: request.week_start,
                        selections: sanitized,
                        total,
                        currency: self.currency.clone(),
                    })
                    .await?
            }
        };

        let intent = self
            .gateway
            .create_payment_intent(&PaymentIntentRequest {
                order_id: order.id,
                order_number: order.order_number.clone(),
                amount: order.total,
                currency: order.currency.clone(),
                description: format!(
                    "Canteen order {} (week of {})",
                    order.order_number, order.week_start
                ),
                customer_email: request.customer_email.clone(),
                customer_name: request.customer_name.clone(),
            })
            .await
            .map_err(|e| {
                // The order stays pending; the checkout can be retried.
                warn!(order_id = %order.id, error = %e, "payment intent creation failed");
                e
            })?;

        let processing = self
            .orders
            .apply_transition(
                &order,
                &LifecycleEvent::PaymentStarted {
                    transaction_ref: Some(intent.transaction_ref.clone()),
                },
            )
            .await?;

        Ok(CheckoutResponse {
            order_id: processing.id,
            order_number: processing.order_number.clone(),
            total: processing.total,
            currency: processing.currency.clone(),
            status: processing.status,
            redirect_url: intent.redirect_url,
        })
    }

    /// Applies a provider callback (or a synthesized one) to the order it
    /// belongs to. The single path for webhooks and manual confirmation.
    #[instrument(skip(self, callback), fields(outcome = %callback.outcome, raw_status = %callback.raw_status))]
    pub async fn handle_callback(
        &self,
        callback: GatewayCallback,
    ) -> Result<Order, ServiceError> {
        let mut order = self.locate_callback_order(&callback).await?;

        let event = match callback.outcome {
            PaymentOutcome::Approved => LifecycleEvent::GatewayApproved {
                transaction_ref: callback.transaction_ref.clone(),
            },
            PaymentOutcome::Declined => LifecycleEvent::GatewayDeclined {
                transaction_ref: callback.transaction_ref.clone(),
            },
            PaymentOutcome::Pending => LifecycleEvent::GatewayPending {
                raw_status: callback.raw_status.clone(),
            },
            PaymentOutcome::Unknown => LifecycleEvent::GatewayUnknown {
                raw_status: callback.raw_status.clone(),
                payload: callback.raw.clone(),
            },
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.orders.apply_transition(&order, &event).await {
                Err(ServiceError::ConcurrentModification(_)) if attempt < TRANSITION_RETRIES => {
                    // Lost the version race; re-read and re-apply. The
                    // state machine turns a replay into a no-op.
                    order = self.orders.require_order(order.id).await?;
                }
                result => return result,
            }
        }
    }

    /// Read-only reconciliation behind the return/status page: find the
    /// order the customer came back for and present its latest state,
    /// never fabricating a status the state machine did not reach.
    #[instrument(skip(self, query), fields(user_id = %user_id))]
    pub async fn reconcile(
        &self,
        query: &ReturnQuery,
        user_id: Uuid,
    ) -> Result<PaymentReturnView, ServiceError> {
        let order = self.locate_return_order(query, user_id).await?;

        let outcome = match order.status {
            OrderStatus::Paid => ReturnOutcome::Paid,
            OrderStatus::Cancelled => ReturnOutcome::Cancelled,
            OrderStatus::ProcessingPayment => {
                if self.return_signals_abandonment(query) {
                    // Presentation only: the order stays processing until
                    // the provider (or an admin) says otherwise.
                    ReturnOutcome::Cancelled
                } else {
                    ReturnOutcome::Processing
                }
            }
            OrderStatus::Pending => ReturnOutcome::Pending,
        };

        Ok(PaymentReturnView { outcome, order })
    }

    /// Manual "the webhook never came" escape hatch: synthesizes an
    /// approved callback and pushes it through [`Self::handle_callback`],
    /// the exact path a real webhook takes.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn confirm_manually(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        let order = self.orders.require_order(order_id).await?;

        if order.status != OrderStatus::ProcessingPayment {
            return Err(ServiceError::InvalidOperation(format!(
                "only orders awaiting their payment outcome can be confirmed manually, order is {}",
                order.status
            )));
        }

        let waiting_since = order.updated_at.unwrap_or(order.created_at);
        let grace = chrono::Duration::from_std(self.reconcile_grace)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        if Utc::now() - waiting_since < grace {
            return Err(ServiceError::InvalidOperation(
                "the provider may still deliver its webhook; retry later".to_string(),
            ));
        }

        info!(order_id = %order.id, "manually confirming payment outcome");
        self.handle_callback(GatewayCallback {
            order_reference: Some(order.id.to_string()),
            transaction_ref: order.payment_transaction_id.clone(),
            outcome: PaymentOutcome::Approved,
            raw_status: "approved".to_string(),
            occurred_at: Some(Utc::now()),
            raw: serde_json::json!({
                "status": "approved",
                "source": "manual_reconciliation",
                "order_id": order.id,
            }),
        })
        .await
    }

    /// A pending order for the same user/week is the residue of a
    /// checkout whose gateway intent failed; it is rewritten instead of
    /// stacking abandoned orders. Anything past `pending` is never reused.
    async fn reusable_pending_order(
        &self,
        request: &CheckoutRequest,
    ) -> Result<Option<Order>, ServiceError> {
        let pending = self
            .orders
            .list_orders(
                &OrderFilter::for_user(request.user_id)
                    .with_week(request.week_start)
                    .with_statuses(vec![OrderStatus::Pending])
                    .with_limit(1),
            )
            .await?;
        Ok(pending.into_iter().next())
    }

    async fn locate_callback_order(
        &self,
        callback: &GatewayCallback,
    ) -> Result<Order, ServiceError> {
        if let Some(reference) = &callback.order_reference {
            if let Some(order) = self.orders.resolve_reference(reference).await? {
                return Ok(order);
            }
        }
        if let Some(transaction_ref) = &callback.transaction_ref {
            let mut matches = self
                .orders
                .list_orders(&OrderFilter {
                    transaction_ref: Some(transaction_ref.clone()),
                    limit: Some(1),
                    ..OrderFilter::default()
                })
                .await?;
            if let Some(order) = matches.pop() {
                return Ok(order);
            }
        }
        Err(ServiceError::NotFound(
            "order not found for payment callback".to_string(),
        ))
    }

    /// Lookup ladder for the return page: explicit reference, provider
    /// transaction reference, then best-effort per-user fallbacks (some
    /// gateways cannot reliably echo the order id back).
    async fn locate_return_order(
        &self,
        query: &ReturnQuery,
        user_id: Uuid,
    ) -> Result<Order, ServiceError> {
        if let Some(reference) = query.order.as_deref().filter(|r| !r.trim().is_empty()) {
            return self
                .orders
                .resolve_reference(reference.trim())
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", reference)));
        }

        if let Some(transaction_ref) = &query.transaction_ref {
            let mut matches = self
                .orders
                .list_orders(&OrderFilter {
                    user_id: Some(user_id),
                    transaction_ref: Some(transaction_ref.clone()),
                    limit: Some(1),
                    ..OrderFilter::default()
                })
                .await?;
            if let Some(order) = matches.pop() {
                return Ok(order);
            }
        }

        let mut processing = self
            .orders
            .list_orders(
                &OrderFilter::for_user(user_id)
                    .with_statuses(vec![OrderStatus::ProcessingPayment])
                    .with_limit(1),
            )
            .await?;
        if let Some(order) = processing.pop() {
            return Ok(order);
        }

        let mut any = self
            .orders
            .list_orders(&OrderFilter::for_user(user_id).with_limit(1))
            .await?;
        any.pop().ok_or_else(|| {
            ServiceError::NotFound("no orders found for this user".to_string())
        })
    }

    fn return_signals_abandonment(&self, query: &ReturnQuery) -> bool {
        if query.cancelled == Some(true) {
            return true;
        }
        query
            .status
            .as_deref()
            .map(PaymentOutcome::from_raw_status)
            == Some(PaymentOutcome::Declined)
    }
}
