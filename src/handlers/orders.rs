use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{Order, OrderStatus};
use crate::services::selections::RawDaySelection;
use crate::store::OrderFilter;
use crate::{ApiResponse, AppState};

/// Resolve an order identifier that may be a UUID or an order number.
async fn resolve_order(state: &AppState, reference: &str) -> Result<Order, ServiceError> {
    state
        .services
        .orders
        .resolve_reference(reference)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", reference)))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct OrderListQuery {
    pub user_id: Option<Uuid>,
    pub week_start: Option<NaiveDate>,
    /// Comma-separated status list, e.g. `paid,processing_payment`
    pub status: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
}

impl OrderListQuery {
    fn into_filter(self) -> Result<OrderFilter, ServiceError> {
        let statuses = self
            .status
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        OrderStatus::from_str(s).map_err(|_| {
                            ServiceError::InvalidStatus(format!("Unknown order status: {}", s))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;

        Ok(OrderFilter {
            user_id: self.user_id,
            week_start: self.week_start,
            statuses,
            transaction_ref: None,
            created_from: self.created_from,
            created_to: self.created_to,
            limit: self.limit,
        })
    }
}

/// Fetches one order by id or order number.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = String, Path, description = "Order id or order number")),
    responses(
        (status = 200, description = "Order found", body = ApiResponse<Order>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = resolve_order(&state, &id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Lists orders, newest first, filtered by user, week, status and
/// creation range.
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Matching orders", body = ApiResponse<Vec<Order>>),
        (status = 400, description = "Invalid filter", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let filter = query.into_filter()?;
    let orders = state.services.orders.list_orders(&filter).await?;
    Ok(Json(ApiResponse::success(orders)))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CurrentOrderQuery {
    pub user_id: Uuid,
    pub week_start: NaiveDate,
}

/// Most recent non-terminal order for a user and ordering week; lets the
/// UI resume an in-flight order instead of starting a new one.
#[utoipa::path(
    get,
    path = "/api/v1/orders/current",
    params(CurrentOrderQuery),
    responses(
        (status = 200, description = "Open order for the week", body = ApiResponse<Order>),
        (status = 404, description = "No open order for the week", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn current_order(
    State(state): State<AppState>,
    Query(query): Query<CurrentOrderQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .current_order_for_week(query.user_id, query.week_start)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("no open order for week {}", query.week_start))
        })?;
    Ok(Json(ApiResponse::success(order)))
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct AmendOrderRequest {
    pub selections: Vec<RawDaySelection>,
}

/// Rewrites the selections of a still-pending order; the total is
/// recomputed from the current price table.
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/selections",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = AmendOrderRequest,
    responses(
        (status = 200, description = "Order amended", body = ApiResponse<Order>),
        (status = 400, description = "Order is past pending or selections invalid", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn amend_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AmendOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .amend_pending(id, &request.selections)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Manually confirms a payment whose webhook never arrived. Allowed only
/// for orders stuck in processing_payment past the configured grace
/// period; runs through the same transition path as a real webhook.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/confirm-payment",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order reconciled", body = ApiResponse<Order>),
        (status = 400, description = "Order is not awaiting its payment outcome", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn confirm_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.reconciler.confirm_manually(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Administrative override: reopen an order, clearing payment timestamps.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/reset",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order reset to pending", body = ApiResponse<Order>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn reset_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.admin_reset(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Administrative override: cancel an order in any non-cancelled state.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order cancelled", body = ApiResponse<Order>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.admin_cancel(id).await?;
    Ok(Json(ApiResponse::success(order)))
}
