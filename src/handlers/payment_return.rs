use axum::{
    extract::{Query, State},
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::services::reconciliation::{PaymentReturnView, ReturnQuery};
use crate::{ApiResponse, AppState};

/// What the provider's redirect appends to the return URL, plus the
/// acting user (authentication is wired by the surrounding deployment).
#[derive(Debug, Deserialize, IntoParams)]
pub struct ReturnPageQuery {
    pub user_id: Uuid,
    pub status: Option<String>,
    /// Order id or order number, when the provider echoes it back.
    pub order: Option<String>,
    pub transaction_ref: Option<String>,
    pub cancelled: Option<bool>,
}

/// Status page behind the provider redirect: resolves which order the
/// customer is returning for (with per-user fallbacks when the provider
/// echoes nothing back) and presents its latest known state. Read-only;
/// state changes only ever come from webhooks, manual confirmation or
/// admin overrides.
#[utoipa::path(
    get,
    path = "/api/v1/payments/return",
    params(ReturnPageQuery),
    responses(
        (status = 200, description = "Payment outcome and order", body = ApiResponse<PaymentReturnView>),
        (status = 404, description = "No matching order", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_return(
    State(state): State<AppState>,
    Query(query): Query<ReturnPageQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state
        .services
        .reconciler
        .reconcile(
            &ReturnQuery {
                status: query.status,
                order: query.order,
                transaction_ref: query.transaction_ref,
                cancelled: query.cancelled,
            },
            query.user_id,
        )
        .await?;
    Ok(Json(ApiResponse::success(view)))
}
