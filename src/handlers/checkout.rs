use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::errors::ServiceError;
use crate::services::reconciliation::{CheckoutRequest, CheckoutResponse};
use crate::{ApiResponse, AppState};

/// Runs a checkout for one user and ordering week: selections are
/// sanitized, checked against already-paid slots, priced and persisted,
/// and the customer is redirected to the payment provider.
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order created, redirect to payment", body = ApiResponse<CheckoutResponse>),
        (status = 400, description = "Invalid or empty selections", body = crate::errors::ErrorResponse),
        (status = 409, description = "Selections already paid for this week", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment provider unavailable, retry later", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let response = state.services.reconciler.checkout(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}
