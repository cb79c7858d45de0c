use axum::{extract::State, http::HeaderMap, http::StatusCode, response::IntoResponse};
use bytes::Bytes;
use tracing::{info, warn};

use crate::errors::ServiceError;
use crate::gateway::verify_webhook_signature;
use crate::AppState;

/// Receives the provider's asynchronous payment callback.
///
/// The raw body is authenticated (HMAC over `x-timestamp` + body) before
/// anything is parsed; an unauthenticated or malformed callback is
/// rejected without touching any order. Replays are absorbed by the
/// idempotent transition logic and still answer 200 so the provider
/// stops retrying.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Callback processed (or replayed)"),
        (status = 400, description = "Malformed payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 404, description = "No matching order", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    // Verify signature if configured
    if let Some(secret) = &state.config.gateway.webhook_secret {
        let timestamp = header_str(&headers, "x-timestamp")?;
        let signature = header_str(&headers, "x-signature")?;
        let ok = verify_webhook_signature(
            timestamp,
            &body,
            signature,
            secret,
            state.config.gateway.webhook_tolerance_secs,
            chrono::Utc::now().timestamp(),
        );
        if !ok {
            warn!("payment webhook signature verification failed");
            return Err(ServiceError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }
    }

    let callback = state.services.gateway.parse_callback(&body)?;
    info!(
        outcome = %callback.outcome,
        raw_status = %callback.raw_status,
        "payment webhook received"
    );

    let order = state.services.reconciler.handle_callback(callback).await?;
    info!(order_id = %order.id, status = %order.status, "payment webhook applied");

    Ok((StatusCode::OK, "ok"))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, ServiceError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            ServiceError::Unauthorized(format!("missing or unreadable {} header", name))
        })
}
