//! Port for the external payment provider.
//!
//! The provider is a black box with a narrow contract: create an intent
//! and get a redirect URL, and parse/authenticate what it later sends
//! back. Everything provider-specific stays behind [`PaymentGateway`].

pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ServiceError;

pub use http::HttpPaymentGateway;

type HmacSha256 = Hmac<Sha256>;

/// What the provider reported about a payment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentOutcome {
    Approved,
    Declined,
    Pending,
    Unknown,
}

impl PaymentOutcome {
    /// Maps a provider status string onto the outcome vocabulary.
    /// Unrecognized statuses stay `Unknown`; the raw string travels
    /// alongside for audit.
    pub fn from_raw_status(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approved" | "authorized" | "captured" | "success" | "succeeded" | "ok" | "paid" => {
                Self::Approved
            }
            "declined" | "failed" | "rejected" | "cancelled" | "canceled" | "expired"
            | "error" | "abandoned" => Self::Declined,
            "pending" | "in_progress" | "processing" | "received" | "created" => Self::Pending,
            _ => Self::Unknown,
        }
    }
}

/// Everything the provider needs to create a payment intent.
#[derive(Clone, Debug, Serialize)]
pub struct PaymentIntentRequest {
    pub order_id: Uuid,
    pub order_number: String,
    /// Amount in the smallest currency unit.
    pub amount: i64,
    pub currency: String,
    pub description: String,
    pub customer_email: String,
    pub customer_name: String,
}

/// A created intent: where to send the customer, and the provider's
/// reference for reconciliation.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PaymentIntent {
    pub transaction_ref: String,
    pub redirect_url: String,
}

/// A parsed provider callback, webhook-delivered or synthesized by
/// manual reconciliation.
#[derive(Clone, Debug, Serialize)]
pub struct GatewayCallback {
    /// Our order id or order number, when the provider echoes it.
    pub order_reference: Option<String>,
    pub transaction_ref: Option<String>,
    pub outcome: PaymentOutcome,
    /// Provider status string exactly as received.
    pub raw_status: String,
    /// Provider-side timestamp, normalized; shape varies by provider.
    pub occurred_at: Option<DateTime<Utc>>,
    /// Full payload, kept for audit of unrecognized outcomes.
    pub raw: serde_json::Value,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a payment intent and returns the customer redirect.
    /// Fails with `GatewayError` on network/auth/provider failure; the
    /// caller leaves the order `pending` so the checkout can be retried.
    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, ServiceError>;

    /// Parses a raw callback payload. Fails with `InvalidCallback` when
    /// the payload is not JSON or carries neither an order reference nor
    /// a transaction reference.
    fn parse_callback(&self, payload: &[u8]) -> Result<GatewayCallback, ServiceError>;
}

/// Verifies the webhook HMAC: hex(HMAC-SHA256(secret, "{ts}.{body}")),
/// with a bounded timestamp age. `now` is the verifier's unix time.
pub fn verify_webhook_signature(
    timestamp: &str,
    payload: &[u8],
    signature_hex: &str,
    secret: &str,
    tolerance_secs: u64,
    now: i64,
) -> bool {
    let Ok(ts) = timestamp.parse::<i64>() else {
        return false;
    };
    if (now - ts).unsigned_abs() > tolerance_secs {
        return false;
    }

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&expected, signature_hex)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
