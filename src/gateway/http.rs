use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, instrument, warn};
use url::Url;

use crate::config::GatewayConfig;
use crate::errors::ServiceError;
use crate::store::parse_stored_timestamp;

use super::{GatewayCallback, PaymentGateway, PaymentIntent, PaymentIntentRequest, PaymentOutcome};

/// HTTP client for the hosted-checkout payment provider.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: Url,
    merchant_id: String,
    api_key: String,
    return_url: String,
}

impl HttpPaymentGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, ServiceError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            ServiceError::InternalError(format!("invalid gateway base url: {}", e))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                ServiceError::InternalError(format!("failed to build gateway client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url,
            merchant_id: config.merchant_id.clone(),
            api_key: config.api_key.clone(),
            return_url: config.return_url.clone(),
        })
    }

    fn intents_url(&self) -> Result<Url, ServiceError> {
        self.base_url
            .join("v1/payment-intents")
            .map_err(|e| ServiceError::InternalError(format!("invalid gateway url: {}", e)))
    }
}

/// Provider response for intent creation; field names vary across
/// provider API versions.
#[derive(Debug, Deserialize)]
struct IntentResponse {
    transaction_id: Option<String>,
    id: Option<String>,
    redirect_url: Option<String>,
    checkout_url: Option<String>,
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, request), fields(order_id = %request.order_id, amount = request.amount))]
    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, ServiceError> {
        let body = serde_json::json!({
            "merchant_id": self.merchant_id,
            "order_id": request.order_id,
            "reference": request.order_number,
            "amount": request.amount,
            "currency": request.currency,
            "description": request.description,
            "customer": {
                "email": request.customer_email,
                "name": request.customer_name,
            },
            "return_url": self.return_url,
        });

        let response = self
            .client
            .post(self.intents_url()?)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "payment intent request failed");
                if e.is_timeout() {
                    ServiceError::GatewayError("payment provider timed out".to_string())
                } else {
                    ServiceError::GatewayError(format!("payment provider unreachable: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(%status, detail, "payment provider rejected intent request");
            return Err(ServiceError::GatewayError(format!(
                "payment provider rejected the request ({})",
                status
            )));
        }

        let parsed: IntentResponse = response.json().await.map_err(|e| {
            ServiceError::GatewayError(format!("unreadable provider response: {}", e))
        })?;

        let transaction_ref = parsed
            .transaction_id
            .or(parsed.id)
            .ok_or_else(|| {
                ServiceError::GatewayError(
                    "provider response carried no transaction reference".to_string(),
                )
            })?;
        let redirect_url = parsed
            .redirect_url
            .or(parsed.checkout_url)
            .ok_or_else(|| {
                ServiceError::GatewayError(
                    "provider response carried no redirect url".to_string(),
                )
            })?;

        Ok(PaymentIntent {
            transaction_ref,
            redirect_url,
        })
    }

    fn parse_callback(&self, payload: &[u8]) -> Result<GatewayCallback, ServiceError> {
        let raw: Value = serde_json::from_slice(payload)
            .map_err(|e| ServiceError::InvalidCallback(format!("payload is not JSON: {}", e)))?;

        let order_reference = first_string(&raw, &["order_id", "orderId", "reference", "merchant_reference"]);
        let transaction_ref = first_string(&raw, &["transaction_id", "transactionId", "txn_id", "id"]);
        if order_reference.is_none() && transaction_ref.is_none() {
            return Err(ServiceError::InvalidCallback(
                "callback carries neither an order nor a transaction reference".to_string(),
            ));
        }

        let raw_status = first_string(&raw, &["status", "outcome", "result"])
            .ok_or_else(|| {
                ServiceError::InvalidCallback("callback carries no status field".to_string())
            })?;

        let occurred_at = ["timestamp", "occurred_at", "created_at"]
            .iter()
            .filter_map(|key| raw.get(key))
            .find_map(parse_stored_timestamp);

        Ok(GatewayCallback {
            order_reference,
            transaction_ref,
            outcome: PaymentOutcome::from_raw_status(&raw_status),
            raw_status,
            occurred_at,
            raw,
        })
    }
}

fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| value.get(key))
        .find_map(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use uuid::Uuid;
    use wiremock::matchers::{bearer_token, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway_for(base_url: &str) -> HttpPaymentGateway {
        HttpPaymentGateway::new(&GatewayConfig {
            base_url: base_url.to_string(),
            merchant_id: "canteen-001".to_string(),
            api_key: "test-key".to_string(),
            timeout_secs: 2,
            return_url: "http://localhost:3000/payment/return".to_string(),
            webhook_secret: None,
            webhook_tolerance_secs: 300,
        })
        .unwrap()
    }

    fn intent_request() -> PaymentIntentRequest {
        PaymentIntentRequest {
            order_id: Uuid::new_v4(),
            order_number: "ORD-ABCD1234".to_string(),
            amount: 4500,
            currency: "EUR".to_string(),
            description: "Canteen order ORD-ABCD1234".to_string(),
            customer_email: "parent@example.com".to_string(),
            customer_name: "Pat Parent".to_string(),
        }
    }

    #[tokio::test]
    async fn create_intent_parses_the_provider_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payment-intents"))
            .and(bearer_token("test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "transaction_id": "txn-42",
                "redirect_url": "https://pay.example/txn-42",
            })))
            .mount(&server)
            .await;

        let gateway = gateway_for(&server.uri());
        let intent = gateway
            .create_payment_intent(&intent_request())
            .await
            .unwrap();
        assert_eq!(intent.transaction_ref, "txn-42");
        assert_eq!(intent.redirect_url, "https://pay.example/txn-42");
    }

    #[tokio::test]
    async fn provider_rejections_surface_as_gateway_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payment-intents"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let gateway = gateway_for(&server.uri());
        assert_matches!(
            gateway.create_payment_intent(&intent_request()).await,
            Err(ServiceError::GatewayError(_))
        );
    }

    #[tokio::test]
    async fn unreachable_provider_is_a_gateway_error() {
        // Nothing listens here.
        let gateway = gateway_for("http://127.0.0.1:1");
        assert_matches!(
            gateway.create_payment_intent(&intent_request()).await,
            Err(ServiceError::GatewayError(_))
        );
    }

    #[test]
    fn parse_callback_reads_aliased_fields() {
        let gateway = gateway_for("http://localhost:9000");
        let payload = json!({
            "orderId": "ORD-ABCD1234",
            "transaction_id": "txn-42",
            "status": "Approved",
            "timestamp": 1725273000,
        });

        let callback = gateway
            .parse_callback(payload.to_string().as_bytes())
            .unwrap();
        assert_eq!(callback.order_reference.as_deref(), Some("ORD-ABCD1234"));
        assert_eq!(callback.transaction_ref.as_deref(), Some("txn-42"));
        assert_eq!(callback.outcome, PaymentOutcome::Approved);
        assert_eq!(callback.raw_status, "Approved");
        assert_eq!(callback.occurred_at.unwrap().timestamp(), 1725273000);
    }

    #[test]
    fn parse_callback_requires_some_reference_and_a_status() {
        let gateway = gateway_for("http://localhost:9000");

        assert_matches!(
            gateway.parse_callback(br#"{"status": "approved"}"#),
            Err(ServiceError::InvalidCallback(_))
        );
        assert_matches!(
            gateway.parse_callback(br#"{"transaction_id": "txn-1"}"#),
            Err(ServiceError::InvalidCallback(_))
        );
        assert_matches!(
            gateway.parse_callback(b"not json at all"),
            Err(ServiceError::InvalidCallback(_))
        );
    }

    #[test]
    fn unrecognized_statuses_parse_as_unknown() {
        let gateway = gateway_for("http://localhost:9000");
        let callback = gateway
            .parse_callback(br#"{"transaction_id": "txn-1", "status": "settlement_review"}"#)
            .unwrap();
        assert_eq!(callback.outcome, PaymentOutcome::Unknown);
        assert_eq!(callback.raw_status, "settlement_review");
    }
}
