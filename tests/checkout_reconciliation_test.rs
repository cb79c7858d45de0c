//! End-to-end tests for the checkout and payment-reconciliation flow,
//! run against the in-memory store and a scripted gateway stub:
//!
//! - checkout pricing and persistence
//! - top-up orders for the same week
//! - duplicate-slot rejection after payment
//! - webhook approval, replayed webhooks
//! - return-page fallback lookup
//! - webhook authentication at the HTTP surface

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use canteen_api::config::{AppConfig, PricingConfig};
use canteen_api::errors::ServiceError;
use canteen_api::events;
use canteen_api::gateway::{
    GatewayCallback, PaymentGateway, PaymentIntent, PaymentIntentRequest, PaymentOutcome,
};
use canteen_api::models::{MealCategory, OrderStatus, SlotOwner, UserRole};
use canteen_api::services::orders::OrderService;
use canteen_api::services::pricing::PriceTable;
use canteen_api::services::reconciliation::{
    CheckoutRequest, PaymentReconciler, ReturnOutcome, ReturnQuery,
};
use canteen_api::services::selections::{RawDaySelection, RawMenuItem};
use canteen_api::store::{InMemoryOrderStore, OrderFilter, OrderStore};

/// Deterministic gateway: intents succeed (unless failure is scripted)
/// with a transaction reference derived from the order number.
#[derive(Default)]
struct StubGateway {
    fail_next_intent: AtomicBool,
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, ServiceError> {
        if self.fail_next_intent.swap(false, Ordering::SeqCst) {
            return Err(ServiceError::GatewayError(
                "provider unreachable".to_string(),
            ));
        }
        Ok(PaymentIntent {
            transaction_ref: format!("txn-{}", request.order_number),
            redirect_url: format!("https://pay.example/{}", request.order_number),
        })
    }

    fn parse_callback(&self, payload: &[u8]) -> Result<GatewayCallback, ServiceError> {
        let raw: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| ServiceError::InvalidCallback(format!("payload is not JSON: {}", e)))?;
        let raw_status = raw
            .get("status")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ServiceError::InvalidCallback("missing status".to_string()))?
            .to_string();
        Ok(GatewayCallback {
            order_reference: raw
                .get("order_id")
                .and_then(|v| v.as_str())
                .map(String::from),
            transaction_ref: raw
                .get("transaction_id")
                .and_then(|v| v.as_str())
                .map(String::from),
            outcome: PaymentOutcome::from_raw_status(&raw_status),
            raw_status,
            occurred_at: None,
            raw,
        })
    }
}

struct TestContext {
    store: Arc<InMemoryOrderStore>,
    gateway: Arc<StubGateway>,
    reconciler: PaymentReconciler,
}

fn prices() -> PriceTable {
    PriceTable::from_config(&PricingConfig {
        guardian_lunch: 3000,
        guardian_snack: 1500,
        staff_lunch: 2500,
        staff_snack: 1200,
    })
}

fn context() -> TestContext {
    let store = Arc::new(InMemoryOrderStore::new());
    let gateway = Arc::new(StubGateway::default());
    let orders = Arc::new(OrderService::new(store.clone(), None, prices()));
    let reconciler = PaymentReconciler::new(
        orders,
        gateway.clone(),
        "EUR".to_string(),
        Duration::from_secs(0),
    );
    TestContext {
        store,
        gateway,
        reconciler,
    }
}

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, 2).unwrap()
}

fn tuesday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, 3).unwrap()
}

fn lunch() -> RawMenuItem {
    RawMenuItem {
        code: "L1".to_string(),
        name: "Spaghetti".to_string(),
        price: 3000,
    }
}

fn snack() -> RawMenuItem {
    RawMenuItem {
        code: "S1".to_string(),
        name: "Apple".to_string(),
        price: 1500,
    }
}

fn day(date: NaiveDate, with_lunch: bool, with_snack: bool) -> RawDaySelection {
    RawDaySelection {
        date,
        child_ref: Some("Anna".to_string()),
        lunch: with_lunch.then(lunch),
        snack: with_snack.then(snack),
    }
}

fn guardian_checkout(user_id: Uuid, selections: Vec<RawDaySelection>) -> CheckoutRequest {
    CheckoutRequest {
        user_id,
        user_role: UserRole::Guardian,
        customer_name: "Pat Parent".to_string(),
        customer_email: "parent@example.com".to_string(),
        children: vec!["Anna".to_string()],
        week_start: monday(),
        selections,
    }
}

fn approved_callback(order_id: Uuid, transaction_ref: &str) -> GatewayCallback {
    GatewayCallback {
        order_reference: Some(order_id.to_string()),
        transaction_ref: Some(transaction_ref.to_string()),
        outcome: PaymentOutcome::Approved,
        raw_status: "approved".to_string(),
        occurred_at: None,
        raw: serde_json::json!({
            "order_id": order_id,
            "transaction_id": transaction_ref,
            "status": "approved",
        }),
    }
}

// ==================== Checkout Scenarios ====================

#[tokio::test]
async fn monday_lunch_and_snack_totals_4500() {
    let ctx = context();
    let user = Uuid::new_v4();

    let response = ctx
        .reconciler
        .checkout(guardian_checkout(user, vec![day(monday(), true, true)]))
        .await
        .unwrap();

    assert_eq!(response.total, 4500);
    assert!(response.redirect_url.contains(&response.order_number));

    let order = ctx.store.get_by_id(response.order_id).await.unwrap().unwrap();
    assert_eq!(order.total, 4500);
    assert_eq!(order.selections.len(), 1);
    assert_eq!(order.status, OrderStatus::ProcessingPayment);
    assert!(order.paid_at.is_none() && order.cancelled_at.is_none());
}

#[tokio::test]
async fn top_up_order_for_another_day_leaves_the_first_untouched() {
    let ctx = context();
    let user = Uuid::new_v4();

    let first = ctx
        .reconciler
        .checkout(guardian_checkout(user, vec![day(monday(), true, true)]))
        .await
        .unwrap();
    let first_order = ctx.store.get_by_id(first.order_id).await.unwrap().unwrap();

    // Tuesday lunch only: a different slot, so no conflict.
    let second = ctx
        .reconciler
        .checkout(guardian_checkout(user, vec![day(tuesday(), true, false)]))
        .await
        .unwrap();

    assert_ne!(second.order_id, first.order_id);
    assert_eq!(second.total, 3000);

    let all = ctx
        .store
        .list(&OrderFilter::for_user(user))
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let first_after = ctx.store.get_by_id(first.order_id).await.unwrap().unwrap();
    assert_eq!(first_after, first_order);
}

#[tokio::test]
async fn resubmitting_a_paid_slot_is_rejected_with_the_conflict() {
    let ctx = context();
    let user = Uuid::new_v4();

    let first = ctx
        .reconciler
        .checkout(guardian_checkout(user, vec![day(monday(), true, false)]))
        .await
        .unwrap();
    ctx.reconciler
        .handle_callback(approved_callback(
            first.order_id,
            &format!("txn-{}", first.order_number),
        ))
        .await
        .unwrap();

    let result = ctx
        .reconciler
        .checkout(guardian_checkout(user, vec![day(monday(), true, false)]))
        .await;

    match result {
        Err(ServiceError::DuplicateSelection(conflicts)) => {
            assert_eq!(conflicts.len(), 1);
            assert_eq!(conflicts[0].date, monday());
            assert_eq!(conflicts[0].owner, SlotOwner::Child("Anna".to_string()));
            assert_eq!(conflicts[0].category, MealCategory::Lunch);
            assert_eq!(conflicts[0].paid_item, "Spaghetti");
        }
        other => panic!("expected a duplicate-selection rejection, got {:?}", other.map(|r| r.order_id)),
    }

    // Snack for the same slot is still purchasable.
    let snack_only = ctx
        .reconciler
        .checkout(guardian_checkout(user, vec![day(monday(), false, true)]))
        .await
        .unwrap();
    assert_eq!(snack_only.total, 1500);
}

// ==================== Webhook Scenarios ====================

#[tokio::test]
async fn approved_callback_marks_the_order_paid() {
    let ctx = context();
    let user = Uuid::new_v4();
    let response = ctx
        .reconciler
        .checkout(guardian_checkout(user, vec![day(monday(), true, true)]))
        .await
        .unwrap();

    let order = ctx
        .reconciler
        .handle_callback(approved_callback(
            response.order_id,
            &format!("txn-{}", response.order_number),
        ))
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Paid);
    assert!(order.paid_at.is_some());
    assert!(order.cancelled_at.is_none());
}

#[tokio::test]
async fn replayed_callbacks_are_absorbed_without_side_effects() {
    let ctx = context();
    let user = Uuid::new_v4();
    let response = ctx
        .reconciler
        .checkout(guardian_checkout(user, vec![day(monday(), true, true)]))
        .await
        .unwrap();
    let callback = approved_callback(
        response.order_id,
        &format!("txn-{}", response.order_number),
    );

    let first = ctx.reconciler.handle_callback(callback.clone()).await.unwrap();
    // The provider retries delivery of the same payload.
    let second = ctx.reconciler.handle_callback(callback).await.unwrap();

    assert_eq!(second.status, OrderStatus::Paid);
    assert_eq!(second.paid_at, first.paid_at);
    assert_eq!(second.version, first.version);
}

#[tokio::test]
async fn declined_callback_cancels_the_order() {
    let ctx = context();
    let user = Uuid::new_v4();
    let response = ctx
        .reconciler
        .checkout(guardian_checkout(user, vec![day(monday(), true, false)]))
        .await
        .unwrap();

    let order = ctx
        .reconciler
        .handle_callback(GatewayCallback {
            order_reference: Some(response.order_id.to_string()),
            transaction_ref: None,
            outcome: PaymentOutcome::Declined,
            raw_status: "declined".to_string(),
            occurred_at: None,
            raw: serde_json::json!({"status": "declined"}),
        })
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Cancelled);
    assert!(order.cancelled_at.is_some());
    assert!(order.paid_at.is_none());
}

#[tokio::test]
async fn unknown_outcomes_audit_without_changing_status() {
    let ctx = context();
    let user = Uuid::new_v4();
    let response = ctx
        .reconciler
        .checkout(guardian_checkout(user, vec![day(monday(), true, false)]))
        .await
        .unwrap();

    let order = ctx
        .reconciler
        .handle_callback(GatewayCallback {
            order_reference: Some(response.order_id.to_string()),
            transaction_ref: None,
            outcome: PaymentOutcome::Unknown,
            raw_status: "settlement_review".to_string(),
            occurred_at: None,
            raw: serde_json::json!({"status": "settlement_review"}),
        })
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::ProcessingPayment);
    let metadata = order.gateway_metadata.unwrap();
    assert_eq!(metadata["last_unapplied_outcome"], "settlement_review");
}

// ==================== Return-Page Scenarios ====================

#[tokio::test]
async fn return_page_finds_the_processing_order_without_a_reference() {
    let ctx = context();
    let user = Uuid::new_v4();
    let response = ctx
        .reconciler
        .checkout(guardian_checkout(user, vec![day(monday(), true, true)]))
        .await
        .unwrap();

    let orders_before = ctx.store.list(&OrderFilter::for_user(user)).await.unwrap();

    // The provider echoed nothing usable back.
    let view = ctx
        .reconciler
        .reconcile(&ReturnQuery::default(), user)
        .await
        .unwrap();

    assert_eq!(view.order.id, response.order_id);
    assert_eq!(view.outcome, ReturnOutcome::Processing);

    // Nothing was fabricated along the way.
    let orders_after = ctx.store.list(&OrderFilter::for_user(user)).await.unwrap();
    assert_eq!(orders_before, orders_after);
}

#[tokio::test]
async fn return_page_for_a_user_without_orders_is_not_found() {
    let ctx = context();
    let result = ctx
        .reconciler
        .reconcile(&ReturnQuery::default(), Uuid::new_v4())
        .await;
    assert!(matches!(result, Err(ServiceError::NotFound(_))));
}

#[tokio::test]
async fn manual_confirmation_after_a_missing_webhook() {
    let ctx = context();
    let user = Uuid::new_v4();
    let response = ctx
        .reconciler
        .checkout(guardian_checkout(user, vec![day(monday(), true, true)]))
        .await
        .unwrap();

    // No webhook ever arrives (grace period is zero in tests).
    let confirmed = ctx
        .reconciler
        .confirm_manually(response.order_id)
        .await
        .unwrap();
    assert_eq!(confirmed.status, OrderStatus::Paid);

    let view = ctx
        .reconciler
        .reconcile(&ReturnQuery::default(), user)
        .await
        .unwrap();
    assert_eq!(view.outcome, ReturnOutcome::Paid);
}

#[tokio::test]
async fn gateway_failure_keeps_checkout_retryable() {
    let ctx = context();
    let user = Uuid::new_v4();
    ctx.gateway.fail_next_intent.store(true, Ordering::SeqCst);

    let failed = ctx
        .reconciler
        .checkout(guardian_checkout(user, vec![day(monday(), true, true)]))
        .await;
    assert!(matches!(failed, Err(ServiceError::GatewayError(_))));

    // One pending order was left behind; the retry reuses it.
    let retried = ctx
        .reconciler
        .checkout(guardian_checkout(user, vec![day(monday(), true, true)]))
        .await
        .unwrap();
    let all = ctx.store.list(&OrderFilter::for_user(user)).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, retried.order_id);
    assert_eq!(all[0].status, OrderStatus::ProcessingPayment);
}

// ==================== HTTP Surface ====================

mod http_surface {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;
    use tower::ServiceExt;

    use canteen_api::handlers::AppServices;
    use canteen_api::{app_router, AppState};

    fn test_config(webhook_secret: Option<&str>) -> AppConfig {
        AppConfig {
            pricing: PricingConfig {
                guardian_lunch: 3000,
                guardian_snack: 1500,
                staff_lunch: 2500,
                staff_snack: 1200,
            },
            reconcile_grace_secs: 0,
            ..AppConfig::default()
        }
        .with_webhook_secret(webhook_secret)
    }

    trait WithSecret {
        fn with_webhook_secret(self, secret: Option<&str>) -> Self;
    }

    impl WithSecret for AppConfig {
        fn with_webhook_secret(mut self, secret: Option<&str>) -> Self {
            self.gateway.webhook_secret = secret.map(String::from);
            self
        }
    }

    fn app(webhook_secret: Option<&str>) -> (axum::Router, Arc<InMemoryOrderStore>) {
        let cfg = test_config(webhook_secret);
        let store = Arc::new(InMemoryOrderStore::new());
        let gateway = Arc::new(StubGateway::default());
        let (event_sender, event_rx) = events::channel(64);
        tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(
            store.clone(),
            gateway,
            Some(Arc::new(event_sender.clone())),
            &cfg,
        );
        let state = AppState {
            config: cfg,
            event_sender,
            services,
        };
        (app_router(state), store)
    }

    fn checkout_body(user_id: Uuid) -> String {
        serde_json::json!({
            "user_id": user_id,
            "user_role": "guardian",
            "customer_name": "Pat Parent",
            "customer_email": "parent@example.com",
            "children": ["Anna"],
            "week_start": "2024-09-02",
            "selections": [{
                "date": "2024-09-02",
                "child_ref": "Anna",
                "lunch": {"code": "L1", "name": "Spaghetti", "price": 3000},
                "snack": {"code": "S1", "name": "Apple", "price": 1500},
            }],
        })
        .to_string()
    }

    fn sign(timestamp: &str, payload: &[u8], secret: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body bytes");
        serde_json::from_slice(&bytes).expect("json response")
    }

    #[tokio::test]
    async fn checkout_endpoint_creates_and_redirects() {
        let (app, store) = app(None);
        let user = Uuid::new_v4();

        let response = app
            .oneshot(
                Request::post("/api/v1/checkout")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(checkout_body(user)))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["data"]["total"], 4500);
        assert_eq!(body["data"]["status"], "processing_payment");

        let orders = store.list(&OrderFilter::for_user(user)).await.unwrap();
        assert_eq!(orders.len(), 1);
    }

    #[tokio::test]
    async fn webhook_with_a_valid_signature_is_applied() {
        let (app, store) = app(Some("whsec"));
        let user = Uuid::new_v4();

        let checkout_response = app
            .clone()
            .oneshot(
                Request::post("/api/v1/checkout")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(checkout_body(user)))
                    .unwrap(),
            )
            .await
            .unwrap();
        let order_id = body_json(checkout_response).await["data"]["order_id"]
            .as_str()
            .unwrap()
            .to_string();

        let payload = serde_json::json!({"order_id": order_id, "status": "approved"}).to_string();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign(&timestamp, payload.as_bytes(), "whsec");

        let response = app
            .oneshot(
                Request::post("/api/v1/payments/webhook")
                    .header("x-timestamp", &timestamp)
                    .header("x-signature", &signature)
                    .body(Body::from(payload))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let order = store
            .get_by_id(order_id.parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn webhook_with_a_bad_signature_mutates_nothing() {
        let (app, store) = app(Some("whsec"));
        let user = Uuid::new_v4();

        let checkout_response = app
            .clone()
            .oneshot(
                Request::post("/api/v1/checkout")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(checkout_body(user)))
                    .unwrap(),
            )
            .await
            .unwrap();
        let order_id = body_json(checkout_response).await["data"]["order_id"]
            .as_str()
            .unwrap()
            .to_string();

        let payload = serde_json::json!({"order_id": order_id, "status": "approved"}).to_string();
        let timestamp = chrono::Utc::now().timestamp().to_string();

        let response = app
            .oneshot(
                Request::post("/api/v1/payments/webhook")
                    .header("x-timestamp", &timestamp)
                    .header("x-signature", "deadbeef")
                    .body(Body::from(payload))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let order = store
            .get_by_id(order_id.parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.status, OrderStatus::ProcessingPayment);
    }

    #[tokio::test]
    async fn duplicate_checkout_answers_409_with_conflicts() {
        let (app, store) = app(None);
        let user = Uuid::new_v4();

        let first = app
            .clone()
            .oneshot(
                Request::post("/api/v1/checkout")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(checkout_body(user)))
                    .unwrap(),
            )
            .await
            .unwrap();
        let order_id: Uuid = body_json(first).await["data"]["order_id"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();

        // Pay the first order directly through the store-facing services.
        let order = store.get_by_id(order_id).await.unwrap().unwrap();
        let orders = OrderService::new(store.clone(), None, prices());
        orders
            .apply_transition(
                &order,
                &canteen_api::services::lifecycle::LifecycleEvent::GatewayApproved {
                    transaction_ref: order.payment_transaction_id.clone(),
                },
            )
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::post("/api/v1/checkout")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(checkout_body(user)))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["conflicts"].as_array().unwrap().len(), 2);
        assert!(body["message"]
            .as_str()
            .unwrap()
            .contains("lunch already paid as Spaghetti"));
    }
}
