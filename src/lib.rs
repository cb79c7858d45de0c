//! Canteen API Library
//!
//! Order processing and payment reconciliation core for a school
//! cafeteria ordering platform.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod cache;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod models;
pub mod openapi;
pub mod services;
pub mod store;

use std::time::Duration;

use axum::{
    routing::{get, post, put},
    Router,
};
use serde::Serialize;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

// Common response wrapper
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
        }
    }
}

/// Builds the application router with all routes and middleware layers.
pub fn app_router(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.config.request_timeout_secs);

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/v1/checkout", post(handlers::checkout::checkout))
        .route(
            "/api/v1/payments/webhook",
            post(handlers::payment_webhooks::payment_webhook),
        )
        .route(
            "/api/v1/payments/return",
            get(handlers::payment_return::payment_return),
        )
        .route("/api/v1/orders", get(handlers::orders::list_orders))
        .route(
            "/api/v1/orders/current",
            get(handlers::orders::current_order),
        )
        .route("/api/v1/orders/:id", get(handlers::orders::get_order))
        .route(
            "/api/v1/orders/:id/selections",
            put(handlers::orders::amend_order),
        )
        .route(
            "/api/v1/orders/:id/confirm-payment",
            post(handlers::orders::confirm_payment),
        )
        .route("/api/v1/orders/:id/reset", post(handlers::orders::reset_order))
        .route("/api/v1/orders/:id/cancel", post(handlers::orders::cancel_order))
        .merge(
            SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
        )
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}
