//! digistore-api library
//!
//! Backend for a digital-goods storefront. The interesting part is the order
//! fulfillment engine: checkout pricing, payment-gateway reconciliation, and
//! exactly-once allocation of single-use stock items.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;

use axum::{extract::State, response::Json, routing::get, routing::post, Router};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use services::inventory::InventoryService;
use services::order_expiry::ExpirySweeper;
use services::orders::OrderService;
use services::payment_gateway::MidtransClient;
use services::payment_reconciliation::ReconciliationService;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub orders: Arc<OrderService>,
    pub inventory: InventoryService,
    pub reconciliation: Arc<ReconciliationService>,
    pub sweeper: ExpirySweeper,
}

impl AppState {
    /// Wires the service graph on top of a connection pool and event channel.
    pub fn build(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
        gateway: Arc<MidtransClient>,
    ) -> Self {
        let inventory = InventoryService::new(db.clone(), event_sender.clone());
        let sweeper = ExpirySweeper::new(db.clone(), inventory.clone(), event_sender.clone());
        let orders = Arc::new(OrderService::new(
            db.clone(),
            inventory.clone(),
            gateway,
            sweeper.clone(),
            event_sender.clone(),
            &config,
        ));
        let reconciliation = Arc::new(ReconciliationService::new(
            db.clone(),
            inventory.clone(),
            event_sender.clone(),
        ));

        Self {
            db,
            config,
            event_sender,
            orders,
            inventory,
            reconciliation,
            sweeper,
        }
    }
}

// Common response wrappers
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

// API routes
pub fn api_v1_routes() -> Router<AppState> {
    let orders = Router::new()
        .route("/checkout", post(handlers::orders::checkout))
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route(
            "/orders/:id/complete",
            post(handlers::orders::complete_order),
        )
        .route("/orders/:id/cancel", post(handlers::orders::cancel_order));

    let products = Router::new()
        .route(
            "/products/:id/stock",
            post(handlers::products::restock).get(handlers::products::stock_level),
        );

    // Unauthenticated transport; authenticity comes from the HMAC signature
    let payment_webhook = Router::new().route(
        "/payments/webhook",
        post(handlers::payment_webhooks::payment_webhook),
    );

    Router::new()
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .merge(orders)
        .merge(products)
        .merge(payment_webhook)
}

async fn api_status() -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "digistore-api",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": db_status,
        "checks": {
            "database": db_status,
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}
