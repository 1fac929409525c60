use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::services::orders::{CheckoutRequest, OrderListResponse, OrderResponse};
use crate::{errors::ServiceError, ApiResponse, ApiResult, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct OrderListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    /// Restrict the listing to one customer's orders
    pub email: Option<String>,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CompleteOrderRequest {
    #[validate(length(min = 1, message = "delivery_data is required"))]
    pub delivery_data: String,
}

// POST /api/v1/checkout
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Order created with a payment session"),
        (status = 400, description = "Invalid checkout fields", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment gateway failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> ApiResult<OrderResponse> {
    let order = state.orders.checkout(request).await?;
    Ok(Json(ApiResponse::success(order)))
}

// GET /api/v1/orders/{id}
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with product details"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderResponse> {
    let order = state.orders.get_order(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

// GET /api/v1/orders
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(
        ("page" = Option<u64>, Query, description = "Page number (1-based)"),
        ("limit" = Option<u64>, Query, description = "Items per page"),
        ("email" = Option<String>, Query, description = "Filter by customer email")
    ),
    responses((status = 200, description = "Paginated orders, newest first")),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> ApiResult<OrderListResponse> {
    let limit = query.limit.clamp(1, 100);
    let list = match query.email.as_deref() {
        Some(email) => {
            state
                .orders
                .list_orders_by_email(email, query.page, limit)
                .await?
        }
        None => state.orders.list_orders(query.page, limit).await?,
    };
    Ok(Json(ApiResponse::success(list)))
}

// POST /api/v1/orders/{id}/complete
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/complete",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = CompleteOrderRequest,
    responses(
        (status = 200, description = "Order completed with manual delivery data"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order not in a completable state", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn complete_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CompleteOrderRequest>,
) -> ApiResult<OrderResponse> {
    request.validate().map_err(ServiceError::from)?;
    let order = state.orders.complete_order(id, request.delivery_data).await?;
    Ok(Json(ApiResponse::success(order)))
}

// POST /api/v1/orders/{id}/cancel
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order canceled"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order already completed", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderResponse> {
    let order = state.orders.cancel_order(id).await?;
    Ok(Json(ApiResponse::success(order)))
}
