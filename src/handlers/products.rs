use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct RestockRequest {
    /// One fulfillment payload per line item (license key, voucher code, ...)
    pub items: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StockLevelResponse {
    pub product_id: Uuid,
    /// Unclaimed items currently available for fulfillment
    pub available: u64,
}

// POST /api/v1/products/{id}/stock
#[utoipa::path(
    post,
    path = "/api/v1/products/{id}/stock",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = RestockRequest,
    responses(
        (status = 200, description = "Stock items added"),
        (status = 400, description = "Empty or blank items", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn restock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RestockRequest>,
) -> ApiResult<StockLevelResponse> {
    state.inventory.restock(id, request.items).await?;
    let available = state.inventory.available_count(id).await?;
    Ok(Json(ApiResponse::success(StockLevelResponse {
        product_id: id,
        available,
    })))
}

// GET /api/v1/products/{id}/stock
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}/stock",
    params(("id" = Uuid, Path, description = "Product id")),
    responses((status = 200, description = "Unclaimed item count")),
    tag = "Products"
)]
pub async fn stock_level(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StockLevelResponse> {
    let available = state.inventory.available_count(id).await?;
    Ok(Json(ApiResponse::success(StockLevelResponse {
        product_id: id,
        available,
    })))
}
