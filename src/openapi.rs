use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "digistore API",
        version = "0.1.0",
        description = "Storefront backend for digital goods: checkout pricing, \
payment-gateway reconciliation, and exactly-once fulfillment of single-use \
stock items (license keys, voucher codes)."
    ),
    paths(
        crate::handlers::orders::checkout,
        crate::handlers::orders::get_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::complete_order,
        crate::handlers::orders::cancel_order,
        crate::handlers::products::restock,
        crate::handlers::products::stock_level,
        crate::handlers::payment_webhooks::payment_webhook,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::services::orders::CheckoutRequest,
        crate::services::orders::OrderResponse,
        crate::services::orders::OrderListResponse,
        crate::handlers::orders::CompleteOrderRequest,
        crate::handlers::products::RestockRequest,
        crate::handlers::products::StockLevelResponse,
    )),
    tags(
        (name = "Orders", description = "Checkout and order lifecycle"),
        (name = "Products", description = "Fulfillment stock management"),
        (name = "Payments", description = "Payment gateway callbacks")
    )
)]
pub struct ApiDoc;

/// Swagger UI router serving the generated document.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}
