//! Checkout initiator tests: fee pricing, gateway session creation, stock
//! holds for manual products, and failure behavior when the gateway is down.

mod common;

use common::TestApp;
use digistore_api::entities::order::{OrderStatus, PaymentStatus};
use digistore_api::errors::ServiceError;
use digistore_api::services::orders::CheckoutRequest;
use rust_decimal_macros::dec;
use uuid::Uuid;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, ResponseTemplate};

fn decimal_field(value: &serde_json::Value) -> f64 {
    value
        .as_str()
        .expect("decimal serialized as string")
        .parse()
        .expect("decimal parses")
}

fn checkout_request(product_id: Uuid, quantity: i32) -> CheckoutRequest {
    CheckoutRequest {
        product_id,
        quantity,
        email: "buyer@example.com".to_string(),
        phone: "+628123456789".to_string(),
        name: Some("Buyer".to_string()),
        target_id: Some("player-1".to_string()),
        server_id: Some("asia-3".to_string()),
    }
}

#[tokio::test]
async fn checkout_prices_order_and_stores_session_token() {
    let app = TestApp::with_config(|cfg| {
        cfg.fees.admin_fee_percent = 2.5;
        cfg.fees.tax_percent = 10.0;
    })
    .await;
    let product = app
        .seed_product("100 Diamonds", dec!(10000), 2, true, true)
        .await;
    app.seed_stock(product.id, &["d-1", "d-2"]).await;

    let order = app
        .state
        .orders
        .checkout(checkout_request(product.id, 2))
        .await
        .expect("checkout");

    assert_eq!(order.subtotal, dec!(20000));
    assert_eq!(order.admin_fee, dec!(500));
    assert_eq!(order.service_fee, dec!(0));
    assert_eq!(order.tax_amount, dec!(2000));
    assert_eq!(order.total_price, dec!(22500));
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Unpaid);
    assert_eq!(order.midtrans_token.as_deref(), Some("test-session-token"));
    assert!(order.expires_at.is_some());
    assert_eq!(order.delivery_data, None);

    // Checkout only checks availability for auto-delivery products; claiming
    // happens at fulfillment time
    assert_eq!(app.unclaimed_count(product.id).await, 2);
}

#[tokio::test]
async fn gateway_receives_lines_reconciling_to_the_total() {
    let app = TestApp::with_config(|cfg| {
        cfg.fees.admin_fee_percent = 2.5;
        cfg.fees.tax_percent = 10.0;
    })
    .await;
    let product = app
        .seed_product("Top-up", dec!(10000), 5, true, false)
        .await;
    app.seed_stock(product.id, &["t-1", "t-2"]).await;

    app.state
        .orders
        .checkout(checkout_request(product.id, 2))
        .await
        .expect("checkout");

    let requests = app
        .gateway_server
        .received_requests()
        .await
        .expect("recorded requests");
    assert_eq!(requests.len(), 1);

    let body: serde_json::Value =
        serde_json::from_slice(&requests[0].body).expect("session payload");
    // Decimal amounts travel as strings on the wire
    let gross = decimal_field(&body["transaction_details"]["gross_amount"]);
    let line_sum: f64 = body["item_details"]
        .as_array()
        .expect("item_details")
        .iter()
        .map(|line| decimal_field(&line["price"]) * line["quantity"].as_f64().unwrap())
        .sum();
    assert_eq!(gross, line_sum);
    assert_eq!(gross, 22500.0);

    // Merchant reference is the order id
    assert!(body["transaction_details"]["order_id"].is_string());
    assert_eq!(body["customer_details"]["email"], "buyer@example.com");
}

#[tokio::test]
async fn manual_product_checkout_holds_units_up_front() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Manual", dec!(5000), 5, false, false)
        .await;

    app.state
        .orders
        .checkout(checkout_request(product.id, 3))
        .await
        .expect("checkout");
    assert_eq!(app.reload_product(product.id).await.stock, 2);

    // The remaining units cannot cover another three
    let err = app
        .state
        .orders
        .checkout(checkout_request(product.id, 3))
        .await
        .expect_err("oversell");
    assert!(matches!(err, ServiceError::InsufficientStock(_)));
    assert_eq!(app.reload_product(product.id).await.stock, 2);
}

#[tokio::test]
async fn auto_product_checkout_requires_available_items() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Thin Stock", dec!(5000), 1, true, false)
        .await;
    app.seed_stock(product.id, &["only-one"]).await;

    let err = app
        .state
        .orders
        .checkout(checkout_request(product.id, 2))
        .await
        .expect_err("not enough items");
    assert!(matches!(err, ServiceError::InsufficientStock(_)));
}

#[tokio::test]
async fn missing_delivery_target_is_a_validation_error() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Needs Target", dec!(5000), 5, true, true)
        .await;
    app.seed_stock(product.id, &["n-1"]).await;

    let mut request = checkout_request(product.id, 1);
    request.target_id = None;

    let err = app
        .state
        .orders
        .checkout(request)
        .await
        .expect_err("missing target");
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn gateway_failure_leaves_pending_order_for_the_sweeper() {
    let app = TestApp::new().await;
    // Replace the default mock with a server error
    app.gateway_server.reset().await;
    Mock::given(method("POST"))
        .and(path("/snap/v1/transactions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream boom"))
        .mount(&app.gateway_server)
        .await;

    let product = app
        .seed_product("Gateway Down", dec!(5000), 5, false, false)
        .await;

    let err = app
        .state
        .orders
        .checkout(checkout_request(product.id, 1))
        .await
        .expect_err("gateway failure");
    assert!(matches!(err, ServiceError::ExternalApiError(_)));

    // The order is not silently orphaned: it exists, pending and unpaid,
    // with its units held, awaiting the expiry sweeper
    let orders = app
        .state
        .orders
        .list_orders(1, 10)
        .await
        .expect("list orders");
    assert_eq!(orders.total, 1);
    let order = &orders.orders[0];
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Unpaid);
    assert_eq!(order.midtrans_token, None);
    assert_eq!(app.reload_product(product.id).await.stock, 4);
}

#[tokio::test]
async fn gateway_is_called_with_basic_auth() {
    let app = TestApp::new().await;
    app.gateway_server.reset().await;
    Mock::given(method("POST"))
        .and(path("/snap/v1/transactions"))
        .and(header_exists("authorization"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "token": "authed-token" })),
        )
        .expect(1)
        .mount(&app.gateway_server)
        .await;

    let product = app
        .seed_product("Authed", dec!(5000), 5, false, false)
        .await;

    let order = app
        .state
        .orders
        .checkout(checkout_request(product.id, 1))
        .await
        .expect("checkout");
    assert_eq!(order.midtrans_token.as_deref(), Some("authed-token"));
}
