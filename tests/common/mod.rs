//! Shared scaffolding for integration tests: a tempfile-backed SQLite
//! database with migrations applied, a mocked payment gateway, and the full
//! service graph wired the same way `main` wires it.
#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use digistore_api::{
    config::AppConfig,
    db,
    entities::{order, product, stock_item},
    events::{self, EventSender},
    services::payment_gateway::{
        FraudStatus, MidtransClient, PaymentNotification, TransactionStatus,
    },
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::mpsc;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct TestApp {
    pub state: AppState,
    pub gateway_server: MockServer,
    // Keeps the SQLite file alive for the lifetime of the test
    _db_file: NamedTempFile,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let db_file = NamedTempFile::new().expect("temp db file");
        let database_url = format!("sqlite://{}?mode=rwc", db_file.path().display());

        let gateway_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/snap/v1/transactions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "token": "test-session-token" })),
            )
            .mount(&gateway_server)
            .await;

        let mut cfg = AppConfig::new(database_url.clone(), "127.0.0.1", 0, "test");
        cfg.midtrans_base_url = Some(gateway_server.uri());
        customize(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("db connect");
        db::run_migrations(&pool).await.expect("migrations");

        let db_arc = Arc::new(pool);
        let (tx, rx) = mpsc::channel(64);
        let event_sender = EventSender::new(tx);
        tokio::spawn(events::process_events(rx));

        let gateway = Arc::new(MidtransClient::from_config(&cfg).expect("gateway client"));
        let state = AppState::build(db_arc, cfg, event_sender, gateway);

        Self {
            state,
            gateway_server,
            _db_file: db_file,
        }
    }

    pub async fn seed_product(
        &self,
        name: &str,
        price: Decimal,
        stock: i32,
        is_auto_delivery: bool,
        requires_delivery_data: bool,
    ) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            price: Set(price),
            stock: Set(stock),
            is_available: Set(true),
            is_auto_delivery: Set(is_auto_delivery),
            requires_delivery_data: Set(requires_delivery_data),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product")
    }

    /// Inserts stock items with strictly increasing timestamps so the claim
    /// order is deterministic.
    pub async fn seed_stock(&self, product_id: Uuid, contents: &[&str]) {
        let base = Utc::now();
        for (i, content) in contents.iter().enumerate() {
            stock_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                product_id: Set(product_id),
                content: Set(content.to_string()),
                is_used: Set(false),
                claimed_by_order_id: Set(None),
                created_at: Set(base + Duration::milliseconds(i as i64)),
            }
            .insert(&*self.state.db)
            .await
            .expect("seed stock item");
        }
    }

    /// Inserts a pending/unpaid order directly, as the checkout initiator
    /// would, without touching the gateway.
    pub async fn seed_pending_order(
        &self,
        product: &product::Model,
        quantity: i32,
        expires_at: Option<DateTime<Utc>>,
    ) -> order::Model {
        let subtotal = product.price * Decimal::from(quantity);
        order::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product.id),
            quantity: Set(quantity),
            subtotal: Set(subtotal),
            admin_fee: Set(Decimal::ZERO),
            service_fee: Set(Decimal::ZERO),
            tax_amount: Set(Decimal::ZERO),
            total_price: Set(subtotal),
            status: Set(order::OrderStatus::Pending),
            payment_status: Set(order::PaymentStatus::Unpaid),
            user_email: Set("buyer@example.com".to_string()),
            customer_phone: Set("+628123456789".to_string()),
            customer_target_id: Set(Some("player-1".to_string())),
            customer_server_id: Set(None),
            delivery_data: Set(None),
            midtrans_token: Set(None),
            expires_at: Set(expires_at.or_else(|| Some(Utc::now() + Duration::minutes(30)))),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed order")
    }

    pub async fn reload_order(&self, order_id: Uuid) -> order::Model {
        order::Entity::find_by_id(order_id)
            .one(&*self.state.db)
            .await
            .expect("query order")
            .expect("order exists")
    }

    pub async fn reload_product(&self, product_id: Uuid) -> product::Model {
        product::Entity::find_by_id(product_id)
            .one(&*self.state.db)
            .await
            .expect("query product")
            .expect("product exists")
    }

    pub async fn claimed_items_for(&self, order_id: Uuid) -> Vec<stock_item::Model> {
        stock_item::Entity::find()
            .filter(stock_item::Column::ClaimedByOrderId.eq(order_id))
            .all(&*self.state.db)
            .await
            .expect("query claimed items")
    }

    pub async fn unclaimed_count(&self, product_id: Uuid) -> u64 {
        self.state
            .inventory
            .available_count(product_id)
            .await
            .expect("available count")
    }
}

pub fn settlement(order_id: Uuid) -> PaymentNotification {
    notification(order_id, TransactionStatus::Settlement, None)
}

pub fn notification(
    order_id: Uuid,
    transaction_status: TransactionStatus,
    fraud_status: Option<FraudStatus>,
) -> PaymentNotification {
    PaymentNotification {
        order_id: order_id.to_string(),
        transaction_status,
        fraud_status,
    }
}
