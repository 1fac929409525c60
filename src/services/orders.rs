use crate::{
    config::{AppConfig, FeeConfig},
    entities::{
        order::{self, OrderStatus, PaymentStatus},
        product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::inventory::InventoryService,
    services::order_expiry::ExpirySweeper,
    services::payment_gateway::{
        CustomerDetails, ItemDetail, MidtransClient, SnapTransactionRequest, TransactionDetails,
    },
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Request/Response types for the order service
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    pub product_id: Uuid,

    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,

    #[validate(email(message = "A valid email address is required"))]
    pub email: String,

    #[validate(length(min = 1, message = "Phone number is required"))]
    pub phone: String,

    /// Buyer display name forwarded to the gateway's checkout page
    pub name: Option<String>,

    /// Delivery target (game account id); required for products that need it
    pub target_id: Option<String>,

    pub server_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: Option<String>,
    pub quantity: i32,
    pub subtotal: Decimal,
    pub admin_fee: Decimal,
    pub service_fee: Decimal,
    pub tax_amount: Decimal,
    pub total_price: Decimal,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub user_email: String,
    pub delivery_data: Option<String>,
    pub midtrans_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Priced order lines, computed once at creation and never recomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeBreakdown {
    pub subtotal: Decimal,
    pub admin_fee: Decimal,
    pub service_fee: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

/// Checkout fee percentages as exact decimals.
#[derive(Debug, Clone, Copy)]
pub struct FeeRates {
    pub admin_fee_percent: Decimal,
    pub service_fee_percent: Decimal,
    pub tax_percent: Decimal,
}

impl From<&FeeConfig> for FeeRates {
    fn from(cfg: &FeeConfig) -> Self {
        // Config validation guarantees finite values in [0, 100]
        Self {
            admin_fee_percent: Decimal::from_f64_retain(cfg.admin_fee_percent)
                .unwrap_or_default(),
            service_fee_percent: Decimal::from_f64_retain(cfg.service_fee_percent)
                .unwrap_or_default(),
            tax_percent: Decimal::from_f64_retain(cfg.tax_percent).unwrap_or_default(),
        }
    }
}

/// `subtotal = price * quantity`; each fee is `round(subtotal * percent /
/// 100)` to whole currency units, half away from zero; `total` is their sum.
pub fn compute_fees(price: Decimal, quantity: i32, rates: &FeeRates) -> FeeBreakdown {
    let subtotal = price * Decimal::from(quantity);
    let admin_fee = percent_of(subtotal, rates.admin_fee_percent);
    let service_fee = percent_of(subtotal, rates.service_fee_percent);
    let tax_amount = percent_of(subtotal, rates.tax_percent);
    let total = subtotal + admin_fee + service_fee + tax_amount;

    FeeBreakdown {
        subtotal,
        admin_fee,
        service_fee,
        tax_amount,
        total,
    }
}

fn percent_of(subtotal: Decimal, percent: Decimal) -> Decimal {
    (subtotal * percent / Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// Service for creating and querying orders.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    inventory: InventoryService,
    gateway: Arc<MidtransClient>,
    sweeper: ExpirySweeper,
    event_sender: EventSender,
    fee_rates: FeeRates,
    payment_window: Duration,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        inventory: InventoryService,
        gateway: Arc<MidtransClient>,
        sweeper: ExpirySweeper,
        event_sender: EventSender,
        config: &AppConfig,
    ) -> Self {
        Self {
            db,
            inventory,
            gateway,
            sweeper,
            event_sender,
            fee_rates: FeeRates::from(&config.fees),
            payment_window: Duration::minutes(config.payment_window_mins),
        }
    }

    /// Creates a priced pending order and opens a payment session for it.
    ///
    /// The order is inserted before the gateway call so a session failure
    /// leaves a pending/unpaid order for the sweeper rather than a silent
    /// orphan, and no database lock spans the network call.
    #[instrument(skip(self, request), fields(product_id = %request.product_id, quantity = request.quantity))]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<OrderResponse, ServiceError> {
        request.validate().map_err(ServiceError::from)?;

        let product = product::Entity::find_by_id(request.product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", request.product_id))
            })?;

        if !product.is_available {
            return Err(ServiceError::ValidationError(
                "Product is not available for purchase".to_string(),
            ));
        }

        let target_id = request
            .target_id
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        if product.requires_delivery_data && target_id.is_none() {
            return Err(ServiceError::ValidationError(
                "This product requires a delivery target".to_string(),
            ));
        }

        let fees = compute_fees(product.price, request.quantity, &self.fee_rates);
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let order_model = order::ActiveModel {
            id: Set(order_id),
            product_id: Set(product.id),
            quantity: Set(request.quantity),
            subtotal: Set(fees.subtotal),
            admin_fee: Set(fees.admin_fee),
            service_fee: Set(fees.service_fee),
            tax_amount: Set(fees.tax_amount),
            total_price: Set(fees.total),
            status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Unpaid),
            user_email: Set(request.email.clone()),
            customer_phone: Set(request.phone.clone()),
            customer_target_id: Set(target_id.map(str::to_string)),
            customer_server_id: Set(request.server_id.clone()),
            delivery_data: Set(None),
            midtrans_token: Set(None),
            expires_at: Set(Some(now + self.payment_window)),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        let txn = self.db.begin().await?;

        if product.is_auto_delivery {
            // Availability check only; items are claimed at fulfillment time
            let available = self.inventory.available_count(product.id).await?;
            if available < request.quantity as u64 {
                txn.rollback().await?;
                return Err(ServiceError::InsufficientStock(format!(
                    "only {} of {} requested units available",
                    available, request.quantity
                )));
            }
            order_model.insert(&txn).await?;
        } else {
            // Manual products hold their units up front; the sweeper or a
            // failed payment gives them back
            order_model.insert(&txn).await?;
            if !self
                .inventory
                .decrement_stock(&txn, product.id, request.quantity)
                .await?
            {
                txn.rollback().await?;
                return Err(ServiceError::InsufficientStock(format!(
                    "fewer than {} units in stock",
                    request.quantity
                )));
            }
        }

        txn.commit().await?;

        info!(order_id = %order_id, total = %fees.total, "order created");
        if let Err(e) = self.event_sender.send(Event::OrderCreated(order_id)).await {
            warn!(error = %e, order_id = %order_id, "failed to send order created event");
        }

        let session = self
            .gateway
            .create_transaction(&build_session_request(
                order_id, &product, &fees, &request,
            ))
            .await;

        let token = match session {
            Ok(response) => response.token,
            Err(e) => {
                // The pending order stays behind for the sweeper
                error!(order_id = %order_id, error = %e, "payment session creation failed");
                return Err(e);
            }
        };

        let updated = order::ActiveModel {
            id: Set(order_id),
            midtrans_token: Set(Some(token)),
            updated_at: Set(Some(Utc::now())),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;

        Ok(model_to_response(updated, Some(product.name)))
    }

    /// Retrieves an order with its product. Opportunistically runs the expiry
    /// check first so stale pending orders self-heal on access.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let (order, product) = self.find_with_product(order_id).await?;

        if self.sweeper.sweep_order(&order, &product).await? {
            let (order, product) = self.find_with_product(order_id).await?;
            return Ok(model_to_response(order, Some(product.name)));
        }

        Ok(model_to_response(order, Some(product.name)))
    }

    /// Lists a customer's orders, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders_by_email(
        &self,
        email: &str,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        self.list_page(Some(email), page, per_page).await
    }

    /// Lists all orders, newest first (admin view).
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        self.list_page(None, page, per_page).await
    }

    async fn list_page(
        &self,
        email: Option<&str>,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let mut query = order::Entity::find()
            .find_also_related(product::Entity)
            .order_by_desc(order::Column::CreatedAt);

        if let Some(email) = email {
            query = query.filter(order::Column::UserEmail.eq(email));
        }

        let paginator = query.paginate(&*self.db, per_page.max(1));
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page.saturating_sub(1)).await?;

        let orders = rows
            .into_iter()
            .map(|(order, product)| model_to_response(order, product.map(|p| p.name)))
            .collect();

        Ok(OrderListResponse {
            orders,
            total,
            page,
            per_page,
        })
    }

    /// Admin completion for orders auto-delivery could not serve: moves
    /// processing → completed with the supplied delivery payload. Completing
    /// an already-completed order is a no-op.
    #[instrument(skip(self, delivery_data), fields(order_id = %order_id))]
    pub async fn complete_order(
        &self,
        order_id: Uuid,
        delivery_data: String,
    ) -> Result<OrderResponse, ServiceError> {
        if delivery_data.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "delivery_data must not be empty".to_string(),
            ));
        }

        let (order, product) = self.find_with_product(order_id).await?;

        match order.status {
            OrderStatus::Completed => Ok(model_to_response(order, Some(product.name))),
            OrderStatus::Processing => {
                let result = order::Entity::update_many()
                    .col_expr(
                        order::Column::Status,
                        Expr::value(OrderStatus::Completed),
                    )
                    .col_expr(
                        order::Column::DeliveryData,
                        Expr::value(Some(delivery_data)),
                    )
                    .col_expr(
                        order::Column::UpdatedAt,
                        Expr::value(Some(Utc::now())),
                    )
                    .filter(order::Column::Id.eq(order_id))
                    .filter(order::Column::Status.eq(OrderStatus::Processing))
                    .exec(&*self.db)
                    .await?;

                if result.rows_affected == 0 {
                    return Err(ServiceError::Conflict(
                        "order left processing while completing it".to_string(),
                    ));
                }

                if let Err(e) = self.event_sender.send(Event::OrderCompleted(order_id)).await {
                    warn!(error = %e, order_id = %order_id, "failed to send order completed event");
                }

                let (order, product) = self.find_with_product(order_id).await?;
                Ok(model_to_response(order, Some(product.name)))
            }
            other => Err(ServiceError::Conflict(format!(
                "only processing orders can be completed manually (current: {:?})",
                other
            ))),
        }
    }

    /// Admin cancellation. Canceling an already-canceled order is a no-op;
    /// completed orders cannot be canceled.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn cancel_order(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let (order, product) = self.find_with_product(order_id).await?;

        match order.status {
            OrderStatus::Canceled => Ok(model_to_response(order, Some(product.name))),
            OrderStatus::Completed => Err(ServiceError::Conflict(
                "completed orders cannot be canceled".to_string(),
            )),
            OrderStatus::Pending | OrderStatus::Processing => {
                let txn = self.db.begin().await?;

                let result = order::Entity::update_many()
                    .col_expr(
                        order::Column::Status,
                        Expr::value(OrderStatus::Canceled),
                    )
                    .col_expr(
                        order::Column::ExpiresAt,
                        Expr::value(Option::<DateTime<Utc>>::None),
                    )
                    .col_expr(
                        order::Column::UpdatedAt,
                        Expr::value(Some(Utc::now())),
                    )
                    .filter(order::Column::Id.eq(order_id))
                    .filter(
                        order::Column::Status
                            .is_in([OrderStatus::Pending, OrderStatus::Processing]),
                    )
                    .exec(&txn)
                    .await?;

                if result.rows_affected == 0 {
                    txn.rollback().await?;
                    return Err(ServiceError::Conflict(
                        "order reached a terminal state while canceling it".to_string(),
                    ));
                }

                if !product.is_auto_delivery {
                    self.inventory
                        .restore_stock(&txn, product.id, order.quantity)
                        .await?;
                }

                txn.commit().await?;

                if let Err(e) = self.event_sender.send(Event::OrderCanceled(order_id)).await {
                    warn!(error = %e, order_id = %order_id, "failed to send order canceled event");
                }

                let (order, product) = self.find_with_product(order_id).await?;
                Ok(model_to_response(order, Some(product.name)))
            }
        }
    }

    async fn find_with_product(
        &self,
        order_id: Uuid,
    ) -> Result<(order::Model, product::Model), ServiceError> {
        let (order, product) = order::Entity::find_by_id(order_id)
            .find_also_related(product::Entity)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let product = product.ok_or_else(|| {
            ServiceError::InternalError(format!(
                "order {} references a missing product",
                order_id
            ))
        })?;

        Ok((order, product))
    }
}

/// Gateway session lines must reconcile to the computed total exactly, fee
/// lines included; the gateway rejects sessions whose lines disagree with
/// `gross_amount`.
fn build_session_request(
    order_id: Uuid,
    product: &product::Model,
    fees: &FeeBreakdown,
    request: &CheckoutRequest,
) -> SnapTransactionRequest {
    let mut item_details = vec![ItemDetail {
        id: product.id.to_string(),
        name: product.name.clone(),
        price: product.price,
        quantity: request.quantity,
    }];

    for (label, amount) in [
        ("Admin Fee", fees.admin_fee),
        ("Service Fee", fees.service_fee),
        ("Tax", fees.tax_amount),
    ] {
        if !amount.is_zero() {
            item_details.push(ItemDetail {
                id: label.to_ascii_lowercase().replace(' ', "-"),
                name: label.to_string(),
                price: amount,
                quantity: 1,
            });
        }
    }

    SnapTransactionRequest {
        transaction_details: TransactionDetails {
            order_id: order_id.to_string(),
            gross_amount: fees.total,
        },
        item_details,
        customer_details: CustomerDetails {
            email: request.email.clone(),
            first_name: request
                .name
                .clone()
                .unwrap_or_else(|| request.email.clone()),
            phone: request.phone.clone(),
        },
    }
}

fn model_to_response(model: order::Model, product_name: Option<String>) -> OrderResponse {
    OrderResponse {
        id: model.id,
        product_id: model.product_id,
        product_name,
        quantity: model.quantity,
        subtotal: model.subtotal,
        admin_fee: model.admin_fee,
        service_fee: model.service_fee,
        tax_amount: model.tax_amount,
        total_price: model.total_price,
        status: model.status,
        payment_status: model.payment_status,
        user_email: model.user_email,
        delivery_data: model.delivery_data,
        midtrans_token: model.midtrans_token,
        expires_at: model.expires_at,
        created_at: model.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rates(admin: Decimal, service: Decimal, tax: Decimal) -> FeeRates {
        FeeRates {
            admin_fee_percent: admin,
            service_fee_percent: service,
            tax_percent: tax,
        }
    }

    #[test]
    fn fee_arithmetic_matches_documented_example() {
        let fees = compute_fees(dec!(10000), 2, &rates(dec!(2.5), dec!(0), dec!(10)));

        assert_eq!(fees.subtotal, dec!(20000));
        assert_eq!(fees.admin_fee, dec!(500));
        assert_eq!(fees.service_fee, dec!(0));
        assert_eq!(fees.tax_amount, dec!(2000));
        assert_eq!(fees.total, dec!(22500));
    }

    #[test]
    fn fees_round_half_away_from_zero_on_boundaries() {
        // 0.05% of 25000 = 12.5, rounds up
        let fees = compute_fees(dec!(25000), 1, &rates(dec!(0.05), dec!(0), dec!(0)));
        assert_eq!(fees.admin_fee, dec!(13));
        assert_eq!(fees.total, dec!(25013));

        // 0.05% of 30003 = 15.0015, rounds down
        let fees = compute_fees(dec!(10001), 3, &rates(dec!(0.05), dec!(0), dec!(0)));
        assert_eq!(fees.subtotal, dec!(30003));
        assert_eq!(fees.admin_fee, dec!(15));
    }

    #[test]
    fn total_is_sum_of_subtotal_and_fees() {
        let fees = compute_fees(dec!(4999), 7, &rates(dec!(2.5), dec!(1.25), dec!(11)));
        assert_eq!(
            fees.total,
            fees.subtotal + fees.admin_fee + fees.service_fee + fees.tax_amount
        );
    }

    #[test]
    fn zero_rates_add_nothing() {
        let fees = compute_fees(dec!(10000), 3, &rates(dec!(0), dec!(0), dec!(0)));
        assert_eq!(fees.subtotal, dec!(30000));
        assert_eq!(fees.total, dec!(30000));
    }

    #[test]
    fn session_request_lines_reconcile_to_total() {
        let product = product::Model {
            id: Uuid::new_v4(),
            name: "100 Diamonds".to_string(),
            price: dec!(10000),
            stock: 5,
            is_available: true,
            is_auto_delivery: true,
            requires_delivery_data: true,
            created_at: Utc::now(),
        };
        let request = CheckoutRequest {
            product_id: product.id,
            quantity: 2,
            email: "buyer@example.com".to_string(),
            phone: "+628123456789".to_string(),
            name: Some("Buyer".to_string()),
            target_id: Some("player-1".to_string()),
            server_id: None,
        };
        let fees = compute_fees(product.price, 2, &rates(dec!(2.5), dec!(0), dec!(10)));

        let session = build_session_request(Uuid::new_v4(), &product, &fees, &request);

        let line_sum: Decimal = session
            .item_details
            .iter()
            .map(|line| line.price * Decimal::from(line.quantity))
            .sum();
        assert_eq!(line_sum, session.transaction_details.gross_amount);
        // Zero service fee must not appear as a line
        assert_eq!(session.item_details.len(), 3);
    }
}
