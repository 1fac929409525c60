use crate::{
    entities::{
        order::{self, OrderStatus, PaymentStatus},
        product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::inventory::InventoryService,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect,
    TransactionTrait,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

const SWEEP_BATCH_SIZE: u64 = 100;

/// Cancels orders whose payment window lapsed and releases any counter stock
/// held for them. Runs lazily on order reads and periodically in the
/// background; both paths share the same conditional write, so racing a late
/// webhook leaves exactly one winner.
#[derive(Clone)]
pub struct ExpirySweeper {
    db: Arc<DatabaseConnection>,
    inventory: InventoryService,
    event_sender: EventSender,
}

impl ExpirySweeper {
    pub fn new(
        db: Arc<DatabaseConnection>,
        inventory: InventoryService,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            inventory,
            event_sender,
        }
    }

    /// True when the order is past its payment deadline and still unpaid.
    pub fn is_expired(order: &order::Model, now: DateTime<Utc>) -> bool {
        order.status == OrderStatus::Pending
            && order.payment_status == PaymentStatus::Unpaid
            && order.expires_at.is_some_and(|deadline| deadline < now)
    }

    /// Conditionally cancels one lapsed order. Returns whether this call won
    /// the transition; re-sweeping an already-canceled order is a no-op.
    #[instrument(skip(self, order, product), fields(order_id = %order.id))]
    pub async fn sweep_order(
        &self,
        order: &order::Model,
        product: &product::Model,
    ) -> Result<bool, ServiceError> {
        if !Self::is_expired(order, Utc::now()) {
            return Ok(false);
        }

        let txn = self.db.begin().await?;

        let result = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Canceled))
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(PaymentStatus::Expired),
            )
            .col_expr(
                order::Column::ExpiresAt,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Unpaid))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            // A webhook (or another sweep) got here first
            txn.rollback().await?;
            return Ok(false);
        }

        // Manual products were decremented at checkout; give the units back
        if !product.is_auto_delivery {
            self.inventory
                .restore_stock(&txn, product.id, order.quantity)
                .await?;
        }

        txn.commit().await?;

        info!(order_id = %order.id, "pending order expired and canceled");
        if let Err(e) = self.event_sender.send(Event::OrderExpired(order.id)).await {
            tracing::warn!(error = %e, "failed to send order expired event");
        }

        Ok(true)
    }

    /// One batch of the periodic sweep. Returns the number of orders
    /// canceled.
    pub async fn sweep_batch(&self) -> Result<usize, ServiceError> {
        let lapsed: Vec<(order::Model, Option<product::Model>)> = order::Entity::find()
            .find_also_related(product::Entity)
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Unpaid))
            .filter(order::Column::ExpiresAt.lt(Utc::now()))
            .limit(SWEEP_BATCH_SIZE)
            .all(&*self.db)
            .await?;

        let mut swept = 0;
        for (order, product) in lapsed {
            let Some(product) = product else {
                error!(order_id = %order.id, "expired order references a missing product");
                continue;
            };
            if self.sweep_order(&order, &product).await? {
                swept += 1;
            }
        }

        Ok(swept)
    }

    /// Spawns the background sweep loop.
    pub fn spawn(self, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.sweep_batch().await {
                    Ok(0) => {}
                    Ok(n) => info!(count = n, "expiry sweep canceled lapsed orders"),
                    Err(e) => error!(error = %e, "expiry sweep failed"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn order_fixture(
        status: OrderStatus,
        payment_status: PaymentStatus,
        expires_at: Option<DateTime<Utc>>,
    ) -> order::Model {
        order::Model {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            quantity: 1,
            subtotal: dec!(10000),
            admin_fee: dec!(0),
            service_fee: dec!(0),
            tax_amount: dec!(0),
            total_price: dec!(10000),
            status,
            payment_status,
            user_email: "buyer@example.com".to_string(),
            customer_phone: "+628123456789".to_string(),
            customer_target_id: Some("player-1".to_string()),
            customer_server_id: None,
            delivery_data: None,
            midtrans_token: None,
            expires_at,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn lapsed_pending_unpaid_order_is_expired() {
        let now = Utc::now();
        let order = order_fixture(
            OrderStatus::Pending,
            PaymentStatus::Unpaid,
            Some(now - ChronoDuration::minutes(1)),
        );
        assert!(ExpirySweeper::is_expired(&order, now));
    }

    #[test]
    fn future_deadline_is_not_expired() {
        let now = Utc::now();
        let order = order_fixture(
            OrderStatus::Pending,
            PaymentStatus::Unpaid,
            Some(now + ChronoDuration::minutes(5)),
        );
        assert!(!ExpirySweeper::is_expired(&order, now));
    }

    #[test]
    fn paid_or_terminal_orders_never_expire() {
        let now = Utc::now();
        let lapsed = Some(now - ChronoDuration::minutes(1));

        let processing = order_fixture(OrderStatus::Processing, PaymentStatus::Paid, lapsed);
        assert!(!ExpirySweeper::is_expired(&processing, now));

        let canceled = order_fixture(OrderStatus::Canceled, PaymentStatus::Expired, None);
        assert!(!ExpirySweeper::is_expired(&canceled, now));
    }
}
