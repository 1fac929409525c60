use crate::{
    entities::{
        order::{self, OrderStatus, PaymentStatus},
        product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::inventory::{ClaimOutcome, InventoryService},
    services::payment_gateway::{FraudStatus, PaymentNotification, TransactionStatus},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// What a gateway notification asks of the order, after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Payment confirmed; drive fulfillment
    Confirmed,
    /// Payment held for fraud review; order stays pending/unpaid
    Held,
    /// Payment canceled, denied or expired
    Failed,
    /// Signal carries no state change (pending, unrecognized, ...)
    NoChange,
}

/// Maps a gateway notification to a disposition. Pure function, no side
/// effects; every branch is explicit so unrecognized statuses cannot slide
/// into a payment confirmation.
pub fn map_notification(
    status: TransactionStatus,
    fraud: Option<FraudStatus>,
) -> Disposition {
    match status {
        TransactionStatus::Capture | TransactionStatus::Settlement => match fraud {
            Some(FraudStatus::Accept) | None => Disposition::Confirmed,
            // A challenged or denied capture is not money until the gateway
            // says so with a follow-up notification
            Some(FraudStatus::Challenge)
            | Some(FraudStatus::Deny)
            | Some(FraudStatus::Unrecognized) => Disposition::Held,
        },
        TransactionStatus::Cancel | TransactionStatus::Deny | TransactionStatus::Expire => {
            Disposition::Failed
        }
        TransactionStatus::Pending
        | TransactionStatus::Authorize
        | TransactionStatus::Refund
        | TransactionStatus::Unrecognized => Disposition::NoChange,
    }
}

/// Final outcome of processing one notification. Every variant is a handled
/// result answered with 200 to the gateway; hard failures surface as
/// `ServiceError` instead so the gateway retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Items claimed and order completed in one transaction
    Fulfilled,
    /// Paid, but not enough stock; order left processing for later follow-up
    AwaitingFulfillment,
    /// Paid; manual product awaits an admin to supply delivery data
    MarkedProcessing,
    /// Fraud review pending; nothing persisted
    PaymentHeld,
    /// Order canceled (payment canceled/denied/expired)
    Canceled,
    /// Signal could not change the order's current state; idempotent no-op
    NoOp,
    /// Notification carried no actionable status
    NoChange,
}

/// Drives the order state machine from asynchronous gateway notifications.
///
/// Safe to invoke concurrently and repeatedly for the same order: every
/// transition is a conditional write, and fulfillment claims items inside the
/// same transaction that completes the order.
#[derive(Clone)]
pub struct ReconciliationService {
    db: Arc<DatabaseConnection>,
    inventory: InventoryService,
    event_sender: EventSender,
}

impl ReconciliationService {
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

    /// Processes one gateway notification end to end.
    #[instrument(skip(self, notification), fields(order_id = %notification.order_id, status = ?notification.transaction_status))]
    pub async fn process_notification(
        &self,
        notification: &PaymentNotification,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let order_id = Uuid::parse_str(&notification.order_id).map_err(|_| {
            ServiceError::BadRequest(format!(
                "order_id is not a valid identifier: {}",
                notification.order_id
            ))
        })?;

        // Webhooks never create orders
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

        match map_notification(notification.transaction_status, notification.fraud_status) {
            Disposition::NoChange => {
                info!(status = ?notification.transaction_status, "notification carries no state change");
                Ok(ReconcileOutcome::NoChange)
            }
            Disposition::Held => {
                if order.status.is_terminal() {
                    return Ok(ReconcileOutcome::NoOp);
                }
                info!("payment held for fraud review; order unchanged");
                self.emit(Event::PaymentHeldForReview(order.id)).await;
                Ok(ReconcileOutcome::PaymentHeld)
            }
            Disposition::Failed => self.cancel(&order, &product).await,
            Disposition::Confirmed => self.confirm(&order, &product).await,
        }
    }

    async fn confirm(
        &self,
        order: &order::Model,
        product: &product::Model,
    ) -> Result<ReconcileOutcome, ServiceError> {
        match order.status {
            // Terminal states never revert: a late settlement after the
            // sweeper canceled the order is ignored, and re-delivered
            // settlements for a completed order change nothing
            OrderStatus::Canceled | OrderStatus::Completed => Ok(ReconcileOutcome::NoOp),
            OrderStatus::Pending | OrderStatus::Processing => {
                if product.is_auto_delivery {
                    self.fulfill(order).await
                } else {
                    match self.mark_processing(order).await? {
                        true => Ok(ReconcileOutcome::MarkedProcessing),
                        false => Ok(ReconcileOutcome::NoOp),
                    }
                }
            }
        }
    }

    /// Claims `quantity` items and completes the order as one atomic unit.
    /// A crash between the two can strand neither claimed-but-undelivered
    /// items nor a completed order without claims.
    async fn fulfill(&self, order: &order::Model) -> Result<ReconcileOutcome, ServiceError> {
        let txn = self.db.begin().await?;

        let items = match self
            .inventory
            .claim_items(&txn, order.product_id, order.id, order.quantity)
            .await?
        {
            ClaimOutcome::Insufficient { available } => {
                // Partial delivery is never acceptable: undo the short claim
                // and leave the order paid-but-undelivered
                txn.rollback().await?;

                let marked = self.mark_processing(order).await?;
                self.emit(Event::DeliveryDeferred {
                    order_id: order.id,
                    requested: order.quantity,
                    available,
                })
                .await;

                return Ok(if marked {
                    ReconcileOutcome::AwaitingFulfillment
                } else {
                    ReconcileOutcome::NoOp
                });
            }
            ClaimOutcome::Claimed(items) => items,
        };

        let delivery_data = items
            .iter()
            .map(|item| item.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        // Keep the counter equal to the unclaimed item count
        if !self
            .inventory
            .decrement_stock(&txn, order.product_id, order.quantity)
            .await?
        {
            warn!(product_id = %order.product_id, "stock counter drifted below claimed item count");
        }

        let result = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Completed))
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(PaymentStatus::Paid),
            )
            .col_expr(
                order::Column::DeliveryData,
                Expr::value(Some(delivery_data)),
            )
            .col_expr(
                order::Column::ExpiresAt,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(order::Column::Id.eq(order.id))
            .filter(
                order::Column::Status
                    .is_in([OrderStatus::Pending, OrderStatus::Processing]),
            )
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            // A concurrent invocation completed (or the sweeper canceled)
            // this order first; release our claims
            txn.rollback().await?;
            return Ok(ReconcileOutcome::NoOp);
        }

        txn.commit().await?;

        if order.status == OrderStatus::Pending {
            self.emit(Event::OrderPaid(order.id)).await;
        }
        self.emit(Event::OrderCompleted(order.id)).await;
        info!(order_id = %order.id, "order fulfilled");

        Ok(ReconcileOutcome::Fulfilled)
    }

    /// Conditionally moves the order to processing/paid. Returns whether the
    /// write changed anything.
    async fn mark_processing(&self, order: &order::Model) -> Result<bool, ServiceError> {
        let result = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Processing))
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(PaymentStatus::Paid),
            )
            .col_expr(
                order::Column::ExpiresAt,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(order::Column::Id.eq(order.id))
            .filter(
                order::Column::Status
                    .is_in([OrderStatus::Pending, OrderStatus::Processing]),
            )
            .exec(&*self.db)
            .await?;

        let changed = result.rows_affected == 1;
        if changed && order.status == OrderStatus::Pending {
            self.emit(Event::OrderPaid(order.id)).await;
        }
        Ok(changed)
    }

    /// Conditional cancel: only a still-pending order can be canceled by a
    /// failed payment, so a sweep/webhook race has exactly one winner and
    /// stock is released exactly once.
    async fn cancel(
        &self,
        order: &order::Model,
        product: &product::Model,
    ) -> Result<ReconcileOutcome, ServiceError> {
        if order.status.is_terminal() {
            return Ok(ReconcileOutcome::NoOp);
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
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(ReconcileOutcome::NoOp);
        }

        // Manual products had their counter decremented at checkout; that is
        // the only reservation a failed payment can release
        if !product.is_auto_delivery {
            self.inventory
                .restore_stock(&txn, product.id, order.quantity)
                .await?;
        }

        txn.commit().await?;

        self.emit(Event::OrderCanceled(order.id)).await;
        info!(order_id = %order.id, "order canceled after failed payment");

        Ok(ReconcileOutcome::Canceled)
    }

    async fn emit(&self, event: Event) {
        if let Err(e) = self.event_sender.send(event).await {
            warn!(error = %e, "failed to send event");
        }
    }
}
