use crate::{
    entities::{product, stock_item},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, PaginatorTrait,
    QueryFilter, Set, Statement, TransactionTrait,
    sea_query::Expr,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// One row returned by the claim primitive.
#[derive(Debug, Clone)]
pub struct ClaimedItem {
    pub id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Result of an atomic claim attempt.
#[derive(Debug)]
pub enum ClaimOutcome {
    Claimed(Vec<ClaimedItem>),
    /// Fewer than the requested number of unclaimed items exist. The rows
    /// touched so far belong to the caller's transaction and MUST be rolled
    /// back; partial claims never persist.
    Insufficient {
        available: u64,
    },
}

/// Service owning every mutation of the stock-item set and the product stock
/// counter. No other code path may mark items used.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Atomically claims exactly `quantity` unclaimed items of a product for
    /// an order, oldest first.
    ///
    /// This is a single conditional statement (row-locked on Postgres), never
    /// select-then-update across round-trips: two concurrent claims can never
    /// take the same item. Must be called inside a transaction that also
    /// writes the order's completion, so a crash cannot strand claimed items
    /// without a completed order.
    pub async fn claim_items<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        order_id: Uuid,
        quantity: i32,
    ) -> Result<ClaimOutcome, ServiceError> {
        let stmt = match conn.get_database_backend() {
            DbBackend::Postgres => Statement::from_sql_and_values(
                DbBackend::Postgres,
                r#"
                WITH picked AS (
                    SELECT id FROM stock_items
                    WHERE product_id = $1 AND is_used = FALSE
                    ORDER BY created_at ASC, id ASC
                    FOR UPDATE SKIP LOCKED
                    LIMIT $2
                )
                UPDATE stock_items s
                SET is_used = TRUE, claimed_by_order_id = $3
                FROM picked
                WHERE s.id = picked.id
                RETURNING s.id, s.content, s.created_at
                "#,
                [
                    product_id.into(),
                    i64::from(quantity).into(),
                    order_id.into(),
                ],
            ),
            DbBackend::Sqlite => Statement::from_sql_and_values(
                DbBackend::Sqlite,
                r#"
                UPDATE stock_items
                SET is_used = TRUE, claimed_by_order_id = ?
                WHERE id IN (
                    SELECT id FROM stock_items
                    WHERE product_id = ? AND is_used = FALSE
                    ORDER BY created_at ASC, id ASC
                    LIMIT ?
                )
                RETURNING id, content, created_at
                "#,
                [
                    order_id.into(),
                    product_id.into(),
                    i64::from(quantity).into(),
                ],
            ),
            other => {
                return Err(ServiceError::InternalError(format!(
                    "unsupported database backend for inventory claim: {:?}",
                    other
                )))
            }
        };

        let rows = conn.query_all(stmt).await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(ClaimedItem {
                id: row.try_get("", "id")?,
                content: row.try_get("", "content")?,
                created_at: row.try_get("", "created_at")?,
            });
        }

        if (items.len() as i64) < i64::from(quantity) {
            return Ok(ClaimOutcome::Insufficient {
                available: items.len() as u64,
            });
        }

        // RETURNING order is backend-dependent; re-establish claim order
        items.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));

        Ok(ClaimOutcome::Claimed(items))
    }

    /// Conditionally decrements a product's stock counter in one statement
    /// (`stock = stock - qty ... WHERE stock >= qty`). Returns false when the
    /// guard fails, leaving the counter untouched.
    pub async fn decrement_stock<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<bool, ServiceError> {
        let result = product::Entity::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(quantity),
            )
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::Stock.gte(quantity))
            .exec(conn)
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// Restores a previously decremented stock counter (expiry or cancel of a
    /// manual-delivery order).
    pub async fn restore_stock<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        product::Entity::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).add(quantity),
            )
            .filter(product::Column::Id.eq(product_id))
            .exec(conn)
            .await?;

        Ok(())
    }

    /// Number of unclaimed items currently backing a product.
    pub async fn available_count(&self, product_id: Uuid) -> Result<u64, ServiceError> {
        let count = stock_item::Entity::find()
            .filter(stock_item::Column::ProductId.eq(product_id))
            .filter(stock_item::Column::IsUsed.eq(false))
            .count(&*self.db)
            .await?;

        Ok(count)
    }

    /// Bulk-inserts fulfillment items for an auto-delivery product and bumps
    /// the stock counter in the same transaction, keeping the counter equal
    /// to the unclaimed item count.
    #[instrument(skip(self, items), fields(product_id = %product_id, count = items.len()))]
    pub async fn restock(
        &self,
        product_id: Uuid,
        items: Vec<String>,
    ) -> Result<usize, ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::ValidationError(
                "restock requires at least one item".to_string(),
            ));
        }
        if items.iter().any(|content| content.trim().is_empty()) {
            return Err(ServiceError::ValidationError(
                "restock items must not be blank".to_string(),
            ));
        }

        let product = product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", product_id))
            })?;

        if !product.is_auto_delivery {
            return Err(ServiceError::InvalidOperation(
                "stock items can only be added to auto-delivery products".to_string(),
            ));
        }

        let count = items.len();
        let now = Utc::now();
        let models: Vec<stock_item::ActiveModel> = items
            .into_iter()
            .map(|content| stock_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                product_id: Set(product_id),
                content: Set(content),
                is_used: Set(false),
                claimed_by_order_id: Set(None),
                created_at: Set(now),
            })
            .collect();

        let txn = self.db.begin().await?;
        stock_item::Entity::insert_many(models).exec(&txn).await?;
        self.restore_stock(&txn, product_id, count as i32).await?;
        txn.commit().await?;

        info!(product_id = %product_id, count, "stock items added");

        if let Err(e) = self
            .event_sender
            .send(Event::StockReplenished { product_id, count })
            .await
        {
            tracing::warn!(error = %e, product_id = %product_id, "failed to send stock replenished event");
        }

        Ok(count)
    }
}
