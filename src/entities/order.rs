use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Order entity. The id doubles as the gateway's merchant order reference,
/// so it must be unique per checkout attempt.
///
/// `total_price = subtotal + admin_fee + service_fee + tax_amount`, computed
/// once at creation and never recomputed.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub product_id: Uuid,

    pub quantity: i32,

    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub subtotal: Decimal,

    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub admin_fee: Decimal,

    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub service_fee: Decimal,

    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub tax_amount: Decimal,

    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub total_price: Decimal,

    pub status: OrderStatus,

    pub payment_status: PaymentStatus,

    #[validate(email(message = "user_email must be a valid email address"))]
    pub user_email: String,

    pub customer_phone: String,

    /// Delivery target supplied at checkout (e.g. a game account id);
    /// required only when the product demands delivery data
    #[sea_orm(nullable)]
    pub customer_target_id: Option<String>,

    #[sea_orm(nullable)]
    pub customer_server_id: Option<String>,

    /// Fulfilled item contents, newline-joined; null until delivered
    #[sea_orm(nullable)]
    pub delivery_data: Option<String>,

    /// Gateway payment session token, persisted server-side so any process
    /// restart or duplicate tab can recover the session
    #[sea_orm(nullable)]
    pub midtrans_token: Option<String>,

    /// Payment deadline; set only while pending/unpaid
    #[sea_orm(nullable)]
    pub expires_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
    #[sea_orm(has_many = "super::stock_item::Entity")]
    StockItems,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::stock_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Order lifecycle. `Completed` and `Canceled` are terminal and never revert.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "canceled")]
    Canceled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Canceled)
    }
}

/// Gateway payment lifecycle, normalized for persistence. Transient
/// `challenge`/`failed` gateway signals map to `Unpaid`/`Expired` before
/// anything is written.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "unpaid")]
    Unpaid,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "expired")]
    Expired,
}
