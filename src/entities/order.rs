use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub restaurant_id: i64,

    /// Unique per restaurant, format `R{restaurant_id}_{epoch_ms}_{rand3}`.
    #[validate(length(min = 1, max = 64))]
    pub order_number: String,

    pub table_id: i64,
    pub table_number: String,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    /// Role tag of whoever placed the order (customer, captain, reception).
    pub ordered_by: Option<String>,
    pub captain_id: Option<i64>,

    pub subtotal: Decimal,
    pub discount: Decimal,
    /// Snapshot of the promo code applied at intake, if any.
    pub promo_code: Option<String>,
    pub tax_percentage: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,

    pub status: String,
    pub payment_method: String,
    pub payment_status: String,
    pub transaction_id: Option<String>,
    /// Correlation id issued to the gateway at payment-session creation;
    /// webhooks resolve orders through this column.
    pub gateway_order_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
