use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "restaurants")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    #[sea_orm(unique)]
    pub slug: String,
    pub is_active: bool,
    pub tax_percentage: Decimal,
    pub contact_phone: String,
    pub contact_email: String,
    pub bank_account_number: Option<String>,
    pub bank_ifsc: Option<String>,
    /// Gateway vendor id, provisioned lazily on first payout setup.
    pub vendor_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::menu_item::Entity")]
    MenuItem,
    #[sea_orm(has_many = "super::dining_table::Entity")]
    DiningTable,
}

impl Related<super::menu_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MenuItem.def()
    }
}

impl Related<super::dining_table::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DiningTable.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
