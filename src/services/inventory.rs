//! Menu-item stock accounting for order intake.
//!
//! The decrement is a conditional UPDATE so that concurrent intakes can
//! never drive stock negative: whichever request loses the race observes
//! zero affected rows and is rejected.

use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::debug;

use crate::{
    entities::menu_item::{self, Entity as MenuItemEntity, Model as MenuItemModel},
    errors::ServiceError,
};

/// A successfully reserved order line.
#[derive(Debug, Clone)]
pub struct ReservedLine {
    pub item: MenuItemModel,
    pub quantity: i32,
    /// Stock remaining after the decrement.
    pub remaining: i32,
}

impl ReservedLine {
    pub fn is_low_stock(&self) -> bool {
        self.remaining < self.item.low_stock_threshold
    }
}

/// Atomically reserves `quantity` units of a menu item within the
/// caller's transaction.
pub async fn reserve_menu_item<C: ConnectionTrait>(
    conn: &C,
    restaurant_id: i64,
    menu_item_id: i64,
    quantity: i32,
) -> Result<ReservedLine, ServiceError> {
    let item = MenuItemEntity::find_by_id(menu_item_id)
        .filter(menu_item::Column::RestaurantId.eq(restaurant_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Menu item {} not found", menu_item_id)))?;

    if !item.is_available {
        return Err(ServiceError::ValidationError(format!(
            "'{}' is currently unavailable",
            item.name
        )));
    }

    let result = MenuItemEntity::update_many()
        .col_expr(
            menu_item::Column::InventoryCount,
            Expr::col(menu_item::Column::InventoryCount).sub(quantity),
        )
        .filter(menu_item::Column::Id.eq(menu_item_id))
        .filter(menu_item::Column::IsAvailable.eq(true))
        .filter(menu_item::Column::InventoryCount.gte(quantity))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        // Lost the race or never had the stock; re-read for the message.
        let available = MenuItemEntity::find_by_id(menu_item_id)
            .one(conn)
            .await?
            .map(|m| m.inventory_count)
            .unwrap_or(0);
        return Err(ServiceError::ValidationError(format!(
            "Insufficient stock for '{}': requested {}, available {}",
            item.name, quantity, available
        )));
    }

    let remaining = MenuItemEntity::find_by_id(menu_item_id)
        .one(conn)
        .await?
        .map(|m| m.inventory_count)
        .unwrap_or(item.inventory_count - quantity);

    debug!(menu_item_id, quantity, remaining, "Reserved menu item stock");

    Ok(ReservedLine {
        item,
        quantity,
        remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(threshold: i32) -> MenuItemModel {
        MenuItemModel {
            id: 1,
            restaurant_id: 1,
            name: "Masala Dosa".to_string(),
            price: rust_decimal_macros::dec!(100.00),
            is_available: true,
            inventory_count: 10,
            low_stock_threshold: threshold,
        }
    }

    #[test]
    fn low_stock_is_strictly_below_threshold() {
        let line = ReservedLine {
            item: item(5),
            quantity: 1,
            remaining: 5,
        };
        assert!(!line.is_low_stock());

        let line = ReservedLine {
            item: item(5),
            quantity: 1,
            remaining: 4,
        };
        assert!(line.is_low_stock());
    }
}
