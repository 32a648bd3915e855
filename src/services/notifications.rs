//! Create-only notification sink.
//!
//! The engine only ever writes notifications (low stock, revenue
//! milestones); reading and acknowledging them is another component's
//! concern.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::notification::{self, ActiveModel as NotificationActiveModel, Entity as NotificationEntity},
    errors::ServiceError,
    services::orders::LowStockAlert,
};

pub const KIND_LOW_STOCK: &str = "low_stock";
pub const KIND_REVENUE_MILESTONE: &str = "revenue_milestone";

#[derive(Clone)]
pub struct NotificationService {
    db: Arc<DatabaseConnection>,
}

impl NotificationService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Records one low-stock notification per alerted item. Failures are
    /// logged and swallowed; notifications must never fail an order.
    #[instrument(skip(self, alerts), fields(count = alerts.len()))]
    pub async fn record_low_stock(&self, restaurant_id: i64, alerts: &[LowStockAlert]) {
        for alert in alerts {
            let model = NotificationActiveModel {
                id: Set(Uuid::new_v4()),
                restaurant_id: Set(restaurant_id),
                kind: Set(KIND_LOW_STOCK.to_string()),
                message: Set(format!(
                    "Low stock: '{}' has {} left (threshold {})",
                    alert.name, alert.remaining, alert.threshold
                )),
                menu_item_id: Set(Some(alert.menu_item_id)),
                created_at: Set(Utc::now()),
            };
            if let Err(e) = model.insert(&*self.db).await {
                warn!(restaurant_id, menu_item_id = alert.menu_item_id, error = %e,
                    "Failed to record low-stock notification");
            }
        }
    }

    /// Records the daily revenue milestone at most once per restaurant
    /// per UTC day. Returns whether a notification was created.
    #[instrument(skip(self))]
    pub async fn record_revenue_milestone(
        &self,
        restaurant_id: i64,
        today_total: Decimal,
    ) -> Result<bool, ServiceError> {
        let today_start = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always valid")
            .and_utc();

        let existing = NotificationEntity::find()
            .filter(notification::Column::RestaurantId.eq(restaurant_id))
            .filter(notification::Column::Kind.eq(KIND_REVENUE_MILESTONE))
            .filter(notification::Column::CreatedAt.gte(today_start))
            .count(&*self.db)
            .await?;

        if existing > 0 {
            return Ok(false);
        }

        let model = NotificationActiveModel {
            id: Set(Uuid::new_v4()),
            restaurant_id: Set(restaurant_id),
            kind: Set(KIND_REVENUE_MILESTONE.to_string()),
            message: Set(format!(
                "Today's revenue crossed ₹{:.2}",
                today_total
            )),
            menu_item_id: Set(None),
            created_at: Set(Utc::now()),
        };
        model.insert(&*self.db).await?;

        info!(restaurant_id, %today_total, "Revenue milestone notification created");
        Ok(true)
    }
}
