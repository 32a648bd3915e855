//! Order status state machine.
//!
//! Pure transition rules live at module level so UIs can ask for the
//! allowed next actions without touching storage; `OrderStatusService`
//! applies a validated transition to a persisted order.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, EntityTrait, TransactionTrait};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

use crate::{
    entities::order::{ActiveModel as OrderActiveModel, Entity as OrderEntity, Model as OrderModel},
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Preparing,
    Ready,
    Served,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
    Upi,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Served => "served",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Statuses counted as "active" for staff dashboards.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Upi => "upi",
        }
    }
}

/// Outgoing edges of the status graph. Terminal statuses have none.
pub fn allowed_next(from: OrderStatus) -> &'static [OrderStatus] {
    match from {
        OrderStatus::Pending => &[OrderStatus::Preparing, OrderStatus::Cancelled],
        OrderStatus::Preparing => &[OrderStatus::Ready, OrderStatus::Cancelled],
        OrderStatus::Ready => &[OrderStatus::Served, OrderStatus::Cancelled],
        OrderStatus::Served => &[OrderStatus::Completed, OrderStatus::Cancelled],
        OrderStatus::Completed | OrderStatus::Cancelled => &[],
    }
}

/// A transition is valid iff it is a self-transition (idempotent no-op)
/// or an edge of the graph.
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    from == to || allowed_next(from).contains(&to)
}

/// Parse a stored status string, treating an unparseable value as data
/// corruption rather than caller error.
pub fn parse_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    raw.parse::<OrderStatus>().map_err(|_| {
        ServiceError::InternalError(format!("order carries unknown status '{raw}'"))
    })
}

#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderStatusService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Applies a validated status transition and returns the updated order.
    ///
    /// Self-transitions return the order unchanged. Completing an order
    /// requires the payment to be settled; completing a cash order records
    /// the cash as collected in the same update.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_status(
        &self,
        order_id: i64,
        new_status: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        let db = &*self.db;
        let txn = db.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let current = parse_status(&order.status)?;

        if current == new_status {
            info!(status = %current, "Status unchanged; idempotent no-op");
            return Ok(order);
        }

        if !is_valid_transition(current, new_status) {
            return Err(ServiceError::InvalidTransition {
                from: current,
                to: new_status,
                allowed: allowed_next(current),
            });
        }

        let mut settle_cash = false;
        if new_status == OrderStatus::Completed {
            let paid = order.payment_status == PaymentStatus::Paid.as_str();
            let cash = order.payment_method == PaymentMethod::Cash.as_str();
            if !paid && cash {
                settle_cash = true;
            } else if !paid {
                return Err(ServiceError::ValidationError(
                    "Order cannot be completed until payment is settled".to_string(),
                ));
            }
        }

        let mut active: OrderActiveModel = order.into();
        active.status = Set(new_status.as_str().to_string());
        if settle_cash {
            active.payment_status = Set(PaymentStatus::Paid.as_str().to_string());
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        info!(
            order_id,
            old_status = %current,
            new_status = %new_status,
            "Order status updated"
        );
        metrics::counter!("dineline_order_status_transitions", 1);

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::OrderStatusChanged {
                    order_id,
                    restaurant_id: updated.restaurant_id,
                    old_status: current.as_str().to_string(),
                    new_status: new_status.as_str().to_string(),
                })
                .await
            {
                warn!(error = %e, order_id, "Failed to send status changed event");
            }
        }

        Ok(updated)
    }
}
