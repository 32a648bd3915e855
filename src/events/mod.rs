use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

pub mod broadcaster;

/// Domain events emitted by the orchestration engine. Consumed by the
/// in-process audit loop; realtime fan-out goes through the broadcaster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: i64,
        restaurant_id: i64,
    },
    OrderStatusChanged {
        order_id: i64,
        restaurant_id: i64,
        old_status: String,
        new_status: String,
    },
    PaymentSucceeded {
        order_id: i64,
    },
    PaymentFailed {
        order_id: i64,
    },
    PaymentRefunded {
        order_id: i64,
    },
    LowStock {
        restaurant_id: i64,
        menu_item_id: i64,
        remaining: i32,
    },
    RevenueMilestone {
        restaurant_id: i64,
        total: Decimal,
    },
    SettlementRecorded {
        event_type: String,
        vendor_id: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously. Failure to enqueue is reported, not
    /// fatal; the event stream is advisory.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Drains the event channel, logging and counting each event. Runs for
/// the lifetime of the process.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated {
                order_id,
                restaurant_id,
            } => {
                info!(order_id, restaurant_id, "Order created");
                metrics::counter!("dineline_orders_created", 1);
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
                ..
            } => {
                info!(order_id, %old_status, %new_status, "Order status changed");
            }
            Event::PaymentSucceeded { order_id } => {
                info!(order_id, "Payment succeeded");
                metrics::counter!("dineline_payments_succeeded", 1);
            }
            Event::PaymentFailed { order_id } => {
                warn!(order_id, "Payment failed");
                metrics::counter!("dineline_payments_failed", 1);
            }
            Event::PaymentRefunded { order_id } => {
                info!(order_id, "Payment refunded");
            }
            Event::LowStock {
                restaurant_id,
                menu_item_id,
                remaining,
            } => {
                warn!(restaurant_id, menu_item_id, remaining, "Low stock");
            }
            Event::RevenueMilestone {
                restaurant_id,
                total,
            } => {
                info!(restaurant_id, %total, "Revenue milestone crossed");
            }
            Event::SettlementRecorded {
                event_type,
                vendor_id,
            } => {
                info!(%event_type, ?vendor_id, "Settlement event recorded");
            }
        }
    }
}
