//! Role-scoped realtime fan-out.
//!
//! Delivery is fire-and-forget, at-most-once per connected subscriber,
//! with no acknowledgement and no replay. Consumers must tolerate missed
//! events and poll as a fallback; an event is only ever a refresh trigger.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Event name delivered on order creation to the staff channels.
pub const EVENT_NEW_ORDER: &str = "new-order";
/// Event name delivered on any order mutation.
pub const EVENT_ORDER_UPDATED: &str = "order-updated";

pub fn restaurant_channel(restaurant_id: i64) -> String {
    format!("restaurant_{restaurant_id}")
}

pub fn kitchen_channel(restaurant_id: i64) -> String {
    format!("kitchen_{restaurant_id}")
}

pub fn captain_channel(restaurant_id: i64) -> String {
    format!("captain_{restaurant_id}")
}

pub fn order_channel(order_id: i64) -> String {
    format!("order_{order_id}")
}

/// Message delivered to channel subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub channel: String,
    pub event: String,
    pub payload: Value,
}

/// Transport seam for realtime delivery. Implementations must never block
/// request handling on subscriber state and must swallow delivery errors.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn publish(&self, channel: &str, event: &str, payload: Value);
}

/// Fans an order snapshot out to the role-scoped channels.
///
/// The three staff channels receive the calling context's event name; the
/// customer-facing order channel always receives `order-updated`.
pub async fn fan_out_order(
    broadcaster: &dyn Broadcaster,
    restaurant_id: i64,
    order_id: i64,
    event: &str,
    payload: Value,
) {
    let staff_channels = [
        restaurant_channel(restaurant_id),
        kitchen_channel(restaurant_id),
        captain_channel(restaurant_id),
    ];
    join_all(
        staff_channels
            .iter()
            .map(|ch| broadcaster.publish(ch, event, payload.clone())),
    )
    .await;
    broadcaster
        .publish(&order_channel(order_id), EVENT_ORDER_UPDATED, payload)
        .await;
}

/// In-process hub backed by one `tokio::sync::broadcast` channel per
/// logical channel. Subscribers that lag past the buffer lose messages,
/// which matches the at-most-once contract.
pub struct BroadcastHub {
    channels: DashMap<String, broadcast::Sender<ChannelMessage>>,
    capacity: usize,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    /// Subscribe to a channel, creating it on first use.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<ChannelMessage> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl Broadcaster for BroadcastHub {
    async fn publish(&self, channel: &str, event: &str, payload: Value) {
        let Some(sender) = self.channels.get(channel) else {
            debug!(channel, event, "No subscribers; dropping broadcast");
            return;
        };
        let message = ChannelMessage {
            channel: channel.to_string(),
            event: event.to_string(),
            payload,
        };
        // send only fails when every receiver is gone; that is fine here.
        let _ = sender.send(message);
    }
}

/// Redis pub/sub transport for multi-instance deployments. Each message
/// is published to the logical channel name as a JSON envelope.
pub struct RedisBroadcaster {
    client: Arc<redis::Client>,
}

impl RedisBroadcaster {
    pub fn new(client: Arc<redis::Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Broadcaster for RedisBroadcaster {
    async fn publish(&self, channel: &str, event: &str, payload: Value) {
        let envelope = match serde_json::to_string(&ChannelMessage {
            channel: channel.to_string(),
            event: event.to_string(),
            payload,
        }) {
            Ok(json) => json,
            Err(e) => {
                warn!(channel, error = %e, "Failed to serialize broadcast payload");
                return;
            }
        };

        let mut conn = match self.client.get_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(channel, error = %e, "Redis unavailable; dropping broadcast");
                return;
            }
        };

        let result: redis::RedisResult<()> = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(envelope)
            .query_async(&mut conn)
            .await;
        if let Err(e) = result {
            warn!(channel, error = %e, "Failed to publish broadcast");
        }
    }
}
