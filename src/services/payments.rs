//! Split-settlement payment orchestration and webhook reconciliation.
//!
//! Webhook delivery may be duplicated, delayed, or out of order relative
//! to staff actions, so every mutation here is an idempotent merge against
//! current order state, never a blind overwrite.

use std::sync::Arc;

use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::round2,
    config::GatewayConfig,
    entities::{
        order::{self, ActiveModel as OrderActiveModel, Entity as OrderEntity, Model as OrderModel},
        settlement_event,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::{GatewayOrderRequest, PaymentGateway, SplitLeg, VendorDetails},
    services::order_status::{OrderStatus, PaymentMethod, PaymentStatus},
    services::restaurants::RestaurantService,
};

type HmacSha256 = Hmac<Sha256>;

pub const PAYMENT_SUCCESS_WEBHOOK: &str = "PAYMENT_SUCCESS_WEBHOOK";
pub const PAYMENT_FAILED_WEBHOOK: &str = "PAYMENT_FAILED_WEBHOOK";
pub const SETTLEMENT_PROCESSED: &str = "SETTLEMENT_PROCESSED";
pub const VENDOR_PAYOUT_UPDATE: &str = "VENDOR_PAYOUT_UPDATE";

/// Computes the webhook signature: HMAC-SHA256 over `timestamp + body`,
/// base64-encoded. Exposed so tests and tooling can sign payloads.
pub fn sign_webhook_payload(secret: &str, timestamp: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(timestamp.as_bytes());
    mac.update(body);
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

pub fn verify_webhook_signature(
    secret: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
) -> bool {
    let expected = sign_webhook_payload(secret, timestamp, body);
    constant_time_eq(&expected, signature)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// Gateway callback envelope: `{type, data}`.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Deserialize)]
struct WebhookOrderRef {
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct WebhookPaymentRef {
    #[serde(alias = "cf_payment_id")]
    payment_id: String,
    #[serde(default)]
    payment_group: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentWebhookData {
    order: WebhookOrderRef,
    #[serde(default)]
    payment: Option<WebhookPaymentRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    pub order_id: i64,
    pub restaurant_id: i64,
    pub amount: Decimal,
    #[validate(length(min = 1, message = "Customer phone is required"))]
    pub customer_phone: String,
    pub customer_name: Option<String>,
    #[validate(email(message = "Customer email must be a valid email address"))]
    pub customer_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSessionResponse {
    pub order_id: i64,
    pub session_id: String,
    pub payment_link: String,
    pub platform_commission: Decimal,
    pub vendor_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    pub order_id: i64,
    pub amount: Decimal,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefundResponse {
    pub order_id: i64,
    pub refund_id: String,
    pub status: String,
}

#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    restaurants: RestaurantService,
    gateway: Arc<dyn PaymentGateway>,
    config: GatewayConfig,
    event_sender: Option<Arc<EventSender>>,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        restaurants: RestaurantService,
        gateway: Arc<dyn PaymentGateway>,
        config: GatewayConfig,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            restaurants,
            gateway,
            config,
            event_sender,
        }
    }

    /// Returns the restaurant's gateway vendor id, provisioning it on
    /// first use. The id is deterministic, so a vendor the gateway
    /// already knows is adopted rather than treated as a failure.
    #[instrument(skip(self))]
    pub async fn ensure_vendor(&self, restaurant_id: i64) -> Result<String, ServiceError> {
        let restaurant = self
            .restaurants
            .find_by_id(restaurant_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Restaurant {} not found", restaurant_id))
            })?;

        if let Some(vendor_id) = restaurant.vendor_id.clone() {
            return Ok(vendor_id);
        }

        let vendor_id = format!("VENDOR_{}", restaurant.id);
        let details = VendorDetails {
            vendor_id: vendor_id.clone(),
            name: restaurant.name.clone(),
            email: restaurant.contact_email.clone(),
            phone: restaurant.contact_phone.clone(),
            bank_account_number: restaurant.bank_account_number.clone(),
            bank_ifsc: restaurant.bank_ifsc.clone(),
            settlement_schedule: self.config.settlement_schedule,
        };

        let outcome = self.gateway.create_vendor(&details).await?;
        info!(restaurant_id, %vendor_id, ?outcome, "Vendor provisioned");

        self.restaurants.set_vendor_id(restaurant, &vendor_id).await?;
        Ok(vendor_id)
    }

    /// Creates a split-settlement payment session for an order.
    #[instrument(skip(self, request), fields(order_id = request.order_id, amount = %request.amount))]
    pub async fn initiate_payment(
        &self,
        request: InitiatePaymentRequest,
    ) -> Result<PaymentSessionResponse, ServiceError> {
        request.validate()?;

        if request.amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Payment amount must be greater than zero".to_string(),
            ));
        }

        let order = OrderEntity::find_by_id(request.order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} not found", request.order_id))
            })?;

        if order.restaurant_id != request.restaurant_id {
            return Err(ServiceError::ValidationError(
                "Order does not belong to this restaurant".to_string(),
            ));
        }

        if order.payment_status == PaymentStatus::Paid.as_str() {
            return Err(ServiceError::ValidationError(
                "Order is already paid".to_string(),
            ));
        }

        if request.amount != order.total_amount {
            warn!(
                order_id = order.id,
                requested = %request.amount,
                order_total = %order.total_amount,
                "Payment amount differs from order total"
            );
        }

        let vendor_id = self.ensure_vendor(request.restaurant_id).await?;

        let platform_commission = round2(request.amount * self.config.commission_rate);
        let vendor_amount = round2(request.amount - platform_commission);

        let gateway_order_id = format!("CF_ORD_{}_{}", order.id, Utc::now().timestamp());

        let session = self
            .gateway
            .create_split_order(&GatewayOrderRequest {
                gateway_order_id: gateway_order_id.clone(),
                amount: request.amount,
                currency: "INR".to_string(),
                customer_id: format!("CUST_{}", order.id),
                customer_phone: request.customer_phone.clone(),
                customer_name: request.customer_name.clone(),
                customer_email: request.customer_email.clone(),
                splits: vec![SplitLeg {
                    vendor_id,
                    amount: vendor_amount,
                }],
            })
            .await?;

        let order_id = order.id;
        let mut active: OrderActiveModel = order.into();
        active.gateway_order_id = Set(Some(gateway_order_id.clone()));
        active.transaction_id = Set(Some(gateway_order_id));
        active.payment_status = Set(PaymentStatus::Pending.as_str().to_string());
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        metrics::counter!("dineline_payment_sessions_created", 1);

        Ok(PaymentSessionResponse {
            order_id,
            session_id: session.session_id,
            payment_link: session.payment_link,
            platform_commission,
            vendor_amount,
        })
    }

    /// Applies a verified webhook. Returns the mutated order (for
    /// realtime fan-out) when the callback changed anything.
    #[instrument(skip(self, envelope), fields(event_type = %envelope.event_type))]
    pub async fn handle_webhook(
        &self,
        envelope: WebhookEnvelope,
    ) -> Result<Option<OrderModel>, ServiceError> {
        match envelope.event_type.as_str() {
            PAYMENT_SUCCESS_WEBHOOK => self.apply_payment_success(envelope.data).await,
            PAYMENT_FAILED_WEBHOOK => self.apply_payment_failure(envelope.data).await,
            SETTLEMENT_PROCESSED | VENDOR_PAYOUT_UPDATE => {
                self.record_settlement(&envelope.event_type, envelope.data)
                    .await?;
                Ok(None)
            }
            other => {
                info!(event_type = other, "Ignoring unhandled webhook type");
                Ok(None)
            }
        }
    }

    async fn apply_payment_success(&self, data: Value) -> Result<Option<OrderModel>, ServiceError> {
        let data: PaymentWebhookData = serde_json::from_value(data)
            .map_err(|e| ServiceError::ValidationError(format!("malformed webhook data: {e}")))?;

        let Some(order) = self.find_by_gateway_order_id(&data.order.order_id).await? else {
            info!(gateway_order_id = %data.order.order_id,
                "Success webhook references no known payment session; ignoring");
            return Ok(None);
        };

        if order.payment_status == PaymentStatus::Paid.as_str() {
            info!(order_id = order.id, "Payment already recorded; replay ignored");
            return Ok(None);
        }

        let order_id = order.id;
        let current_status = order.status.clone();
        let mut active: OrderActiveModel = order.into();
        active.payment_status = Set(PaymentStatus::Paid.as_str().to_string());
        if let Some(payment) = &data.payment {
            active.transaction_id = Set(Some(payment.payment_id.clone()));
            if let Some(method) = payment.payment_group.as_deref().and_then(map_payment_group) {
                active.payment_method = Set(method.as_str().to_string());
            }
        }
        // Forward-only advance: a payment confirmation may accept a
        // pending order but never rewinds progress staff already made.
        if current_status == OrderStatus::Pending.as_str() {
            active.status = Set(OrderStatus::Preparing.as_str().to_string());
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        info!(order_id, "Payment recorded as paid");
        metrics::counter!("dineline_webhook_payment_success", 1);

        if let Some(sender) = &self.event_sender {
            let _ = sender.send(Event::PaymentSucceeded { order_id }).await;
        }

        Ok(Some(updated))
    }

    async fn apply_payment_failure(&self, data: Value) -> Result<Option<OrderModel>, ServiceError> {
        let data: PaymentWebhookData = serde_json::from_value(data)
            .map_err(|e| ServiceError::ValidationError(format!("malformed webhook data: {e}")))?;

        let Some(order) = self.find_by_gateway_order_id(&data.order.order_id).await? else {
            info!(gateway_order_id = %data.order.order_id,
                "Failure webhook references no known payment session; ignoring");
            return Ok(None);
        };

        if order.payment_status == PaymentStatus::Paid.as_str() {
            warn!(order_id = order.id, "Failure webhook after successful payment; ignoring");
            return Ok(None);
        }
        if order.payment_status == PaymentStatus::Failed.as_str() {
            return Ok(None);
        }

        let order_id = order.id;
        let mut active: OrderActiveModel = order.into();
        active.payment_status = Set(PaymentStatus::Failed.as_str().to_string());
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        warn!(order_id, "Payment recorded as failed");
        metrics::counter!("dineline_webhook_payment_failed", 1);

        if let Some(sender) = &self.event_sender {
            let _ = sender.send(Event::PaymentFailed { order_id }).await;
        }

        Ok(Some(updated))
    }

    /// Persists informational settlement callbacks for reconciliation
    /// reporting. These never mutate orders.
    async fn record_settlement(&self, event_type: &str, data: Value) -> Result<(), ServiceError> {
        let vendor_id = data
            .get("vendor_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let settlement_id = data
            .get("settlement_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let amount = data
            .get("amount")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<Decimal>().ok())
            .or_else(|| {
                data.get("amount")
                    .and_then(Value::as_f64)
                    .and_then(Decimal::from_f64_retain)
            });

        settlement_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            event_type: Set(event_type.to_string()),
            vendor_id: Set(vendor_id.clone()),
            settlement_id: Set(settlement_id),
            amount: Set(amount),
            payload: Set(data.to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        info!(event_type, ?vendor_id, "Settlement event recorded");

        if let Some(sender) = &self.event_sender {
            let _ = sender
                .send(Event::SettlementRecorded {
                    event_type: event_type.to_string(),
                    vendor_id,
                })
                .await;
        }

        Ok(())
    }

    /// Refunds a settled payment through the gateway.
    #[instrument(skip(self, request), fields(order_id = request.order_id))]
    pub async fn refund(&self, request: RefundRequest) -> Result<RefundResponse, ServiceError> {
        let order = OrderEntity::find_by_id(request.order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} not found", request.order_id))
            })?;

        if order.payment_status != PaymentStatus::Paid.as_str() {
            return Err(ServiceError::ValidationError(
                "Refund not allowed: payment is not completed".to_string(),
            ));
        }

        if request.amount <= Decimal::ZERO || request.amount > order.total_amount {
            return Err(ServiceError::ValidationError(format!(
                "Refund amount must be between 0 and {}",
                order.total_amount
            )));
        }

        let transaction_id = order.transaction_id.clone().ok_or_else(|| {
            ServiceError::InternalError(format!(
                "paid order {} has no transaction reference",
                order.id
            ))
        })?;

        let outcome = self
            .gateway
            .refund(&transaction_id, request.amount, request.reason.as_deref())
            .await?;

        let order_id = order.id;
        let mut active: OrderActiveModel = order.into();
        active.payment_status = Set(PaymentStatus::Refunded.as_str().to_string());
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        info!(order_id, refund_id = %outcome.refund_id, "Refund accepted");

        if let Some(sender) = &self.event_sender {
            let _ = sender.send(Event::PaymentRefunded { order_id }).await;
        }

        Ok(RefundResponse {
            order_id,
            refund_id: outcome.refund_id,
            status: outcome.status,
        })
    }

    /// Passthrough read of the gateway's order status.
    #[instrument(skip(self))]
    pub async fn payment_status(&self, order_id: i64) -> Result<Value, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let gateway_order_id = order.gateway_order_id.ok_or_else(|| {
            ServiceError::ValidationError(format!("Order {} has no payment session", order_id))
        })?;

        self.gateway.order_status(&gateway_order_id).await
    }

    /// Passthrough read of the vendor's settlement history.
    #[instrument(skip(self))]
    pub async fn vendor_settlements(
        &self,
        restaurant_id: i64,
        limit: u32,
    ) -> Result<Value, ServiceError> {
        let restaurant = self
            .restaurants
            .find_by_id(restaurant_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Restaurant {} not found", restaurant_id))
            })?;

        let vendor_id = restaurant.vendor_id.ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "Restaurant {} has no vendor account",
                restaurant_id
            ))
        })?;

        self.gateway.vendor_settlements(&vendor_id, limit).await
    }

    async fn find_by_gateway_order_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<OrderModel>, ServiceError> {
        Ok(OrderEntity::find()
            .filter(order::Column::GatewayOrderId.eq(gateway_order_id))
            .one(&*self.db)
            .await?)
    }
}

fn map_payment_group(group: &str) -> Option<PaymentMethod> {
    match group.to_ascii_lowercase().as_str() {
        "upi" => Some(PaymentMethod::Upi),
        "card" | "credit_card" | "debit_card" => Some(PaymentMethod::Card),
        "cash" => Some(PaymentMethod::Cash),
        _ => None,
    }
}
