//! Split-payment gateway integration.
//!
//! The engine depends on the `PaymentGateway` trait; the production
//! implementation is the reqwest-backed client in [`http`]. Tests swap in
//! an in-memory fake.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

pub mod http;

pub use http::HttpPaymentGateway;

/// Vendor identity requested from the gateway's marketplace model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorDetails {
    pub vendor_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub bank_account_number: Option<String>,
    pub bank_ifsc: Option<String>,
    /// 1 = next business day, 2 = instant.
    pub settlement_schedule: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorProvisionOutcome {
    Created,
    /// The gateway already knows this vendor; treated as success.
    AlreadyExists,
}

/// A single split instruction. The platform commission is implicitly
/// retained by the main account; it is not an explicit leg.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitLeg {
    pub vendor_id: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrderRequest {
    /// Correlation id we issue, format `CF_ORD_{order_id}_{epoch_secs}`.
    pub gateway_order_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub customer_id: String,
    pub customer_phone: String,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub splits: Vec<SplitLeg>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrderSession {
    pub session_id: String,
    pub payment_link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundOutcome {
    pub refund_id: String,
    pub status: String,
}

/// Seam to the external split-payment gateway. Calls are bounded by a
/// short timeout and are never retried automatically within a request.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_vendor(
        &self,
        vendor: &VendorDetails,
    ) -> Result<VendorProvisionOutcome, ServiceError>;

    async fn create_split_order(
        &self,
        request: &GatewayOrderRequest,
    ) -> Result<GatewayOrderSession, ServiceError>;

    /// Passthrough read of the gateway's view of an order.
    async fn order_status(&self, gateway_order_id: &str)
        -> Result<serde_json::Value, ServiceError>;

    /// Refund against the gateway reference stored on the order.
    async fn refund(
        &self,
        transaction_id: &str,
        amount: Decimal,
        reason: Option<&str>,
    ) -> Result<RefundOutcome, ServiceError>;

    /// Passthrough read of a vendor's settlement history.
    async fn vendor_settlements(
        &self,
        vendor_id: &str,
        limit: u32,
    ) -> Result<serde_json::Value, ServiceError>;
}
