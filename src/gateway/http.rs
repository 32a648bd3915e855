use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::config::GatewayConfig;
use crate::errors::ServiceError;

use super::{
    GatewayOrderRequest, GatewayOrderSession, PaymentGateway, RefundOutcome, VendorDetails,
    VendorProvisionOutcome,
};

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct CreateOrderBody {
    payment_session_id: String,
    #[serde(default)]
    payment_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefundBody {
    refund_id: String,
    refund_status: String,
}

/// reqwest-backed gateway client. Requests carry the API credentials as
/// headers and share a bounded timeout; a timed-out call surfaces as a
/// gateway error, never a retry.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl HttpPaymentGateway {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .expect("reqwest client construction cannot fail with static options"),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("x-client-id", &self.client_id)
            .header("x-client-secret", &self.client_secret)
            .header("Content-Type", "application/json")
    }

    async fn error_for(&self, context: &str, response: reqwest::Response) -> ServiceError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<GatewayErrorBody>(&body)
            .map(|e| {
                if e.message.is_empty() {
                    e.code
                } else {
                    e.message
                }
            })
            .unwrap_or(body);
        warn!(context, %status, %detail, "Gateway request failed");
        ServiceError::GatewayError(format!("{context} failed ({status}): {detail}"))
    }

    fn transport_error(context: &str, err: reqwest::Error) -> ServiceError {
        if err.is_timeout() {
            ServiceError::GatewayError(format!("{context} timed out"))
        } else {
            ServiceError::GatewayError(format!("{context} failed: {err}"))
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, vendor), fields(vendor_id = %vendor.vendor_id))]
    async fn create_vendor(
        &self,
        vendor: &VendorDetails,
    ) -> Result<VendorProvisionOutcome, ServiceError> {
        let body = json!({
            "vendor_id": vendor.vendor_id,
            "status": "ACTIVE",
            "name": vendor.name,
            "email": vendor.email,
            "phone": vendor.phone,
            "schedule_option": vendor.settlement_schedule,
            "bank": {
                "account_number": vendor.bank_account_number,
                "ifsc": vendor.bank_ifsc,
            },
        });

        let response = self
            .authed(self.client.post(self.url("/pg/vendors")))
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::transport_error("vendor creation", e))?;

        if response.status().is_success() {
            info!(vendor_id = %vendor.vendor_id, "Vendor created");
            return Ok(VendorProvisionOutcome::Created);
        }

        // The gateway reports an existing vendor as a conflict; adopt it.
        if response.status() == StatusCode::CONFLICT {
            info!(vendor_id = %vendor.vendor_id, "Vendor already exists; adopting");
            return Ok(VendorProvisionOutcome::AlreadyExists);
        }

        Err(self.error_for("vendor creation", response).await)
    }

    #[instrument(skip(self, request), fields(gateway_order_id = %request.gateway_order_id))]
    async fn create_split_order(
        &self,
        request: &GatewayOrderRequest,
    ) -> Result<GatewayOrderSession, ServiceError> {
        let body = json!({
            "order_id": request.gateway_order_id,
            "order_amount": request.amount,
            "order_currency": request.currency,
            "customer_details": {
                "customer_id": request.customer_id,
                "customer_phone": request.customer_phone,
                "customer_name": request.customer_name,
                "customer_email": request.customer_email,
            },
            "order_splits": request
                .splits
                .iter()
                .map(|leg| json!({"vendor_id": leg.vendor_id, "amount": leg.amount}))
                .collect::<Vec<_>>(),
        });

        let response = self
            .authed(self.client.post(self.url("/pg/orders")))
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::transport_error("payment session creation", e))?;

        if !response.status().is_success() {
            return Err(self.error_for("payment session creation", response).await);
        }

        let parsed: CreateOrderBody = response
            .json()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("unreadable session response: {e}")))?;

        Ok(GatewayOrderSession {
            payment_link: parsed.payment_link.unwrap_or_else(|| {
                format!(
                    "{}/pg/checkout/{}",
                    self.base_url, parsed.payment_session_id
                )
            }),
            session_id: parsed.payment_session_id,
        })
    }

    #[instrument(skip(self))]
    async fn order_status(
        &self,
        gateway_order_id: &str,
    ) -> Result<serde_json::Value, ServiceError> {
        let response = self
            .authed(
                self.client
                    .get(self.url(&format!("/pg/orders/{gateway_order_id}"))),
            )
            .send()
            .await
            .map_err(|e| Self::transport_error("order status", e))?;

        if !response.status().is_success() {
            return Err(self.error_for("order status", response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("unreadable status response: {e}")))
    }

    #[instrument(skip(self))]
    async fn refund(
        &self,
        transaction_id: &str,
        amount: Decimal,
        reason: Option<&str>,
    ) -> Result<RefundOutcome, ServiceError> {
        let body = json!({
            "reference_id": transaction_id,
            "refund_amount": amount,
            "refund_note": reason,
        });

        let response = self
            .authed(self.client.post(self.url("/pg/refunds")))
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::transport_error("refund", e))?;

        if !response.status().is_success() {
            return Err(self.error_for("refund", response).await);
        }

        let parsed: RefundBody = response
            .json()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("unreadable refund response: {e}")))?;

        Ok(RefundOutcome {
            refund_id: parsed.refund_id,
            status: parsed.refund_status,
        })
    }

    #[instrument(skip(self))]
    async fn vendor_settlements(
        &self,
        vendor_id: &str,
        limit: u32,
    ) -> Result<serde_json::Value, ServiceError> {
        let response = self
            .authed(self.client.get(self.url(&format!(
                "/pg/vendors/{vendor_id}/settlements?limit={limit}"
            ))))
            .send()
            .await
            .map_err(|e| Self::transport_error("settlement listing", e))?;

        if !response.status().is_success() {
            return Err(self.error_for("settlement listing", response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("unreadable settlements response: {e}")))
    }
}
