use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    errors::ServiceError,
    services::payments::{InitiatePaymentRequest, RefundRequest},
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionVendorRequest {
    pub restaurant_id: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionVendorResponse {
    pub vendor_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SettlementsQuery {
    pub limit: Option<u32>,
}

// POST /payment/vendor
#[utoipa::path(
    post,
    path = "/payment/vendor",
    request_body = ProvisionVendorRequest,
    responses(
        (status = 200, description = "Vendor account ready"),
        (status = 404, description = "Unknown restaurant", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn provision_vendor(
    State(state): State<AppState>,
    Json(payload): Json<ProvisionVendorRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let vendor_id = state
        .services
        .payments
        .ensure_vendor(payload.restaurant_id)
        .await?;
    Ok(Json(ApiResponse::success(ProvisionVendorResponse {
        vendor_id,
    })))
}

// POST /payment/initiate
#[utoipa::path(
    post,
    path = "/payment/initiate",
    request_body = InitiatePaymentRequest,
    responses(
        (status = 200, description = "Payment session created"),
        (status = 400, description = "Validation failure", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn initiate_payment(
    State(state): State<AppState>,
    Json(payload): Json<InitiatePaymentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state.services.payments.initiate_payment(payload).await?;
    Ok(Json(ApiResponse::success(session)))
}

// GET /payment/status/{order_id}
#[utoipa::path(
    get,
    path = "/payment/status/{order_id}",
    params(("order_id" = i64, Path, description = "Order id")),
    responses(
        (status = 200, description = "Gateway order status"),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_status(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = state.services.payments.payment_status(order_id).await?;
    Ok(Json(ApiResponse::success(status)))
}

// POST /payment/refund
#[utoipa::path(
    post,
    path = "/payment/refund",
    request_body = RefundRequest,
    responses(
        (status = 200, description = "Refund accepted"),
        (status = 400, description = "Payment not refundable", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn refund(
    State(state): State<AppState>,
    Json(payload): Json<RefundRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let refund = state.services.payments.refund(payload).await?;
    Ok(Json(ApiResponse::success(refund)))
}

// GET /payment/vendor/{restaurant_id}/settlements
#[utoipa::path(
    get,
    path = "/payment/vendor/{restaurant_id}/settlements",
    params(
        ("restaurant_id" = i64, Path, description = "Restaurant id"),
        ("limit" = Option<u32>, Query, description = "Maximum records to return")
    ),
    responses(
        (status = 200, description = "Vendor settlement history"),
        (status = 404, description = "Unknown restaurant", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn vendor_settlements(
    State(state): State<AppState>,
    Path(restaurant_id): Path<i64>,
    Query(query): Query<SettlementsQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let settlements = state
        .services
        .payments
        .vendor_settlements(restaurant_id, query.limit.unwrap_or(20))
        .await?;
    Ok(Json(ApiResponse::success(settlements)))
}
