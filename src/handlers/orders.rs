use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use utoipa::ToSchema;

use crate::{
    errors::ServiceError,
    events::broadcaster::{fan_out_order, EVENT_NEW_ORDER, EVENT_ORDER_UPDATED},
    services::order_status::OrderStatus,
    services::orders::{CreateOrderRequest, OrderResponse},
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActiveOrdersQuery {
    pub restaurant_id: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ActiveOrdersResponse {
    pub orders: Vec<OrderResponse>,
}

fn order_payload(order: &OrderResponse) -> Value {
    serde_json::to_value(order).unwrap_or(Value::Null)
}

// POST /orders
#[utoipa::path(
    post,
    path = "/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created"),
        (status = 400, description = "Validation failure", body = crate::errors::ErrorResponse),
        (status = 404, description = "Restaurant or menu item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let mut outcome = state.services.orders.create_order(payload).await?;
    let restaurant_id = outcome.order.restaurant_id;

    if !outcome.low_stock_alerts.is_empty() {
        state
            .services
            .notifications
            .record_low_stock(restaurant_id, &outcome.low_stock_alerts)
            .await;
    }

    // The milestone only counts once per day; drop it from the response
    // when an earlier order already claimed it.
    if let Some(milestone) = &outcome.revenue_milestone {
        match state
            .services
            .notifications
            .record_revenue_milestone(restaurant_id, milestone.today_total)
            .await
        {
            Ok(true) => {}
            Ok(false) => outcome.revenue_milestone = None,
            Err(e) => {
                warn!(restaurant_id, error = %e, "Failed to record revenue milestone");
                outcome.revenue_milestone = None;
            }
        }
    }

    fan_out_order(
        state.broadcaster.as_ref(),
        restaurant_id,
        outcome.order.id,
        EVENT_NEW_ORDER,
        order_payload(&outcome.order),
    )
    .await;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(outcome))))
}

// PUT /orders/{id}/status
#[utoipa::path(
    put,
    path = "/orders/{id}/status",
    params(("id" = i64, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated"),
        (status = 400, description = "Invalid transition", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let new_status: OrderStatus = payload.status.trim().parse().map_err(|_| {
        ServiceError::ValidationError(format!("Unknown order status '{}'", payload.status))
    })?;

    let updated = state
        .services
        .order_status
        .update_status(order_id, new_status)
        .await?;

    let order = state.services.orders.get_order(updated.id).await?;

    fan_out_order(
        state.broadcaster.as_ref(),
        order.restaurant_id,
        order.id,
        EVENT_ORDER_UPDATED,
        order_payload(&order),
    )
    .await;

    Ok(Json(ApiResponse::success(order)))
}

// GET /orders/active
#[utoipa::path(
    get,
    path = "/orders/active",
    params(("restaurantId" = i64, Query, description = "Restaurant id")),
    responses((status = 200, description = "Orders still in the kitchen flow")),
    tag = "Orders"
)]
pub async fn active_orders(
    State(state): State<AppState>,
    Query(query): Query<ActiveOrdersQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let orders = state
        .services
        .orders
        .list_active_orders(query.restaurant_id)
        .await?;
    Ok(Json(ApiResponse::success(ActiveOrdersResponse { orders })))
}

// GET /orders/{id}
#[utoipa::path(
    get,
    path = "/orders/{id}",
    params(("id" = i64, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order"),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.get_order(order_id).await?;
    Ok(Json(ApiResponse::success(order)))
}
