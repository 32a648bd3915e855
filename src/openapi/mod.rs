use utoipa::OpenApi;

use crate::errors::ErrorResponse;
use crate::handlers;
use crate::services::orders::{
    CreateOrderRequest, LowStockAlert, OrderIntakeOutcome, OrderItemRequest, OrderItemResponse,
    OrderResponse, RevenueMilestone,
};
use crate::services::payments::{
    InitiatePaymentRequest, PaymentSessionResponse, RefundRequest, RefundResponse,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::orders::create_order,
        handlers::orders::update_order_status,
        handlers::orders::active_orders,
        handlers::orders::get_order,
        handlers::payments::provision_vendor,
        handlers::payments::initiate_payment,
        handlers::payments::payment_status,
        handlers::payments::refund,
        handlers::payments::vendor_settlements,
        handlers::payment_webhooks::payment_webhook,
        handlers::health::health,
    ),
    components(schemas(
        ErrorResponse,
        CreateOrderRequest,
        OrderItemRequest,
        OrderItemResponse,
        OrderResponse,
        OrderIntakeOutcome,
        LowStockAlert,
        RevenueMilestone,
        InitiatePaymentRequest,
        PaymentSessionResponse,
        RefundRequest,
        RefundResponse,
        handlers::orders::UpdateOrderStatusRequest,
        handlers::payments::ProvisionVendorRequest,
        handlers::payments::ProvisionVendorResponse,
    )),
    tags(
        (name = "Orders", description = "Order intake and status orchestration"),
        (name = "Payments", description = "Split-settlement payments and reconciliation"),
        (name = "Health", description = "Service health")
    ),
    info(
        title = "Dineline API",
        description = "Order & payment orchestration for multi-tenant restaurant ordering"
    )
)]
pub struct ApiDoc;
