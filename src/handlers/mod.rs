pub mod health;
pub mod orders;
pub mod payment_webhooks;
pub mod payments;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    cache::InMemoryCache,
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    gateway::PaymentGateway,
    services::{
        notifications::NotificationService, order_status::OrderStatusService,
        orders::OrderIntakeService, payments::PaymentService, restaurants::RestaurantService,
    },
    AppState,
};

/// Services layer that encapsulates business logic used by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub restaurants: RestaurantService,
    pub orders: Arc<OrderIntakeService>,
    pub order_status: Arc<OrderStatusService>,
    pub payments: Arc<PaymentService>,
    pub notifications: Arc<NotificationService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        config: &AppConfig,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let restaurants = RestaurantService::new(
            db.clone(),
            InMemoryCache::new(),
            Duration::from_secs(config.cache.ttl_secs),
        );
        let orders = Arc::new(OrderIntakeService::new(
            db.clone(),
            restaurants.clone(),
            Some(event_sender.clone()),
        ));
        let order_status = Arc::new(OrderStatusService::new(
            db.clone(),
            Some(event_sender.clone()),
        ));
        let payments = Arc::new(PaymentService::new(
            db.clone(),
            restaurants.clone(),
            gateway,
            config.gateway.clone(),
            Some(event_sender),
        ));
        let notifications = Arc::new(NotificationService::new(db));

        Self {
            restaurants,
            orders,
            order_status,
            payments,
            notifications,
        }
    }
}

/// Builds the HTTP surface with the standard middleware stack.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(orders::create_order))
        .route("/orders/active", get(orders::active_orders))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/status", put(orders::update_order_status))
        .route("/payment/vendor", post(payments::provision_vendor))
        .route("/payment/initiate", post(payments::initiate_payment))
        .route("/payment/webhook", post(payment_webhooks::payment_webhook))
        .route("/payment/status/:order_id", get(payments::payment_status))
        .route("/payment/refund", post(payments::refund))
        .route(
            "/payment/vendor/:restaurant_id/settlements",
            get(payments::vendor_settlements),
        )
        .route("/health", get(health::health))
        .merge(
            SwaggerUi::new("/docs").url("/api-docs/openapi.json", crate::openapi::ApiDoc::openapi()),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(30)))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
