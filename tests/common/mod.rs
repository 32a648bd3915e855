//! Shared test harness: an in-memory database with the full schema, a
//! canned payment gateway, and seeding helpers.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ActiveValue::Set};
use sea_orm_migration::MigratorTrait;
use tokio::sync::{mpsc, Mutex};

use dineline_api::{
    config::AppConfig,
    db,
    entities::{dining_table, menu_item, order, promo_code, restaurant},
    errors::ServiceError,
    events::{broadcaster::BroadcastHub, process_events, EventSender},
    gateway::{
        GatewayOrderRequest, GatewayOrderSession, PaymentGateway, RefundOutcome, VendorDetails,
        VendorProvisionOutcome,
    },
    migrator::Migrator,
    AppState,
};

/// Gateway double: records requests and answers with canned data.
#[derive(Default)]
pub struct MockGateway {
    pub vendor_already_exists: AtomicBool,
    pub fail_next_order: AtomicBool,
    pub vendors: Mutex<Vec<VendorDetails>>,
    pub orders: Mutex<Vec<GatewayOrderRequest>>,
    pub refunds: Mutex<Vec<(String, Decimal)>>,
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_vendor(
        &self,
        vendor: &VendorDetails,
    ) -> Result<VendorProvisionOutcome, ServiceError> {
        self.vendors.lock().await.push(vendor.clone());
        if self.vendor_already_exists.load(Ordering::SeqCst) {
            Ok(VendorProvisionOutcome::AlreadyExists)
        } else {
            Ok(VendorProvisionOutcome::Created)
        }
    }

    async fn create_split_order(
        &self,
        request: &GatewayOrderRequest,
    ) -> Result<GatewayOrderSession, ServiceError> {
        if self.fail_next_order.swap(false, Ordering::SeqCst) {
            return Err(ServiceError::GatewayError("order rejected".to_string()));
        }
        self.orders.lock().await.push(request.clone());
        Ok(GatewayOrderSession {
            session_id: format!("session_{}", request.gateway_order_id),
            payment_link: format!("https://pay.test/{}", request.gateway_order_id),
        })
    }

    async fn order_status(
        &self,
        gateway_order_id: &str,
    ) -> Result<serde_json::Value, ServiceError> {
        Ok(serde_json::json!({
            "order_id": gateway_order_id,
            "order_status": "ACTIVE",
        }))
    }

    async fn refund(
        &self,
        transaction_id: &str,
        amount: Decimal,
        _reason: Option<&str>,
    ) -> Result<RefundOutcome, ServiceError> {
        self.refunds
            .lock()
            .await
            .push((transaction_id.to_string(), amount));
        Ok(RefundOutcome {
            refund_id: format!("refund_{transaction_id}"),
            status: "PENDING".to_string(),
        })
    }

    async fn vendor_settlements(
        &self,
        vendor_id: &str,
        limit: u32,
    ) -> Result<serde_json::Value, ServiceError> {
        Ok(serde_json::json!({
            "vendor_id": vendor_id,
            "limit": limit,
            "settlements": [],
        }))
    }
}

pub struct TestApp {
    pub state: AppState,
    pub hub: Arc<BroadcastHub>,
    pub gateway: Arc<MockGateway>,
}

impl TestApp {
    pub async fn new() -> Self {
        let config = AppConfig::for_tests("sqlite::memory:");
        let pool = db::establish_connection_from_app_config(&config)
            .await
            .expect("db connect");
        Migrator::up(&pool, None).await.expect("migrations");

        let (tx, rx) = mpsc::channel(256);
        let event_sender = EventSender::new(tx);
        tokio::spawn(process_events(rx));

        let hub = Arc::new(BroadcastHub::default());
        let gateway = Arc::new(MockGateway::default());

        let state = AppState::new(
            config,
            Arc::new(pool),
            gateway.clone(),
            hub.clone(),
            event_sender,
        );

        Self {
            state,
            hub,
            gateway,
        }
    }

    pub async fn seed_restaurant(&self, slug: &str, tax_percentage: Decimal) -> restaurant::Model {
        let now = Utc::now();
        restaurant::ActiveModel {
            name: Set(format!("Restaurant {slug}")),
            slug: Set(slug.to_string()),
            is_active: Set(true),
            tax_percentage: Set(tax_percentage),
            contact_phone: Set("+919900000001".to_string()),
            contact_email: Set(format!("{slug}@dineline.test")),
            bank_account_number: Set(Some("000111222333".to_string())),
            bank_ifsc: Set(Some("TEST0000001".to_string())),
            vendor_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("seed restaurant")
    }

    pub async fn seed_table(
        &self,
        restaurant_id: i64,
        table_number: &str,
        is_active: bool,
    ) -> dining_table::Model {
        dining_table::ActiveModel {
            restaurant_id: Set(restaurant_id),
            table_number: Set(table_number.to_string()),
            is_active: Set(is_active),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("seed table")
    }

    pub async fn seed_menu_item(
        &self,
        restaurant_id: i64,
        name: &str,
        price: Decimal,
        inventory: i32,
        threshold: i32,
    ) -> menu_item::Model {
        menu_item::ActiveModel {
            restaurant_id: Set(restaurant_id),
            name: Set(name.to_string()),
            price: Set(price),
            is_available: Set(true),
            inventory_count: Set(inventory),
            low_stock_threshold: Set(threshold),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("seed menu item")
    }

    pub async fn seed_promo(
        &self,
        restaurant_id: i64,
        code: &str,
        discount_percentage: Decimal,
        min_order_amount: Decimal,
        max_uses: Option<i32>,
    ) -> promo_code::Model {
        let now = Utc::now();
        promo_code::ActiveModel {
            restaurant_id: Set(restaurant_id),
            code: Set(code.to_string()),
            discount_percentage: Set(discount_percentage),
            min_order_amount: Set(min_order_amount),
            max_uses: Set(max_uses),
            used_count: Set(0),
            valid_from: Set(now - ChronoDuration::days(1)),
            valid_until: Set(now + ChronoDuration::days(30)),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("seed promo")
    }

    /// Seeds an order row directly, bypassing intake.
    pub async fn seed_order(
        &self,
        restaurant_id: i64,
        status: &str,
        payment_status: &str,
        payment_method: &str,
        total_amount: Decimal,
    ) -> order::Model {
        let now = Utc::now();
        order::ActiveModel {
            restaurant_id: Set(restaurant_id),
            order_number: Set(format!(
                "R{}_{}_{:03}",
                restaurant_id,
                now.timestamp_millis(),
                rand::random::<u16>() % 1000
            )),
            table_id: Set(1),
            table_number: Set("1".to_string()),
            customer_phone: Set(None),
            customer_email: Set(None),
            ordered_by: Set(None),
            captain_id: Set(None),
            subtotal: Set(total_amount),
            discount: Set(dec!(0)),
            promo_code: Set(None),
            tax_percentage: Set(dec!(0)),
            tax_amount: Set(dec!(0)),
            total_amount: Set(total_amount),
            status: Set(status.to_string()),
            payment_method: Set(payment_method.to_string()),
            payment_status: Set(payment_status.to_string()),
            transaction_id: Set(None),
            gateway_order_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("seed order")
    }
}
