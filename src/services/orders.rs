use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    common::{round2, REVENUE_MILESTONE_THRESHOLD},
    entities::{
        dining_table::{self, Entity as DiningTableEntity},
        order::{self, ActiveModel as OrderActiveModel, Entity as OrderEntity, Model as OrderModel},
        order_item::{self, Entity as OrderItemEntity, Model as OrderItemModel},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::inventory::reserve_menu_item,
    services::order_status::{OrderStatus, PaymentMethod, PaymentStatus},
    services::promotions::apply_promo,
    services::restaurants::RestaurantService,
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub menu_item_id: i64,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    pub special_instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub restaurant_id: Option<i64>,
    pub restaurant_slug: Option<String>,
    pub table_id: Option<i64>,
    pub table_number: Option<String>,
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderItemRequest>,
    pub customer_phone: Option<String>,
    #[validate(email(message = "Customer email must be a valid email address"))]
    pub customer_email: Option<String>,
    pub ordered_by: Option<String>,
    pub captain_id: Option<i64>,
    pub payment_method: Option<PaymentMethod>,
    pub promo_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub menu_item_id: i64,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub special_instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: i64,
    pub restaurant_id: i64,
    pub order_number: String,
    pub table_id: i64,
    pub table_number: String,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub ordered_by: Option<String>,
    pub captain_id: Option<i64>,
    pub items: Vec<OrderItemResponse>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub promo_code: Option<String>,
    pub tax_percentage: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub status: String,
    pub payment_method: String,
    pub payment_status: String,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raised to the caller when an item's remaining stock fell below its
/// threshold during intake. Consumed by the notification sink.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LowStockAlert {
    pub menu_item_id: i64,
    pub name: String,
    pub remaining: i32,
    pub threshold: i32,
}

/// Raised when this order pushed today's revenue across the fixed
/// milestone threshold.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevenueMilestone {
    pub threshold: Decimal,
    pub today_total: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderIntakeOutcome {
    pub order: OrderResponse,
    pub low_stock_alerts: Vec<LowStockAlert>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue_milestone: Option<RevenueMilestone>,
}

/// Derive a numeric table id from any digits in the caller-supplied
/// table number; defaults to 1.
fn derive_table_id(table_number: &str) -> i64 {
    let digits: String = table_number.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(1)
}

fn generate_order_number(restaurant_id: i64) -> String {
    let rand3 = rand::thread_rng().gen_range(0..1000);
    format!(
        "R{}_{}_{:03}",
        restaurant_id,
        Utc::now().timestamp_millis(),
        rand3
    )
}

/// Order intake: validates and commits a new order as one atomic unit.
/// Inventory decrements, the promo increment, and the order insert either
/// all commit or all roll back.
#[derive(Clone)]
pub struct OrderIntakeService {
    db: Arc<DatabaseConnection>,
    restaurants: RestaurantService,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderIntakeService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        restaurants: RestaurantService,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            restaurants,
            event_sender,
        }
    }

    #[instrument(skip(self, request), fields(restaurant_id = ?request.restaurant_id, items = request.items.len()))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<OrderIntakeOutcome, ServiceError> {
        request.validate()?;

        let restaurant = self
            .restaurants
            .resolve(request.restaurant_id, request.restaurant_slug.as_deref())
            .await?;

        if request.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "Order must contain at least one item".to_string(),
            ));
        }

        let db = &*self.db;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start order intake transaction");
            ServiceError::DatabaseError(e)
        })?;

        let (table_id, table_number) =
            resolve_table(&txn, restaurant.id, request.table_id, request.table_number.as_deref())
                .await?;

        let mut subtotal = Decimal::ZERO;
        let mut low_stock_alerts = Vec::new();
        let mut lines = Vec::with_capacity(request.items.len());

        for item_request in &request.items {
            item_request.validate()?;
            let reserved = reserve_menu_item(
                &txn,
                restaurant.id,
                item_request.menu_item_id,
                item_request.quantity,
            )
            .await?;

            subtotal += reserved.item.price * Decimal::from(item_request.quantity);

            if reserved.is_low_stock() {
                low_stock_alerts.push(LowStockAlert {
                    menu_item_id: reserved.item.id,
                    name: reserved.item.name.clone(),
                    remaining: reserved.remaining,
                    threshold: reserved.item.low_stock_threshold,
                });
            }

            lines.push((item_request, reserved));
        }
        subtotal = round2(subtotal);

        let (discount, promo_code) = match request.promo_code.as_deref() {
            Some(code) if !code.trim().is_empty() => {
                let applied = apply_promo(&txn, restaurant.id, code, subtotal).await?;
                (applied.discount, Some(applied.code))
            }
            _ => (Decimal::ZERO, None),
        };

        let taxable = subtotal - discount;
        let tax_amount = round2(taxable * restaurant.tax_percentage / Decimal::from(100));
        let total_amount = taxable + tax_amount;

        let now = Utc::now();
        let payment_method = request.payment_method.unwrap_or(PaymentMethod::Cash);

        let order_model = OrderActiveModel {
            restaurant_id: Set(restaurant.id),
            order_number: Set(generate_order_number(restaurant.id)),
            table_id: Set(table_id),
            table_number: Set(table_number),
            customer_phone: Set(request.customer_phone.clone()),
            customer_email: Set(request.customer_email.clone()),
            ordered_by: Set(request.ordered_by.clone()),
            captain_id: Set(request.captain_id),
            subtotal: Set(subtotal),
            discount: Set(discount),
            promo_code: Set(promo_code),
            tax_percentage: Set(restaurant.tax_percentage),
            tax_amount: Set(tax_amount),
            total_amount: Set(total_amount),
            // Orders skip an explicit kitchen-acceptance step; they are
            // accepted the moment they are created.
            status: Set(OrderStatus::Preparing.as_str().to_string()),
            payment_method: Set(payment_method.as_str().to_string()),
            payment_status: Set(PaymentStatus::Pending.as_str().to_string()),
            transaction_id: Set(None),
            gateway_order_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let order = order_model.insert(&txn).await.map_err(|e| {
            error!(error = %e, "Failed to insert order");
            ServiceError::DatabaseError(e)
        })?;

        let mut item_models = Vec::with_capacity(lines.len());
        for (item_request, reserved) in &lines {
            let inserted = order_item::ActiveModel {
                order_id: Set(order.id),
                menu_item_id: Set(reserved.item.id),
                name: Set(reserved.item.name.clone()),
                quantity: Set(item_request.quantity),
                unit_price: Set(reserved.item.price),
                special_instructions: Set(item_request.special_instructions.clone()),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            item_models.push(inserted);
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = order.id, "Failed to commit order intake");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            order_id = order.id,
            order_number = %order.order_number,
            total = %order.total_amount,
            "Order created"
        );
        metrics::counter!("dineline_order_intake_total", 1);

        let revenue_milestone = self
            .check_revenue_milestone(restaurant.id, order.total_amount)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to compute revenue milestone");
                None
            });

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::OrderCreated {
                    order_id: order.id,
                    restaurant_id: restaurant.id,
                })
                .await
            {
                warn!(error = %e, order_id = order.id, "Failed to send order created event");
            }
            for alert in &low_stock_alerts {
                let _ = sender
                    .send(Event::LowStock {
                        restaurant_id: restaurant.id,
                        menu_item_id: alert.menu_item_id,
                        remaining: alert.remaining,
                    })
                    .await;
            }
        }

        Ok(OrderIntakeOutcome {
            order: model_to_response(order, item_models),
            low_stock_alerts,
            revenue_milestone,
        })
    }

    /// Sums today's non-cancelled revenue and reports a milestone when
    /// this order pushed the total across the threshold.
    async fn check_revenue_milestone(
        &self,
        restaurant_id: i64,
        order_total: Decimal,
    ) -> Result<Option<RevenueMilestone>, ServiceError> {
        let today_start = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always valid")
            .and_utc();

        let today_total = OrderEntity::find()
            .select_only()
            .column_as(order::Column::TotalAmount.sum(), "total")
            .filter(order::Column::RestaurantId.eq(restaurant_id))
            .filter(order::Column::CreatedAt.gte(today_start))
            .filter(order::Column::Status.ne(OrderStatus::Cancelled.as_str()))
            .into_tuple::<Option<Decimal>>()
            .one(&*self.db)
            .await?
            .flatten();

        let today_total = today_total.unwrap_or(Decimal::ZERO);
        let crossed = today_total >= REVENUE_MILESTONE_THRESHOLD
            && today_total - order_total < REVENUE_MILESTONE_THRESHOLD;

        if crossed {
            if let Some(sender) = &self.event_sender {
                let _ = sender
                    .send(Event::RevenueMilestone {
                        restaurant_id,
                        total: today_total,
                    })
                    .await;
            }
            Ok(Some(RevenueMilestone {
                threshold: REVENUE_MILESTONE_THRESHOLD,
                today_total,
            }))
        } else {
            Ok(None)
        }
    }

    /// Retrieves an order with its line items.
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: i64) -> Result<OrderResponse, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        Ok(model_to_response(order, items))
    }

    /// Lists the restaurant's orders still moving through the kitchen
    /// (anything not completed or cancelled), newest first.
    #[instrument(skip(self))]
    pub async fn list_active_orders(
        &self,
        restaurant_id: i64,
    ) -> Result<Vec<OrderResponse>, ServiceError> {
        let active: Vec<&str> = [
            OrderStatus::Pending,
            OrderStatus::Preparing,
            OrderStatus::Ready,
            OrderStatus::Served,
        ]
        .iter()
        .map(|s| s.as_str())
        .collect();

        let orders = OrderEntity::find()
            .filter(order::Column::RestaurantId.eq(restaurant_id))
            .filter(order::Column::Status.is_in(active))
            .order_by_desc(order::Column::CreatedAt)
            .find_with_related(OrderItemEntity)
            .all(&*self.db)
            .await?;

        Ok(orders
            .into_iter()
            .map(|(order, items)| model_to_response(order, items))
            .collect())
    }
}

async fn resolve_table<C: ConnectionTrait>(
    conn: &C,
    restaurant_id: i64,
    table_id: Option<i64>,
    table_number: Option<&str>,
) -> Result<(i64, String), ServiceError> {
    if let Some(id) = table_id {
        let table = DiningTableEntity::find_by_id(id)
            .filter(dining_table::Column::RestaurantId.eq(restaurant_id))
            .one(conn)
            .await?;
        if let Some(table) = table {
            if !table.is_active {
                return Err(ServiceError::ValidationError(format!(
                    "Table {} is not active",
                    table.table_number
                )));
            }
            return Ok((table.id, table.table_number));
        }
        // Unknown id: fall through to the caller-supplied table number.
    }

    let number = table_number.unwrap_or("1").trim();
    let number = if number.is_empty() { "1" } else { number };
    Ok((derive_table_id(number), number.to_string()))
}

pub fn model_to_response(model: OrderModel, items: Vec<OrderItemModel>) -> OrderResponse {
    OrderResponse {
        id: model.id,
        restaurant_id: model.restaurant_id,
        order_number: model.order_number,
        table_id: model.table_id,
        table_number: model.table_number,
        customer_phone: model.customer_phone,
        customer_email: model.customer_email,
        ordered_by: model.ordered_by,
        captain_id: model.captain_id,
        items: items
            .into_iter()
            .map(|item| OrderItemResponse {
                menu_item_id: item.menu_item_id,
                name: item.name,
                quantity: item.quantity,
                unit_price: item.unit_price,
                special_instructions: item.special_instructions,
            })
            .collect(),
        subtotal: model.subtotal,
        discount: model.discount,
        promo_code: model.promo_code,
        tax_percentage: model.tax_percentage,
        tax_amount: model.tax_amount,
        total_amount: model.total_amount,
        status: model.status,
        payment_method: model.payment_method,
        payment_status: model.payment_status,
        transaction_id: model.transaction_id,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}
