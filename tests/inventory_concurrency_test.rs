//! Concurrent intakes against one item must never drive stock negative
//! and must accept at most floor(stock / quantity) orders.

mod common;

use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;

use dineline_api::{
    entities::menu_item,
    services::orders::{CreateOrderRequest, OrderItemRequest},
};

#[tokio::test]
async fn concurrent_intakes_cannot_oversell() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant("race", dec!(5)).await;
    let item = app
        .seed_menu_item(restaurant.id, "Limited Special", dec!(100.00), 10, 0)
        .await;

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let orders = app.state.services.orders.clone();
        let restaurant_id = restaurant.id;
        let menu_item_id = item.id;
        tasks.push(tokio::spawn(async move {
            orders
                .create_order(CreateOrderRequest {
                    restaurant_id: Some(restaurant_id),
                    restaurant_slug: None,
                    table_id: None,
                    table_number: Some("1".to_string()),
                    items: vec![OrderItemRequest {
                        menu_item_id,
                        quantity: 1,
                        special_instructions: None,
                    }],
                    customer_phone: None,
                    customer_email: None,
                    ordered_by: None,
                    captain_id: None,
                    payment_method: None,
                    promo_code: None,
                })
                .await
                .is_ok()
        }));
    }

    let mut accepted = 0;
    for task in tasks {
        if task.await.unwrap_or(false) {
            accepted += 1;
        }
    }

    let remaining = menu_item::Entity::find_by_id(item.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap()
        .inventory_count;

    assert!(remaining >= 0, "stock must never go negative");
    assert!(accepted <= 10, "at most 10 single-unit orders can succeed");
    assert_eq!(
        remaining,
        10 - accepted as i32,
        "every accepted order accounts for exactly one unit"
    );
}
