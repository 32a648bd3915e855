//! End-to-end intake tests against an in-memory database: totals, table
//! resolution, stock accounting, promo application, and milestones.

mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;

use dineline_api::{
    entities::menu_item,
    errors::ServiceError,
    services::orders::{CreateOrderRequest, OrderItemRequest},
};

fn request(restaurant_id: i64, items: Vec<OrderItemRequest>) -> CreateOrderRequest {
    CreateOrderRequest {
        restaurant_id: Some(restaurant_id),
        restaurant_slug: None,
        table_id: None,
        table_number: Some("5".to_string()),
        items,
        customer_phone: Some("+919900000002".to_string()),
        customer_email: None,
        ordered_by: None,
        captain_id: None,
        payment_method: None,
        promo_code: None,
    }
}

fn line(menu_item_id: i64, quantity: i32) -> OrderItemRequest {
    OrderItemRequest {
        menu_item_id,
        quantity,
        special_instructions: None,
    }
}

#[tokio::test]
async fn intake_computes_totals_with_tax() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant("totals", dec!(5)).await;
    let dosa = app
        .seed_menu_item(restaurant.id, "Masala Dosa", dec!(100.00), 20, 5)
        .await;
    let chai = app
        .seed_menu_item(restaurant.id, "Chai", dec!(50.00), 20, 5)
        .await;

    let outcome = app
        .state
        .services
        .orders
        .create_order(request(restaurant.id, vec![line(dosa.id, 2), line(chai.id, 1)]))
        .await
        .expect("intake");

    let order = &outcome.order;
    assert_eq!(order.subtotal, dec!(250.00));
    assert_eq!(order.discount, dec!(0));
    assert_eq!(order.tax_amount, dec!(12.50));
    assert_eq!(order.total_amount, dec!(262.50));
    assert_eq!(order.status, "preparing");
    assert_eq!(order.payment_status, "pending");
    assert_eq!(order.payment_method, "cash");
    assert!(order.order_number.starts_with(&format!("R{}_", restaurant.id)));
    assert_eq!(order.items.len(), 2);
    assert_eq!(order.table_id, 5);

    // Inventory decremented by the ordered quantities.
    let dosa_after = menu_item::Entity::find_by_id(dosa.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(dosa_after.inventory_count, 18);
}

#[tokio::test]
async fn intake_rejects_empty_item_list() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant("empty", dec!(5)).await;

    let err = app
        .state
        .services
        .orders
        .create_order(request(restaurant.id, vec![]))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn intake_rejects_unknown_restaurant() {
    let app = TestApp::new().await;
    let err = app
        .state
        .services
        .orders
        .create_order(request(9999, vec![line(1, 1)]))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn intake_resolves_restaurant_by_slug() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant("by-slug", dec!(0)).await;
    let item = app
        .seed_menu_item(restaurant.id, "Idli", dec!(40.00), 10, 2)
        .await;

    let mut req = request(0, vec![line(item.id, 1)]);
    req.restaurant_id = None;
    req.restaurant_slug = Some("by-slug".to_string());

    let outcome = app.state.services.orders.create_order(req).await.expect("intake");
    assert_eq!(outcome.order.restaurant_id, restaurant.id);
    assert_eq!(outcome.order.total_amount, dec!(40.00));
}

#[tokio::test]
async fn intake_rolls_back_earlier_decrements_when_a_later_item_fails() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant("rollback", dec!(5)).await;
    let plenty = app
        .seed_menu_item(restaurant.id, "Plenty", dec!(10.00), 50, 5)
        .await;
    let scarce = app
        .seed_menu_item(restaurant.id, "Scarce", dec!(10.00), 1, 0)
        .await;

    let err = app
        .state
        .services
        .orders
        .create_order(request(restaurant.id, vec![line(plenty.id, 3), line(scarce.id, 2)]))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    // The whole intake is one transaction: the first item's decrement
    // must not survive the second item's failure.
    let plenty_after = menu_item::Entity::find_by_id(plenty.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(plenty_after.inventory_count, 50);
}

#[tokio::test]
async fn intake_rejects_inactive_table_but_falls_back_on_unknown_id() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant("tables", dec!(5)).await;
    let item = app
        .seed_menu_item(restaurant.id, "Vada", dec!(30.00), 10, 2)
        .await;
    let inactive = app.seed_table(restaurant.id, "9", false).await;

    let mut req = request(restaurant.id, vec![line(item.id, 1)]);
    req.table_id = Some(inactive.id);
    let err = app.state.services.orders.create_order(req).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    // Unknown table id falls back to the supplied table number string.
    let mut req = request(restaurant.id, vec![line(item.id, 1)]);
    req.table_id = Some(424242);
    req.table_number = Some("T-7".to_string());
    let outcome = app.state.services.orders.create_order(req).await.expect("intake");
    assert_eq!(outcome.order.table_id, 7);
    assert_eq!(outcome.order.table_number, "T-7");
}

#[tokio::test]
async fn promo_below_minimum_names_the_threshold() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant("promo-min", dec!(5)).await;
    let item = app
        .seed_menu_item(restaurant.id, "Thali", dec!(120.00), 10, 2)
        .await;
    app.seed_promo(restaurant.id, "SAVE10", dec!(10), dec!(500.00), None)
        .await;

    let mut req = request(restaurant.id, vec![line(item.id, 1)]);
    req.promo_code = Some("SAVE10".to_string());

    let err = app.state.services.orders.create_order(req).await.unwrap_err();
    match err {
        ServiceError::ValidationError(msg) => {
            assert!(msg.contains("Minimum order amount"), "{msg}");
            assert!(msg.contains("500"), "{msg}");
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn promo_applies_discount_case_insensitively() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant("promo-apply", dec!(5)).await;
    let item = app
        .seed_menu_item(restaurant.id, "Biryani", dec!(300.00), 10, 2)
        .await;
    app.seed_promo(restaurant.id, "SAVE10", dec!(10), dec!(100.00), Some(5))
        .await;

    let mut req = request(restaurant.id, vec![line(item.id, 2)]);
    req.promo_code = Some("save10".to_string());

    let outcome = app.state.services.orders.create_order(req).await.expect("intake");
    let order = &outcome.order;
    // 600 - 10% = 540, 5% tax on 540 = 27.00
    assert_eq!(order.subtotal, dec!(600.00));
    assert_eq!(order.discount, dec!(60.00));
    assert_eq!(order.tax_amount, dec!(27.00));
    assert_eq!(order.total_amount, dec!(567.00));
    assert_eq!(order.promo_code.as_deref(), Some("SAVE10"));
}

#[tokio::test]
async fn promo_at_usage_cap_is_rejected() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant("promo-cap", dec!(5)).await;
    let item = app
        .seed_menu_item(restaurant.id, "Paneer", dec!(200.00), 50, 2)
        .await;
    app.seed_promo(restaurant.id, "ONCE", dec!(10), dec!(0), Some(1))
        .await;

    let mut req = request(restaurant.id, vec![line(item.id, 1)]);
    req.promo_code = Some("ONCE".to_string());
    app.state
        .services
        .orders
        .create_order(req)
        .await
        .expect("first use");

    let mut req = request(restaurant.id, vec![line(item.id, 1)]);
    req.promo_code = Some("ONCE".to_string());
    let err = app.state.services.orders.create_order(req).await.unwrap_err();
    match err {
        ServiceError::ValidationError(msg) => {
            assert!(msg.contains("Invalid or expired"), "{msg}")
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn low_stock_alert_is_surfaced_to_the_caller() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant("low-stock", dec!(5)).await;
    let item = app
        .seed_menu_item(restaurant.id, "Special", dec!(80.00), 6, 5)
        .await;

    let outcome = app
        .state
        .services
        .orders
        .create_order(request(restaurant.id, vec![line(item.id, 2)]))
        .await
        .expect("intake");

    assert_eq!(outcome.low_stock_alerts.len(), 1);
    let alert = &outcome.low_stock_alerts[0];
    assert_eq!(alert.menu_item_id, item.id);
    assert_eq!(alert.remaining, 4);
    assert_eq!(alert.threshold, 5);
}

#[tokio::test]
async fn revenue_milestone_fires_once_on_crossing() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant("milestone", dec!(0)).await;
    let item = app
        .seed_menu_item(restaurant.id, "Feast", dec!(3000.00), 100, 1)
        .await;

    let first = app
        .state
        .services
        .orders
        .create_order(request(restaurant.id, vec![line(item.id, 1)]))
        .await
        .expect("first order");
    assert!(first.revenue_milestone.is_none());

    // 3000 + 3000 crosses the fixed 5000 threshold.
    let second = app
        .state
        .services
        .orders
        .create_order(request(restaurant.id, vec![line(item.id, 1)]))
        .await
        .expect("second order");
    let milestone = second.revenue_milestone.expect("milestone");
    assert_eq!(milestone.threshold, dec!(5000));
    assert_eq!(milestone.today_total, dec!(6000.00));

    // Already past the threshold: no milestone on later orders.
    let third = app
        .state
        .services
        .orders
        .create_order(request(restaurant.id, vec![line(item.id, 1)]))
        .await
        .expect("third order");
    assert!(third.revenue_milestone.is_none());
}
