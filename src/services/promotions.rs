//! Promo-code application for order intake.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::debug;

use crate::{
    common::round2,
    entities::promo_code::{self, Entity as PromoCodeEntity, Model as PromoCodeModel},
    errors::ServiceError,
};

/// A promo successfully applied to an order.
#[derive(Debug, Clone)]
pub struct AppliedPromo {
    pub code: String,
    pub discount: Decimal,
}

fn invalid_promo() -> ServiceError {
    ServiceError::ValidationError("Invalid or expired promo code".to_string())
}

/// Looks up a promo code case-insensitively for the restaurant.
pub async fn find_promo<C: ConnectionTrait>(
    conn: &C,
    restaurant_id: i64,
    code: &str,
    now: DateTime<Utc>,
) -> Result<Option<PromoCodeModel>, ServiceError> {
    let promo = PromoCodeEntity::find()
        .filter(promo_code::Column::RestaurantId.eq(restaurant_id))
        .filter(
            Expr::expr(Func::upper(Expr::col(promo_code::Column::Code)))
                .eq(code.trim().to_uppercase()),
        )
        .filter(promo_code::Column::IsActive.eq(true))
        .filter(promo_code::Column::ValidFrom.lte(now))
        .filter(promo_code::Column::ValidUntil.gte(now))
        .one(conn)
        .await?;
    Ok(promo)
}

/// Validates and applies a promo within the caller's transaction.
///
/// The usage increment is a conditional UPDATE bounded by `max_uses`, so
/// two concurrent orders cannot push a code past its cap: the loser of
/// the race observes zero affected rows and the order is rejected.
pub async fn apply_promo<C: ConnectionTrait>(
    conn: &C,
    restaurant_id: i64,
    code: &str,
    subtotal: Decimal,
) -> Result<AppliedPromo, ServiceError> {
    let now = Utc::now();
    let promo = find_promo(conn, restaurant_id, code, now)
        .await?
        .ok_or_else(invalid_promo)?;

    if let Some(limit) = promo.max_uses {
        if promo.used_count >= limit {
            return Err(invalid_promo());
        }
    }

    if subtotal < promo.min_order_amount {
        return Err(ServiceError::ValidationError(format!(
            "Minimum order amount of ₹{} required for promo code {}",
            promo.min_order_amount, promo.code
        )));
    }

    let discount = round2(subtotal * promo.discount_percentage / Decimal::from(100));

    let result = PromoCodeEntity::update_many()
        .col_expr(
            promo_code::Column::UsedCount,
            Expr::col(promo_code::Column::UsedCount).add(1),
        )
        .filter(promo_code::Column::Id.eq(promo.id))
        .filter(
            Condition::any()
                .add(promo_code::Column::MaxUses.is_null())
                .add(
                    Expr::col(promo_code::Column::UsedCount)
                        .lt(Expr::col(promo_code::Column::MaxUses)),
                ),
        )
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(invalid_promo());
    }

    debug!(code = %promo.code, %discount, "Applied promo code");

    Ok(AppliedPromo {
        code: promo.code,
        discount,
    })
}
