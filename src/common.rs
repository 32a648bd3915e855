//! Shared helpers used across services and handlers.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Same-day cumulative revenue threshold that triggers a one-time
/// milestone notification (₹).
pub const REVENUE_MILESTONE_THRESHOLD: Decimal = dec!(5000);

/// Round a monetary amount to 2 decimal places, half away from zero.
pub fn round2(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round2_half_away_from_zero() {
        assert_eq!(round2(dec!(12.505)), dec!(12.51));
        assert_eq!(round2(dec!(12.504)), dec!(12.50));
        assert_eq!(round2(dec!(-12.505)), dec!(-12.51));
        assert_eq!(round2(dec!(250)), dec!(250.00));
    }
}
