//! Retail price derivation

use rust_decimal::prelude::*;
use shared::models::MarkupRule;

/// Retail price for a supplier cost under a markup rule (minor units, half-up)
pub fn retail_price(rule: &MarkupRule, cost: i64) -> i64 {
    match rule {
        MarkupRule::Fixed { amount } => cost.saturating_add(*amount),
        MarkupRule::Percentage { percent } => {
            let factor = Decimal::ONE + *percent / Decimal::ONE_HUNDRED;
            (Decimal::from(cost) * factor)
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                .to_i64()
                .unwrap_or(cost)
        }
    }
}
