//! Price change classification

use rust_decimal::Decimal;

/// How a supplier price change is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceChangeClass {
    /// Applied silently
    Minor,
    /// Applied and logged for audit
    Significant,
    /// Held for manual approval
    Extreme,
}

/// Thresholds on the magnitude of a relative price change, in percent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceChangePolicy {
    pub extreme_threshold_percent: Decimal,
    pub significant_threshold_percent: Decimal,
}

impl Default for PriceChangePolicy {
    fn default() -> Self {
        Self {
            extreme_threshold_percent: Decimal::from(25),
            significant_threshold_percent: Decimal::from(10),
        }
    }
}

impl PriceChangePolicy {
    pub fn classify(&self, change_percent: Decimal) -> PriceChangeClass {
        let magnitude = change_percent.abs();
        if magnitude >= self.extreme_threshold_percent {
            PriceChangeClass::Extreme
        } else if magnitude >= self.significant_threshold_percent {
            PriceChangeClass::Significant
        } else {
            PriceChangeClass::Minor
        }
    }
}

/// Signed relative change `(new - old) / old * 100`, unrounded.
///
/// A change away from a zero price counts as +100%. Classify on this value;
/// round with [`display_percent`] only for storage and messages.
pub fn change_percent(old_price: i64, new_price: i64) -> Decimal {
    if old_price == new_price {
        return Decimal::ZERO;
    }
    if old_price == 0 {
        return Decimal::ONE_HUNDRED;
    }
    let old = Decimal::from(old_price);
    let new = Decimal::from(new_price);
    (new - old) / old * Decimal::ONE_HUNDRED
}

/// Percent as stored on a held change, 2 places
pub fn display_percent(percent: Decimal) -> Decimal {
    percent.round_dp(2)
}
