use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use malvader_core::Money;

/// Credit limit derived from a customer's score.
///
/// current = score × 1.5; projected = current × (1 + score / 2000).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditProjection {
    pub score: Decimal,
    pub current_limit: Money,
    pub projected_limit: Money,
}

impl CreditProjection {
    pub fn from_score(score: Decimal) -> Self {
        let current_limit = Money::from_units(1).scaled(score * Decimal::new(15, 1));
        let growth = Decimal::ONE + score / Decimal::from(2000);
        Self {
            score,
            current_limit,
            projected_limit: current_limit.scaled(growth),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_score_projection() {
        let p = CreditProjection::from_score(dec!(500));
        assert_eq!(p.current_limit, Money::from_units(750));
        assert_eq!(p.projected_limit, Money::from_cents(93_750));
    }

    #[test]
    fn fractional_scores_round_to_cents() {
        let p = CreditProjection::from_score(dec!(333.33));
        assert_eq!(p.current_limit, Money::from_cents(50_000));
        // 500.00 × 1.166665 = 583.3325
        assert_eq!(p.projected_limit, Money::from_cents(58_333));
    }
}
