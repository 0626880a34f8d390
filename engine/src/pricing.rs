//! Pricing policy — reputation-tiered discounts.
//!
//! Pure and deterministic: the same deposit and score always produce the
//! same quote. Every slot-allocating operation quotes through here.

use crate::types::{Money, ReputationScore};
use serde::{Deserialize, Serialize};

/// Discount tiers keyed on the reputation score, in tenths:
/// ≥ 8.5 → 25% off, ≥ 7.0 → 15%, ≥ 6.0 → 10%, else 0%.
#[must_use]
pub const fn discount_percent(score: ReputationScore) -> u8 {
    match score.tenths() {
        85.. => 25,
        70..=84 => 15,
        60..=69 => 10,
        _ => 0,
    }
}

/// The result of pricing one registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Price before discount.
    pub original: Money,
    /// Discount percentage applied.
    pub discount_percent: u8,
    /// Discount amount.
    pub discount: Money,
    /// Price after discount, floored at zero.
    pub final_price: Money,
}

/// Pricing policy for one engine instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// The smallest amount the payment processor accepts. A final price
    /// below this is exempt: the registration auto-confirms without a
    /// payment capture.
    pub minimum_payable: Money,
}

impl PricingPolicy {
    /// Policy with the given minimum payable amount.
    #[must_use]
    pub const fn new(minimum_payable: Money) -> Self {
        Self { minimum_payable }
    }

    /// Price a registration for a user with the given reputation.
    #[must_use]
    pub const fn quote(&self, deposit: Money, score: ReputationScore) -> Quote {
        let percent = discount_percent(score);
        let discount = deposit.percent(percent);
        Quote {
            original: deposit,
            discount_percent: percent,
            discount,
            final_price: deposit.saturating_sub(discount),
        }
    }

    /// Whether a quoted price requires no payment capture.
    #[must_use]
    pub fn is_exempt(&self, quote: &Quote) -> bool {
        self.exempts(quote.final_price)
    }

    /// Whether a final price requires no payment capture.
    #[must_use]
    pub fn exempts(&self, final_price: Money) -> bool {
        final_price.is_zero() || final_price < self.minimum_payable
    }
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self::new(Money::from_cents(100))
    }
}
