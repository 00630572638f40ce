//! # Discount Aggregator
//!
//! Combines all redeemed rewards' discount effects into a single capped
//! discount against the order subtotal.
//!
//! Free-item rewards never appear here: the pricing calculator already
//! zero-priced those lines.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

/// One redeemed reward's discount effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum DiscountDirective {
    /// Percentage of the order subtotal, in basis points (1000 = 10%).
    Percentage { bps: u32 },
    /// Flat amount in cents.
    Fixed { cents: i64 },
}

impl DiscountDirective {
    /// The amount this directive contributes against `subtotal`.
    fn amount(&self, subtotal: Money) -> Money {
        match self {
            DiscountDirective::Percentage { bps } => subtotal.percentage_amount(*bps),
            DiscountDirective::Fixed { cents } => Money::from_cents(*cents),
        }
    }
}

/// Sums all directives' amounts and clamps the total to `[0, subtotal]`.
///
/// No combination of redemptions can make the payable total negative, and a
/// (misconfigured) negative fixed directive can never turn the "discount"
/// into a surcharge.
///
/// ## Example
/// ```rust
/// use perka_core::discount::{aggregate, DiscountDirective};
/// use perka_core::money::Money;
///
/// let subtotal = Money::from_cents(1000); // $10.00
/// let directives = [
///     DiscountDirective::Percentage { bps: 1000 }, // $1.00
///     DiscountDirective::Fixed { cents: 250 },     // $2.50
/// ];
/// assert_eq!(aggregate(subtotal, &directives).cents(), 350);
/// ```
pub fn aggregate(subtotal: Money, directives: &[DiscountDirective]) -> Money {
    let raw = directives
        .iter()
        .fold(Money::zero(), |acc, d| acc + d.amount(subtotal));

    raw.clamp_to(Money::zero(), subtotal)
}

// =============================================================================
// Unit Tests
// =============================================================================
