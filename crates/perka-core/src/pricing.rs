//! # Pricing Calculator
//!
//! Resolves a cart line (product + selected options) into a priced line.
//!
//! ## Pricing Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Cart line: { product_id, quantity, option_ids }                    │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  Catalog re-fetch (db layer) — client prices are NEVER trusted      │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  price_line() ← THIS MODULE                                         │
//! │    unit price = base price + Σ selected option modifiers            │
//! │    reward free item? → unit price forced to zero                    │
//! │    line total = unit price × quantity                               │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Stale Option References
//! Unknown or inactive option ids are skipped with a warn, not fatal.
//! Clients cache menus; a stale option reference should not kill the whole
//! checkout when the product itself is still orderable.

use serde::{Deserialize, Serialize};
use tracing::warn;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Product, ProductOption};

// =============================================================================
// Input / Output Types
// =============================================================================

/// One line of an incoming checkout cart, as sent by a client.
///
/// Carries references only; prices are resolved server-side.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: String,
    pub quantity: i64,
    /// Chosen option ids (at most one per option group, client-enforced;
    /// duplicates within a group are tolerated and simply summed).
    pub option_ids: Vec<String>,
}

/// An option resolved during pricing, ready to snapshot onto the line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PricedOption {
    pub option_id: String,
    pub label: String,
    pub price_modifier_cents: i64,
}

/// A fully priced cart line.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PricedLine {
    pub product_id: String,
    /// Product name at pricing time, for the line-item snapshot.
    pub name_snapshot: String,
    pub quantity: i64,
    /// Post-option, pre-reward unit price.
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
    pub is_reward_item: bool,
    pub selected_options: Vec<PricedOption>,
}

// =============================================================================
// Pricing
// =============================================================================

/// Prices one cart line against the authoritative catalog rows.
///
/// ## Arguments
/// * `product` - the re-fetched catalog product
/// * `available_options` - the product's currently valid options
/// * `line` - the client's cart line (quantity already validated positive)
/// * `is_reward_item` - true when a reward granted this line for free
///
/// ## Errors
/// * [`CoreError::ProductUnavailable`] when the product cannot be ordered
///
/// ## Behavior
/// * unit price = base price + sum of modifiers of resolvable options
/// * option ids that do not resolve are skipped with a warn
/// * reward free items are forced to a zero unit price regardless of the
///   computed value; the computed options are still snapshotted so the
///   receipt shows what was customized
pub fn price_line(
    product: &Product,
    available_options: &[ProductOption],
    line: &CartLine,
    is_reward_item: bool,
) -> CoreResult<PricedLine> {
    if !product.is_orderable() {
        return Err(CoreError::ProductUnavailable {
            name: product.name.clone(),
        });
    }

    let mut selected = Vec::with_capacity(line.option_ids.len());
    let mut unit_price = product.base_price();

    for option_id in &line.option_ids {
        match available_options
            .iter()
            .find(|o| &o.id == option_id && o.is_active)
        {
            Some(option) => {
                unit_price += option.price_modifier();
                selected.push(PricedOption {
                    option_id: option.id.clone(),
                    label: option.label.clone(),
                    price_modifier_cents: option.price_modifier_cents,
                });
            }
            None => {
                // Stale client-side option reference; tolerated by design
                warn!(
                    product_id = %product.id,
                    option_id = %option_id,
                    "Skipping unknown option id on cart line"
                );
            }
        }
    }

    if is_reward_item {
        unit_price = Money::zero();
    }

    let line_total = unit_price.multiply_quantity(line.quantity);

    Ok(PricedLine {
        product_id: product.id.clone(),
        name_snapshot: product.name.clone(),
        quantity: line.quantity,
        unit_price_cents: unit_price.cents(),
        line_total_cents: line_total.cents(),
        is_reward_item,
        selected_options: selected,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Availability;
    use chrono::Utc;

    fn product(price_cents: i64) -> Product {
        Product {
            id: "p1".to_string(),
            name: "Flat White".to_string(),
            description: None,
            base_price_cents: price_cents,
            availability: Availability::Available,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn option(id: &str, modifier: i64) -> ProductOption {
        ProductOption {
            id: id.to_string(),
            product_id: "p1".to_string(),
            group_label: "Size".to_string(),
            label: format!("Option {}", id),
            price_modifier_cents: modifier,
            is_active: true,
        }
    }

    fn line(qty: i64, option_ids: &[&str]) -> CartLine {
        CartLine {
            product_id: "p1".to_string(),
            quantity: qty,
            option_ids: option_ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_base_price_no_options() {
        let priced = price_line(&product(450), &[], &line(2, &[]), false).unwrap();
        assert_eq!(priced.unit_price_cents, 450);
        assert_eq!(priced.line_total_cents, 900);
        assert!(priced.selected_options.is_empty());
    }

    #[test]
    fn test_option_modifiers_summed() {
        let options = vec![option("large", 50), option("oat", 75)];
        let priced =
            price_line(&product(450), &options, &line(1, &["large", "oat"]), false).unwrap();
        assert_eq!(priced.unit_price_cents, 575);
        assert_eq!(priced.selected_options.len(), 2);
    }

    #[test]
    fn test_unknown_option_skipped_not_fatal() {
        let options = vec![option("large", 50)];
        let priced =
            price_line(&product(450), &options, &line(1, &["large", "ghost"]), false).unwrap();
        assert_eq!(priced.unit_price_cents, 500);
        assert_eq!(priced.selected_options.len(), 1);
    }

    #[test]
    fn test_inactive_option_skipped() {
        let mut retired = option("old", 100);
        retired.is_active = false;
        let priced = price_line(&product(450), &[retired], &line(1, &["old"]), false).unwrap();
        assert_eq!(priced.unit_price_cents, 450);
    }

    #[test]
    fn test_reward_item_forced_to_zero() {
        let options = vec![option("large", 50)];
        let priced = price_line(&product(450), &options, &line(1, &["large"]), true).unwrap();
        assert_eq!(priced.unit_price_cents, 0);
        assert_eq!(priced.line_total_cents, 0);
        assert!(priced.is_reward_item);
        // Options still snapshotted for the receipt
        assert_eq!(priced.selected_options.len(), 1);
    }

    #[test]
    fn test_unavailable_product_rejected() {
        let mut p = product(450);
        p.availability = Availability::Unavailable;
        let err = price_line(&p, &[], &line(1, &[]), false).unwrap_err();
        match err {
            CoreError::ProductUnavailable { name } => assert_eq!(name, "Flat White"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_inactive_product_rejected() {
        let mut p = product(450);
        p.is_active = false;
        assert!(matches!(
            price_line(&p, &[], &line(1, &[]), false),
            Err(CoreError::ProductUnavailable { .. })
        ));
    }

    #[test]
    fn test_negative_modifier() {
        let options = vec![option("small", -50)];
        let priced = price_line(&product(450), &options, &line(3, &["small"]), false).unwrap();
        assert_eq!(priced.unit_price_cents, 400);
        assert_eq!(priced.line_total_cents, 1200);
    }
}
