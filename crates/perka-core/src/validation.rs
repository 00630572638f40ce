//! # Validation Module
//!
//! Early input validation for checkout requests.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                              │
//! │                                                                     │
//! │  Layer 1: Client app — immediate feedback, not trusted              │
//! │  Layer 2: THIS MODULE — rejected before the transaction begins,     │
//! │           so nothing ever needs rolling back for bad input          │
//! │  Layer 3: SQLite — NOT NULL / UNIQUE / FK constraints               │
//! │                                                                     │
//! │  Defense in depth: different layers catch different errors          │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::pricing::CartLine;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum cart lines in a single checkout.
///
/// ## Business Reason
/// Prevents runaway carts and keeps the checkout transaction bounded.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity of a single line.
///
/// ## Business Reason
/// Prevents accidental over-ordering (typing 1000 instead of 10).
pub const MAX_LINE_QUANTITY: i64 = 999;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed [`MAX_LINE_QUANTITY`]
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

// =============================================================================
// Cart Validators
// =============================================================================

/// Validates the shape of a whole cart before any store access.
///
/// ## Rules
/// - At least one line
/// - At most [`MAX_CART_LINES`] lines
/// - Every line has a product id and a valid quantity
pub fn validate_cart(lines: &[CartLine]) -> ValidationResult<()> {
    if lines.is_empty() {
        return Err(ValidationError::Required {
            field: "cart lines".to_string(),
        });
    }

    if lines.len() > MAX_CART_LINES {
        return Err(ValidationError::OutOfRange {
            field: "cart lines".to_string(),
            min: 1,
            max: MAX_CART_LINES as i64,
        });
    }

    for line in lines {
        if line.product_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "product_id".to_string(),
            });
        }
        validate_quantity(line.quantity)?;
    }

    Ok(())
}

/// Rejects a redemption list that references the same reward or voucher
/// twice: a single checkout may spend each reference at most once.
pub fn validate_unique_references<'a, I>(references: I) -> ValidationResult<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: Vec<&str> = Vec::new();
    for reference in references {
        if seen.contains(&reference) {
            return Err(ValidationError::DuplicateRedemption {
                reference: reference.to_string(),
            });
        }
        seen.push(reference);
    }
    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string format.
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line(product_id: &str, qty: i64) -> CartLine {
        CartLine {
            product_id: product_id.to_string(),
            quantity: qty,
            option_ids: vec![],
        }
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_cart_rejects_empty() {
        assert!(validate_cart(&[]).is_err());
    }

    #[test]
    fn test_validate_cart_rejects_bad_lines() {
        assert!(validate_cart(&[line("", 1)]).is_err());
        assert!(validate_cart(&[line("p1", 0)]).is_err());
        assert!(validate_cart(&[line("p1", 2), line("p2", -3)]).is_err());
    }

    #[test]
    fn test_validate_cart_accepts_good_lines() {
        assert!(validate_cart(&[line("p1", 2), line("p2", 1)]).is_ok());
    }

    #[test]
    fn test_validate_cart_size_cap() {
        let lines: Vec<CartLine> = (0..=MAX_CART_LINES).map(|i| line(&format!("p{i}"), 1)).collect();
        assert!(validate_cart(&lines).is_err());
    }

    #[test]
    fn test_unique_references() {
        assert!(validate_unique_references(["r1", "r2"]).is_ok());
        assert!(validate_unique_references(["r1", "r2", "r1"]).is_err());
        assert!(validate_unique_references([]).is_ok());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("").is_err());
        assert!(validate_uuid("not-a-uuid").is_err());
    }
}
