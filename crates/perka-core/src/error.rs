//! # Error Types
//!
//! Domain-specific error types for perka-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                 │
//! │                                                                     │
//! │  perka-core errors (this file)                                      │
//! │  ├── CoreError        - business-rule failures during pricing       │
//! │  ├── ValidationError  - input rejected before any store mutation    │
//! │  └── Ineligible       - eligibility reason (criteria module)        │
//! │                                                                     │
//! │  perka-db errors (separate crate)                                   │
//! │  ├── DbError          - infrastructure failures                     │
//! │  └── CheckoutError    - full checkout taxonomy for callers          │
//! │                                                                     │
//! │  Flow: ValidationError → CoreError → CheckoutError → caller         │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. `thiserror` derives, never manual Display impls
//! 2. Business failures carry the specific context end users see
//!    (product name, reward id), infrastructure failures stay opaque
//! 3. Errors are enum variants, never bare Strings

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These are *expected* business failures: reported with a specific reason
/// and distinct from infrastructure failures, which the db layer wraps
/// separately.
/// Not-found failures are raised by the db layer, which is the only place a
/// lookup can actually miss; core code never fabricates them.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product exists but cannot currently be ordered.
    ///
    /// Carries the product *name* so the failure message identifies the
    /// offending item to the customer, not an opaque id.
    #[error("'{name}' is currently unavailable")]
    ProductUnavailable { name: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Rejected before any store mutation, so no rollback is ever needed for
/// these.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// The same reward/voucher reference appears twice in one request.
    #[error("Duplicate redemption reference: {reference}")]
    DuplicateRedemption { reference: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_message_names_product() {
        let err = CoreError::ProductUnavailable {
            name: "Flat White".to_string(),
        };
        assert_eq!(err.to_string(), "'Flat White' is currently unavailable");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::MustBePositive {
            field: "quantity".to_string(),
        };
        assert_eq!(err.to_string(), "quantity must be positive");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "product_id".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
