//! # perka-core: Pure Business Logic for the Perka Backend
//!
//! This crate is the heart of the checkout & reward redemption engine. It
//! contains all business logic as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      Perka Checkout Pipeline                        │
//! │                                                                     │
//! │  Checkout request (identity + cart + redemptions)                   │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  ┌─────────────────────────────────────────────────────────────┐   │
//! │  │                 ★ perka-core (THIS CRATE) ★                  │   │
//! │  │                                                              │   │
//! │  │  ┌─────────┐ ┌──────────┐ ┌────────────┐ ┌──────────────┐  │   │
//! │  │  │  money  │ │ pricing  │ │  criteria  │ │   discount   │  │   │
//! │  │  │  Money  │ │price_line│ │  evaluate  │ │  aggregate   │  │   │
//! │  │  └─────────┘ └──────────┘ └────────────┘ └──────────────┘  │   │
//! │  │                                                              │   │
//! │  │  NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS          │   │
//! │  └─────────────────────────────────────────────────────────────┘   │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  perka-db: repositories, redemption ledger, checkout transaction    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Order, Reward, ledger rows, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`pricing`] - Pricing calculator (base + options, reward zero-pricing)
//! - [`criteria`] - Eligibility evaluator (ordered predicates, first reason)
//! - [`discount`] - Discount aggregator (summed, clamped to subtotal)
//! - [`validation`] - Pre-transaction input validation
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: deterministic given a snapshot and a clock value
//! 2. **No I/O**: database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: all monetary values are cents (i64), never floats
//! 4. **Explicit Errors**: all errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod criteria;
pub mod discount;
pub mod error;
pub mod money;
pub mod pricing;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use perka_core::Money` instead of
// `use perka_core::money::Money`.

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;
