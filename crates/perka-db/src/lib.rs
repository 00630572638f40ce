//! # perka-db: Database Layer for the Perka Backend
//!
//! This crate provides database access for the Perka ordering & loyalty
//! backend. It uses SQLite for local storage with sqlx for async operations,
//! and owns the checkout transaction orchestrator.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Perka Data Flow                                  │
//! │                                                                         │
//! │  Caller (API handler, CLI, test)                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     perka-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │   Checkout   │  │   │
//! │  │   │   (pool.rs)   │    │ catalog/order │    │ orchestrator │  │   │
//! │  │   │               │    │ customer/     │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ reward        │◄───│ BEGIN        │  │   │
//! │  │   │ WAL mode      │    │               │    │ IMMEDIATE    │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database (perka.db)                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (catalog, customer, order, reward)
//! - [`checkout`] - The atomic checkout transaction
//!
//! ## Usage
//!
//! ```rust,ignore
//! use perka_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/perka.db")).await?;
//!
//! let products = db.catalog().list_products().await?;
//! let summary = db.checkout().checkout(&identity, &request).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod checkout;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use checkout::{CheckoutError, CheckoutRequest, CheckoutService, OrderSummary, RedemptionRequest};

// Repository re-exports for convenience
pub use repository::catalog::CatalogRepository;
pub use repository::customer::CustomerRepository;
pub use repository::order::{OrderLifecycleError, OrderRepository};
pub use repository::reward::{ClaimOutcome, ConsumeOutcome, RewardRepository};
