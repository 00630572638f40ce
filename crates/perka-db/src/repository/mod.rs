//! # Repository Module
//!
//! Database repository implementations for the Perka backend.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  The Repository pattern abstracts database access behind a clean API.  │
//! │                                                                         │
//! │  Caller                                                                 │
//! │       │                                                                 │
//! │       │  db.catalog().get_product(id)                                   │
//! │       │  ↓                                                              │
//! │       ▼                                                                 │
//! │  CatalogRepository                                                     │
//! │  ├── list_products(&self)                                              │
//! │  ├── get_product(&self, id)                                            │
//! │  ├── insert_product(&self, product)                                    │
//! │  └── set_availability(&self, id, availability)                         │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Two Calling Conventions
//!
//! Each repository exposes pool-level methods (`&self`, for standalone
//! operations) and `*_in_tx` associated functions taking a
//! `&mut SqliteConnection`. The checkout orchestrator composes the in-tx
//! functions inside a single `BEGIN IMMEDIATE` transaction so that pricing,
//! eligibility, and ledger writes observe one consistent database state.
//!
//! ## Available Repositories
//!
//! - [`catalog::CatalogRepository`] - Products and product options
//! - [`customer::CustomerRepository`] - Profiles and eligibility snapshots
//! - [`order::OrderRepository`] - Orders, line items, status transitions
//! - [`reward::RewardRepository`] - Reward definitions and the redemption ledger

pub mod catalog;
pub mod customer;
pub mod order;
pub mod reward;
