//! # Customer Repository
//!
//! Database operations for customer profiles and eligibility snapshots.
//!
//! ## Snapshot Assembly
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  CustomerSnapshot Assembly                              │
//! │                                                                         │
//! │  customers row ──────────► balance, tier, birth_date, joined_at,       │
//! │                            referral_count                              │
//! │                                                                         │
//! │  orders (this month,  ───► purchases_this_month                        │
//! │   not cancelled)                                                        │
//! │                                                                         │
//! │  orders (all, not     ───► lifetime_spend_cents                        │
//! │   cancelled)                                                            │
//! │                                                                         │
//! │  Assembled inside the checkout transaction so eligibility is judged    │
//! │  against committed state, never against client-cached numbers.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Datelike, TimeZone, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use perka_core::{Customer, CustomerSnapshot};

/// Repository for customer database operations.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Inserts a customer profile.
    pub async fn insert(&self, customer: &Customer) -> DbResult<()> {
        debug!(id = %customer.id, name = %customer.name, "Inserting customer");

        sqlx::query(
            r#"
            INSERT INTO customers (
                id, name, tier, points_balance,
                birth_date, referral_count, joined_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(customer.tier)
        .bind(customer.points_balance)
        .bind(customer.birth_date)
        .bind(customer.referral_count)
        .bind(customer.joined_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a customer by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Customer>> {
        let customer: Option<Customer> = sqlx::query_as(
            r#"
            SELECT id, name, tier, points_balance,
                   birth_date, referral_count, joined_at
            FROM customers
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Gets a customer's current points balance.
    pub async fn points_balance(&self, id: &str) -> DbResult<i64> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT points_balance FROM customers WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        balance.ok_or_else(|| DbError::not_found("Customer", id))
    }

    // =========================================================================
    // In-Transaction Operations
    // =========================================================================

    /// Assembles a customer's eligibility snapshot inside an open transaction.
    ///
    /// Cancelled orders count toward neither monthly purchases nor lifetime
    /// spend.
    pub async fn snapshot_in_tx(
        conn: &mut SqliteConnection,
        customer_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<CustomerSnapshot> {
        let customer: Customer = sqlx::query_as(
            r#"
            SELECT id, name, tier, points_balance,
                   birth_date, referral_count, joined_at
            FROM customers
            WHERE id = ?1
            "#,
        )
        .bind(customer_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Customer", customer_id))?;

        // Calendar month boundary in UTC; timestamps are stored as RFC3339
        // UTC text so the comparison is well-defined
        let month_start = Utc
            .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
            .single()
            .unwrap_or(now);

        let purchases_this_month: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM orders
            WHERE customer_id = ?1 AND status != 'cancelled' AND created_at >= ?2
            "#,
        )
        .bind(customer_id)
        .bind(month_start)
        .fetch_one(&mut *conn)
        .await?;

        let lifetime_spend_cents: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(total_cents) FROM orders
            WHERE customer_id = ?1 AND status != 'cancelled'
            "#,
        )
        .bind(customer_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(CustomerSnapshot {
            customer_id: customer.id,
            points_balance: customer.points_balance,
            purchases_this_month,
            lifetime_spend_cents: lifetime_spend_cents.unwrap_or(0),
            tier: customer.tier,
            birth_date: customer.birth_date,
            joined_at: customer.joined_at,
            referral_count: customer.referral_count,
        })
    }
}
