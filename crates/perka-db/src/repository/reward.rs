//! # Reward Repository
//!
//! Reward definitions plus the redemption ledger: claims, vouchers, usage
//! records, and the points ledger.
//!
//! ## Redemption Ledger
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Redemption Ledger                                  │
//! │                                                                         │
//! │  claimed_rewards        one row per (customer, claim event);           │
//! │                         `used` flips once when spent                   │
//! │                                                                         │
//! │  customer_vouchers      single-use instances; status is the            │
//! │                         concurrency gate (active → claimed)            │
//! │                                                                         │
//! │  reward_usage_records   append-only audit trail per consumption        │
//! │                                                                         │
//! │  points_transactions    append-only; the customers.points_balance      │
//! │                         counter moves in the same transaction          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Compare-And-Update Guards
//! The two races that matter at checkout are settled by conditional UPDATEs,
//! never by read-then-write:
//! - points: `SET points_balance = points_balance - ?cost
//!            WHERE id = ? AND points_balance >= ?cost`
//! - voucher: `SET status = 'claimed' WHERE id = ? AND status = 'active'`
//! `rows_affected() == 0` is the loser's signal.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use perka_core::{
    ClaimedReward, CustomerVoucher, PointsTransaction, PointsTxKind, Reward, RewardKind,
    RewardUsageRecord, VoucherStatus,
};

/// Outcome of claiming a general (non-voucher) reward.
#[derive(Debug)]
pub enum ClaimOutcome {
    /// Claim recorded; points (if any) were deducted.
    Claimed(ClaimedReward),
    /// The customer already holds a claim and the reward forbids repeats.
    AlreadyClaimed,
    /// The conditional balance decrement matched no row.
    InsufficientPoints { balance: i64 },
}

/// Outcome of consuming a voucher instance.
#[derive(Debug, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// This transaction won the active→claimed flip.
    Consumed,
    /// The voucher was not active when the UPDATE ran (already consumed,
    /// expired, or racing consumption lost).
    NotActive,
}

/// Raw rewards row; criteria and free_product_ids are JSON TEXT columns.
#[derive(sqlx::FromRow)]
struct RewardRow {
    id: String,
    kind: RewardKind,
    name: String,
    points_cost: i64,
    percent_discount_bps: Option<u32>,
    fixed_discount_cents: Option<i64>,
    free_product_ids: String,
    allow_multiple_claims: bool,
    is_active: bool,
    criteria: String,
}

impl RewardRow {
    fn into_reward(self) -> DbResult<Reward> {
        Ok(Reward {
            id: self.id,
            kind: self.kind,
            name: self.name,
            points_cost: self.points_cost,
            percent_discount_bps: self.percent_discount_bps,
            fixed_discount_cents: self.fixed_discount_cents,
            free_product_ids: serde_json::from_str(&self.free_product_ids)?,
            allow_multiple_claims: self.allow_multiple_claims,
            is_active: self.is_active,
            criteria: serde_json::from_str(&self.criteria)?,
        })
    }
}

const REWARD_COLUMNS: &str = r#"
    id, kind, name, points_cost,
    percent_discount_bps, fixed_discount_cents,
    free_product_ids, allow_multiple_claims, is_active, criteria
"#;

/// Repository for reward definitions and the redemption ledger.
#[derive(Debug, Clone)]
pub struct RewardRepository {
    pool: SqlitePool,
}

impl RewardRepository {
    /// Creates a new RewardRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RewardRepository { pool }
    }

    // =========================================================================
    // Reward Definitions
    // =========================================================================

    /// Inserts a reward definition.
    pub async fn insert_reward(&self, reward: &Reward) -> DbResult<()> {
        debug!(id = %reward.id, name = %reward.name, "Inserting reward");

        let free_product_ids = serde_json::to_string(&reward.free_product_ids)?;
        let criteria = serde_json::to_string(&reward.criteria)?;

        sqlx::query(
            r#"
            INSERT INTO rewards (
                id, kind, name, points_cost,
                percent_discount_bps, fixed_discount_cents,
                free_product_ids, allow_multiple_claims, is_active, criteria
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&reward.id)
        .bind(reward.kind)
        .bind(&reward.name)
        .bind(reward.points_cost)
        .bind(reward.percent_discount_bps)
        .bind(reward.fixed_discount_cents)
        .bind(free_product_ids)
        .bind(reward.allow_multiple_claims)
        .bind(reward.is_active)
        .bind(criteria)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a reward definition by ID.
    pub async fn get_reward(&self, id: &str) -> DbResult<Option<Reward>> {
        let row: Option<RewardRow> = sqlx::query_as(&format!(
            "SELECT {REWARD_COLUMNS} FROM rewards WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RewardRow::into_reward).transpose()
    }

    /// Lists all active reward definitions.
    pub async fn list_active(&self) -> DbResult<Vec<Reward>> {
        let rows: Vec<RewardRow> = sqlx::query_as(&format!(
            "SELECT {REWARD_COLUMNS} FROM rewards WHERE is_active = 1 ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RewardRow::into_reward).collect()
    }

    // =========================================================================
    // Vouchers
    // =========================================================================

    /// Grants a voucher instance of a voucher-style reward to a customer.
    pub async fn grant_voucher(
        &self,
        customer_id: &str,
        reward_id: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> DbResult<CustomerVoucher> {
        let voucher = CustomerVoucher {
            id: Uuid::new_v4().to_string(),
            customer_id: customer_id.to_string(),
            reward_id: reward_id.to_string(),
            status: VoucherStatus::Active,
            expires_at,
            granted_at: Utc::now(),
            consumed_by_order_id: None,
        };

        debug!(id = %voucher.id, customer_id = %customer_id, "Granting voucher");

        sqlx::query(
            r#"
            INSERT INTO customer_vouchers (
                id, customer_id, reward_id, status,
                expires_at, granted_at, consumed_by_order_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&voucher.id)
        .bind(&voucher.customer_id)
        .bind(&voucher.reward_id)
        .bind(voucher.status)
        .bind(voucher.expires_at)
        .bind(voucher.granted_at)
        .bind(&voucher.consumed_by_order_id)
        .execute(&self.pool)
        .await?;

        Ok(voucher)
    }

    /// Gets a voucher by ID.
    pub async fn get_voucher(&self, id: &str) -> DbResult<Option<CustomerVoucher>> {
        let voucher: Option<CustomerVoucher> = sqlx::query_as(
            r#"
            SELECT id, customer_id, reward_id, status,
                   expires_at, granted_at, consumed_by_order_id
            FROM customer_vouchers
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(voucher)
    }

    /// Lists a customer's vouchers, newest first.
    pub async fn list_vouchers(&self, customer_id: &str) -> DbResult<Vec<CustomerVoucher>> {
        let vouchers: Vec<CustomerVoucher> = sqlx::query_as(
            r#"
            SELECT id, customer_id, reward_id, status,
                   expires_at, granted_at, consumed_by_order_id
            FROM customer_vouchers
            WHERE customer_id = ?1
            ORDER BY granted_at DESC
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(vouchers)
    }

    /// Marks every active voucher whose expiry has passed as expired.
    ///
    /// ## When To Call
    /// Periodic sweep. Checkout does not depend on it: expiry is also
    /// checked inline against the transaction clock, so an un-swept voucher
    /// is still rejected at consumption time.
    pub async fn expire_due_vouchers(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE customer_vouchers SET status = 'expired'
            WHERE status = 'active' AND expires_at IS NOT NULL AND expires_at <= ?1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        let swept = result.rows_affected();
        if swept > 0 {
            debug!(count = swept, "Expired due vouchers");
        }

        Ok(swept)
    }

    // =========================================================================
    // Ledger Queries
    // =========================================================================

    /// Gets a customer's claims, newest first.
    pub async fn list_claims(&self, customer_id: &str) -> DbResult<Vec<ClaimedReward>> {
        let claims: Vec<ClaimedReward> = sqlx::query_as(
            r#"
            SELECT id, customer_id, reward_id, used, claimed_at
            FROM claimed_rewards
            WHERE customer_id = ?1
            ORDER BY claimed_at DESC
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(claims)
    }

    /// Gets the usage records for an order.
    pub async fn usage_for_order(&self, order_id: &str) -> DbResult<Vec<RewardUsageRecord>> {
        let records: Vec<RewardUsageRecord> = sqlx::query_as(
            r#"
            SELECT id, reward_id, voucher_id, order_id, customer_id,
                   discount_applied_cents, free_items_json, used_at
            FROM reward_usage_records
            WHERE order_id = ?1
            ORDER BY used_at
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Gets a customer's points ledger, newest first.
    pub async fn points_history(&self, customer_id: &str) -> DbResult<Vec<PointsTransaction>> {
        let entries: Vec<PointsTransaction> = sqlx::query_as(
            r#"
            SELECT id, customer_id, kind, delta, order_id, reward_id, created_at
            FROM points_transactions
            WHERE customer_id = ?1
            ORDER BY created_at DESC
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    // =========================================================================
    // In-Transaction Operations
    // =========================================================================

    /// Gets a reward definition inside an open transaction.
    pub async fn get_reward_in_tx(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<Reward>> {
        let row: Option<RewardRow> = sqlx::query_as(&format!(
            "SELECT {REWARD_COLUMNS} FROM rewards WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(RewardRow::into_reward).transpose()
    }

    /// Gets a voucher inside an open transaction.
    pub async fn get_voucher_in_tx(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<CustomerVoucher>> {
        let voucher: Option<CustomerVoucher> = sqlx::query_as(
            r#"
            SELECT id, customer_id, reward_id, status,
                   expires_at, granted_at, consumed_by_order_id
            FROM customer_vouchers
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(voucher)
    }

    /// Claims a general (non-voucher) reward for a customer.
    ///
    /// ## Sequence
    /// 1. Duplicate gate: an existing claim row blocks the claim unless the
    ///    reward allows repeats
    /// 2. Points gate: conditional decrement, zero rows means the balance
    ///    was short at execution time
    /// 3. Claim row + Redeemed ledger row
    pub async fn claim_general_reward(
        conn: &mut SqliteConnection,
        customer_id: &str,
        reward: &Reward,
        now: DateTime<Utc>,
    ) -> DbResult<ClaimOutcome> {
        if !reward.allow_multiple_claims {
            let existing: i64 = sqlx::query_scalar(
                r#"
                SELECT COUNT(*) FROM claimed_rewards
                WHERE customer_id = ?1 AND reward_id = ?2
                "#,
            )
            .bind(customer_id)
            .bind(&reward.id)
            .fetch_one(&mut *conn)
            .await?;

            if existing > 0 {
                return Ok(ClaimOutcome::AlreadyClaimed);
            }
        }

        if reward.points_cost > 0 {
            let result = sqlx::query(
                r#"
                UPDATE customers SET points_balance = points_balance - ?2
                WHERE id = ?1 AND points_balance >= ?2
                "#,
            )
            .bind(customer_id)
            .bind(reward.points_cost)
            .execute(&mut *conn)
            .await?;

            if result.rows_affected() == 0 {
                let balance: i64 =
                    sqlx::query_scalar("SELECT points_balance FROM customers WHERE id = ?1")
                        .bind(customer_id)
                        .fetch_optional(&mut *conn)
                        .await?
                        .ok_or_else(|| DbError::not_found("Customer", customer_id))?;

                return Ok(ClaimOutcome::InsufficientPoints { balance });
            }

            let tx = PointsTransaction {
                id: Uuid::new_v4().to_string(),
                customer_id: customer_id.to_string(),
                kind: PointsTxKind::Redeemed,
                delta: -reward.points_cost,
                order_id: None,
                reward_id: Some(reward.id.clone()),
                created_at: now,
            };
            Self::insert_points_tx(conn, &tx).await?;
        }

        let claim = ClaimedReward {
            id: Uuid::new_v4().to_string(),
            customer_id: customer_id.to_string(),
            reward_id: reward.id.clone(),
            used: false,
            claimed_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO claimed_rewards (id, customer_id, reward_id, used, claimed_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&claim.id)
        .bind(&claim.customer_id)
        .bind(&claim.reward_id)
        .bind(claim.used)
        .bind(claim.claimed_at)
        .execute(&mut *conn)
        .await?;

        debug!(customer_id = %customer_id, reward_id = %reward.id, "Reward claimed");

        Ok(ClaimOutcome::Claimed(claim))
    }

    /// Marks a claim as used (spent at checkout).
    pub async fn mark_claim_used(conn: &mut SqliteConnection, claim_id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE claimed_rewards SET used = 1 WHERE id = ?1")
            .bind(claim_id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Claim", claim_id));
        }

        Ok(())
    }

    /// Consumes a voucher instance: the active→claimed flip.
    ///
    /// The UPDATE itself is the concurrency gate. Under two simultaneous
    /// checkouts exactly one matches the `status = 'active'` predicate; the
    /// other sees zero rows and gets [`ConsumeOutcome::NotActive`].
    pub async fn consume_voucher(
        conn: &mut SqliteConnection,
        voucher_id: &str,
        order_id: &str,
    ) -> DbResult<ConsumeOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE customer_vouchers
            SET status = 'claimed', consumed_by_order_id = ?2
            WHERE id = ?1 AND status = 'active'
            "#,
        )
        .bind(voucher_id)
        .bind(order_id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(ConsumeOutcome::NotActive);
        }

        debug!(voucher_id = %voucher_id, order_id = %order_id, "Voucher consumed");

        Ok(ConsumeOutcome::Consumed)
    }

    /// Appends a usage record.
    pub async fn record_usage(
        conn: &mut SqliteConnection,
        record: &RewardUsageRecord,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reward_usage_records (
                id, reward_id, voucher_id, order_id, customer_id,
                discount_applied_cents, free_items_json, used_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&record.id)
        .bind(&record.reward_id)
        .bind(&record.voucher_id)
        .bind(&record.order_id)
        .bind(&record.customer_id)
        .bind(record.discount_applied_cents)
        .bind(&record.free_items_json)
        .bind(record.used_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Credits earned loyalty points: ledger row plus balance increment,
    /// inside the caller's transaction so the two never drift.
    pub async fn credit_loyalty_points(
        conn: &mut SqliteConnection,
        customer_id: &str,
        points: i64,
        order_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        if points <= 0 {
            return Ok(());
        }

        let result = sqlx::query(
            r#"
            UPDATE customers SET points_balance = points_balance + ?2
            WHERE id = ?1
            "#,
        )
        .bind(customer_id)
        .bind(points)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", customer_id));
        }

        let tx = PointsTransaction {
            id: Uuid::new_v4().to_string(),
            customer_id: customer_id.to_string(),
            kind: PointsTxKind::Earned,
            delta: points,
            order_id: Some(order_id.to_string()),
            reward_id: None,
            created_at: now,
        };
        Self::insert_points_tx(conn, &tx).await?;

        Ok(())
    }

    async fn insert_points_tx(
        conn: &mut SqliteConnection,
        tx: &PointsTransaction,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO points_transactions (
                id, customer_id, kind, delta, order_id, reward_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&tx.id)
        .bind(&tx.customer_id)
        .bind(tx.kind)
        .bind(tx.delta)
        .bind(&tx.order_id)
        .bind(&tx.reward_id)
        .bind(tx.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
