//! # Checkout Transaction Orchestrator
//!
//! Composes pricing, eligibility, discount aggregation, and the redemption
//! ledger into one atomic SQLite transaction.
//!
//! ## Transaction Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Checkout Transaction                                │
//! │                                                                         │
//! │  validate request (shape only, no store access)                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN IMMEDIATE  ← takes the write lock up front                      │
//! │       │                                                                 │
//! │       ├── 1. resolve redemptions (rewards + voucher instances)         │
//! │       ├── 2. eligibility: fresh snapshot per general redemption        │
//! │       ├── 3. append free-item lines, price every line off the catalog  │
//! │       ├── 4. aggregate discounts, clamp to subtotal                    │
//! │       ├── 5. insert order → line items → selected options             │
//! │       ├── 6. ledger: claim rewards / consume vouchers / usage rows    │
//! │       ├── 7. credit earned loyalty points (customers only)            │
//! │       ▼                                                                 │
//! │  COMMIT on success, ROLLBACK on any error                              │
//! │                                                                         │
//! │  Partial effects are impossible: either the order plus every ledger    │
//! │  row exists, or none of it does.                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Why BEGIN IMMEDIATE
//! A deferred SQLite transaction upgrades to a write lock at its first
//! write, which can fail mid-flight with a busy-snapshot error when another
//! writer committed in between. Taking the reserved lock at BEGIN serializes
//! checkout transactions outright, so the voucher compare-and-update always
//! sees the latest committed status and the losing side of a race gets a
//! clean zero-rows result instead of a retry storm.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, instrument, warn};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::DbError;
use crate::repository::catalog::CatalogRepository;
use crate::repository::customer::CustomerRepository;
use crate::repository::order::OrderRepository;
use crate::repository::reward::{ClaimOutcome, ConsumeOutcome, RewardRepository};
use perka_core::{
    criteria,
    discount::{aggregate, DiscountDirective},
    pricing::{self, CartLine},
    validation, CoreError, CustomerVoucher, Identity, Money, Order, OrderLineItem, OrderStatus,
    Reward, RewardUsageRecord, SelectedOption, ValidationError,
};

// =============================================================================
// Request / Response Types
// =============================================================================

/// One redemption the client wants applied to this checkout.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum RedemptionRequest {
    /// A non-voucher reward, claimed and spent in this checkout.
    General { reward_id: String },
    /// A previously granted voucher instance.
    Voucher { voucher_id: String },
}

impl RedemptionRequest {
    /// The id this request spends; each may appear at most once per checkout.
    pub fn reference(&self) -> &str {
        match self {
            RedemptionRequest::General { reward_id } => reward_id,
            RedemptionRequest::Voucher { voucher_id } => voucher_id,
        }
    }
}

/// A full checkout request.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub lines: Vec<CartLine>,
    #[serde(default)]
    pub redemptions: Vec<RedemptionRequest>,
}

/// What the caller gets back from a committed checkout.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub order_id: String,
    pub ticket_number: String,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    /// Loyalty points credited by this order; zero for staff checkouts.
    pub points_earned: i64,
    pub items: Vec<OrderLineItem>,
}

// =============================================================================
// Errors
// =============================================================================

/// Business-level checkout failures.
///
/// Every variant except `Db` is a deterministic verdict about the request;
/// `Db` is infrastructure. All of them roll the transaction back.
#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("Invalid checkout request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("'{name}' is currently unavailable")]
    ProductUnavailable { name: String },

    #[error("Reward not found: {0}")]
    RewardNotFound(String),

    #[error("Voucher not found: {0}")]
    VoucherNotFound(String),

    /// The reward is voucher-style and must be spent through a granted
    /// voucher instance, not redeemed directly.
    #[error("Reward {reward_id} must be redeemed through a voucher")]
    VoucherRequired { reward_id: String },

    #[error("Not eligible for reward {reward_id}: {reason}")]
    Ineligible { reward_id: String, reason: String },

    #[error("Insufficient points: requires {required}, you have {balance}")]
    InsufficientPoints { required: i64, balance: i64 },

    #[error("Reward {reward_id} has already been claimed")]
    AlreadyClaimed { reward_id: String },

    #[error("Voucher {voucher_id} is not usable: {reason}")]
    VoucherNotUsable { voucher_id: String, reason: String },

    /// The voucher's active→claimed flip matched no row: another checkout
    /// spent it first.
    #[error("Voucher {voucher_id} was consumed by a concurrent checkout")]
    ConcurrentRedemption { voucher_id: String },

    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<CoreError> for CheckoutError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ProductUnavailable { name } => CheckoutError::ProductUnavailable { name },
            CoreError::Validation(v) => CheckoutError::Validation(v),
        }
    }
}

impl From<sqlx::Error> for CheckoutError {
    fn from(err: sqlx::Error) -> Self {
        CheckoutError::Db(err.into())
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// A redemption resolved against committed state, ready to apply.
struct ResolvedRedemption {
    reward: Reward,
    voucher: Option<CustomerVoucher>,
}

/// The checkout transaction orchestrator.
#[derive(Debug, Clone)]
pub struct CheckoutService {
    pool: SqlitePool,
}

impl CheckoutService {
    /// Creates a new CheckoutService.
    pub fn new(pool: SqlitePool) -> Self {
        CheckoutService { pool }
    }

    /// Runs a full checkout.
    ///
    /// ## Atomicity
    /// Everything after validation happens inside a single `BEGIN IMMEDIATE`
    /// transaction. Any error rolls back: no order row, no ledger row, no
    /// balance movement survives a failed checkout.
    #[instrument(skip(self, request), fields(lines = request.lines.len(), redemptions = request.redemptions.len()))]
    pub async fn checkout(
        &self,
        identity: &Identity,
        request: &CheckoutRequest,
    ) -> Result<OrderSummary, CheckoutError> {
        // Shape validation before any store access; nothing to roll back
        validation::validate_cart(&request.lines)?;
        validation::validate_unique_references(
            request.redemptions.iter().map(|r| r.reference()),
        )?;

        if !request.redemptions.is_empty() && identity.customer_id().is_none() {
            return Err(ValidationError::Required {
                field: "customer identity (redemptions)".to_string(),
            }
            .into());
        }

        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;

        sqlx::query("BEGIN IMMEDIATE").execute(conn.as_mut()).await?;

        match Self::run(conn.as_mut(), identity, request).await {
            Ok(summary) => {
                sqlx::query("COMMIT").execute(conn.as_mut()).await?;
                info!(
                    order_id = %summary.order_id,
                    total_cents = summary.total_cents,
                    "Checkout committed"
                );
                Ok(summary)
            }
            Err(err) => {
                if let Err(rollback_err) = sqlx::query("ROLLBACK").execute(conn.as_mut()).await {
                    warn!(error = %rollback_err, "Rollback failed after checkout error");
                }
                Err(err)
            }
        }
    }

    /// The transaction body. Runs with the write lock held.
    async fn run(
        conn: &mut SqliteConnection,
        identity: &Identity,
        request: &CheckoutRequest,
    ) -> Result<OrderSummary, CheckoutError> {
        let now = Utc::now();
        let customer_id = identity.customer_id();

        // --- 1. Resolve redemptions against committed state ----------------
        let mut resolved = Vec::with_capacity(request.redemptions.len());

        for redemption in &request.redemptions {
            match redemption {
                RedemptionRequest::General { reward_id } => {
                    let reward = RewardRepository::get_reward_in_tx(conn, reward_id)
                        .await?
                        .filter(|r| r.is_active)
                        .ok_or_else(|| CheckoutError::RewardNotFound(reward_id.clone()))?;

                    if reward.kind.is_voucher_style() {
                        return Err(CheckoutError::VoucherRequired {
                            reward_id: reward_id.clone(),
                        });
                    }

                    resolved.push(ResolvedRedemption {
                        reward,
                        voucher: None,
                    });
                }
                RedemptionRequest::Voucher { voucher_id } => {
                    let voucher = RewardRepository::get_voucher_in_tx(conn, voucher_id)
                        .await?
                        // Someone else's voucher is indistinguishable from a
                        // missing one
                        .filter(|v| Some(v.customer_id.as_str()) == customer_id)
                        .ok_or_else(|| CheckoutError::VoucherNotFound(voucher_id.clone()))?;

                    if voucher.expires_at.is_some_and(|exp| exp <= now) {
                        return Err(CheckoutError::VoucherNotUsable {
                            voucher_id: voucher_id.clone(),
                            reason: "expired".to_string(),
                        });
                    }

                    let reward = RewardRepository::get_reward_in_tx(conn, &voucher.reward_id)
                        .await?
                        .ok_or_else(|| DbError::not_found("Reward", &voucher.reward_id))?;

                    resolved.push(ResolvedRedemption {
                        reward,
                        voucher: Some(voucher),
                    });
                }
            }
        }

        // --- 2. Eligibility, evaluated against a fresh snapshot ------------
        // Vouchers bypass the evaluator: their instance status and expiry
        // already govern usability.
        for redemption in resolved.iter().filter(|r| r.voucher.is_none()) {
            let customer_id = require_customer(customer_id)?;
            let snapshot = CustomerRepository::snapshot_in_tx(conn, customer_id, now).await?;

            criteria::evaluate(
                &snapshot,
                &redemption.reward.criteria,
                redemption.reward.points_cost,
                now,
            )
            .map_err(|e| CheckoutError::Ineligible {
                reward_id: redemption.reward.id.clone(),
                reason: e.reason,
            })?;
        }

        // --- 3. Price every line off the authoritative catalog -------------
        // Free-item lines granted by redemptions are appended at quantity 1
        // and zero-priced by the calculator.
        let mut lines: Vec<(CartLine, bool, Option<String>)> = request
            .lines
            .iter()
            .map(|l| (l.clone(), false, None))
            .collect();

        for redemption in &resolved {
            for product_id in &redemption.reward.free_product_ids {
                lines.push((
                    CartLine {
                        product_id: product_id.clone(),
                        quantity: 1,
                        option_ids: vec![],
                    },
                    true,
                    Some(redemption.reward.id.clone()),
                ));
            }
        }

        let mut priced = Vec::with_capacity(lines.len());
        let mut subtotal = Money::zero();

        for (line, is_reward_item, reward_id) in &lines {
            let product = CatalogRepository::get_product_in_tx(conn, &line.product_id)
                .await?
                .ok_or_else(|| CheckoutError::ProductNotFound(line.product_id.clone()))?;
            let options = CatalogRepository::get_options_in_tx(conn, &line.product_id).await?;

            let priced_line = pricing::price_line(&product, &options, line, *is_reward_item)?;
            subtotal += Money::from_cents(priced_line.line_total_cents);
            priced.push((priced_line, reward_id.clone()));
        }

        // --- 4. Aggregate discounts -----------------------------------------
        let mut directives = Vec::new();
        for redemption in &resolved {
            if let Some(bps) = redemption.reward.percent_discount_bps {
                directives.push(DiscountDirective::Percentage { bps });
            }
            if let Some(cents) = redemption.reward.fixed_discount_cents {
                directives.push(DiscountDirective::Fixed { cents });
            }
        }

        let discount = aggregate(subtotal, &directives);
        let total = subtotal - discount;

        // --- 5. Insert the order graph --------------------------------------
        let order = Order {
            id: Uuid::new_v4().to_string(),
            customer_id: customer_id.map(str::to_string),
            customer_name: identity.display_name().to_string(),
            subtotal_cents: subtotal.cents(),
            discount_cents: discount.cents(),
            total_cents: total.cents(),
            status: OrderStatus::Pending,
            ticket_number: generate_ticket_number(now),
            archived: false,
            created_at: now,
            updated_at: now,
        };
        OrderRepository::insert_order_in_tx(conn, &order).await?;

        let mut items = Vec::with_capacity(priced.len());
        for (priced_line, reward_id) in &priced {
            let item = OrderLineItem {
                id: Uuid::new_v4().to_string(),
                order_id: order.id.clone(),
                product_id: priced_line.product_id.clone(),
                name_snapshot: priced_line.name_snapshot.clone(),
                quantity: priced_line.quantity,
                unit_price_cents: priced_line.unit_price_cents,
                line_total_cents: priced_line.line_total_cents,
                is_reward_item: priced_line.is_reward_item,
                reward_id: reward_id.clone(),
                created_at: now,
            };
            OrderRepository::insert_line_item_in_tx(conn, &item).await?;

            for option in &priced_line.selected_options {
                let selected = SelectedOption {
                    id: Uuid::new_v4().to_string(),
                    line_item_id: item.id.clone(),
                    label: option.label.clone(),
                    price_modifier_cents: option.price_modifier_cents,
                };
                OrderRepository::insert_selected_option_in_tx(conn, &selected).await?;
            }

            items.push(item);
        }

        // --- 6. Apply redemptions to the ledger ------------------------------
        for redemption in &resolved {
            let customer_id = require_customer(customer_id)?;

            match &redemption.voucher {
                Some(voucher) => {
                    let outcome =
                        RewardRepository::consume_voucher(conn, &voucher.id, &order.id).await?;
                    if outcome == ConsumeOutcome::NotActive {
                        return Err(CheckoutError::ConcurrentRedemption {
                            voucher_id: voucher.id.clone(),
                        });
                    }
                }
                None => {
                    match RewardRepository::claim_general_reward(
                        conn,
                        customer_id,
                        &redemption.reward,
                        now,
                    )
                    .await?
                    {
                        ClaimOutcome::Claimed(claim) => {
                            RewardRepository::mark_claim_used(conn, &claim.id).await?;
                        }
                        ClaimOutcome::AlreadyClaimed => {
                            return Err(CheckoutError::AlreadyClaimed {
                                reward_id: redemption.reward.id.clone(),
                            });
                        }
                        ClaimOutcome::InsufficientPoints { balance } => {
                            return Err(CheckoutError::InsufficientPoints {
                                required: redemption.reward.points_cost,
                                balance,
                            });
                        }
                    }
                }
            }

            // Audit row: this reward's own (uncapped) discount contribution
            let mut applied = Money::zero();
            if let Some(bps) = redemption.reward.percent_discount_bps {
                applied += subtotal.percentage_amount(bps);
            }
            if let Some(cents) = redemption.reward.fixed_discount_cents {
                applied += Money::from_cents(cents);
            }

            let record = RewardUsageRecord {
                id: Uuid::new_v4().to_string(),
                reward_id: redemption.reward.id.clone(),
                voucher_id: redemption.voucher.as_ref().map(|v| v.id.clone()),
                order_id: order.id.clone(),
                customer_id: Some(customer_id.to_string()),
                discount_applied_cents: applied.cents(),
                free_items_json: serde_json::to_string(&redemption.reward.free_product_ids)
                    .map_err(DbError::from)?,
                used_at: now,
            };
            RewardRepository::record_usage(conn, &record).await?;
        }

        // --- 7. Credit earned loyalty points ---------------------------------
        // One point per whole dollar of the final payable total; staff
        // checkouts earn nothing.
        let points_earned = match customer_id {
            Some(customer_id) => {
                let points = total.cents() / 100;
                RewardRepository::credit_loyalty_points(conn, customer_id, points, &order.id, now)
                    .await?;
                points
            }
            None => 0,
        };

        debug!(
            order_id = %order.id,
            subtotal_cents = subtotal.cents(),
            discount_cents = discount.cents(),
            points_earned,
            "Checkout transaction body complete"
        );

        Ok(OrderSummary {
            order_id: order.id,
            ticket_number: order.ticket_number,
            subtotal_cents: subtotal.cents(),
            discount_cents: discount.cents(),
            total_cents: total.cents(),
            points_earned,
            items,
        })
    }
}

/// Redemptions are customer-only; re-checked here because `run` trusts no
/// caller-side invariant.
fn require_customer(customer_id: Option<&str>) -> Result<&str, CheckoutError> {
    customer_id.ok_or_else(|| {
        ValidationError::Required {
            field: "customer identity (redemptions)".to_string(),
        }
        .into()
    })
}

/// Generates a ticket number in format: P-YYMMDD-NNNN
///
/// ## Example
/// `P-260823-4817`
fn generate_ticket_number(now: DateTime<Utc>) -> String {
    let date_part = now.format("%y%m%d");

    // Timestamp milliseconds as sequence; collisions within the same
    // millisecond window are acceptable for a human-facing pickup code
    let seq = (now.timestamp_millis() % 10000) as u32;

    format!("P-{}-{:04}", date_part, seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Duration;
    use perka_core::{
        criteria::Criterion, Availability, Customer, MembershipTier, PointsTxKind, Product,
        RewardKind, StaffRole, VoucherStatus,
    };

    // =========================================================================
    // Fixtures
    // =========================================================================

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn seed_product(db: &Database, name: &str, price_cents: i64) -> String {
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: None,
            base_price_cents: price_cents,
            availability: Availability::Available,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.catalog().insert_product(&product).await.unwrap();
        product.id
    }

    async fn seed_customer(db: &Database, name: &str, points: i64) -> Identity {
        let customer = Customer {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            tier: MembershipTier::Silver,
            points_balance: points,
            birth_date: None,
            referral_count: 0,
            joined_at: Utc::now(),
        };
        db.customers().insert(&customer).await.unwrap();
        Identity::Customer {
            id: customer.id,
            name: customer.name,
        }
    }

    fn reward(kind: RewardKind, points_cost: i64) -> Reward {
        Reward {
            id: Uuid::new_v4().to_string(),
            kind,
            name: "Test Reward".to_string(),
            points_cost,
            percent_discount_bps: None,
            fixed_discount_cents: None,
            free_product_ids: vec![],
            allow_multiple_claims: false,
            is_active: true,
            criteria: vec![],
        }
    }

    fn cart(product_id: &str, quantity: i64) -> CheckoutRequest {
        CheckoutRequest {
            lines: vec![CartLine {
                product_id: product_id.to_string(),
                quantity,
                option_ids: vec![],
            }],
            redemptions: vec![],
        }
    }

    fn id_of(identity: &Identity) -> &str {
        identity.customer_id().unwrap()
    }

    // =========================================================================
    // Basics
    // =========================================================================

    #[test]
    fn test_ticket_number_format() {
        let ticket = generate_ticket_number(Utc::now());

        assert!(ticket.starts_with("P-"));
        let parts: Vec<&str> = ticket.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].len(), 6);
        assert_eq!(parts[2].len(), 4);
    }

    #[test]
    fn test_redemption_reference() {
        let general = RedemptionRequest::General {
            reward_id: "r1".to_string(),
        };
        let voucher = RedemptionRequest::Voucher {
            voucher_id: "v1".to_string(),
        };
        assert_eq!(general.reference(), "r1");
        assert_eq!(voucher.reference(), "v1");
    }

    #[tokio::test]
    async fn test_staff_checkout_no_points() {
        let db = setup().await;
        let product_id = seed_product(&db, "Flat White", 450).await;
        let staff = Identity::Staff {
            role: StaffRole::Cashier,
        };

        let summary = db
            .checkout()
            .checkout(&staff, &cart(&product_id, 2))
            .await
            .unwrap();

        assert_eq!(summary.subtotal_cents, 900);
        assert_eq!(summary.discount_cents, 0);
        assert_eq!(summary.total_cents, 900);
        assert_eq!(summary.points_earned, 0);
        assert_eq!(summary.items.len(), 1);

        let order = db.orders().get_by_id(&summary.order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.customer_name, "Walk-in");
        assert!(order.customer_id.is_none());
    }

    #[tokio::test]
    async fn test_customer_earns_one_point_per_dollar() {
        let db = setup().await;
        let product_id = seed_product(&db, "Latte", 475).await;
        let customer = seed_customer(&db, "Ada", 0).await;

        // 3 × $4.75 = $14.25 → 14 points
        let summary = db
            .checkout()
            .checkout(&customer, &cart(&product_id, 3))
            .await
            .unwrap();

        assert_eq!(summary.total_cents, 1425);
        assert_eq!(summary.points_earned, 14);

        let balance = db.customers().points_balance(id_of(&customer)).await.unwrap();
        assert_eq!(balance, 14);

        let history = db.rewards().points_history(id_of(&customer)).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, PointsTxKind::Earned);
        assert_eq!(history[0].delta, 14);
        assert_eq!(history[0].order_id.as_deref(), Some(summary.order_id.as_str()));
    }

    #[tokio::test]
    async fn test_unavailable_product_rejected() {
        let db = setup().await;
        let product_id = seed_product(&db, "Mocha", 525).await;
        db.catalog()
            .set_availability(&product_id, Availability::Unavailable)
            .await
            .unwrap();

        let staff = Identity::Staff {
            role: StaffRole::Cashier,
        };
        let err = db
            .checkout()
            .checkout(&staff, &cart(&product_id, 1))
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::ProductUnavailable { name } if name == "Mocha"));
        assert!(db.orders().list_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_staff_redemption_rejected_before_transaction() {
        let db = setup().await;
        let product_id = seed_product(&db, "Espresso", 300).await;
        let staff = Identity::Staff {
            role: StaffRole::Cashier,
        };

        let mut request = cart(&product_id, 1);
        request.redemptions.push(RedemptionRequest::General {
            reward_id: "r1".to_string(),
        });

        let err = db.checkout().checkout(&staff, &request).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));
    }

    #[tokio::test]
    async fn test_duplicate_redemption_reference_rejected() {
        let db = setup().await;
        let product_id = seed_product(&db, "Espresso", 300).await;
        let customer = seed_customer(&db, "Ada", 500).await;

        let mut request = cart(&product_id, 1);
        request.redemptions.push(RedemptionRequest::General {
            reward_id: "r1".to_string(),
        });
        request.redemptions.push(RedemptionRequest::General {
            reward_id: "r1".to_string(),
        });

        let err = db.checkout().checkout(&customer, &request).await.unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::Validation(ValidationError::DuplicateRedemption { .. })
        ));
    }

    // =========================================================================
    // Redemptions
    // =========================================================================

    #[tokio::test]
    async fn test_percent_discount_redemption_end_to_end() {
        let db = setup().await;
        let product_id = seed_product(&db, "Flat White", 500).await;
        let customer = seed_customer(&db, "Ada", 500).await;

        let mut discount_reward = reward(RewardKind::DiscountCoupon, 200);
        discount_reward.percent_discount_bps = Some(1000);
        discount_reward.criteria = vec![Criterion::MinPoints { points: 200 }];
        db.rewards().insert_reward(&discount_reward).await.unwrap();

        // $10.00 cart, 10% off for 200 points
        let mut request = cart(&product_id, 2);
        request.redemptions.push(RedemptionRequest::General {
            reward_id: discount_reward.id.clone(),
        });

        let summary = db.checkout().checkout(&customer, &request).await.unwrap();

        assert_eq!(summary.subtotal_cents, 1000);
        assert_eq!(summary.discount_cents, 100);
        assert_eq!(summary.total_cents, 900);
        assert_eq!(summary.points_earned, 9);

        // 500 - 200 redeemed + 9 earned
        let balance = db.customers().points_balance(id_of(&customer)).await.unwrap();
        assert_eq!(balance, 309);

        let usage = db.rewards().usage_for_order(&summary.order_id).await.unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].reward_id, discount_reward.id);
        assert_eq!(usage[0].discount_applied_cents, 100);

        let claims = db.rewards().list_claims(id_of(&customer)).await.unwrap();
        assert_eq!(claims.len(), 1);
        assert!(claims[0].used);
    }

    #[tokio::test]
    async fn test_free_item_line_appended_and_zero_priced() {
        let db = setup().await;
        let espresso = seed_product(&db, "Espresso", 300).await;
        let muffin = seed_product(&db, "Muffin", 325).await;
        let customer = seed_customer(&db, "Ada", 100).await;

        let mut free_muffin = reward(RewardKind::Standard, 0);
        free_muffin.free_product_ids = vec![muffin.clone()];
        db.rewards().insert_reward(&free_muffin).await.unwrap();

        let mut request = cart(&espresso, 1);
        request.redemptions.push(RedemptionRequest::General {
            reward_id: free_muffin.id.clone(),
        });

        let summary = db.checkout().checkout(&customer, &request).await.unwrap();

        assert_eq!(summary.subtotal_cents, 300);
        assert_eq!(summary.items.len(), 2);

        let reward_line = summary.items.iter().find(|i| i.is_reward_item).unwrap();
        assert_eq!(reward_line.product_id, muffin);
        assert_eq!(reward_line.quantity, 1);
        assert_eq!(reward_line.line_total_cents, 0);
        assert_eq!(reward_line.reward_id.as_deref(), Some(free_muffin.id.as_str()));
    }

    #[tokio::test]
    async fn test_discount_clamped_to_subtotal() {
        let db = setup().await;
        let product_id = seed_product(&db, "Espresso", 300).await;
        let customer = seed_customer(&db, "Ada", 0).await;

        let mut big_coupon = reward(RewardKind::DiscountCoupon, 0);
        big_coupon.fixed_discount_cents = Some(5000);
        db.rewards().insert_reward(&big_coupon).await.unwrap();

        let mut request = cart(&product_id, 1);
        request.redemptions.push(RedemptionRequest::General {
            reward_id: big_coupon.id.clone(),
        });

        let summary = db.checkout().checkout(&customer, &request).await.unwrap();

        assert_eq!(summary.discount_cents, 300);
        assert_eq!(summary.total_cents, 0);
        assert_eq!(summary.points_earned, 0);
    }

    #[tokio::test]
    async fn test_insufficient_points_rolls_back() {
        let db = setup().await;
        let product_id = seed_product(&db, "Latte", 475).await;
        let customer = seed_customer(&db, "Ada", 50).await;

        let costly = reward(RewardKind::Standard, 200);
        db.rewards().insert_reward(&costly).await.unwrap();

        let mut request = cart(&product_id, 1);
        request.redemptions.push(RedemptionRequest::General {
            reward_id: costly.id.clone(),
        });

        let err = db.checkout().checkout(&customer, &request).await.unwrap_err();

        // Caught by the eligibility evaluator against a fresh snapshot
        assert!(matches!(err, CheckoutError::Ineligible { ref reason, .. }
            if reason.contains("Insufficient points")));

        // Nothing committed
        assert!(db.orders().list_active().await.unwrap().is_empty());
        let balance = db.customers().points_balance(id_of(&customer)).await.unwrap();
        assert_eq!(balance, 50);
        assert!(db.rewards().list_claims(id_of(&customer)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ineligible_structural_reason_wins() {
        let db = setup().await;
        let product_id = seed_product(&db, "Latte", 475).await;
        // Silver customer, plenty of points
        let customer = seed_customer(&db, "Ada", 1000).await;

        let mut perk = reward(RewardKind::LoyaltyTierPerk, 500);
        perk.criteria = vec![Criterion::RequiredTiers {
            tiers: vec![MembershipTier::Platinum],
        }];
        db.rewards().insert_reward(&perk).await.unwrap();

        let mut request = cart(&product_id, 1);
        request.redemptions.push(RedemptionRequest::General {
            reward_id: perk.id.clone(),
        });

        let err = db.checkout().checkout(&customer, &request).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Ineligible { ref reason, .. }
            if reason.contains("membership tier")));
    }

    #[tokio::test]
    async fn test_already_claimed_single_claim_reward() {
        let db = setup().await;
        let product_id = seed_product(&db, "Espresso", 300).await;
        let customer = seed_customer(&db, "Ada", 1000).await;

        let mut once = reward(RewardKind::DiscountCoupon, 100);
        once.fixed_discount_cents = Some(50);
        once.allow_multiple_claims = false;
        db.rewards().insert_reward(&once).await.unwrap();

        let mut request = cart(&product_id, 1);
        request.redemptions.push(RedemptionRequest::General {
            reward_id: once.id.clone(),
        });

        db.checkout().checkout(&customer, &request).await.unwrap();

        let err = db.checkout().checkout(&customer, &request).await.unwrap_err();
        assert!(matches!(err, CheckoutError::AlreadyClaimed { ref reward_id }
            if *reward_id == once.id));

        // Only the first order exists and only 100 points were spent
        assert_eq!(db.orders().list_active().await.unwrap().len(), 1);
        let balance = db.customers().points_balance(id_of(&customer)).await.unwrap();
        assert_eq!(balance, 1000 - 100 + 2); // +2 earned on $2.50 total
    }

    #[tokio::test]
    async fn test_voucher_style_reward_requires_voucher() {
        let db = setup().await;
        let product_id = seed_product(&db, "Espresso", 300).await;
        let customer = seed_customer(&db, "Ada", 0).await;

        let voucher_reward = reward(RewardKind::Voucher, 0);
        db.rewards().insert_reward(&voucher_reward).await.unwrap();

        let mut request = cart(&product_id, 1);
        request.redemptions.push(RedemptionRequest::General {
            reward_id: voucher_reward.id.clone(),
        });

        let err = db.checkout().checkout(&customer, &request).await.unwrap_err();
        assert!(matches!(err, CheckoutError::VoucherRequired { .. }));
    }

    // =========================================================================
    // Vouchers
    // =========================================================================

    #[tokio::test]
    async fn test_voucher_consumed_exactly_once() {
        let db = setup().await;
        let product_id = seed_product(&db, "Latte", 475).await;
        let customer = seed_customer(&db, "Ada", 0).await;

        let mut welcome = reward(RewardKind::Voucher, 0);
        welcome.fixed_discount_cents = Some(300);
        db.rewards().insert_reward(&welcome).await.unwrap();

        let voucher = db
            .rewards()
            .grant_voucher(id_of(&customer), &welcome.id, None)
            .await
            .unwrap();

        let mut request = cart(&product_id, 1);
        request.redemptions.push(RedemptionRequest::Voucher {
            voucher_id: voucher.id.clone(),
        });

        let summary = db.checkout().checkout(&customer, &request).await.unwrap();
        assert_eq!(summary.discount_cents, 300);
        assert_eq!(summary.total_cents, 175);

        let stored = db.rewards().get_voucher(&voucher.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VoucherStatus::Claimed);
        assert_eq!(stored.consumed_by_order_id.as_deref(), Some(summary.order_id.as_str()));

        // Second spend attempt loses to the status gate
        let err = db.checkout().checkout(&customer, &request).await.unwrap_err();
        assert!(matches!(err, CheckoutError::ConcurrentRedemption { .. }));
        assert_eq!(db.orders().list_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_expired_voucher_rejected() {
        let db = setup().await;
        let product_id = seed_product(&db, "Latte", 475).await;
        let customer = seed_customer(&db, "Ada", 0).await;

        let welcome = reward(RewardKind::Voucher, 0);
        db.rewards().insert_reward(&welcome).await.unwrap();

        let voucher = db
            .rewards()
            .grant_voucher(
                id_of(&customer),
                &welcome.id,
                Some(Utc::now() - Duration::hours(1)),
            )
            .await
            .unwrap();

        let mut request = cart(&product_id, 1);
        request.redemptions.push(RedemptionRequest::Voucher {
            voucher_id: voucher.id.clone(),
        });

        let err = db.checkout().checkout(&customer, &request).await.unwrap_err();
        assert!(matches!(err, CheckoutError::VoucherNotUsable { ref reason, .. }
            if reason == "expired"));
    }

    #[tokio::test]
    async fn test_foreign_voucher_invisible() {
        let db = setup().await;
        let product_id = seed_product(&db, "Latte", 475).await;
        let owner = seed_customer(&db, "Ada", 0).await;
        let thief = seed_customer(&db, "Mallory", 0).await;

        let welcome = reward(RewardKind::Voucher, 0);
        db.rewards().insert_reward(&welcome).await.unwrap();

        let voucher = db
            .rewards()
            .grant_voucher(id_of(&owner), &welcome.id, None)
            .await
            .unwrap();

        let mut request = cart(&product_id, 1);
        request.redemptions.push(RedemptionRequest::Voucher {
            voucher_id: voucher.id.clone(),
        });

        let err = db.checkout().checkout(&thief, &request).await.unwrap_err();
        assert!(matches!(err, CheckoutError::VoucherNotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_voucher_double_spend() {
        let db = setup().await;
        let product_id = seed_product(&db, "Latte", 475).await;
        let customer = seed_customer(&db, "Ada", 0).await;

        let mut welcome = reward(RewardKind::Voucher, 0);
        welcome.fixed_discount_cents = Some(100);
        db.rewards().insert_reward(&welcome).await.unwrap();

        let voucher = db
            .rewards()
            .grant_voucher(id_of(&customer), &welcome.id, None)
            .await
            .unwrap();

        let mut request = cart(&product_id, 1);
        request.redemptions.push(RedemptionRequest::Voucher {
            voucher_id: voucher.id.clone(),
        });

        let service = db.checkout();
        let (a, b) = tokio::join!(
            service.checkout(&customer, &request),
            service.checkout(&customer, &request)
        );

        // Exactly one side wins the active→claimed flip
        let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);

        let loser = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
        assert!(matches!(loser, CheckoutError::ConcurrentRedemption { .. }));

        assert_eq!(db.orders().list_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_points_redemptions_cannot_overdraw_balance() {
        let db = setup().await;
        let product_id = seed_product(&db, "Espresso", 300).await;
        let customer = seed_customer(&db, "Ada", 500).await;

        // Two distinct rewards, each costing more than half the balance
        let first = reward(RewardKind::Standard, 300);
        let second = reward(RewardKind::Standard, 300);
        db.rewards().insert_reward(&first).await.unwrap();
        db.rewards().insert_reward(&second).await.unwrap();

        let mut request_a = cart(&product_id, 1);
        request_a.redemptions.push(RedemptionRequest::General {
            reward_id: first.id.clone(),
        });
        let mut request_b = cart(&product_id, 1);
        request_b.redemptions.push(RedemptionRequest::General {
            reward_id: second.id.clone(),
        });

        let service = db.checkout();
        let (a, b) = tokio::join!(
            service.checkout(&customer, &request_a),
            service.checkout(&customer, &request_b)
        );

        // 500 points cover one 300-point redemption, never both
        let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);

        // The loser hits the points shortage either at the eligibility
        // re-check or at the conditional decrement, depending on timing
        let loser = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
        assert!(matches!(
            loser,
            CheckoutError::Ineligible { .. } | CheckoutError::InsufficientPoints { .. }
        ));

        // One committed order; balance reflects a single 300-point spend
        // plus the 3 points earned on the $3.00 total. Never negative.
        assert_eq!(db.orders().list_active().await.unwrap().len(), 1);
        let balance = db.customers().points_balance(id_of(&customer)).await.unwrap();
        assert_eq!(balance, 203);
    }
}
