//! # Domain Types
//!
//! Core domain types for the Perka ordering & loyalty backend.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                │
//! │                                                                     │
//! │  Catalog                 Order graph              Redemption ledger │
//! │  ───────                 ───────────              ───────────────── │
//! │  Product                 Order                    ClaimedReward     │
//! │  ProductOption           OrderLineItem            CustomerVoucher   │
//! │                          SelectedOption           RewardUsageRecord │
//! │  Reward (definition)                              PointsTransaction │
//! │                                                                     │
//! │  Orders snapshot catalog data at write time; ledger rows reference  │
//! │  reward definitions but never own them.                             │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot-On-Write Pattern
//! Line items copy product name, unit price, and option labels into their own
//! rows at checkout. Historical orders stay stable no matter how the catalog
//! is edited afterwards. Joining live catalog data at read time is forbidden.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::criteria::Criterion;
use crate::money::Money;

// =============================================================================
// Catalog
// =============================================================================

/// Whether a product can currently be ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// Orderable right now.
    Available,
    /// Temporarily out (e.g. out of stock); checkout rejects it.
    Unavailable,
}

/// A catalog product.
///
/// The catalog is authoritative for prices: checkout re-fetches the product
/// on every request and never trusts client-supplied prices.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name shown in menus and snapshotted onto order lines.
    pub name: String,

    /// Optional description for product details.
    pub description: Option<String>,

    /// Base price in cents, before option modifiers.
    pub base_price_cents: i64,

    /// Current availability.
    pub availability: Availability,

    /// Whether product is active (soft delete).
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the base price as a Money type.
    #[inline]
    pub fn base_price(&self) -> Money {
        Money::from_cents(self.base_price_cents)
    }

    /// Checks whether the product can be ordered right now.
    #[inline]
    pub fn is_orderable(&self) -> bool {
        self.is_active && self.availability == Availability::Available
    }
}

/// A selectable option on a product (e.g. size "Large", milk "Oat").
///
/// Options are grouped by `group_label`; a cart line picks at most one option
/// per group. Each option carries a signed price modifier.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ProductOption {
    pub id: String,
    pub product_id: String,
    /// Option group this belongs to ("Size", "Milk", ...).
    pub group_label: String,
    /// Option label ("Large", "Oat milk", ...).
    pub label: String,
    /// Signed price modifier in cents (upcharges positive).
    pub price_modifier_cents: i64,
    pub is_active: bool,
}

impl ProductOption {
    /// Returns the price modifier as Money.
    #[inline]
    pub fn price_modifier(&self) -> Money {
        Money::from_cents(self.price_modifier_cents)
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// The status of an order.
///
/// ## Lifecycle
/// ```text
/// pending ──► preparing ──► ready ──► completed
///    │            │           │
///    └────────────┴───────────┴─────► cancelled
/// ```
/// Transitions are validated by [`OrderStatus::can_transition_to`]: strictly
/// forward through the chain, with any non-terminal state cancellable.
/// Nothing ever moves backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order accepted, not yet started.
    Pending,
    /// Being prepared.
    Preparing,
    /// Ready for pickup/serving.
    Ready,
    /// Handed over; terminal.
    Completed,
    /// Cancelled; terminal.
    Cancelled,
}

impl OrderStatus {
    /// Checks whether a transition to `next` is allowed.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, Preparing) => true,
            (Preparing, Ready) => true,
            (Ready, Completed) => true,
            // Any non-terminal state may be cancelled
            (Pending | Preparing | Ready, Cancelled) => true,
            _ => false,
        }
    }

    /// Checks whether this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

// =============================================================================
// Order
// =============================================================================

/// A committed order.
///
/// Created exactly once per checkout. `subtotal_cents`, `discount_cents` and
/// `total_cents` are immutable after insert; only status and the archived
/// flag change afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Order {
    pub id: String,
    /// Owning customer; None for guest / walk-in orders.
    pub customer_id: Option<String>,
    /// Customer name at order time (frozen).
    pub customer_name: String,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub status: OrderStatus,
    /// Short human-facing code called out for pickup.
    pub ticket_number: String,
    /// Orthogonal to status; set only from terminal states, never reversed.
    pub archived: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Returns the final payable total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A line item in an order.
/// Uses the snapshot pattern to freeze product data at checkout time.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderLineItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    /// Product name at order time (frozen).
    pub name_snapshot: String,
    /// Quantity ordered (always positive).
    pub quantity: i64,
    /// Unit price in cents at order time: base + option modifiers,
    /// before any reward effect (frozen).
    pub unit_price_cents: i64,
    /// Line total (unit_price × quantity).
    pub line_total_cents: i64,
    /// True when this line was granted free by a reward (zero-priced).
    pub is_reward_item: bool,
    /// The reward that granted this line, if any.
    pub reward_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl OrderLineItem {
    /// Returns the line total as Money.
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

/// A selected option snapshotted onto a line item.
///
/// Owned exclusively by its line item and deleted with it. The label and
/// modifier are copies, not references to live catalog rows.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SelectedOption {
    pub id: String,
    pub line_item_id: String,
    /// Option label at order time (frozen).
    pub label: String,
    /// Price modifier in cents at order time (frozen).
    pub price_modifier_cents: i64,
}

// =============================================================================
// Membership & Identity
// =============================================================================

/// Customer membership tier, used in reward eligibility criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MembershipTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

/// Staff role, carried on staff identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Cashier,
    Manager,
    Admin,
}

/// The resolved identity attached to a checkout call.
///
/// Authentication happens in an external layer; this engine only authorizes
/// based on the identity it is handed. Loyalty points are credited only for
/// customer identities.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Identity {
    Customer { id: String, name: String },
    Staff { role: StaffRole },
}

impl Identity {
    /// Returns the customer id when this identity is a customer.
    pub fn customer_id(&self) -> Option<&str> {
        match self {
            Identity::Customer { id, .. } => Some(id),
            Identity::Staff { .. } => None,
        }
    }

    /// Display name snapshotted onto orders.
    pub fn display_name(&self) -> &str {
        match self {
            Identity::Customer { name, .. } => name,
            Identity::Staff { .. } => "Walk-in",
        }
    }

    /// Checks whether this identity may archive an order in `status`.
    ///
    /// Archiving is allowed from `completed` for everyone authorized to touch
    /// orders; Managers and Admins may additionally archive cancelled orders.
    pub fn can_archive(&self, status: OrderStatus) -> bool {
        match status {
            OrderStatus::Completed => true,
            OrderStatus::Cancelled => matches!(
                self,
                Identity::Staff {
                    role: StaffRole::Manager | StaffRole::Admin
                }
            ),
            _ => false,
        }
    }
}

// =============================================================================
// Rewards
// =============================================================================

/// The kind of a reward definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    /// Points-purchasable reward evaluated against criteria.
    Standard,
    /// Instantiated per customer as a single-use voucher.
    Voucher,
    /// Discount-only reward (percentage or fixed).
    DiscountCoupon,
    /// Perk attached to a membership tier.
    LoyaltyTierPerk,
    /// Granted ad hoc by staff, consumed as a voucher instance.
    ManualGrant,
}

impl RewardKind {
    /// Voucher-style kinds are consumed via a [`CustomerVoucher`] instance
    /// and bypass the eligibility evaluator entirely: once granted, the
    /// instance's own status and expiry govern usability.
    pub fn is_voucher_style(&self) -> bool {
        matches!(self, RewardKind::Voucher | RewardKind::ManualGrant)
    }
}

/// A reward definition.
///
/// Mutated only by managers; redemption records reference definitions but
/// never own them. The criteria document is an ordered predicate set
/// evaluated by [`crate::criteria::evaluate`].
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Reward {
    pub id: String,
    pub kind: RewardKind,
    pub name: String,
    /// Points deducted on claim; zero for free rewards.
    pub points_cost: i64,
    /// Percentage discount in basis points, if any.
    pub percent_discount_bps: Option<u32>,
    /// Fixed discount in cents, if any.
    pub fixed_discount_cents: Option<i64>,
    /// Products granted free by this reward (zero-priced at checkout).
    pub free_product_ids: Vec<String>,
    /// Whether a customer may claim this reward more than once.
    pub allow_multiple_claims: bool,
    pub is_active: bool,
    /// Eligibility criteria, stored as a JSON document.
    pub criteria: Vec<Criterion>,
}

// =============================================================================
// Customers
// =============================================================================

/// A customer profile row.
///
/// Profile management itself is an external collaborator; this engine only
/// reads profiles (for snapshots) and maintains `points_balance` in lockstep
/// with the points ledger.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub tier: MembershipTier,
    /// Denormalized running balance; never decremented below zero.
    pub points_balance: i64,
    #[ts(as = "Option<String>")]
    pub birth_date: Option<NaiveDate>,
    pub referral_count: i64,
    #[ts(as = "String")]
    pub joined_at: DateTime<Utc>,
}

/// A customer's profile/activity snapshot used for eligibility evaluation.
///
/// Assembled fresh inside the checkout transaction so that eligibility is
/// judged against committed state, not whatever the client cached.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CustomerSnapshot {
    pub customer_id: String,
    /// Denormalized running balance, kept consistent with the points ledger.
    pub points_balance: i64,
    /// Completed purchases this calendar month.
    pub purchases_this_month: i64,
    pub lifetime_spend_cents: i64,
    pub tier: MembershipTier,
    #[ts(as = "Option<String>")]
    pub birth_date: Option<NaiveDate>,
    #[ts(as = "String")]
    pub joined_at: DateTime<Utc>,
    pub referral_count: i64,
}

// =============================================================================
// Redemption Ledger Rows
// =============================================================================

/// A customer's one-time claim of a non-voucher reward.
///
/// Claim and usage are distinct events: a later usage marks the claim
/// consumed without deleting this row.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ClaimedReward {
    pub id: String,
    pub customer_id: String,
    pub reward_id: String,
    pub used: bool,
    #[ts(as = "String")]
    pub claimed_at: DateTime<Utc>,
}

/// Lifecycle of a customer voucher instance. Forward-only:
/// `active → claimed` or `active → expired`, never backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum VoucherStatus {
    Active,
    Claimed,
    Expired,
}

/// A customer-scoped, single-use instance of a voucher-style reward.
///
/// Carries its own lifecycle independent of the reward definition. Granted
/// by staff action or a customer claim; consumed at most once.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CustomerVoucher {
    pub id: String,
    pub customer_id: String,
    pub reward_id: String,
    pub status: VoucherStatus,
    #[ts(as = "Option<String>")]
    pub expires_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub granted_at: DateTime<Utc>,
    /// The order that consumed this voucher, once claimed.
    pub consumed_by_order_id: Option<String>,
}

impl CustomerVoucher {
    /// Checks whether the voucher can still be consumed at `now`.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.status == VoucherStatus::Active
            && self.expires_at.map_or(true, |exp| exp > now)
    }
}

/// Append-only audit row linking a reward (and voucher instance, if any) to
/// the order that consumed it. Source of truth for "has this reward been
/// spent", as opposed to "has it been claimed".
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct RewardUsageRecord {
    pub id: String,
    pub reward_id: String,
    pub voucher_id: Option<String>,
    pub order_id: String,
    pub customer_id: Option<String>,
    /// This reward's own discount value, computed against the order subtotal
    /// before the order-level clamp. When the combined discount exceeds the
    /// subtotal, these per-reward values can sum to more than the order's
    /// `discount_cents`; the order row holds the clamped truth.
    pub discount_applied_cents: i64,
    /// Free items granted, as a JSON array of product ids.
    pub free_items_json: String,
    #[ts(as = "String")]
    pub used_at: DateTime<Utc>,
}

/// Direction of a points ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PointsTxKind {
    Earned,
    Redeemed,
}

/// Append-only loyalty points ledger row.
///
/// The customer's denormalized balance is updated by the same transaction
/// that appends here, so ledger and counter never drift.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PointsTransaction {
    pub id: String,
    pub customer_id: String,
    pub kind: PointsTxKind,
    /// Signed point delta: positive for earned, negative for redeemed.
    pub delta: i64,
    pub order_id: Option<String>,
    pub reward_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions_forward_chain() {
        use OrderStatus::*;

        assert!(Pending.can_transition_to(Preparing));
        assert!(Preparing.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Completed));

        // No skipping, no backward moves
        assert!(!Pending.can_transition_to(Ready));
        assert!(!Completed.can_transition_to(Preparing));
        assert!(!Ready.can_transition_to(Pending));
    }

    #[test]
    fn test_status_cancellation() {
        use OrderStatus::*;

        assert!(Pending.can_transition_to(Cancelled));
        assert!(Preparing.can_transition_to(Cancelled));
        assert!(Ready.can_transition_to(Cancelled));

        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Cancelled));
    }

    #[test]
    fn test_archive_privileges() {
        let cashier = Identity::Staff {
            role: StaffRole::Cashier,
        };
        let manager = Identity::Staff {
            role: StaffRole::Manager,
        };
        let customer = Identity::Customer {
            id: "c1".to_string(),
            name: "Ada".to_string(),
        };

        assert!(cashier.can_archive(OrderStatus::Completed));
        assert!(manager.can_archive(OrderStatus::Completed));

        // Only managers/admins archive cancelled orders
        assert!(!cashier.can_archive(OrderStatus::Cancelled));
        assert!(!customer.can_archive(OrderStatus::Cancelled));
        assert!(manager.can_archive(OrderStatus::Cancelled));

        // Never from active states
        assert!(!manager.can_archive(OrderStatus::Preparing));
    }

    #[test]
    fn test_voucher_usability() {
        let now = Utc::now();
        let mut voucher = CustomerVoucher {
            id: "v1".to_string(),
            customer_id: "c1".to_string(),
            reward_id: "r1".to_string(),
            status: VoucherStatus::Active,
            expires_at: None,
            granted_at: now,
            consumed_by_order_id: None,
        };

        assert!(voucher.is_usable(now));

        voucher.expires_at = Some(now - chrono::Duration::hours(1));
        assert!(!voucher.is_usable(now));

        voucher.expires_at = None;
        voucher.status = VoucherStatus::Claimed;
        assert!(!voucher.is_usable(now));
    }

    #[test]
    fn test_voucher_style_kinds() {
        assert!(RewardKind::Voucher.is_voucher_style());
        assert!(RewardKind::ManualGrant.is_voucher_style());
        assert!(!RewardKind::Standard.is_voucher_style());
        assert!(!RewardKind::DiscountCoupon.is_voucher_style());
    }

    #[test]
    fn test_identity_accessors() {
        let customer = Identity::Customer {
            id: "c1".to_string(),
            name: "Ada".to_string(),
        };
        assert_eq!(customer.customer_id(), Some("c1"));
        assert_eq!(customer.display_name(), "Ada");

        let staff = Identity::Staff {
            role: StaffRole::Cashier,
        };
        assert_eq!(staff.customer_id(), None);
        assert_eq!(staff.display_name(), "Walk-in");
    }
}
