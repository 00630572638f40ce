//! # Order Repository
//!
//! Database operations for orders, line items, and selected options.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Order Lifecycle                                   │
//! │                                                                         │
//! │  1. CREATE (checkout transaction only)                                 │
//! │     └── insert_order_in_tx() → Order { status: Pending }               │
//! │     └── insert_line_item_in_tx() × N                                   │
//! │     └── insert_selected_option_in_tx() × M                             │
//! │                                                                         │
//! │  2. PROGRESS                                                           │
//! │     └── update_status() → preparing → ready → completed                │
//! │         (guarded by OrderStatus::can_transition_to)                    │
//! │                                                                         │
//! │  3. (OPTIONAL) CANCEL from any non-terminal state                      │
//! │                                                                         │
//! │  4. ARCHIVE from a terminal state                                      │
//! │     └── archive() → hidden from active views, totals immutable         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Totals are immutable after insert. There is no update path for
//! subtotal/discount/total by design.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use perka_core::{Identity, Order, OrderLineItem, OrderStatus, SelectedOption};

/// Errors specific to order lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum OrderLifecycleError {
    /// The requested status change violates the transition table.
    #[error("Invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The caller is not allowed to archive an order in this state.
    #[error("Not authorized to archive an order in status {status:?}")]
    ArchiveNotAllowed { status: OrderStatus },

    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<sqlx::Error> for OrderLifecycleError {
    fn from(err: sqlx::Error) -> Self {
        OrderLifecycleError::Db(err.into())
    }
}

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Gets an order by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let order: Option<Order> = sqlx::query_as(
            r#"
            SELECT id, customer_id, customer_name,
                   subtotal_cents, discount_cents, total_cents,
                   status, ticket_number, archived,
                   created_at, updated_at
            FROM orders
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    /// Lists non-archived orders, newest first.
    pub async fn list_active(&self) -> DbResult<Vec<Order>> {
        let orders: Vec<Order> = sqlx::query_as(
            r#"
            SELECT id, customer_id, customer_name,
                   subtotal_cents, discount_cents, total_cents,
                   status, ticket_number, archived,
                   created_at, updated_at
            FROM orders
            WHERE archived = 0
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    /// Gets all line items for an order.
    pub async fn get_line_items(&self, order_id: &str) -> DbResult<Vec<OrderLineItem>> {
        let items: Vec<OrderLineItem> = sqlx::query_as(
            r#"
            SELECT id, order_id, product_id, name_snapshot,
                   quantity, unit_price_cents, line_total_cents,
                   is_reward_item, reward_id, created_at
            FROM order_line_items
            WHERE order_id = ?1
            ORDER BY created_at
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Gets the snapshotted options for a line item.
    pub async fn get_selected_options(&self, line_item_id: &str) -> DbResult<Vec<SelectedOption>> {
        let options: Vec<SelectedOption> = sqlx::query_as(
            r#"
            SELECT id, line_item_id, label, price_modifier_cents
            FROM selected_options
            WHERE line_item_id = ?1
            ORDER BY label
            "#,
        )
        .bind(line_item_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(options)
    }

    /// Moves an order to a new status.
    ///
    /// ## Guards
    /// 1. The transition table in [`OrderStatus::can_transition_to`]
    /// 2. A conditional UPDATE (`WHERE status = current`) so a concurrent
    ///    transition loses cleanly instead of double-applying
    pub async fn update_status(
        &self,
        order_id: &str,
        to: OrderStatus,
    ) -> Result<(), OrderLifecycleError> {
        let order = self
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_id))?;

        if !order.status.can_transition_to(to) {
            return Err(OrderLifecycleError::InvalidTransition {
                from: order.status,
                to,
            });
        }

        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE orders SET status = ?2, updated_at = ?3
            WHERE id = ?1 AND status = ?4
            "#,
        )
        .bind(order_id)
        .bind(to)
        .bind(now)
        .bind(order.status)
        .execute(&self.pool)
        .await?;

        // Zero rows means the status moved underneath us; re-running the
        // lookup would report the real current state
        if result.rows_affected() == 0 {
            return Err(OrderLifecycleError::InvalidTransition {
                from: order.status,
                to,
            });
        }

        debug!(order_id = %order_id, from = ?order.status, to = ?to, "Order status updated");

        Ok(())
    }

    /// Archives an order.
    ///
    /// Archiving hides the order from active views; it never deletes rows
    /// and never changes totals. Allowed only from terminal states, with
    /// cancelled orders restricted to managers and admins.
    pub async fn archive(
        &self,
        order_id: &str,
        who: &Identity,
    ) -> Result<(), OrderLifecycleError> {
        let order = self
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_id))?;

        if !who.can_archive(order.status) {
            return Err(OrderLifecycleError::ArchiveNotAllowed {
                status: order.status,
            });
        }

        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE orders SET archived = 1, updated_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(order_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(order_id = %order_id, "Order archived");

        Ok(())
    }

    // =========================================================================
    // In-Transaction Operations
    // =========================================================================
    // Orders are only ever created by the checkout transaction; there is no
    // pool-level insert on purpose.

    /// Inserts an order row inside an open transaction.
    pub async fn insert_order_in_tx(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
        debug!(id = %order.id, ticket = %order.ticket_number, "Inserting order");

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, customer_id, customer_name,
                subtotal_cents, discount_cents, total_cents,
                status, ticket_number, archived,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&order.id)
        .bind(&order.customer_id)
        .bind(&order.customer_name)
        .bind(order.subtotal_cents)
        .bind(order.discount_cents)
        .bind(order.total_cents)
        .bind(order.status)
        .bind(&order.ticket_number)
        .bind(order.archived)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Inserts a line item inside an open transaction.
    ///
    /// ## Snapshot Pattern
    /// Product name and unit price are copied onto the row. Later catalog
    /// edits never change committed orders.
    pub async fn insert_line_item_in_tx(
        conn: &mut SqliteConnection,
        item: &OrderLineItem,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO order_line_items (
                id, order_id, product_id, name_snapshot,
                quantity, unit_price_cents, line_total_cents,
                is_reward_item, reward_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&item.id)
        .bind(&item.order_id)
        .bind(&item.product_id)
        .bind(&item.name_snapshot)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.line_total_cents)
        .bind(item.is_reward_item)
        .bind(&item.reward_id)
        .bind(item.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Inserts a snapshotted selected option inside an open transaction.
    pub async fn insert_selected_option_in_tx(
        conn: &mut SqliteConnection,
        option: &SelectedOption,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO selected_options (
                id, line_item_id, label, price_modifier_cents
            ) VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&option.id)
        .bind(&option.line_item_id)
        .bind(&option.label)
        .bind(option.price_modifier_cents)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
