//! # Catalog Repository
//!
//! Database operations for products and their options.
//!
//! The catalog is the single source of truth for prices: checkout re-fetches
//! every product inside its transaction and ignores client-supplied prices.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use perka_core::{Availability, Product, ProductOption};

/// Repository for catalog database operations.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// Inserts a product.
    pub async fn insert_product(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, name = %product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, description, base_price_cents,
                availability, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.base_price_cents)
        .bind(product.availability)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Inserts a product option.
    pub async fn insert_option(&self, option: &ProductOption) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO product_options (
                id, product_id, group_label, label,
                price_modifier_cents, is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&option.id)
        .bind(&option.product_id)
        .bind(&option.group_label)
        .bind(&option.label)
        .bind(option.price_modifier_cents)
        .bind(option.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a product by ID.
    pub async fn get_product(&self, id: &str) -> DbResult<Option<Product>> {
        let product: Option<Product> = sqlx::query_as(
            r#"
            SELECT id, name, description, base_price_cents,
                   availability, is_active, created_at, updated_at
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Lists all active products, ordered by name.
    pub async fn list_products(&self) -> DbResult<Vec<Product>> {
        let products: Vec<Product> = sqlx::query_as(
            r#"
            SELECT id, name, description, base_price_cents,
                   availability, is_active, created_at, updated_at
            FROM products
            WHERE is_active = 1
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Gets the active options for a product.
    pub async fn get_options(&self, product_id: &str) -> DbResult<Vec<ProductOption>> {
        let options: Vec<ProductOption> = sqlx::query_as(
            r#"
            SELECT id, product_id, group_label, label,
                   price_modifier_cents, is_active
            FROM product_options
            WHERE product_id = ?1 AND is_active = 1
            ORDER BY group_label, label
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(options)
    }

    /// Updates a product's availability.
    ///
    /// ## When To Call
    /// Toggled by staff when stock runs out mid-shift. Checkout rejects
    /// unavailable products on the next request.
    pub async fn set_availability(&self, id: &str, availability: Availability) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE products SET availability = ?2, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(availability)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    // =========================================================================
    // In-Transaction Operations
    // =========================================================================

    /// Gets a product inside an open transaction.
    ///
    /// Used by the checkout orchestrator so that every priced line sees the
    /// same committed catalog state.
    pub async fn get_product_in_tx(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<Product>> {
        let product: Option<Product> = sqlx::query_as(
            r#"
            SELECT id, name, description, base_price_cents,
                   availability, is_active, created_at, updated_at
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(product)
    }

    /// Gets the active options for a product inside an open transaction.
    pub async fn get_options_in_tx(
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> DbResult<Vec<ProductOption>> {
        let options: Vec<ProductOption> = sqlx::query_as(
            r#"
            SELECT id, product_id, group_label, label,
                   price_modifier_cents, is_active
            FROM product_options
            WHERE product_id = ?1 AND is_active = 1
            ORDER BY group_label, label
            "#,
        )
        .bind(product_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(options)
    }
}
