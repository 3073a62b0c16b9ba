//! Persistence for the ordering API.
//!
//! # Database: `kiosk`
//!
//! ## Tables
//!
//! - `storefront.identity` - Customers and staff, keyed by phone
//! - `storefront.cart_item` - Pending cart lines per identity
//! - `storefront.customer_order` - Placed orders with frozen line items (JSONB)
//! - `catalog.variant` - Sellable variants with base price (read-only here)
//! - `catalog.variant_tier_price` - Per-tier price overrides
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p kiosk-cli -- migrate
//! ```
//!
//! # Stores
//!
//! Services depend on the [`Store`] trait only. [`PgStore`] is the
//! production implementation; [`MemoryStore`] backs tests and local demos.

pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use kiosk_core::{CartItemId, IdentityId, OrderId, Phone, PriceTier, Role, VariantId};

use crate::models::{
    CartItem, CartSnapshot, CatalogVariant, Identity, NewCartItem, NewOrder, Order, OrderFilter,
    ProfileUpdate,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// A conditional write lost a race (stale version or cart revision).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Merging into an existing cart line would pass the quantity cap.
    #[error("merged quantity exceeds the limit")]
    QuantityLimit,

    /// The store cannot serve requests.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Identity persistence.
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    /// Get an identity by ID.
    async fn identity_by_id(&self, id: IdentityId) -> Result<Option<Identity>, RepositoryError>;

    /// Create the identity for `phone` or merge `profile` into the existing one.
    ///
    /// A new identity is named after its phone unless the profile names it.
    async fn upsert_identity(
        &self,
        phone: &Phone,
        profile: &ProfileUpdate,
    ) -> Result<Identity, RepositoryError>;

    /// Set the role of the identity with `phone`.
    ///
    /// Returns `RepositoryError::NotFound` if no identity has that phone.
    async fn set_role(&self, phone: &Phone, role: Role) -> Result<Identity, RepositoryError>;

    /// Set the price tier of the identity with `phone`.
    ///
    /// Returns `RepositoryError::NotFound` if no identity has that phone.
    async fn set_price_tier(
        &self,
        phone: &Phone,
        tier: PriceTier,
    ) -> Result<Identity, RepositoryError>;
}

/// Read-only catalog access.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Resolve variants with prices for `tier`.
    ///
    /// Unknown IDs are absent from the result.
    async fn resolve_variants(
        &self,
        ids: &[VariantId],
        tier: PriceTier,
    ) -> Result<Vec<CatalogVariant>, RepositoryError>;
}

/// Cart persistence. Every write bumps the identity's cart revision.
#[async_trait]
pub trait CartRepository: Send + Sync {
    /// Read the cart and its current revision.
    async fn cart(&self, identity: IdentityId) -> Result<CartSnapshot, RepositoryError>;

    /// Add an item, merging into a row with the same variant and note.
    ///
    /// Returns `RepositoryError::QuantityLimit`, leaving the cart and its
    /// revision untouched, if the merged quantity would exceed
    /// `max_quantity`.
    async fn add_cart_item(
        &self,
        identity: IdentityId,
        item: &NewCartItem,
        max_quantity: u32,
    ) -> Result<CartItem, RepositoryError>;

    /// Set the quantity of one of the identity's items.
    ///
    /// Returns `RepositoryError::NotFound` if the item is not in this cart.
    async fn set_cart_item_quantity(
        &self,
        identity: IdentityId,
        item: CartItemId,
        quantity: u32,
    ) -> Result<CartItem, RepositoryError>;

    /// Remove one of the identity's items. Returns whether it existed.
    async fn remove_cart_item(
        &self,
        identity: IdentityId,
        item: CartItemId,
    ) -> Result<bool, RepositoryError>;
}

/// Order persistence.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Get an order by ID.
    async fn order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// List orders matching `filter`, newest first.
    async fn orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, RepositoryError>;

    /// Insert `order` and clear the owner's cart in one transaction.
    ///
    /// Returns `RepositoryError::Conflict` without writing anything if the
    /// owner's cart revision is no longer `cart_revision`.
    async fn place_order(
        &self,
        order: &NewOrder,
        cart_revision: i64,
    ) -> Result<Order, RepositoryError>;

    /// Write back a modified order if its version is unchanged.
    ///
    /// Returns the stored order with its version bumped, or
    /// `RepositoryError::Conflict` if the stored version differs and
    /// `RepositoryError::NotFound` if the order is gone.
    async fn save_order(&self, order: &Order) -> Result<Order, RepositoryError>;

    /// Delete an order if its version is unchanged.
    ///
    /// Same error contract as [`OrderRepository::save_order`].
    async fn delete_order(&self, id: OrderId, version: i64) -> Result<(), RepositoryError>;
}

/// Everything the services need from persistence.
#[async_trait]
pub trait Store: IdentityRepository + CatalogRepository + CartRepository + OrderRepository {
    /// Check that the store can serve requests.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
