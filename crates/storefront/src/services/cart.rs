//! Cart operations.
//!
//! Carts are scoped to the session identity; every write goes through the
//! store, which bumps the identity's cart revision.

use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use kiosk_core::{CartItemId, IdentityId, Price, PriceTier, VariantId};

use crate::db::{CartRepository, CatalogRepository, RepositoryError, Store};
use crate::models::{CartItem, NewCartItem};

/// Largest quantity accepted for a single cart line.
pub const MAX_QUANTITY: u32 = 999;

/// Longest accepted line note, in characters.
pub const MAX_NOTE_LENGTH: usize = 200;

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("quantity must be between 1 and {MAX_QUANTITY}")]
    InvalidQuantity,

    #[error("note must be at most {MAX_NOTE_LENGTH} characters")]
    InvalidNote,

    #[error("variant {0} not found")]
    UnknownVariant(VariantId),

    #[error("variant {0} is not available")]
    Unavailable(VariantId),

    #[error("cart item not found")]
    ItemNotFound,

    #[error("cart total cannot exceed {}", Price::MAX)]
    TotalOutOfRange,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// One cart line with its current catalog price.
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub id: CartItemId,
    pub variant_id: VariantId,
    /// `None` when the variant left the catalog.
    pub name: Option<String>,
    pub quantity: u32,
    pub unit_price: Option<Price>,
    /// `None` when the variant left the catalog or the subtotal is out of
    /// range.
    pub subtotal: Option<Price>,
    pub note: Option<String>,
    pub available: bool,
}

/// The cart as shown to its owner.
///
/// Prices are current catalog prices; they are frozen only at checkout.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub items: Vec<CartLine>,
    /// Sum over lines that can currently be ordered.
    pub total: Price,
}

/// Validate a requested quantity.
///
/// # Errors
///
/// Returns `CartError::InvalidQuantity` outside `1..=MAX_QUANTITY`.
pub fn validate_quantity(quantity: i64) -> Result<u32, CartError> {
    u32::try_from(quantity)
        .ok()
        .filter(|q| (1..=MAX_QUANTITY).contains(q))
        .ok_or(CartError::InvalidQuantity)
}

fn normalize_note(note: Option<String>) -> Result<Option<String>, CartError> {
    let note = note
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    if note
        .as_ref()
        .is_some_and(|n| n.chars().count() > MAX_NOTE_LENGTH)
    {
        return Err(CartError::InvalidNote);
    }
    Ok(note)
}

/// Cart service.
pub struct CartService<'a> {
    store: &'a dyn Store,
}

impl<'a> CartService<'a> {
    /// Create a new cart service.
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// The identity's cart priced at `tier`.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the store fails.
    #[instrument(skip(self), fields(identity_id = %identity))]
    pub async fn view(&self, identity: IdentityId, tier: PriceTier) -> Result<CartView, CartError> {
        let snapshot = self.store.cart(identity).await?;
        let ids: Vec<VariantId> = snapshot.items.iter().map(|item| item.variant_id).collect();
        let variants = self.store.resolve_variants(&ids, tier).await?;

        let items: Vec<CartLine> = snapshot
            .items
            .into_iter()
            .map(|item| {
                let variant = variants.iter().find(|v| v.id == item.variant_id);
                CartLine {
                    id: item.id,
                    variant_id: item.variant_id,
                    name: variant.map(|v| v.name.clone()),
                    quantity: item.quantity,
                    unit_price: variant.map(|v| v.unit_price),
                    subtotal: variant.and_then(|v| v.unit_price.checked_times(item.quantity)),
                    note: item.note,
                    available: variant.is_some_and(|v| v.available),
                }
            })
            .collect();

        let total = Price::checked_sum(
            items
                .iter()
                .filter(|line| line.available)
                .filter_map(|line| line.subtotal),
        )
        .ok_or(CartError::TotalOutOfRange)?;

        Ok(CartView { items, total })
    }

    /// Add a variant to the cart.
    ///
    /// Adding to an existing line (same variant and note) merges the
    /// quantities; the merged quantity is held to `MAX_QUANTITY` as well.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity` or `CartError::InvalidNote` for
    /// bad input or a merge past `MAX_QUANTITY`, `CartError::UnknownVariant` if the variant does not exist
    /// and `CartError::Unavailable` if it cannot be ordered.
    #[instrument(skip(self, note), fields(identity_id = %identity))]
    pub async fn add(
        &self,
        identity: IdentityId,
        tier: PriceTier,
        variant_id: VariantId,
        quantity: i64,
        note: Option<String>,
    ) -> Result<CartItem, CartError> {
        let quantity = validate_quantity(quantity)?;
        let note = normalize_note(note)?;

        let variant = self
            .store
            .resolve_variants(&[variant_id], tier)
            .await?
            .into_iter()
            .next()
            .ok_or(CartError::UnknownVariant(variant_id))?;
        if !variant.available {
            return Err(CartError::Unavailable(variant_id));
        }

        let item = self
            .store
            .add_cart_item(
                identity,
                &NewCartItem {
                    variant_id,
                    quantity,
                    note,
                },
                MAX_QUANTITY,
            )
            .await
            .map_err(|e| match e {
                RepositoryError::QuantityLimit => CartError::InvalidQuantity,
                other => CartError::Repository(other),
            })?;

        tracing::debug!(cart_item_id = %item.id, quantity = item.quantity, "Cart item added");
        Ok(item)
    }

    /// Replace the quantity of a cart line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity` for a bad quantity and
    /// `CartError::ItemNotFound` if the line is not in this cart.
    #[instrument(skip(self), fields(identity_id = %identity))]
    pub async fn set_quantity(
        &self,
        identity: IdentityId,
        item: CartItemId,
        quantity: i64,
    ) -> Result<CartItem, CartError> {
        let quantity = validate_quantity(quantity)?;
        self.store
            .set_cart_item_quantity(identity, item, quantity)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => CartError::ItemNotFound,
                other => CartError::Repository(other),
            })
    }

    /// Remove a cart line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ItemNotFound` if the line is not in this cart.
    #[instrument(skip(self), fields(identity_id = %identity))]
    pub async fn remove(&self, identity: IdentityId, item: CartItemId) -> Result<(), CartError> {
        if self.store.remove_cart_item(identity, item).await? {
            Ok(())
        } else {
            Err(CartError::ItemNotFound)
        }
    }
}
