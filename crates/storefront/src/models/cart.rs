//! Cart domain types.

use serde::{Deserialize, Serialize};

use kiosk_core::{CartItemId, IdentityId, VariantId};

/// A pending line in an identity's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub identity_id: IdentityId,
    pub variant_id: VariantId,
    /// Always at least 1.
    pub quantity: u32,
    pub note: Option<String>,
}

/// The cart as read at one point in time.
#[derive(Debug, Clone, Default)]
pub struct CartSnapshot {
    /// Items in insertion order.
    pub items: Vec<CartItem>,
    /// The identity's cart revision when the items were read.
    pub revision: i64,
}

/// An item to add to a cart.
///
/// Adding the same variant with the same note merges into the existing row.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCartItem {
    pub variant_id: VariantId,
    pub quantity: u32,
    #[serde(default)]
    pub note: Option<String>,
}
