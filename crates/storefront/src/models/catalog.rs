//! Read-only catalog view.

use serde::Serialize;

use kiosk_core::{Price, VariantId};

/// A sellable variant with its price resolved for one price tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogVariant {
    pub id: VariantId,
    pub name: String,
    /// Tier price when one is defined, base price otherwise.
    pub unit_price: Price,
    pub available: bool,
}
