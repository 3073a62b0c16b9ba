//! Order domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kiosk_core::{IdentityId, OrderId, OrderStatus, Price, VariantId};

use super::PickupPreference;

/// A placed order.
///
/// `total` always equals the sum of `unit_price * quantity` over
/// `line_items` as of the last creation or edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub identity_id: IdentityId,
    pub line_items: Vec<LineItem>,
    pub total: Price,
    pub pickup: PickupPreference,
    pub note: Option<String>,
    pub status: OrderStatus,
    pub printed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped on every write.
    #[serde(skip)]
    pub version: i64,
}

/// A line item frozen at checkout.
///
/// Name and unit price are copied from the catalog, so later catalog changes
/// never alter a placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Catalog variant, if the line came from one.
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Price,
    #[serde(default)]
    pub note: Option<String>,
}

impl LineItem {
    /// `unit_price * quantity`, or `None` past [`Price::MAX`].
    #[must_use]
    pub fn subtotal(&self) -> Option<Price> {
        self.unit_price.checked_times(self.quantity)
    }
}

/// Sum of all line subtotals, or `None` if any subtotal or the total does
/// not fit in a [`Price`].
#[must_use]
pub fn compute_total(items: &[LineItem]) -> Option<Price> {
    items
        .iter()
        .try_fold(Price::ZERO, |total, item| total.checked_add(item.subtotal()?))
}

/// An order ready to be persisted by checkout.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub identity_id: IdentityId,
    pub line_items: Vec<LineItem>,
    pub total: Price,
    pub pickup: PickupPreference,
    pub note: Option<String>,
}

/// Criteria for listing orders.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub identity_id: Option<IdentityId>,
}

impl OrderFilter {
    /// Whether `order` satisfies every set criterion.
    #[must_use]
    pub fn matches(&self, order: &Order) -> bool {
        self.status.is_none_or(|status| order.status == status)
            && self.identity_id.is_none_or(|id| order.identity_id == id)
    }
}
