//! Status and classification enums shared by the storefront and CLI.

use serde::{Deserialize, Serialize};

/// Lifecycle status of an order.
///
/// `pending_review` is set at checkout, staff confirm to `pending`, and
/// completing an order makes it `completed` (terminal). Deleted orders are
/// removed rather than given a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Placed by the customer, waiting for staff review.
    #[default]
    PendingReview,
    /// Confirmed by staff, being prepared.
    Pending,
    /// Handed over. Terminal.
    Completed,
}

impl OrderStatus {
    /// Whether the order can no longer change status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PendingReview => write!(f, "pending_review"),
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_review" => Ok(Self::PendingReview),
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}

/// Discount class applied when resolving catalog prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.price_tier", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PriceTier {
    /// Walk-in customers.
    #[default]
    Standard,
    /// Registered members.
    Member,
    /// Stores buying for resale.
    Wholesale,
}

impl std::fmt::Display for PriceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Member => write!(f, "member"),
            Self::Wholesale => write!(f, "wholesale"),
        }
    }
}

impl std::str::FromStr for PriceTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "member" => Ok(Self::Member),
            "wholesale" => Ok(Self::Wholesale),
            _ => Err(format!("invalid price tier: {s}")),
        }
    }
}

/// How an order leaves the shop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.pickup_type", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PickupType {
    /// Customer collects the order at the counter.
    #[default]
    SelfPickup,
    /// Order is shipped to the customer's address.
    Delivery,
}

impl std::fmt::Display for PickupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SelfPickup => write!(f, "self_pickup"),
            Self::Delivery => write!(f, "delivery"),
        }
    }
}

/// Access level of an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.identity_role", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Places orders for itself.
    #[default]
    Customer,
    /// Reviews, confirms, edits, prints and completes orders.
    Staff,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Customer => write!(f, "customer"),
            Self::Staff => write!(f, "staff"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "staff" => Ok(Self::Staff),
            _ => Err(format!("invalid role: {s}")),
        }
    }
}
