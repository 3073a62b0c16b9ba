//! Order error types.

use thiserror::Error;

use kiosk_core::{OrderStatus, VariantId};

use crate::db::RepositoryError;

/// Errors that can occur during checkout and order transitions.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Checkout with nothing in the cart.
    #[error("cart is empty")]
    EmptyCart,

    /// Confirming a delivery order requires a ship date.
    #[error("delivery orders need a ship date to be confirmed")]
    MissingShipDate,

    /// The action is not allowed in the order's current status.
    #[error("cannot {action} an order that is {status}")]
    InvalidTransition {
        status: OrderStatus,
        action: &'static str,
    },

    /// A line item quantity is not positive.
    #[error("line item quantity must be at least 1")]
    InvalidQuantity,

    /// A line item is malformed.
    #[error("invalid line item: {0}")]
    InvalidLineItem(String),

    /// An order note is too long.
    #[error("note must be at most {max} characters")]
    InvalidNote { max: usize },

    /// Order does not exist.
    #[error("order not found")]
    NotFound,

    /// The checking-out identity does not exist.
    #[error("identity not found")]
    IdentityNotFound,

    /// A cart line refers to a variant that no longer exists.
    #[error("variant {0} not found")]
    UnknownVariant(VariantId),

    /// A cart line refers to a variant that cannot be ordered.
    #[error("variant {0} is not available")]
    VariantUnavailable(VariantId),

    /// Concurrent writes kept winning; retries exhausted.
    #[error("order is being modified concurrently, try again")]
    StorageConflict,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}
