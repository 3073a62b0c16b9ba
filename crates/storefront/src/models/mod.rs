//! Domain models for the ordering API.
//!
//! These are validated domain objects, separate from database row types.

pub mod cart;
pub mod catalog;
pub mod identity;
pub mod order;
pub mod session;

pub use cart::{CartItem, CartSnapshot, NewCartItem};
pub use catalog::CatalogVariant;
pub use identity::{Identity, PickupPreference, ProfileError, ProfileUpdate};
pub use order::{LineItem, NewOrder, Order, OrderFilter, compute_total};
pub use session::CurrentIdentity;
