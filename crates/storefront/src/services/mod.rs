//! Business logic services for the ordering API.
//!
//! # Services
//!
//! - `auth` - Phone login with one-time codes
//! - `credential` - Signed session tokens
//! - `cart` - Per-identity cart operations
//! - `orders` - Checkout and the order state machine
//!
//! Services borrow the store and other long-lived parts of
//! [`crate::state::AppState`] for the duration of one request.

pub mod auth;
pub mod cart;
pub mod credential;
pub mod orders;
