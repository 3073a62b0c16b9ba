//! Kiosk Core - Shared types library.
//!
//! This crate provides common types used across all Kiosk components:
//! - `storefront` - Ordering API (customers and staff)
//! - `cli` - Command-line tools for migrations and identity management
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, phone numbers, prices, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
