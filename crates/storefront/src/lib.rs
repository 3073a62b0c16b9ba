//! Kiosk Storefront library.
//!
//! Phone login with one-time codes, a signed session cookie, per-identity
//! carts, checkout into frozen orders, and the staff order workflow.
//!
//! The binary in `main.rs` wires configuration, Postgres and the pager into
//! [`routes::app`]; tests build the same router over [`db::MemoryStore`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
