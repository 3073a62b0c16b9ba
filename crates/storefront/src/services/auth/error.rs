//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;
use crate::models::ProfileError;
use crate::services::credential::TokenError;

use super::pager::PagerError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Phone number is not a valid mobile number.
    #[error("invalid phone: {0}")]
    InvalidPhone(#[from] kiosk_core::PhoneError),

    /// Profile fields supplied at login are invalid.
    #[error("invalid profile: {0}")]
    InvalidProfile(#[from] ProfileError),

    /// The pager could not deliver the code.
    #[error("code delivery failed: {0}")]
    DeliveryFailed(#[source] PagerError),

    /// No live challenge for this phone (never issued, expired, or used).
    #[error("no active code for this phone")]
    NoActiveChallenge,

    /// The code does not match the live challenge.
    #[error("code does not match")]
    CodeMismatch,

    /// Session token could not be issued.
    #[error("token error: {0}")]
    Token(#[from] TokenError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}
