//! Authentication service.
//!
//! Phone login in two steps: request a one-time code, then verify it. A
//! successful verification upserts the identity and issues a signed session
//! token.

mod error;
pub mod otp;
pub mod pager;

pub use error::AuthError;
pub use otp::OtpManager;
pub use pager::{LogPager, Pager, PagerError, WebhookPager};

use chrono::Utc;
use tracing::instrument;

use kiosk_core::Phone;

use crate::db::{IdentityRepository, Store};
use crate::models::{CurrentIdentity, Identity, ProfileUpdate};
use crate::services::credential::SessionCodec;

/// Authentication service.
///
/// Borrows the long-lived OTP manager, store and codec from application
/// state for the duration of one request.
pub struct AuthService<'a> {
    otp: &'a OtpManager,
    store: &'a dyn Store,
    codec: &'a SessionCodec,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(otp: &'a OtpManager, store: &'a dyn Store, codec: &'a SessionCodec) -> Self {
        Self { otp, store, codec }
    }

    /// Send a one-time code to `phone`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidPhone` if the phone is not a mobile number.
    /// Returns `AuthError::DeliveryFailed` if the code cannot be sent.
    #[instrument(skip_all)]
    pub async fn request_code(&self, phone: &str) -> Result<(), AuthError> {
        let phone = Phone::parse(phone)?;
        self.otp.request_code(&phone).await
    }

    /// Verify a code, upsert the identity, and issue a session token.
    ///
    /// Profile fields are validated before the code is checked, so a bad
    /// profile never burns the challenge.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidPhone` or `AuthError::InvalidProfile` for
    /// bad input, `AuthError::NoActiveChallenge` or `AuthError::CodeMismatch`
    /// if the code does not verify, and `AuthError::Repository` or
    /// `AuthError::Token` on internal failures.
    #[instrument(skip_all)]
    pub async fn verify_code(
        &self,
        phone: &str,
        code: &str,
        profile: ProfileUpdate,
    ) -> Result<(Identity, String), AuthError> {
        let phone = Phone::parse(phone)?;
        let profile = profile.normalized()?;

        self.otp.verify_code(&phone, code.trim()).await?;

        let identity = self.store.upsert_identity(&phone, &profile).await?;
        let token = self.issue_token(&identity)?;

        tracing::info!(identity_id = %identity.id, phone = %phone.masked(), "Identity logged in");
        Ok((identity, token))
    }

    /// Sign a session token for `identity`, issued now.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Token` if the payload cannot be signed.
    pub fn issue_token(&self, identity: &Identity) -> Result<String, AuthError> {
        let payload = CurrentIdentity::from_identity(identity, Utc::now().timestamp());
        Ok(self.codec.sign(&payload)?)
    }
}
