//! Identity management commands.
//!
//! Identities are created by logging in; these commands only change the role
//! or price tier of an existing one. Changes reach a signed-in client the
//! next time it logs in, except prices, which are read from the store.
//!
//! # Usage
//!
//! ```bash
//! kiosk-cli staff grant --phone 0912345678
//! kiosk-cli staff revoke --phone 0912345678
//! kiosk-cli tier set --phone 0912345678 --tier wholesale
//! ```

use kiosk_core::{Phone, PriceTier, Role};
use kiosk_storefront::db::{IdentityRepository, PgStore, RepositoryError};
use kiosk_storefront::models::Identity;
use thiserror::Error;

use super::{MissingDatabaseUrl, database_url};

/// Errors that can occur during identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error(transparent)]
    MissingEnvVar(#[from] MissingDatabaseUrl),

    #[error("Database connection error: {0}")]
    Connect(#[from] sqlx::Error),

    #[error("No identity with phone {0}; they must log in once first")]
    UnknownPhone(String),

    #[error("Database error: {0}")]
    Repository(RepositoryError),
}

async fn connect() -> Result<PgStore, IdentityError> {
    let url = database_url()?;
    tracing::info!("Connecting to database...");
    Ok(PgStore::new(kiosk_storefront::db::create_pool(&url).await?))
}

fn not_found_as_unknown(phone: &Phone) -> impl FnOnce(RepositoryError) -> IdentityError + '_ {
    move |e| match e {
        RepositoryError::NotFound => IdentityError::UnknownPhone(phone.masked()),
        other => IdentityError::Repository(other),
    }
}

/// Give or take the staff role.
///
/// # Errors
///
/// Returns `IdentityError::UnknownPhone` if nobody has logged in with `phone`.
pub async fn set_role(phone: &Phone, role: Role) -> Result<Identity, IdentityError> {
    let store = connect().await?;
    let identity = store
        .set_role(phone, role)
        .await
        .map_err(not_found_as_unknown(phone))?;

    tracing::info!(identity_id = %identity.id, phone = %phone.masked(), %role, "Role updated");
    Ok(identity)
}

/// Change the price tier used for an identity's carts and checkouts.
///
/// # Errors
///
/// Returns `IdentityError::UnknownPhone` if nobody has logged in with `phone`.
pub async fn set_tier(phone: &Phone, tier: PriceTier) -> Result<Identity, IdentityError> {
    let store = connect().await?;
    let identity = store
        .set_price_tier(phone, tier)
        .await
        .map_err(not_found_as_unknown(phone))?;

    tracing::info!(identity_id = %identity.id, phone = %phone.masked(), %tier, "Price tier updated");
    Ok(identity)
}
