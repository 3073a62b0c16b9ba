//! CLI subcommand implementations.

pub mod identity;
pub mod migrate;

use secrecy::SecretString;

/// Error for a missing database URL.
#[derive(Debug, thiserror::Error)]
#[error("Missing environment variable: KIOSK_DATABASE_URL (or DATABASE_URL)")]
pub struct MissingDatabaseUrl;

/// Read the database URL the same way the server does.
///
/// # Errors
///
/// Returns `MissingDatabaseUrl` if neither variable is set.
pub fn database_url() -> Result<SecretString, MissingDatabaseUrl> {
    dotenvy::dotenv().ok();

    std::env::var("KIOSK_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| MissingDatabaseUrl)
}
