//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `KIOSK_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `KIOSK_BASE_URL` - Public URL of the API (decides the cookie `Secure` flag)
//! - `KIOSK_SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `KIOSK_HOST` - Bind address (default: 127.0.0.1)
//! - `KIOSK_PORT` - Listen port (default: 3000)
//! - `KIOSK_ENVIRONMENT` - `production` or `development` (default: production)
//! - `KIOSK_SESSION_MAX_AGE_DAYS` - Session lifetime (default: 30)
//! - `KIOSK_OTP_TTL_SECONDS` - One-time code lifetime (default: 300)
//! - `KIOSK_OTP_MAX_ATTEMPTS` - Wrong codes before a challenge is dropped (default: 5)
//! - `KIOSK_STORE_RETRIES` - Retries on storage write conflicts (default: 3)
//! - `KIOSK_RATE_LIMIT` - Rate limit login endpoints (default: true)
//! - `KIOSK_PAGER_WEBHOOK_URL` - Webhook that delivers one-time codes (logs them if unset)
//! - `KIOSK_PAGER_TOKEN` - Bearer token for the pager webhook
//! - `KIOSK_FIXTURE_PHONE` - Fixed identity for local development (development only)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Performance sample rate (default: 0.1)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use kiosk_core::Phone;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Production,
    Development,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "production" => Ok(Self::Production),
            "development" => Ok(Self::Development),
            _ => Err(format!("expected production or development, got {s}")),
        }
    }
}

/// Server application configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL
    pub base_url: String,
    /// Deployment environment
    pub environment: Environment,
    /// Session signing and lifetime
    pub session: SessionConfig,
    /// One-time code settings
    pub otp: OtpConfig,
    /// One-time code delivery
    pub pager: PagerConfig,
    /// Bounded retries when a conditional write loses a race
    pub store_retries: u32,
    /// Whether login endpoints are rate limited
    pub rate_limit: bool,
    /// Phone of the fixed development identity
    pub fixture_phone: Option<Phone>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Sentry error event sample rate
    pub sentry_sample_rate: f32,
    /// Sentry performance trace sample rate
    pub sentry_traces_sample_rate: f32,
}

/// Session cookie configuration.
///
/// Implements `Debug` manually to redact the secret.
#[derive(Clone)]
pub struct SessionConfig {
    /// HMAC key for session tokens
    pub secret: SecretString,
    /// How long a signed session stays valid
    pub max_age: Duration,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &"[REDACTED]")
            .field("max_age", &self.max_age)
            .finish()
    }
}

/// One-time code configuration.
#[derive(Debug, Clone, Copy)]
pub struct OtpConfig {
    /// Lifetime of an issued code
    pub ttl: Duration,
    /// Wrong guesses allowed before the challenge is dropped
    pub max_attempts: u32,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_attempts: 5,
        }
    }
}

/// One-time code delivery configuration.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone, Default)]
pub struct PagerConfig {
    /// Webhook that sends the code; codes are only logged when unset
    pub webhook_url: Option<Url>,
    /// Bearer token for the webhook
    pub token: Option<SecretString>,
}

impl std::fmt::Debug for PagerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagerConfig")
            .field("webhook_url", &self.webhook_url.as_ref().map(Url::as_str))
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("KIOSK_DATABASE_URL")?;
        let host = get_parsed_or_default::<IpAddr>("KIOSK_HOST", "127.0.0.1")?;
        let port = get_parsed_or_default::<u16>("KIOSK_PORT", "3000")?;
        let base_url = get_required_env("KIOSK_BASE_URL")?;
        let environment = get_parsed_or_default::<Environment>("KIOSK_ENVIRONMENT", "production")?;

        let secret = get_validated_secret("KIOSK_SESSION_SECRET")?;
        validate_session_secret(&secret, "KIOSK_SESSION_SECRET")?;
        let max_age_days = get_parsed_or_default::<u64>("KIOSK_SESSION_MAX_AGE_DAYS", "30")?;
        let session = SessionConfig {
            secret,
            max_age: session_max_age(max_age_days)?,
        };

        let otp = OtpConfig {
            ttl: Duration::from_secs(get_parsed_or_default::<u64>(
                "KIOSK_OTP_TTL_SECONDS",
                "300",
            )?),
            max_attempts: get_parsed_or_default::<u32>("KIOSK_OTP_MAX_ATTEMPTS", "5")?,
        };

        let pager = PagerConfig {
            webhook_url: get_optional_env("KIOSK_PAGER_WEBHOOK_URL")
                .map(|raw| {
                    Url::parse(&raw).map_err(|e| {
                        ConfigError::InvalidEnvVar("KIOSK_PAGER_WEBHOOK_URL".to_string(), e.to_string())
                    })
                })
                .transpose()?,
            token: get_optional_env("KIOSK_PAGER_TOKEN").map(SecretString::from),
        };

        let fixture_phone = get_optional_env("KIOSK_FIXTURE_PHONE")
            .map(|raw| {
                Phone::parse(&raw).map_err(|e| {
                    ConfigError::InvalidEnvVar("KIOSK_FIXTURE_PHONE".to_string(), e.to_string())
                })
            })
            .transpose()?;
        validate_fixture(fixture_phone.as_ref(), environment)?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            environment,
            session,
            otp,
            pager,
            store_retries: get_parsed_or_default::<u32>("KIOSK_STORE_RETRIES", "3")?,
            rate_limit: get_parsed_or_default::<bool>("KIOSK_RATE_LIMIT", "true")?,
            fixture_phone,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: get_parsed_or_default::<f32>("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: get_parsed_or_default::<f32>(
                "SENTRY_TRACES_SAMPLE_RATE",
                "0.1",
            )?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should carry the `Secure` attribute.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get an environment variable (or its default) parsed into `T`.
fn get_parsed_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Session lifetime for `days` days.
fn session_max_age(days: u64) -> Result<Duration, ConfigError> {
    days.checked_mul(24 * 60 * 60)
        .map(Duration::from_secs)
        .ok_or_else(|| {
            ConfigError::InvalidEnvVar(
                "KIOSK_SESSION_MAX_AGE_DAYS".to_string(),
                format!("{days} days is out of range"),
            )
        })
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// A fixture identity bypasses login, so production refuses it.
fn validate_fixture(phone: Option<&Phone>, environment: Environment) -> Result<(), ConfigError> {
    if phone.is_some() && environment == Environment::Production {
        return Err(ConfigError::InvalidEnvVar(
            "KIOSK_FIXTURE_PHONE".to_string(),
            "only allowed when KIOSK_ENVIRONMENT=development".to_string(),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
