//! Session resolution.
//!
//! Sessions are stateless: the `kiosk_session` cookie holds a signed
//! [`CurrentIdentity`]. An [`IdentityProvider`] turns request headers into an
//! identity, and [`session_middleware`] stores the result in request
//! extensions for the extractors in [`super::auth`].
//!
//! In development a [`FixtureIdentityProvider`] can stand in for the cookie so
//! every request runs as one configured identity.

use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    http::header::COOKIE,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use cookie::{Cookie, SameSite};
use tracing::Span;

use kiosk_core::Phone;

use crate::config::ServerConfig;
use crate::db::{IdentityRepository, RepositoryError, Store};
use crate::error::set_sentry_user;
use crate::models::{CurrentIdentity, ProfileUpdate};
use crate::services::credential::SessionCodec;
use crate::state::AppState;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "kiosk_session";

/// Resolves the identity behind a request.
pub trait IdentityProvider: Send + Sync {
    /// Return the identity for these headers, or `None` for an anonymous
    /// request.
    fn resolve(&self, headers: &HeaderMap) -> Option<CurrentIdentity>;
}

/// Reads the identity from the signed session cookie.
#[derive(Debug, Clone)]
pub struct SignedCookieProvider {
    codec: SessionCodec,
    max_age: Duration,
}

impl SignedCookieProvider {
    /// Create a provider that accepts tokens younger than `max_age`.
    #[must_use]
    pub const fn new(codec: SessionCodec, max_age: Duration) -> Self {
        Self { codec, max_age }
    }

    fn is_expired(&self, identity: &CurrentIdentity, now: i64) -> bool {
        let max_age = i64::try_from(self.max_age.as_secs()).unwrap_or(i64::MAX);
        now.saturating_sub(identity.issued_at) > max_age
    }
}

impl IdentityProvider for SignedCookieProvider {
    fn resolve(&self, headers: &HeaderMap) -> Option<CurrentIdentity> {
        let token = session_token(headers)?;
        let identity = match self.codec.verify(&token) {
            Ok(identity) => identity,
            Err(e) => {
                tracing::debug!(error = %e, "Rejected session cookie");
                return None;
            }
        };

        if self.is_expired(&identity, Utc::now().timestamp()) {
            tracing::debug!(identity_id = %identity.id, "Session cookie expired");
            return None;
        }

        Some(identity)
    }
}

/// Treats every request as one fixed identity.
///
/// Only for local development; configuration refuses it in production.
#[derive(Debug, Clone)]
pub struct FixtureIdentityProvider {
    identity: CurrentIdentity,
}

impl FixtureIdentityProvider {
    /// Wrap an identity snapshot.
    #[must_use]
    pub const fn new(identity: CurrentIdentity) -> Self {
        Self { identity }
    }

    /// Create (or reuse) the identity for `phone` and serve it on every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity cannot be written.
    pub async fn load(store: &dyn Store, phone: &Phone) -> Result<Self, RepositoryError> {
        let identity = store
            .upsert_identity(phone, &ProfileUpdate::default())
            .await?;
        tracing::warn!(
            identity_id = %identity.id,
            phone = %phone.masked(),
            "Fixture identity provider enabled, every request is authenticated"
        );
        Ok(Self::new(CurrentIdentity::from_identity(
            &identity,
            Utc::now().timestamp(),
        )))
    }
}

impl IdentityProvider for FixtureIdentityProvider {
    fn resolve(&self, _headers: &HeaderMap) -> Option<CurrentIdentity> {
        Some(self.identity.clone())
    }
}

/// Identity resolved for the current request, stored in request extensions.
#[derive(Debug, Clone, Default)]
pub struct SessionContext(pub Option<CurrentIdentity>);

/// Extract the raw session token from the `Cookie` headers.
#[must_use]
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == SESSION_COOKIE_NAME)
        .map(|cookie| cookie.value().to_string())
}

/// Build the cookie carrying a freshly issued token.
#[must_use]
pub fn session_cookie(token: String, config: &ServerConfig) -> Cookie<'static> {
    let max_age = i64::try_from(config.session.max_age.as_secs()).unwrap_or(i64::MAX);
    Cookie::build((SESSION_COOKIE_NAME, token))
        .http_only(true)
        .secure(config.secure_cookies())
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(cookie::time::Duration::seconds(max_age))
        .build()
}

/// Build a cookie that makes the client drop its session.
#[must_use]
pub fn removal_cookie(config: &ServerConfig) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, ""))
        .http_only(true)
        .secure(config.secure_cookies())
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(cookie::time::Duration::ZERO)
        .build()
}

/// Resolve the request's identity and store it as a [`SessionContext`].
///
/// Records `identity_id` on the request span and sets the Sentry user.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let identity = state.identity_provider().resolve(request.headers());

    if let Some(identity) = &identity {
        Span::current().record("identity_id", tracing::field::display(identity.id));
        set_sentry_user(identity);
    }

    request.extensions_mut().insert(SessionContext(identity));
    next.run(request).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::HeaderValue;
    use secrecy::SecretString;

    use kiosk_core::{IdentityId, PriceTier, Role};

    use super::*;

    fn codec() -> SessionCodec {
        SessionCodec::new(&SecretString::from("k".repeat(32))).unwrap()
    }

    fn identity(issued_at: i64) -> CurrentIdentity {
        CurrentIdentity {
            id: IdentityId::new(7),
            phone: Phone::parse("0912345678").unwrap(),
            name: "Customer".to_string(),
            price_tier: PriceTier::Standard,
            role: Role::Customer,
            issued_at,
        }
    }

    fn headers_with_cookie(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_session_token_among_other_cookies() {
        let headers = headers_with_cookie("theme=dark; kiosk_session=abc.def; lang=en");
        assert_eq!(session_token(&headers).as_deref(), Some("abc.def"));
    }

    #[test]
    fn test_session_token_missing() {
        assert!(session_token(&HeaderMap::new()).is_none());
        assert!(session_token(&headers_with_cookie("theme=dark")).is_none());
    }

    #[test]
    fn test_signed_cookie_provider_accepts_fresh_token() {
        let codec = codec();
        let current = identity(Utc::now().timestamp());
        let token = codec.sign(&current).unwrap();
        let provider = SignedCookieProvider::new(codec, Duration::from_secs(60));

        let headers = headers_with_cookie(&format!("{SESSION_COOKIE_NAME}={token}"));
        assert_eq!(provider.resolve(&headers), Some(current));
    }

    #[test]
    fn test_signed_cookie_provider_rejects_expired_token() {
        let codec = codec();
        let token = codec
            .sign(&identity(Utc::now().timestamp() - 3600))
            .unwrap();
        let provider = SignedCookieProvider::new(codec, Duration::from_secs(60));

        let headers = headers_with_cookie(&format!("{SESSION_COOKIE_NAME}={token}"));
        assert!(provider.resolve(&headers).is_none());
    }

    #[test]
    fn test_signed_cookie_provider_rejects_foreign_key() {
        let other = SessionCodec::new(&SecretString::from("z".repeat(32))).unwrap();
        let token = other.sign(&identity(Utc::now().timestamp())).unwrap();
        let provider = SignedCookieProvider::new(codec(), Duration::from_secs(60));

        let headers = headers_with_cookie(&format!("{SESSION_COOKIE_NAME}={token}"));
        assert!(provider.resolve(&headers).is_none());
    }

    #[test]
    fn test_fixture_provider_ignores_headers() {
        let provider = FixtureIdentityProvider::new(identity(0));
        assert_eq!(provider.resolve(&HeaderMap::new()), Some(identity(0)));
    }
}
