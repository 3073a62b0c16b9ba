//! Authentication extractors.
//!
//! Handlers declare what they need by taking one of these extractors. They
//! read the [`SessionContext`] left by
//! [`session_middleware`](super::session::session_middleware).

use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};

use kiosk_core::Role;

use crate::db::{IdentityRepository, RepositoryError};
use crate::error::AppError;
use crate::models::CurrentIdentity;
use crate::state::AppState;

use super::session::SessionContext;

/// Extractor that requires a valid session.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireIdentity(identity): RequireIdentity,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", identity.name)
/// }
/// ```
pub struct RequireIdentity(pub CurrentIdentity);

/// Extractor that requires a staff session.
///
/// The role is read from the store, not the session, so granting or revoking
/// staff takes effect on the next request.
pub struct RequireStaff(pub CurrentIdentity);

/// Error returned when a handler's identity requirement is not met.
#[derive(Debug)]
pub enum AuthRejection {
    /// No valid session.
    Unauthorized,
    /// Valid session without the staff role.
    Forbidden,
    /// The stored role could not be read.
    Store(RepositoryError),
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized => {
                AppError::Unauthorized("Sign in to continue".to_string()).into_response()
            }
            Self::Forbidden => AppError::Forbidden("Staff only".to_string()).into_response(),
            Self::Store(err) => AppError::Database(err).into_response(),
        }
    }
}

fn current_identity(parts: &Parts) -> Option<CurrentIdentity> {
    parts
        .extensions
        .get::<SessionContext>()
        .and_then(|context| context.0.clone())
}

impl<S> FromRequestParts<S> for RequireIdentity
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        current_identity(parts)
            .map(Self)
            .ok_or(AuthRejection::Unauthorized)
    }
}

/// Whether `identity` holds the staff role right now.
///
/// An identity missing from the store is not staff.
///
/// # Errors
///
/// Returns `RepositoryError` if the store fails.
pub async fn has_staff_role(
    state: &AppState,
    identity: &CurrentIdentity,
) -> Result<bool, RepositoryError> {
    Ok(state
        .store()
        .identity_by_id(identity.id)
        .await?
        .is_some_and(|stored| stored.role == Role::Staff))
}

impl FromRequestParts<AppState> for RequireStaff {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let mut identity = current_identity(parts).ok_or(AuthRejection::Unauthorized)?;
        if !has_staff_role(state, &identity)
            .await
            .map_err(AuthRejection::Store)?
        {
            tracing::debug!(identity_id = %identity.id, "Staff route refused");
            return Err(AuthRejection::Forbidden);
        }
        identity.role = Role::Staff;
        Ok(Self(identity))
    }
}

/// Extractor that optionally gets the current identity.
///
/// Unlike `RequireIdentity`, this does not reject anonymous requests.
pub struct OptionalIdentity(pub Option<CurrentIdentity>);

impl<S> FromRequestParts<S> for OptionalIdentity
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(current_identity(parts)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::http::{Request, StatusCode};

    use kiosk_core::{Phone, PriceTier};

    use super::*;
    use crate::db::MemoryStore;
    use crate::models::ProfileUpdate;

    fn parts_with(identity: Option<CurrentIdentity>) -> Parts {
        let (mut parts, ()) = Request::new(()).into_parts();
        parts.extensions.insert(SessionContext(identity));
        parts
    }

    /// A stored identity and a session for it that claims `session_role`.
    async fn session(
        store: &MemoryStore,
        stored_role: Role,
        session_role: Role,
    ) -> CurrentIdentity {
        let phone = Phone::parse("0912345678").unwrap();
        let stored = store
            .upsert_identity(&phone, &ProfileUpdate::default())
            .await
            .unwrap();
        store.set_role(&phone, stored_role).await.unwrap();
        CurrentIdentity {
            id: stored.id,
            phone,
            name: stored.name,
            price_tier: PriceTier::Standard,
            role: session_role,
            issued_at: 0,
        }
    }

    async fn require_staff(
        state: &AppState,
        identity: Option<CurrentIdentity>,
    ) -> Result<RequireStaff, StatusCode> {
        let mut parts = parts_with(identity);
        RequireStaff::from_request_parts(&mut parts, state)
            .await
            .map_err(|rejection| rejection.into_response().status())
    }

    #[tokio::test]
    async fn test_require_identity_rejects_anonymous() {
        let mut parts = parts_with(None);
        let rejection = RequireIdentity::from_request_parts(&mut parts, &())
            .await
            .err()
            .unwrap();
        assert_eq!(rejection.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_require_staff_rejects_anonymous_and_customer() {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::for_tests(store.clone());
        let customer = session(&store, Role::Customer, Role::Customer).await;

        assert_eq!(
            require_staff(&state, None).await.err(),
            Some(StatusCode::UNAUTHORIZED)
        );
        assert_eq!(
            require_staff(&state, Some(customer)).await.err(),
            Some(StatusCode::FORBIDDEN)
        );
    }

    #[tokio::test]
    async fn test_require_staff_accepts_staff() {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::for_tests(store.clone());
        let staff = session(&store, Role::Staff, Role::Staff).await;

        let RequireStaff(staff) = require_staff(&state, Some(staff)).await.unwrap();
        assert_eq!(staff.role, Role::Staff);
    }

    #[tokio::test]
    async fn test_require_staff_follows_stored_role() {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::for_tests(store.clone());

        let revoked = session(&store, Role::Customer, Role::Staff).await;
        assert_eq!(
            require_staff(&state, Some(revoked)).await.err(),
            Some(StatusCode::FORBIDDEN)
        );

        let granted = session(&store, Role::Staff, Role::Customer).await;
        let RequireStaff(staff) = require_staff(&state, Some(granted)).await.unwrap();
        assert_eq!(staff.role, Role::Staff);
    }

    #[tokio::test]
    async fn test_optional_identity_without_middleware() {
        let (mut parts, ()) = Request::new(()).into_parts();
        let OptionalIdentity(identity) = OptionalIdentity::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert!(identity.is_none());
    }
}
