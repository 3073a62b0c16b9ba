//! Login route handlers.
//!
//! Phone login is two requests: ask for a code, then trade the code (plus
//! optional profile fields) for a session cookie.

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse},
};
use serde::{Deserialize, Serialize};

use kiosk_core::{IdentityId, Phone, PriceTier, Role};

use crate::error::{Result, add_breadcrumb, clear_sentry_user};
use crate::middleware::{OptionalIdentity, removal_cookie, session_cookie};
use crate::models::{CurrentIdentity, Identity, PickupPreference, ProfileUpdate};
use crate::state::AppState;

use super::extract::ApiJson;

// =============================================================================
// Request / Response Types
// =============================================================================

/// Body of `POST /login/request-code`.
#[derive(Debug, Deserialize)]
pub struct RequestCodeBody {
    pub phone: String,
}

/// Body of `POST /login/verify-code`.
#[derive(Debug, Deserialize)]
pub struct VerifyCodeBody {
    pub phone: String,
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pickup: Option<PickupPreference>,
}

/// Identity fields returned to the client.
#[derive(Debug, Serialize)]
pub struct IdentityView {
    pub id: IdentityId,
    pub phone: Phone,
    pub name: String,
    pub price_tier: PriceTier,
    pub role: Role,
}

impl From<&CurrentIdentity> for IdentityView {
    fn from(identity: &CurrentIdentity) -> Self {
        Self {
            id: identity.id,
            phone: identity.phone.clone(),
            name: identity.name.clone(),
            price_tier: identity.price_tier,
            role: identity.role,
        }
    }
}

impl From<&Identity> for IdentityView {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            phone: identity.phone.clone(),
            name: identity.name.clone(),
            price_tier: identity.price_tier,
            role: identity.role,
        }
    }
}

/// Body of `GET /session`.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub authenticated: bool,
    pub identity: Option<IdentityView>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Send a one-time code to a phone.
///
/// POST /login/request-code
pub async fn request_code(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RequestCodeBody>,
) -> Result<impl IntoResponse> {
    state.auth().request_code(&body.phone).await?;
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "sent": true }))))
}

/// Verify a code and start a session.
///
/// POST /login/verify-code
pub async fn verify_code(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<VerifyCodeBody>,
) -> Result<impl IntoResponse> {
    let profile = ProfileUpdate {
        name: body.name,
        pickup: body.pickup,
    };
    let (identity, token) = state
        .auth()
        .verify_code(&body.phone, &body.code, profile)
        .await?;

    let identity_id = identity.id.to_string();
    add_breadcrumb("auth", "Signed in", Some(&[("identity_id", identity_id.as_str())]));

    let cookie = session_cookie(token, state.config());
    Ok((
        AppendHeaders([(SET_COOKIE, cookie.to_string())]),
        Json(IdentityView::from(&identity)),
    ))
}

/// Describe the current session.
///
/// GET /session
pub async fn session(OptionalIdentity(identity): OptionalIdentity) -> Json<SessionView> {
    Json(SessionView {
        authenticated: identity.is_some(),
        identity: identity.as_ref().map(IdentityView::from),
    })
}

/// Clear the session cookie.
///
/// POST /logout
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    clear_sentry_user();
    (
        StatusCode::NO_CONTENT,
        AppendHeaders([(SET_COOKIE, removal_cookie(state.config()).to_string())]),
    )
}
