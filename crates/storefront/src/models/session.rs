//! Session-related types.
//!
//! The identity snapshot carried inside the signed session cookie.

use serde::{Deserialize, Serialize};

use kiosk_core::{IdentityId, Phone, PriceTier, Role};

use super::Identity;

/// Identity as seen by a request.
///
/// This is the signed payload of the session token, so its fields (and their
/// order) define the token format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentIdentity {
    /// Identity database ID.
    pub id: IdentityId,
    /// Normalized phone number.
    pub phone: Phone,
    /// Display name at login time.
    pub name: String,
    /// Price tier at login time.
    pub price_tier: PriceTier,
    /// Role at login time. Staff checks read the stored role instead.
    pub role: Role,
    /// Unix seconds when the token was issued.
    pub issued_at: i64,
}

impl CurrentIdentity {
    /// Snapshot an identity for a token issued at `issued_at`.
    #[must_use]
    pub fn from_identity(identity: &Identity, issued_at: i64) -> Self {
        Self {
            id: identity.id,
            phone: identity.phone.clone(),
            name: identity.name.clone(),
            price_tier: identity.price_tier,
            role: identity.role,
            issued_at,
        }
    }
}
