//! Identity domain types.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use kiosk_core::{IdentityId, Phone, PickupType, PriceTier, Role};

/// Maximum length of a display name, in characters.
pub const MAX_NAME_LENGTH: usize = 100;

/// A customer or staff member, keyed by phone number.
///
/// Created on the first successful code verification for an unseen phone and
/// never hard-deleted.
#[derive(Debug, Clone)]
pub struct Identity {
    /// Stable identity ID.
    pub id: IdentityId,
    /// Normalized phone number (unique).
    pub phone: Phone,
    /// Display name; defaults to the phone number.
    pub name: String,
    /// Price tier used when resolving catalog prices.
    pub price_tier: PriceTier,
    /// Access level.
    pub role: Role,
    /// Preferred pickup details, copied onto each order at checkout.
    pub pickup: PickupPreference,
    /// Bumped on every cart write; checkout commits only if it is unchanged.
    pub cart_revision: i64,
    /// When the identity was created.
    pub created_at: DateTime<Utc>,
    /// When the identity was last updated.
    pub updated_at: DateTime<Utc>,
}

/// How and when an order should be handed over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupPreference {
    /// Self pickup or delivery.
    #[serde(default)]
    pub pickup_type: PickupType,
    /// Pickup or ship date.
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// Pickup time of day.
    #[serde(default)]
    pub time: Option<NaiveTime>,
    /// Delivery address; required for delivery.
    #[serde(default)]
    pub address: Option<String>,
}

/// Profile fields a customer may supply when logging in.
///
/// Absent fields leave the stored value untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    /// New display name.
    #[serde(default)]
    pub name: Option<String>,
    /// New pickup preference.
    #[serde(default)]
    pub pickup: Option<PickupPreference>,
}

/// Reasons a [`ProfileUpdate`] is rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("name must be between 1 and {MAX_NAME_LENGTH} characters")]
    NameLength,
    #[error("delivery requires an address")]
    MissingAddress,
}

impl ProfileUpdate {
    /// Trim and validate the update.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError` if the name is blank or too long, or if a
    /// delivery preference has no address.
    pub fn normalized(self) -> Result<Self, ProfileError> {
        let name = match self.name {
            Some(name) => {
                let trimmed = name.trim();
                let len = trimmed.chars().count();
                if len == 0 || len > MAX_NAME_LENGTH {
                    return Err(ProfileError::NameLength);
                }
                Some(trimmed.to_string())
            }
            None => None,
        };

        let pickup = match self.pickup {
            Some(mut pickup) => {
                pickup.address = pickup
                    .address
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty());
                if pickup.pickup_type == PickupType::Delivery && pickup.address.is_none() {
                    return Err(ProfileError::MissingAddress);
                }
                Some(pickup)
            }
            None => None,
        };

        Ok(Self { name, pickup })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_name_is_trimmed() {
        let update = ProfileUpdate {
            name: Some("  Amy  ".to_string()),
            pickup: None,
        }
        .normalized()
        .unwrap();
        assert_eq!(update.name.as_deref(), Some("Amy"));
    }

    #[test]
    fn test_blank_or_long_name_rejected() {
        let blank = ProfileUpdate {
            name: Some("   ".to_string()),
            pickup: None,
        };
        assert_eq!(blank.normalized().unwrap_err(), ProfileError::NameLength);

        let long = ProfileUpdate {
            name: Some("a".repeat(MAX_NAME_LENGTH + 1)),
            pickup: None,
        };
        assert_eq!(long.normalized().unwrap_err(), ProfileError::NameLength);
    }

    #[test]
    fn test_delivery_requires_address() {
        let update = ProfileUpdate {
            name: None,
            pickup: Some(PickupPreference {
                pickup_type: PickupType::Delivery,
                address: Some("  ".to_string()),
                ..PickupPreference::default()
            }),
        };
        assert_eq!(update.normalized().unwrap_err(), ProfileError::MissingAddress);
    }

    #[test]
    fn test_pickup_deserializes_with_defaults() {
        let pickup: PickupPreference =
            serde_json::from_str(r#"{"pickup_type":"delivery","address":"1 Main St"}"#).unwrap();
        assert_eq!(pickup.pickup_type, PickupType::Delivery);
        assert!(pickup.date.is_none());

        let empty: PickupPreference = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, PickupPreference::default());
    }
}
