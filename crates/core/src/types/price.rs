//! Type-safe price representation using decimal arithmetic.
//!
//! The store sells in a single currency, so a price is a non-negative
//! decimal amount in the currency's standard unit with at most two decimal
//! places. Every price fits the `NUMERIC(12, 2)` columns it is stored in.
//! Arithmetic is exact and checked; floating point never touches a total.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The amount is below zero.
    #[error("price cannot be negative")]
    Negative,

    /// The amount has more than two decimal places.
    #[error("price cannot have more than two decimal places")]
    TooPrecise,

    /// The amount does not fit in storage.
    #[error("price cannot exceed {}", Price::MAX)]
    TooLarge,
}

/// A non-negative amount of money.
///
/// ## Examples
///
/// ```
/// use kiosk_core::Price;
/// use rust_decimal::Decimal;
///
/// let unit = Price::new(Decimal::new(100, 0)).unwrap();
/// assert_eq!(unit.checked_times(2).unwrap().amount(), Decimal::new(200, 0));
///
/// assert!(Price::new(Decimal::new(-1, 0)).is_err());
/// assert!(Price::new(Decimal::new(333, 3)).is_err());
/// assert!(Price::MAX.checked_times(2).is_none());
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// The zero price.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// The largest storable price, `9999999999.99`.
    pub const MAX: Self = Self(Decimal::from_parts(3_567_587_327, 232, 0, false, 2));

    /// Create a price from a decimal amount.
    ///
    /// Trailing zeros do not count as decimal places, so `1.500` is accepted.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Negative` if the amount is below zero,
    /// `PriceError::TooPrecise` if it has sub-cent digits and
    /// `PriceError::TooLarge` above [`Price::MAX`].
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative);
        }
        if amount.normalize().scale() > 2 {
            return Err(PriceError::TooPrecise);
        }
        if amount > Self::MAX.0 {
            return Err(PriceError::TooLarge);
        }
        Ok(Self(amount))
    }

    /// Create a price from a whole number of currency units.
    #[must_use]
    pub fn from_units(units: u32) -> Self {
        Self(Decimal::from(units))
    }

    /// Get the underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Price of `quantity` units at this unit price, or `None` if it would
    /// exceed [`Price::MAX`].
    #[must_use]
    pub fn checked_times(self, quantity: u32) -> Option<Self> {
        self.0
            .checked_mul(Decimal::from(quantity))
            .and_then(|amount| Self::new(amount).ok())
    }

    /// `self + rhs`, or `None` if the sum would exceed [`Price::MAX`].
    #[must_use]
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0
            .checked_add(rhs.0)
            .and_then(|amount| Self::new(amount).ok())
    }

    /// Sum of `prices`, or `None` if it would exceed [`Price::MAX`].
    #[must_use]
    pub fn checked_sum<I: IntoIterator<Item = Self>>(prices: I) -> Option<Self> {
        prices
            .into_iter()
            .try_fold(Self::ZERO, Self::checked_add)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        Self::new(amount)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

// SQLx support (with postgres feature)
#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Price {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Price {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let amount = <Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::new(amount)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Price {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_rejected() {
        assert_eq!(Price::new(Decimal::new(-5, 1)), Err(PriceError::Negative));
        assert!(Price::new(Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_times_and_sum_are_exact() {
        let lines = [
            Price::new(Decimal::new(1999, 2)).unwrap().checked_times(3).unwrap(),
            Price::new(Decimal::new(1, 2)).unwrap().checked_times(1).unwrap(),
        ];
        let total = Price::checked_sum(lines).unwrap();
        assert_eq!(total.amount(), Decimal::new(5998, 2));
        assert_eq!(Price::checked_sum([]), Some(Price::ZERO));
    }

    #[test]
    fn test_sub_cent_amounts_rejected() {
        assert_eq!(Price::new(Decimal::new(333, 3)), Err(PriceError::TooPrecise));
        assert!(Price::new(Decimal::new(1500, 3)).is_ok());
        assert!(serde_json::from_str::<Price>("\"0.333\"").is_err());
    }

    #[test]
    fn test_max_matches_storage_bound() {
        assert_eq!(Price::MAX.to_string(), "9999999999.99");
        assert_eq!(
            Price::new(Decimal::new(1_000_000_000_000, 2)),
            Err(PriceError::TooLarge)
        );
    }

    #[test]
    fn test_overflow_is_none_not_panic() {
        assert_eq!(Price::MAX.checked_times(2), None);
        assert_eq!(Price::MAX.checked_add(Price::new(Decimal::new(1, 2)).unwrap()), None);
        assert_eq!(Price::MAX.checked_times(1), Some(Price::MAX));
        assert_eq!(Price::checked_sum([Price::MAX, Price::MAX]), None);
    }

    #[test]
    fn test_display_two_decimals() {
        assert_eq!(Price::from_units(250).to_string(), "250.00");
    }

    #[test]
    fn test_serde_as_string_and_validates() {
        let json = serde_json::to_string(&Price::from_units(100)).unwrap();
        assert_eq!(json, "\"100\"");
        assert!(serde_json::from_str::<Price>("\"-1\"").is_err());
    }
}
