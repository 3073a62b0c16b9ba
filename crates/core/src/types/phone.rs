//! Mobile phone number type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Phone`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneError {
    /// The input string is empty.
    #[error("phone number cannot be empty")]
    Empty,
    /// The input contains something other than digits and separators.
    #[error("phone number may only contain digits, spaces, dashes, dots and parentheses")]
    InvalidCharacter,
    /// The number does not have the expected number of digits.
    #[error("phone number must have exactly {expected} digits")]
    InvalidLength {
        /// Expected number of digits.
        expected: usize,
    },
    /// The number is not a mobile number.
    #[error("phone number must start with 09")]
    NotMobile,
}

/// A normalized mobile phone number.
///
/// Phones are the natural key for identities and the address one-time codes
/// are delivered to, so two spellings of the same number must compare equal.
///
/// ## Normalization
///
/// - Spaces, dashes, dots and parentheses are ignored
/// - A leading `+886` country code is rewritten to the domestic `0` prefix
/// - The result must be 10 digits starting with `09`
///
/// ## Examples
///
/// ```
/// use kiosk_core::Phone;
///
/// assert_eq!(Phone::parse("0912345678").unwrap().as_str(), "0912345678");
/// assert_eq!(Phone::parse("0912-345-678").unwrap().as_str(), "0912345678");
/// assert_eq!(Phone::parse("+886 912 345 678").unwrap().as_str(), "0912345678");
///
/// assert!(Phone::parse("").is_err());
/// assert!(Phone::parse("0212345678").is_err()); // landline
/// assert!(Phone::parse("091234567").is_err());  // too short
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Phone(String);

impl Phone {
    /// Number of digits in a normalized phone number.
    pub const DIGITS: usize = 10;

    const COUNTRY_PREFIX: &'static str = "+886";

    /// Parse and normalize a `Phone` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input:
    /// - Is empty
    /// - Contains characters other than digits and separators
    /// - Does not have exactly 10 digits after normalization
    /// - Does not start with `09`
    pub fn parse(s: &str) -> Result<Self, PhoneError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(PhoneError::Empty);
        }

        let (domestic, rest) = trimmed
            .strip_prefix(Self::COUNTRY_PREFIX)
            .map_or((false, trimmed), |rest| (true, rest));

        let mut digits = String::with_capacity(Self::DIGITS);
        if domestic {
            digits.push('0');
        }
        for c in rest.chars() {
            match c {
                '0'..='9' => digits.push(c),
                ' ' | '-' | '.' | '(' | ')' => {}
                _ => return Err(PhoneError::InvalidCharacter),
            }
        }

        if digits.len() != Self::DIGITS {
            return Err(PhoneError::InvalidLength {
                expected: Self::DIGITS,
            });
        }

        if !digits.starts_with("09") {
            return Err(PhoneError::NotMobile);
        }

        Ok(Self(digits))
    }

    /// Returns the normalized number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `Phone` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Returns the number with its middle digits hidden, for logs.
    #[must_use]
    pub fn masked(&self) -> String {
        let head = self.0.get(..4).unwrap_or_default();
        let tail = self.0.get(7..).unwrap_or_default();
        format!("{head}***{tail}")
    }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Phone {
    type Err = PhoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Phone {
    type Error = PhoneError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Phone> for String {
    fn from(phone: Phone) -> Self {
        phone.0
    }
}

impl AsRef<str> for Phone {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// SQLx support (with postgres feature)
#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Phone {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Phone {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::parse(&s)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Phone {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_phones() {
        assert!(Phone::parse("0912345678").is_ok());
        assert!(Phone::parse(" 0912345678 ").is_ok());
        assert!(Phone::parse("0912 345 678").is_ok());
        assert!(Phone::parse("(0912) 345-678").is_ok());
        assert!(Phone::parse("0912.345.678").is_ok());
    }

    #[test]
    fn test_parse_country_code() {
        let phone = Phone::parse("+886912345678").unwrap();
        assert_eq!(phone.as_str(), "0912345678");
        assert_eq!(phone, Phone::parse("0912-345-678").unwrap());
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(Phone::parse(""), Err(PhoneError::Empty));
        assert_eq!(Phone::parse("   "), Err(PhoneError::Empty));
    }

    #[test]
    fn test_parse_invalid_character() {
        assert_eq!(Phone::parse("09123x5678"), Err(PhoneError::InvalidCharacter));
        assert_eq!(Phone::parse("+1 0912345678"), Err(PhoneError::InvalidCharacter));
    }

    #[test]
    fn test_parse_wrong_length() {
        assert!(matches!(
            Phone::parse("091234567"),
            Err(PhoneError::InvalidLength { expected: 10 })
        ));
        assert!(matches!(
            Phone::parse("09123456789"),
            Err(PhoneError::InvalidLength { .. })
        ));
    }

    #[test]
    fn test_parse_not_mobile() {
        assert_eq!(Phone::parse("0223456789"), Err(PhoneError::NotMobile));
    }

    #[test]
    fn test_masked_hides_middle_digits() {
        let phone = Phone::parse("0912345678").unwrap();
        assert_eq!(phone.masked(), "0912***678");
    }

    #[test]
    fn test_serde_validates_on_deserialize() {
        let phone = Phone::parse("0912345678").unwrap();
        let json = serde_json::to_string(&phone).unwrap();
        assert_eq!(json, "\"0912345678\"");

        let parsed: Phone = serde_json::from_str("\"0912-345-678\"").unwrap();
        assert_eq!(parsed, phone);

        assert!(serde_json::from_str::<Phone>("\"12345\"").is_err());
    }
}
