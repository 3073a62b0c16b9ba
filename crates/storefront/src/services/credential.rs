//! Signed session tokens.
//!
//! A token is `base64url(json(payload)) + "." + hex(hmac_sha256(secret, json(payload)))`.
//! Nothing is stored server-side: a token is valid exactly when its signature
//! verifies under the configured secret.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

use crate::models::CurrentIdentity;

type HmacSha256 = Hmac<Sha256>;

/// Length of a hex-encoded SHA-256 MAC.
const SIGNATURE_HEX_LEN: usize = 64;

/// Errors from signing or verifying a session token.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The secret cannot be used as an HMAC key.
    #[error("invalid signing key")]
    InvalidKey,

    /// The token is not `payload.signature`.
    #[error("malformed token")]
    Malformed,

    /// The signature does not match the payload.
    #[error("signature mismatch")]
    BadSignature,

    /// The payload could not be (de)serialized.
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Signs and verifies session tokens with one secret.
#[derive(Clone)]
pub struct SessionCodec {
    mac: HmacSha256,
}

impl std::fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCodec")
            .field("mac", &"[REDACTED]")
            .finish()
    }
}

impl SessionCodec {
    /// Create a codec keyed with `secret`.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::InvalidKey` if the secret is rejected as a key.
    pub fn new(secret: &SecretString) -> Result<Self, TokenError> {
        let mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
            .map_err(|_| TokenError::InvalidKey)?;
        Ok(Self { mac })
    }

    /// Sign `payload` into a token.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Payload` if the payload cannot be serialized.
    pub fn sign(&self, payload: &CurrentIdentity) -> Result<String, TokenError> {
        let json = serde_json::to_vec(payload)?;
        let mut mac = self.mac.clone();
        mac.update(&json);
        let signature = hex::encode(mac.finalize().into_bytes());
        Ok(format!("{}.{signature}", URL_SAFE_NO_PAD.encode(&json)))
    }

    /// Verify `token` and return its payload.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Malformed` if the token is not `payload.signature`
    /// with a 64-character lowercase hex signature and a base64url payload,
    /// `TokenError::BadSignature` if the MAC does not match, and
    /// `TokenError::Payload` if the signed payload does not deserialize.
    pub fn verify(&self, token: &str) -> Result<CurrentIdentity, TokenError> {
        let (encoded, signature) = token.split_once('.').ok_or(TokenError::Malformed)?;

        // Lowercase only, so each token has exactly one valid spelling.
        if signature.len() != SIGNATURE_HEX_LEN
            || !signature
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(TokenError::Malformed);
        }
        let signature = hex::decode(signature).map_err(|_| TokenError::Malformed)?;
        let json = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| TokenError::Malformed)?;

        let mut mac = self.mac.clone();
        mac.update(&json);
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        Ok(serde_json::from_slice(&json)?)
    }
}
