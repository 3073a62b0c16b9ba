//! One-time code challenges.
//!
//! At most one live challenge exists per phone; requesting a new code
//! replaces it. A challenge is consumed by its first correct guess, expires
//! after the configured TTL, and is dropped once the attempt limit is hit.

use std::future::ready;
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::future::Cache;
use moka::ops::compute::Op;
use rand::Rng;
use subtle::ConstantTimeEq;

use kiosk_core::Phone;

use crate::config::OtpConfig;

use super::AuthError;
use super::pager::Pager;

/// Upper bound on concurrently live challenges.
const MAX_CHALLENGES: u64 = 100_000;

#[derive(Debug, Clone)]
struct Challenge {
    /// Distinguishes this challenge from one that superseded it.
    nonce: u64,
    code: String,
    issued_at: Instant,
    failed_attempts: u32,
}

impl Challenge {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.issued_at.elapsed() >= ttl
    }

    fn matches(&self, code: &str) -> bool {
        self.code.as_bytes().ct_eq(code.as_bytes()).into()
    }
}

enum Verification {
    NoChallenge,
    Mismatch,
    Verified,
}

/// Issues and checks one-time codes.
#[derive(Clone)]
pub struct OtpManager {
    challenges: Cache<Phone, Challenge>,
    pager: Arc<dyn Pager>,
    config: OtpConfig,
}

impl std::fmt::Debug for OtpManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtpManager")
            .field("live_challenges", &self.challenges.entry_count())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OtpManager {
    /// Create a manager delivering codes through `pager`.
    #[must_use]
    pub fn new(pager: Arc<dyn Pager>, config: OtpConfig) -> Self {
        // Expiry is checked on every verify; the cache TTL only evicts.
        let challenges = Cache::builder()
            .max_capacity(MAX_CHALLENGES)
            .time_to_live(config.ttl.max(Duration::from_secs(1)))
            .build();

        Self {
            challenges,
            pager,
            config,
        }
    }

    /// Issue a fresh code for `phone` and send it.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::DeliveryFailed` if the pager fails; the challenge
    /// is withdrawn unless a newer one already replaced it.
    pub async fn request_code(&self, phone: &Phone) -> Result<(), AuthError> {
        let (code, nonce) = {
            let mut rng = rand::rng();
            (format!("{:04}", rng.random_range(0..10_000_u32)), rng.random::<u64>())
        };

        self.challenges
            .insert(
                phone.clone(),
                Challenge {
                    nonce,
                    code: code.clone(),
                    issued_at: Instant::now(),
                    failed_attempts: 0,
                },
            )
            .await;

        if let Err(e) = self.pager.send(phone, &code).await {
            tracing::warn!(phone = %phone.masked(), error = %e, "One-time code delivery failed");
            self.challenges
                .entry(phone.clone())
                .and_compute_with(|entry| {
                    let op = match entry {
                        Some(entry) if entry.value().nonce == nonce => Op::Remove,
                        _ => Op::Nop,
                    };
                    ready(op)
                })
                .await;
            return Err(AuthError::DeliveryFailed(e));
        }

        tracing::info!(phone = %phone.masked(), "One-time code issued");
        Ok(())
    }

    /// Check `code` against the live challenge for `phone`, consuming it on
    /// success.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NoActiveChallenge` if there is no live challenge
    /// and `AuthError::CodeMismatch` if the code is wrong.
    pub async fn verify_code(&self, phone: &Phone, code: &str) -> Result<(), AuthError> {
        let ttl = self.config.ttl;
        let max_attempts = self.config.max_attempts;
        let mut outcome = Verification::NoChallenge;

        self.challenges
            .entry(phone.clone())
            .and_compute_with(|entry| {
                let op = match entry.map(moka::Entry::into_value) {
                    None => Op::Nop,
                    Some(challenge) if challenge.is_expired(ttl) => Op::Remove,
                    Some(challenge) if challenge.matches(code) => {
                        outcome = Verification::Verified;
                        Op::Remove
                    }
                    Some(mut challenge) => {
                        outcome = Verification::Mismatch;
                        challenge.failed_attempts += 1;
                        if challenge.failed_attempts >= max_attempts {
                            Op::Remove
                        } else {
                            Op::Put(challenge)
                        }
                    }
                };
                ready(op)
            })
            .await;

        match outcome {
            Verification::Verified => Ok(()),
            Verification::Mismatch => {
                tracing::info!(phone = %phone.masked(), "One-time code mismatch");
                Err(AuthError::CodeMismatch)
            }
            Verification::NoChallenge => Err(AuthError::NoActiveChallenge),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::services::auth::pager::PagerError;

    #[derive(Default)]
    struct CapturingPager {
        codes: Mutex<Vec<String>>,
    }

    impl CapturingPager {
        fn last(&self) -> String {
            self.codes.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Pager for CapturingPager {
        async fn send(&self, _phone: &Phone, code: &str) -> Result<(), PagerError> {
            self.codes.lock().unwrap().push(code.to_string());
            Ok(())
        }
    }

    struct DownPager;

    #[async_trait]
    impl Pager for DownPager {
        async fn send(&self, _phone: &Phone, _code: &str) -> Result<(), PagerError> {
            Err(PagerError::Api {
                status: 503,
                message: "gateway down".to_string(),
            })
        }
    }

    fn phone() -> Phone {
        Phone::parse("0912345678").unwrap()
    }

    fn manager(pager: Arc<dyn Pager>, ttl: Duration, max_attempts: u32) -> OtpManager {
        OtpManager::new(pager, OtpConfig { ttl, max_attempts })
    }

    fn wrong(code: &str) -> String {
        if code == "0000" { "1111" } else { "0000" }.to_string()
    }

    #[tokio::test]
    async fn test_code_is_four_digits_and_single_use() {
        let pager = Arc::new(CapturingPager::default());
        let otp = manager(pager.clone(), Duration::from_secs(300), 5);

        otp.request_code(&phone()).await.unwrap();
        let code = pager.last();
        assert_eq!(code.len(), 4);
        assert!(code.bytes().all(|b| b.is_ascii_digit()));

        otp.verify_code(&phone(), &code).await.unwrap();
        assert!(matches!(
            otp.verify_code(&phone(), &code).await,
            Err(AuthError::NoActiveChallenge)
        ));
    }

    #[tokio::test]
    async fn test_mismatch_keeps_challenge_until_limit() {
        let pager = Arc::new(CapturingPager::default());
        let otp = manager(pager.clone(), Duration::from_secs(300), 3);
        otp.request_code(&phone()).await.unwrap();
        let code = pager.last();

        for _ in 0..2 {
            assert!(matches!(
                otp.verify_code(&phone(), &wrong(&code)).await,
                Err(AuthError::CodeMismatch)
            ));
        }
        otp.verify_code(&phone(), &code).await.unwrap();
    }

    #[tokio::test]
    async fn test_attempt_limit_destroys_challenge() {
        let pager = Arc::new(CapturingPager::default());
        let otp = manager(pager.clone(), Duration::from_secs(300), 2);
        otp.request_code(&phone()).await.unwrap();
        let code = pager.last();

        for _ in 0..2 {
            assert!(matches!(
                otp.verify_code(&phone(), &wrong(&code)).await,
                Err(AuthError::CodeMismatch)
            ));
        }
        assert!(matches!(
            otp.verify_code(&phone(), &code).await,
            Err(AuthError::NoActiveChallenge)
        ));
    }

    #[tokio::test]
    async fn test_expired_challenge_rejected() {
        let pager = Arc::new(CapturingPager::default());
        let otp = manager(pager.clone(), Duration::ZERO, 5);
        otp.request_code(&phone()).await.unwrap();

        assert!(matches!(
            otp.verify_code(&phone(), &pager.last()).await,
            Err(AuthError::NoActiveChallenge)
        ));
    }

    #[tokio::test]
    async fn test_new_request_supersedes_old_code() {
        let pager = Arc::new(CapturingPager::default());
        let otp = manager(pager.clone(), Duration::from_secs(300), 5);

        otp.request_code(&phone()).await.unwrap();
        let first = pager.last();
        // Retry until the second code differs so the check is meaningful.
        let second = loop {
            otp.request_code(&phone()).await.unwrap();
            let code = pager.last();
            if code != first {
                break code;
            }
        };

        assert!(matches!(
            otp.verify_code(&phone(), &first).await,
            Err(AuthError::CodeMismatch)
        ));
        otp.verify_code(&phone(), &second).await.unwrap();
    }

    #[tokio::test]
    async fn test_delivery_failure_withdraws_challenge() {
        let otp = manager(Arc::new(DownPager), Duration::from_secs(300), 5);

        assert!(matches!(
            otp.request_code(&phone()).await,
            Err(AuthError::DeliveryFailed(_))
        ));
        assert!(matches!(
            otp.verify_code(&phone(), "1234").await,
            Err(AuthError::NoActiveChallenge)
        ));
    }
}
