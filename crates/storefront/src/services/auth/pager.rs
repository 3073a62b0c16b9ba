//! One-time code delivery.
//!
//! The [`Pager`] trait is the boundary to whatever actually reaches the phone.
//! [`WebhookPager`] posts the code to a configured HTTP endpoint (an SMS
//! gateway); [`LogPager`] only logs it and is meant for local development.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;
use url::Url;

use kiosk_core::Phone;

use crate::config::PagerConfig;

/// Errors that can occur while delivering a code.
#[derive(Debug, Error)]
pub enum PagerError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Gateway returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Pager could not be configured.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Sends one-time codes to phones.
#[async_trait]
pub trait Pager: Send + Sync {
    /// Deliver `code` to `phone`.
    async fn send(&self, phone: &Phone, code: &str) -> Result<(), PagerError>;
}

/// Writes codes to the log instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPager;

#[async_trait]
impl Pager for LogPager {
    async fn send(&self, phone: &Phone, code: &str) -> Result<(), PagerError> {
        tracing::info!(phone = %phone.masked(), code, "One-time code (not sent, log pager)");
        Ok(())
    }
}

#[derive(Serialize)]
struct PageRequest<'a> {
    phone: &'a str,
    code: &'a str,
}

/// Posts codes as JSON to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookPager {
    client: reqwest::Client,
    url: Url,
}

impl WebhookPager {
    /// Create a pager posting to `url`, authenticating with `token` if given.
    ///
    /// # Errors
    ///
    /// Returns error if the token is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(url: Url, token: Option<&SecretString>) -> Result<Self, PagerError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let value = format!("Bearer {}", token.expose_secret());
            let mut value = HeaderValue::from_str(&value)
                .map_err(|e| PagerError::Config(format!("invalid pager token: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl Pager for WebhookPager {
    async fn send(&self, phone: &Phone, code: &str) -> Result<(), PagerError> {
        let body = PageRequest {
            phone: phone.as_str(),
            code,
        };

        let response = self.client.post(self.url.clone()).json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PagerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        tracing::debug!(phone = %phone.masked(), "One-time code sent");
        Ok(())
    }
}

/// Build the pager described by `config`.
///
/// # Errors
///
/// Returns `PagerError` if the webhook pager cannot be built.
pub fn from_config(config: &PagerConfig) -> Result<std::sync::Arc<dyn Pager>, PagerError> {
    match &config.webhook_url {
        Some(url) => Ok(std::sync::Arc::new(WebhookPager::new(
            url.clone(),
            config.token.as_ref(),
        )?)),
        None => {
            tracing::warn!("KIOSK_PAGER_WEBHOOK_URL not set; one-time codes will only be logged");
            Ok(std::sync::Arc::new(LogPager))
        }
    }
}
