//! Integration tests for Kiosk.
//!
//! Tests drive the real router (all middleware included) in-process with
//! `tower::ServiceExt::oneshot`, over a [`MemoryStore`] and a pager that
//! records codes instead of sending them.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p kiosk-integration-tests
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, Bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;

use kiosk_core::{Phone, Price, Role, VariantId};
use kiosk_storefront::config::{
    Environment, OtpConfig, PagerConfig, ServerConfig, SessionConfig,
};
use kiosk_storefront::db::{IdentityRepository, MemoryStore};
use kiosk_storefront::routes;
use kiosk_storefront::services::auth::{Pager, PagerError};
use kiosk_storefront::state::AppState;

/// Pager that remembers the last code sent to each phone.
#[derive(Debug, Default)]
pub struct RecordingPager {
    codes: Mutex<HashMap<Phone, String>>,
    sent: Mutex<usize>,
}

impl RecordingPager {
    /// Last code sent to `phone`.
    pub fn code_for(&self, phone: &str) -> Option<String> {
        let phone = Phone::parse(phone).ok()?;
        self.codes.lock().unwrap().get(&phone).cloned()
    }

    /// Number of codes sent so far.
    pub fn sent(&self) -> usize {
        *self.sent.lock().unwrap()
    }
}

#[async_trait]
impl Pager for RecordingPager {
    async fn send(&self, phone: &Phone, code: &str) -> Result<(), PagerError> {
        self.codes
            .lock()
            .unwrap()
            .insert(phone.clone(), code.to_string());
        *self.sent.lock().unwrap() += 1;
        Ok(())
    }
}

/// Pager whose provider is always down.
#[derive(Debug, Default)]
pub struct FailingPager;

#[async_trait]
impl Pager for FailingPager {
    async fn send(&self, _phone: &Phone, _code: &str) -> Result<(), PagerError> {
        Err(PagerError::Api {
            status: 503,
            message: "provider unavailable".to_string(),
        })
    }
}

/// Configuration for tests: development mode, no rate limiting.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        database_url: SecretString::from("postgres://unused"),
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        base_url: "http://localhost:3000".to_string(),
        environment: Environment::Development,
        session: SessionConfig {
            secret: SecretString::from("Zk3q9LmP2xV7rT4wN8bY1cH6jD5sF0gA"),
            max_age: Duration::from_secs(30 * 24 * 60 * 60),
        },
        otp: OtpConfig::default(),
        pager: PagerConfig::default(),
        store_retries: 3,
        rate_limit: false,
        fixture_phone: None,
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}

/// A response with its body read.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    /// Body as JSON.
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body)
            .unwrap_or_else(|e| panic!("body is not JSON ({e}): {:?}", self.body))
    }

    /// Body as text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// `error.kind` of a JSON error body.
    pub fn error_kind(&self) -> String {
        self.json()["error"]["kind"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    }

    /// `name=value` of the session cookie set by this response.
    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with("kiosk_session="))
            .and_then(|v| v.split(';').next())
            .map(str::to_string)
    }
}

/// Application under test.
pub struct TestContext {
    pub app: Router,
    pub store: Arc<MemoryStore>,
    pub pager: Arc<RecordingPager>,
}

impl TestContext {
    /// Build the app with default test configuration.
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Build the app with custom configuration.
    pub fn with_config(config: ServerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let pager = Arc::new(RecordingPager::default());
        let state = AppState::new(config, store.clone(), pager.clone(), None)
            .expect("test state");
        Self {
            app: routes::app(state),
            store,
            pager,
        }
    }

    /// Send one request through the router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, cookie, None).await
    }

    pub async fn post(&self, uri: &str, cookie: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, cookie, Some(body)).await
    }

    pub async fn put(&self, uri: &str, cookie: Option<&str>, body: Option<Value>) -> TestResponse {
        self.request(Method::PUT, uri, cookie, body).await
    }

    pub async fn delete(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.request(Method::DELETE, uri, cookie, None).await
    }

    /// Request a code for `phone` and return what the pager received.
    pub async fn request_code(&self, phone: &str) -> String {
        let response = self
            .post(
                "/login/request-code",
                None,
                serde_json::json!({ "phone": phone }),
            )
            .await;
        assert_eq!(response.status, StatusCode::ACCEPTED, "{}", response.text());
        self.pager.code_for(phone).expect("code was sent")
    }

    /// Log in as `phone` and return the session cookie.
    pub async fn login(&self, phone: &str) -> String {
        let code = self.request_code(phone).await;
        let response = self
            .post(
                "/login/verify-code",
                None,
                serde_json::json!({ "phone": phone, "code": code }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.text());
        response.session_cookie().expect("session cookie")
    }

    /// Log in as `phone` with the staff role.
    pub async fn login_staff(&self, phone: &str) -> String {
        let cookie = self.login(phone).await;
        self.set_role(phone, Role::Staff).await;
        cookie
    }

    /// Change the stored role of `phone`, as `kiosk-cli staff` does.
    pub async fn set_role(&self, phone: &str, role: Role) {
        self.store
            .set_role(&Phone::parse(phone).unwrap(), role)
            .await
            .unwrap();
    }

    /// Add a catalog variant priced at `price` (e.g. `"12.50"`).
    pub async fn variant(&self, name: &str, price: &str) -> VariantId {
        self.store.insert_variant(name, price_of(price)).await
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a price literal.
pub fn price_of(amount: &str) -> Price {
    Price::new(amount.parse::<rust_decimal::Decimal>().unwrap()).unwrap()
}

/// Read a price serialized as a JSON string.
pub fn price_at(value: &Value) -> Price {
    price_of(value.as_str().unwrap_or_else(|| panic!("not a price: {value}")))
}
