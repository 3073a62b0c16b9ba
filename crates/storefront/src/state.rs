//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::db::Store;
use crate::middleware::session::{IdentityProvider, SignedCookieProvider};
use crate::services::auth::{AuthService, OtpManager, Pager};
use crate::services::cart::CartService;
use crate::services::credential::{SessionCodec, TokenError};
use crate::services::orders::OrderService;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the store, the session codec and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    store: Arc<dyn Store>,
    codec: SessionCodec,
    otp: OtpManager,
    identity_provider: Arc<dyn IdentityProvider>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Server configuration
    /// * `store` - Persistence backend
    /// * `pager` - Delivery channel for one-time codes
    /// * `identity_provider` - Overrides the signed-cookie provider when set
    ///
    /// # Errors
    ///
    /// Returns an error if the session secret cannot key the codec.
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn Store>,
        pager: Arc<dyn Pager>,
        identity_provider: Option<Arc<dyn IdentityProvider>>,
    ) -> Result<Self, TokenError> {
        let codec = SessionCodec::new(&config.session.secret)?;
        let otp = OtpManager::new(pager, config.otp);
        let identity_provider = identity_provider.unwrap_or_else(|| {
            Arc::new(SignedCookieProvider::new(
                codec.clone(),
                config.session.max_age,
            ))
        });

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                codec,
                otp,
                identity_provider,
            }),
        })
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    /// Get a reference to the session codec.
    #[must_use]
    pub fn codec(&self) -> &SessionCodec {
        &self.inner.codec
    }

    /// Get the identity provider used by the session middleware.
    #[must_use]
    pub fn identity_provider(&self) -> &dyn IdentityProvider {
        self.inner.identity_provider.as_ref()
    }

    /// Authentication service for one request.
    #[must_use]
    pub fn auth(&self) -> AuthService<'_> {
        AuthService::new(&self.inner.otp, self.store(), &self.inner.codec)
    }

    /// Cart service for one request.
    #[must_use]
    pub fn carts(&self) -> CartService<'_> {
        CartService::new(self.store())
    }

    /// Order service for one request.
    #[must_use]
    pub fn orders(&self) -> OrderService<'_> {
        OrderService::new(self.store(), self.inner.config.store_retries)
    }
}

#[cfg(test)]
impl AppState {
    /// Development state over `store`, with codes logged instead of sent.
    pub(crate) fn for_tests(store: Arc<dyn Store>) -> Self {
        use std::time::Duration;

        use secrecy::SecretString;

        use crate::config::{Environment, OtpConfig, PagerConfig, SessionConfig};
        use crate::services::auth::LogPager;

        let config = ServerConfig {
            database_url: SecretString::from("postgres://unused"),
            host: std::net::IpAddr::from([127, 0, 0, 1]),
            port: 0,
            base_url: "http://localhost:3000".to_string(),
            environment: Environment::Development,
            session: SessionConfig {
                secret: SecretString::from("r8Vn2Qx5Lk9Tw3Jm7Hc1Pz6Yb4Fd0Gs"),
                max_age: Duration::from_secs(3600),
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
        };
        match Self::new(config, store, Arc::new(LogPager), None) {
            Ok(state) => state,
            Err(e) => panic!("test state: {e}"),
        }
    }
}
