//! Kiosk Storefront - ordering API.
//!
//! This binary serves the ordering API on port 3000.
//!
//! # Architecture
//!
//! - Axum web framework, JSON API plus one printable HTML ticket
//! - Stateless sessions: an HMAC-signed cookie, no server-side session store
//! - One-time login codes kept in an in-process cache and sent by a pager
//! - `PostgreSQL` for identities, carts, orders and the catalog

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::net::SocketAddr;
use std::sync::Arc;

use kiosk_storefront::config::{Environment, ServerConfig};
use kiosk_storefront::db::{self, PgStore, Store};
use kiosk_storefront::middleware::{FixtureIdentityProvider, IdentityProvider};
use kiosk_storefront::routes;
use kiosk_storefront::services::auth::pager;
use kiosk_storefront::state::AppState;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ServerConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            traces_sample_rate: config.sentry_traces_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Build the fixture identity provider when development config asks for one.
async fn fixture_provider(
    config: &ServerConfig,
    store: &dyn Store,
) -> Option<Arc<dyn IdentityProvider>> {
    let phone = config.fixture_phone.as_ref()?;
    if config.environment != Environment::Development {
        tracing::error!("KIOSK_FIXTURE_PHONE ignored outside development");
        return None;
    }

    let provider = FixtureIdentityProvider::load(store, phone)
        .await
        .expect("Failed to create fixture identity");
    Some(Arc::new(provider))
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = ServerConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "kiosk_storefront=info,tower_http=debug".into());

    // JSON logs in production, human-readable locally
    let (json_layer, text_layer) = match config.environment {
        Environment::Production => (Some(tracing_subscriber::fmt::layer().json()), None),
        Environment::Development => (None, Some(tracing_subscriber::fmt::layer())),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    // Initialize database connection pool
    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");
    tracing::info!("Database pool created");

    // NOTE: Migrations are NOT run automatically on startup.
    // Run them explicitly via: cargo run -p kiosk-cli -- migrate
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));

    let pager = pager::from_config(&config.pager).expect("Failed to create pager");
    let identity_provider = fixture_provider(&config, store.as_ref()).await;

    let state = AppState::new(config.clone(), store, pager, identity_provider)
        .expect("Failed to initialize application state");

    let app = routes::app(state);

    // Start server
    let addr = config.socket_addr();
    tracing::info!("storefront listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
