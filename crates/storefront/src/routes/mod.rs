//! HTTP route handlers for the ordering API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                 - Liveness
//! GET    /health/ready           - Store readiness
//!
//! # Login (rate limited)
//! POST   /login/request-code     - Send a one-time code
//! POST   /login/verify-code      - Verify code, set session cookie
//! GET    /session                - Current identity or anonymous
//! POST   /logout                 - Clear session cookie
//!
//! # Cart (customer)
//! GET    /cart                   - Cart with current prices
//! POST   /cart                   - Add item
//! PUT    /cart/{id}              - Set quantity
//! DELETE /cart/{id}              - Remove item
//! POST   /checkout               - Place order from cart
//! GET    /account/orders         - Own orders
//!
//! # Orders
//! GET    /orders                 - List (staff), ?status= filter
//! GET    /orders/{id}            - Detail (owner or staff)
//! PUT    /orders/{id}            - Edit line items / note (staff)
//! DELETE /orders/{id}            - Delete (staff)
//! PUT    /orders/{id}/confirm    - Confirm (staff)
//! PUT    /orders/{id}/complete   - Complete (staff)
//! GET    /orders/{id}/print      - Mark printed, HTML ticket (staff)
//! ```

pub mod auth;
pub mod cart;
pub mod extract;
pub mod orders;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state, map_response},
    routing::{get, post, put},
};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::middleware::{
    login_rate_limiter, rate_limit_response, request_id_middleware, security_headers_middleware,
    session_middleware,
};
use crate::state::AppState;

/// Create the login routes router.
pub fn login_routes(rate_limit: bool) -> Router<AppState> {
    let router = Router::new()
        .route("/request-code", post(auth::request_code))
        .route("/verify-code", post(auth::verify_code));

    if rate_limit {
        router
            .layer(login_rate_limiter())
            .layer(map_response(rate_limit_response))
    } else {
        router
    }
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).post(cart::add))
        .route("/{id}", put(cart::update).delete(cart::remove))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index))
        .route(
            "/{id}",
            get(orders::show).put(orders::update).delete(orders::delete),
        )
        .route("/{id}/confirm", put(orders::confirm))
        .route("/{id}/complete", put(orders::complete))
        .route("/{id}/print", get(orders::print))
}

/// Create all API routes.
pub fn routes(rate_limit: bool) -> Router<AppState> {
    Router::new()
        .nest("/login", login_routes(rate_limit))
        .route("/session", get(auth::session))
        .route("/logout", post(auth::logout))
        .nest("/cart", cart_routes())
        .route("/checkout", post(cart::checkout))
        .route("/account/orders", get(orders::mine))
        .nest("/orders", order_routes())
}

/// Build the complete application with middleware.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes(state.config().rate_limit))
        .layer(from_fn_with_state(state.clone(), session_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        identity_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the store is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
