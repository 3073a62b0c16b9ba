//! HTTP middleware stack for the ordering API.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request span with `request_id` and `identity_id` fields)
//! 3. Request ID (add unique ID to each request)
//! 4. Security headers
//! 5. Session (resolve the identity behind the request)
//! 6. Rate limiting on login routes (governor)

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;
pub mod session;

pub use auth::{AuthRejection, OptionalIdentity, RequireIdentity, RequireStaff, has_staff_role};
pub use rate_limit::{login_rate_limiter, rate_limit_response};
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
pub use session::{
    FixtureIdentityProvider, IdentityProvider, SESSION_COOKIE_NAME, SessionContext,
    SignedCookieProvider, removal_cookie, session_cookie, session_middleware,
};
