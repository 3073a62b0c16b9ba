//! Rate limiting middleware using governor and `tower_governor`.
//!
//! Login endpoints are limited per client IP. Rejections from the limiter are
//! rewritten into the API's JSON error shape by [`rate_limit_response`].

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::ConnectInfo,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use tower_governor::{GovernorError, GovernorLayer, governor::GovernorConfigBuilder};

use crate::error::AppError;

// =============================================================================
// Client IP Key Extractor
// =============================================================================

/// Proxy headers checked for the client IP, most trusted first.
const CLIENT_IP_HEADERS: [&str; 3] = ["cf-connecting-ip", "x-real-ip", "fly-client-ip"];

/// Key extractor that reads the client IP from proxy headers.
///
/// Checks `X-Forwarded-For` (first hop) after `CF-Connecting-IP`, then the
/// remaining single-address headers, then the socket peer address when the
/// server was started with connect info.
#[derive(Clone, Copy)]
pub struct ClientIpKeyExtractor;

fn header_ip<T>(req: &Request<T>, name: &str) -> Option<IpAddr> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

impl tower_governor::key_extractor::KeyExtractor for ClientIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        header_ip(req, CLIENT_IP_HEADERS[0])
            .or_else(|| header_ip(req, "x-forwarded-for"))
            .or_else(|| {
                CLIENT_IP_HEADERS[1..]
                    .iter()
                    .find_map(|name| header_ip(req, name))
            })
            .or_else(|| {
                req.extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|info| info.0.ip())
            })
            .ok_or(GovernorError::UnableToExtractKey)
    }
}

// =============================================================================
// Rate Limiter Configuration
// =============================================================================

/// Rate limiter layer type for Axum.
pub type RateLimiterLayer =
    GovernorLayer<ClientIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body>;

/// Create rate limiter for login endpoints: ~10 requests per minute per IP.
///
/// Configuration: 1 request every 6 seconds (replenish), burst of 5.
/// This bounds code requests to one phone and code guessing from one client.
///
/// # Panics
///
/// This function will not panic. The configuration uses only valid positive
/// integers (`per_second(6)` and `burst_size(5)`), which are always accepted
/// by `GovernorConfigBuilder`.
#[must_use]
pub fn login_rate_limiter() -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ClientIpKeyExtractor)
        .per_second(6) // Replenish 1 token every 6 seconds (~10/minute)
        .burst_size(5)
        .finish()
        .expect("rate limiter config with per_second(6) and burst_size(5) is valid");
    GovernorLayer::new(Arc::new(config))
}

/// Rewrite plain-text 429 responses from the limiter into `RateLimited` JSON.
///
/// Use with `axum::middleware::map_response`. Responses that are already JSON
/// pass through untouched.
pub async fn rate_limit_response(response: Response) -> Response {
    let is_json = response
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));

    if response.status() != StatusCode::TOO_MANY_REQUESTS || is_json {
        return response;
    }

    let retry_after = response
        .headers()
        .get(axum::http::header::RETRY_AFTER)
        .cloned();
    let mut rewritten = AppError::RateLimited.into_response();
    if let Some(value) = retry_after {
        rewritten
            .headers_mut()
            .insert(axum::http::header::RETRY_AFTER, value);
    }
    rewritten
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tower_governor::key_extractor::KeyExtractor;

    use super::*;

    fn request(headers: &[(&str, &str)]) -> Request<()> {
        let mut builder = Request::builder();
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_prefers_cloudflare_header() {
        let req = request(&[
            ("x-forwarded-for", "10.0.0.1, 10.0.0.2"),
            ("cf-connecting-ip", "203.0.113.9"),
        ]);
        let ip = ClientIpKeyExtractor.extract(&req).unwrap();
        assert_eq!(ip, "203.0.113.9".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_forwarded_for_first_hop() {
        let req = request(&[("x-forwarded-for", "10.0.0.1, 10.0.0.2")]);
        let ip = ClientIpKeyExtractor.extract(&req).unwrap();
        assert_eq!(ip, "10.0.0.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_falls_back_to_peer_address() {
        let mut req = request(&[]);
        req.extensions_mut()
            .insert(ConnectInfo("192.0.2.4:5123".parse::<SocketAddr>().unwrap()));
        let ip = ClientIpKeyExtractor.extract(&req).unwrap();
        assert_eq!(ip, "192.0.2.4".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_no_headers_is_error() {
        assert!(ClientIpKeyExtractor.extract(&request(&[])).is_err());
    }

    #[tokio::test]
    async fn test_plain_429_is_rewritten() {
        let plain = Response::builder()
            .status(StatusCode::TOO_MANY_REQUESTS)
            .header(axum::http::header::RETRY_AFTER, "6")
            .body(axum::body::Body::from("Too Many Requests! Wait for 6s"))
            .unwrap();

        let rewritten = rate_limit_response(plain).await;
        assert_eq!(rewritten.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            rewritten.headers().get(axum::http::header::RETRY_AFTER).unwrap(),
            "6"
        );

        let body = axum::body::to_bytes(rewritten.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["kind"], "RateLimited");
    }

    #[tokio::test]
    async fn test_other_responses_untouched() {
        let ok = Response::builder()
            .status(StatusCode::OK)
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(rate_limit_response(ok).await.status(), StatusCode::OK);
    }
}
