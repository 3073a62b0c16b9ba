//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers return `Result<T, AppError>`.
//!
//! Every error response has the body
//! `{"error": {"kind": "<Kind>", "message": "<text>"}}`, where `kind` is a
//! stable identifier clients can branch on.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::models::CurrentIdentity;
use crate::services::auth::AuthError;
use crate::services::cart::CartError;
use crate::services::orders::OrderError;

/// Application-level error type for the ordering API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Cart operation failed.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Checkout or order transition failed.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// No valid session.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Valid session without the needed role or ownership.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    kind: &'a str,
    message: String,
}

const fn repository_kind(err: &RepositoryError) -> (&'static str, StatusCode) {
    match err {
        RepositoryError::NotFound => ("NotFound", StatusCode::NOT_FOUND),
        RepositoryError::Conflict(_) => ("StorageConflict", StatusCode::SERVICE_UNAVAILABLE),
        RepositoryError::QuantityLimit => ("InvalidQuantity", StatusCode::BAD_REQUEST),
        RepositoryError::Database(_)
        | RepositoryError::DataCorruption(_)
        | RepositoryError::Unavailable(_) => ("Internal", StatusCode::INTERNAL_SERVER_ERROR),
    }
}

impl AppError {
    /// Stable error kind and HTTP status.
    #[must_use]
    pub const fn classify(&self) -> (&'static str, StatusCode) {
        match self {
            Self::Database(err)
            | Self::Auth(AuthError::Repository(err))
            | Self::Cart(CartError::Repository(err))
            | Self::Order(OrderError::Repository(err)) => repository_kind(err),

            Self::Auth(err) => match err {
                AuthError::InvalidPhone(_) => ("InvalidPhone", StatusCode::BAD_REQUEST),
                AuthError::InvalidProfile(_) => ("InvalidProfile", StatusCode::BAD_REQUEST),
                AuthError::DeliveryFailed(_) => ("DeliveryFailed", StatusCode::BAD_GATEWAY),
                AuthError::NoActiveChallenge => ("NoActiveChallenge", StatusCode::BAD_REQUEST),
                AuthError::CodeMismatch => ("CodeMismatch", StatusCode::UNAUTHORIZED),
                AuthError::Token(_) | AuthError::Repository(_) => {
                    ("Internal", StatusCode::INTERNAL_SERVER_ERROR)
                }
            },

            Self::Cart(err) => match err {
                CartError::InvalidQuantity | CartError::TotalOutOfRange => {
                    ("InvalidQuantity", StatusCode::BAD_REQUEST)
                }
                CartError::InvalidNote => ("BadRequest", StatusCode::BAD_REQUEST),
                CartError::UnknownVariant(_) | CartError::ItemNotFound => {
                    ("NotFound", StatusCode::NOT_FOUND)
                }
                CartError::Unavailable(_) => ("VariantUnavailable", StatusCode::CONFLICT),
                CartError::Repository(_) => ("Internal", StatusCode::INTERNAL_SERVER_ERROR),
            },

            Self::Order(err) => match err {
                OrderError::EmptyCart => ("EmptyCart", StatusCode::UNPROCESSABLE_ENTITY),
                OrderError::MissingShipDate => {
                    ("MissingShipDate", StatusCode::UNPROCESSABLE_ENTITY)
                }
                OrderError::InvalidTransition { .. } => ("InvalidTransition", StatusCode::CONFLICT),
                OrderError::InvalidQuantity => ("InvalidQuantity", StatusCode::BAD_REQUEST),
                OrderError::InvalidLineItem(_) => ("InvalidLineItem", StatusCode::BAD_REQUEST),
                OrderError::InvalidNote { .. } => ("BadRequest", StatusCode::BAD_REQUEST),
                OrderError::NotFound
                | OrderError::IdentityNotFound
                | OrderError::UnknownVariant(_) => ("NotFound", StatusCode::NOT_FOUND),
                OrderError::VariantUnavailable(_) => ("VariantUnavailable", StatusCode::CONFLICT),
                OrderError::StorageConflict => {
                    ("StorageConflict", StatusCode::SERVICE_UNAVAILABLE)
                }
                OrderError::Repository(_) => ("Internal", StatusCode::INTERNAL_SERVER_ERROR),
            },

            Self::NotFound(_) => ("NotFound", StatusCode::NOT_FOUND),
            Self::Unauthorized(_) => ("AuthInvalid", StatusCode::UNAUTHORIZED),
            Self::Forbidden(_) => ("Forbidden", StatusCode::FORBIDDEN),
            Self::BadRequest(_) => ("BadRequest", StatusCode::BAD_REQUEST),
            Self::RateLimited => ("RateLimited", StatusCode::TOO_MANY_REQUESTS),
            Self::Internal(_) => ("Internal", StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    /// Message safe to show to clients.
    fn public_message(&self) -> String {
        match self {
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Auth(err) => match err {
                AuthError::DeliveryFailed(_) => "Could not send the code, try again".to_string(),
                AuthError::Token(_) | AuthError::Repository(_) => {
                    "Internal server error".to_string()
                }
                other => other.to_string(),
            },
            Self::Cart(CartError::Repository(_)) | Self::Order(OrderError::Repository(_)) => {
                "Internal server error".to_string()
            }
            Self::Cart(err) => err.to_string(),
            Self::Order(err) => err.to_string(),
            Self::NotFound(what) => format!("{what} not found"),
            Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::BadRequest(msg) => msg.clone(),
            Self::RateLimited => "Too many requests, slow down".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (kind, status) = self.classify();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                kind,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, kind, "Request rejected");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                kind,
                message: self.public_message(),
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from the session identity.
///
/// Errors captured afterwards on this scope are associated with the identity.
/// The phone is masked.
pub fn set_sentry_user(identity: &CurrentIdentity) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(identity.id.to_string()),
            username: Some(identity.phone.masked()),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the identity.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("order", "Order confirmed", Some(&[("order_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use kiosk_core::OrderStatus;

    use super::*;

    fn classify(err: &AppError) -> (&'static str, StatusCode) {
        err.classify()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("order".to_string());
        assert_eq!(err.to_string(), "Not found: order");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_auth_error_kinds() {
        assert_eq!(
            classify(&AuthError::CodeMismatch.into()),
            ("CodeMismatch", StatusCode::UNAUTHORIZED)
        );
        assert_eq!(
            classify(&AuthError::NoActiveChallenge.into()),
            ("NoActiveChallenge", StatusCode::BAD_REQUEST)
        );
        assert_eq!(
            classify(&AuthError::InvalidPhone(kiosk_core::PhoneError::Empty).into()),
            ("InvalidPhone", StatusCode::BAD_REQUEST)
        );
        assert_eq!(
            classify(&AppError::Unauthorized("no session".to_string())),
            ("AuthInvalid", StatusCode::UNAUTHORIZED)
        );
    }

    #[test]
    fn test_order_error_kinds() {
        assert_eq!(
            classify(&OrderError::EmptyCart.into()),
            ("EmptyCart", StatusCode::UNPROCESSABLE_ENTITY)
        );
        assert_eq!(
            classify(&OrderError::MissingShipDate.into()),
            ("MissingShipDate", StatusCode::UNPROCESSABLE_ENTITY)
        );
        assert_eq!(
            classify(
                &OrderError::InvalidTransition {
                    status: OrderStatus::Completed,
                    action: "complete",
                }
                .into()
            ),
            ("InvalidTransition", StatusCode::CONFLICT)
        );
        assert_eq!(
            classify(&OrderError::StorageConflict.into()),
            ("StorageConflict", StatusCode::SERVICE_UNAVAILABLE)
        );
    }

    #[test]
    fn test_repository_errors_nested_in_services_are_internal() {
        let err: AppError =
            OrderError::Repository(RepositoryError::DataCorruption("bad row".to_string())).into();
        assert_eq!(
            classify(&err),
            ("Internal", StatusCode::INTERNAL_SERVER_ERROR)
        );
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            let response = err.into_response();
            response.status()
        }

        assert_eq!(
            get_status(AppError::NotFound("order".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Forbidden("staff only".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(AppError::RateLimited),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
