//! API error types.
//!
//! Every variant maps to a distinct HTTP status code.  The enum
//! implements [`axum::response::IntoResponse`] so handlers can simply
//! return `Err(ApiError::NotFound { .. })`; the body is a small JSON
//! object carrying a stable error code and a human-readable message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Request-level error taxonomy.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A uniqueness constraint was violated (duplicate email).
    #[error("{message}")]
    Conflict { message: String },

    /// The caller could not be authenticated: bad credentials, an
    /// unverified account, or an invalid/expired/missing token.
    #[error("{message}")]
    Unauthenticated { message: String },

    /// The caller is authenticated but lacks the required role.
    #[error("{message}")]
    Forbidden { message: String },

    /// The referenced user, file, or blob does not exist.
    #[error("{message}")]
    NotFound { message: String },

    /// The request itself is malformed or carries disallowed content.
    #[error("{message}")]
    BadRequest { message: String },

    /// Catch-all for unexpected internal errors. The underlying cause is
    /// logged but never echoed to the caller.
    #[error("We encountered an internal error, please try again.")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Shorthand constructors used throughout the handlers.
    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict {
            message: message.into(),
        }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        ApiError::Unauthenticated {
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound {
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            message: message.into(),
        }
    }

    /// Return the stable error code string.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Conflict { .. } => "Conflict",
            ApiError::Unauthenticated { .. } => "Unauthenticated",
            ApiError::Forbidden { .. } => "Forbidden",
            ApiError::NotFound { .. } => "NotFound",
            ApiError::BadRequest { .. } => "BadRequest",
            ApiError::Internal(_) => "InternalError",
        }
    }

    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = generate_request_id();
        let status = self.status_code();

        if let ApiError::Internal(ref cause) = self {
            tracing::error!(request_id = %request_id, error = %cause, "internal error");
        }

        let body = serde_json::json!({
            "code": self.code(),
            "message": self.to_string(),
        })
        .to_string();

        let mut response = (
            status,
            [
                ("content-type", "application/json".to_string()),
                ("x-request-id", request_id),
            ],
            body,
        )
            .into_response();

        // RFC 6750: challenge the caller on authentication failures.
        if matches!(self, ApiError::Unauthenticated { .. }) {
            response.headers_mut().insert(
                "www-authenticate",
                axum::http::HeaderValue::from_static("Bearer"),
            );
        }

        response
    }
}

// -- Tests --------------------------------------------------------------------
