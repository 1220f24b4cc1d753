use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::identity::IdentityError;

/// Unified error type for the vrin-auth service.
///
/// Every variant renders as `{"success": false, "error": <message>}` so that
/// callers written against the old proxy routes keep working unchanged.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    // ── Client Errors ───────────────────────────────────────────────────
    #[error("{0}")]
    BadRequest(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Incorrect password. Please try again.")]
    IncorrectPassword,

    #[error("No password is set for this account. Please sign in with Google or a magic link.")]
    PasswordNotSet,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    // ── Upstream Errors ─────────────────────────────────────────────────
    /// Non-success answer from the legacy backend; the status is passed through.
    #[error("{message}")]
    Upstream { status: u16, message: String },

    #[error("Identity provider error: {0}")]
    Identity(#[from] IdentityError),

    // ── Internal ────────────────────────────────────────────────────────
    #[error("Database error: {0}")]
    Database(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::BadRequest(_) | AuthError::PasswordNotSet => StatusCode::BAD_REQUEST,
            AuthError::Unauthorized | AuthError::IncorrectPassword => StatusCode::UNAUTHORIZED,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::Conflict(_) => StatusCode::CONFLICT,
            AuthError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AuthError::Identity(_)
            | AuthError::Database(_)
            | AuthError::Crypto(_)
            | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the end user. Server-side failures are logged
    /// in full and replaced by a generic retry hint.
    pub fn public_message(&self) -> String {
        if self.status().is_server_error() && !matches!(self, AuthError::Upstream { .. }) {
            "Authentication failed. Please try again.".to_string()
        } else {
            self.to_string()
        }
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(e: sqlx::Error) -> Self {
        tracing::error!("Database error: {e}");
        AuthError::Database(e.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(e: anyhow::Error) -> Self {
        AuthError::Internal(e.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "request failed: {self}");
        }

        let body = json!({
            "success": false,
            "error": self.public_message(),
        });

        (status, axum::Json(body)).into_response()
    }
}
