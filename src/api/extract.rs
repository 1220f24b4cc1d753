use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequest;

use crate::error::AuthError;

/// `axum::Json` whose rejection renders as `{"success": false, "error": ...}`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AuthError))]
pub struct JsonBody<T>(pub T);

impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(status = rejection.status().as_u16(), "request body rejected: {rejection}");
        AuthError::BadRequest(match rejection {
            JsonRejection::MissingJsonContentType(_) => {
                "Expected a JSON request body (Content-Type: application/json)".to_string()
            }
            JsonRejection::JsonSyntaxError(_) => "Request body is not valid JSON".to_string(),
            other => other.body_text(),
        })
    }
}
