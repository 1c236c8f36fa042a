//! HTTP clients for the label platform: auth sessions and the reports API.

use thiserror::Error;

/// Password/refresh-token sign-in against the auth service.
pub mod auth;
/// `/api/admin/reports` wrappers.
pub mod reports;
/// Session persistence for sign-in.
pub mod session_store;

/// Errors returned by the platform clients.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Transport-level failure (connect, TLS, body read).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-2xx response; `message` is the `{ error }` body when present.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// No usable session, or the server rejected the token.
    #[error("authentication required")]
    AuthRequired,

    /// Sign-in or token refresh was rejected.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The response body did not have the expected shape.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// Reading or writing the session file failed.
    #[error("session storage: {0}")]
    Session(String),
}

/// Result alias for platform calls.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Pull a human-readable message out of an error body.
///
/// Accepts the reports API shape `{ "error": ... }` as well as the auth
/// service's `error_description` / `msg` / `message` fields.
pub(crate) fn error_message(status: u16, body: &str) -> String {
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["error_description", "msg", "message", "error"] {
            if let Some(s) = v.get(key).and_then(|m| m.as_str()) {
                return s.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {status}")
    } else {
        trimmed.to_string()
    }
}

/// Turn a non-success response into an [`ApiError`].
pub(crate) async fn error_from_response(resp: reqwest::Response) -> ApiError {
    let status = resp.status().as_u16();
    if status == 401 {
        return ApiError::AuthRequired;
    }
    let body = resp.text().await.unwrap_or_default();
    ApiError::Server {
        status,
        message: error_message(status, &body),
    }
}
