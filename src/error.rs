//! Error handling module
//!
//! Provides unified error types for the REST client and the controllers
//! built on top of it.

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server responded {status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Rison error: {0}")]
    Rison(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Feature disabled: {0}")]
    FeatureDisabled(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// The message a user should see for this error.
    ///
    /// Server-side messages are passed through untouched, everything else
    /// uses the display form.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Api { message, .. }
            | AppError::AccessDenied(message)
            | AppError::Unauthorized(message) => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            AppError::Api { status, .. } => Some(*status),
            AppError::AccessDenied(_) => Some(StatusCode::FORBIDDEN),
            AppError::Unauthorized(_) => Some(StatusCode::UNAUTHORIZED),
            AppError::Http(e) => e.status(),
            _ => None,
        }
    }
}

/// Error body returned by the API on failures.
///
/// `message` is usually a string but validation failures send an object
/// keyed by field name, so it is kept as raw JSON.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub message: Option<serde_json::Value>,
    #[serde(default)]
    pub msg: Option<String>,
}

impl ErrorResponse {
    /// Render the server message verbatim
    pub fn into_message(self) -> Option<String> {
        match self.message {
            Some(serde_json::Value::String(s)) => Some(s),
            Some(serde_json::Value::Null) | None => self.msg,
            Some(other) => Some(other.to_string()),
        }
    }
}

/// Build an `AppError::Api` from a failed response body
pub fn api_error(status: StatusCode, body: &str) -> AppError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(ErrorResponse::into_message)
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                body.to_string()
            }
        });

    match status {
        StatusCode::UNAUTHORIZED => AppError::Unauthorized(message),
        StatusCode::FORBIDDEN => AppError::AccessDenied(message),
        _ => AppError::Api { status, message },
    }
}

/// Result type alias for client calls
pub type ApiResult<T> = Result<T, AppError>;

/// Helper function to create a validation error
pub fn validation_error(msg: impl Into<String>) -> AppError {
    AppError::Validation(msg.into())
}

/// Helper function to create a rison error
pub fn rison_error(msg: impl Into<String>) -> AppError {
    AppError::Rison(msg.into())
}
