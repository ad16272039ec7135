//! Errors returned by the Azure Resource Manager layer

use std::time::Duration;
use thiserror::Error;

/// Result type for ARM calls
pub type AzureResult<T> = Result<T, AzureError>;

/// Failure of a single control-plane call
#[derive(Debug, Error)]
pub enum AzureError {
    #[error("failed to send request: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API request failed: {status} {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("failed to parse response JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error(
        "long-running operation ended with status {status}{}",
        operation_detail(.code, .message)
    )]
    OperationFailed {
        status: String,
        code: Option<String>,
        message: Option<String>,
    },

    #[error("operation did not complete within {0:?}")]
    Timeout(Duration),

    #[error("response is missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// `: code: message` suffix of a failed operation, omitting absent parts
fn operation_detail(code: &Option<String>, message: &Option<String>) -> String {
    match (code, message) {
        (Some(code), Some(message)) => format!(": {}: {}", code, message),
        (Some(detail), None) | (None, Some(detail)) => format!(": {}", detail),
        (None, None) => String::new(),
    }
}

impl AzureError {
    /// HTTP status of an API error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            AzureError::Api { status, .. } => Some(*status),
            AzureError::Transport(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// ARM error code (e.g. `ResourceGroupNotFound`), if any
    pub fn code(&self) -> Option<&str> {
        match self {
            AzureError::Api { code, .. } => Some(code),
            AzureError::OperationFailed {
                code: Some(code), ..
            } => Some(code),
            _ => None,
        }
    }
}
