//! Nova client error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NovaError {
    #[error("Keystone authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("No compute endpoint for region '{0}' in the service catalog")]
    NoComputeEndpoint(String),

    #[error("Nova API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NovaError>;
