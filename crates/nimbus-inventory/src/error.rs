//! Inventory client error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Inventory request failed with code {status}: Body -->|{body}|<--")]
    RequestFailed { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, InventoryError>;
