//! Upload error types.

/// Errors produced while opening, enumerating or driving an upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] strato_transfer::TransferError),

    #[error("enumeration failed: {0}")]
    Enumeration(String),

    #[error("{0}")]
    Structural(String),

    #[error("cancelled")]
    Cancelled,

    #[error("file handle not available: {0}")]
    HandleTimeout(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
