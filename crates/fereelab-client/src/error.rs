use thiserror::Error;

/// Errors returned by [`crate::ApiClient`] and the chat manager.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never produced a response (connect, TLS, body read...).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server rejected the bearer token, or none was sent.
    #[error("unauthorized")]
    Unauthorized,

    /// Any other non-2xx response.
    #[error("API error {status}: {message}")]
    Api {
        status: u16,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Upstream reported an error in the middle of a streamed reply.
    #[error("stream error: {0}")]
    Stream(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors from a [`crate::storage::KeyValueStore`] backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The platform has no per-user configuration directory.
    #[error("no configuration directory available")]
    NoConfigDir,
}
