//! Error taxonomy for the sync layer.
//!
//! - `ConnectionError`: the push channel failed to establish or keep its
//!   stream. Never fatal; the channel loop logs it and reconnects.
//! - `FetchError`: a REST call failed. Returned to whoever asked for the data.
//! - `ReconciliationError`: a background refresh failed. Logged and counted,
//!   never returned to a caller.

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection failed: {0}")]
    Request(String),
    #[error("push endpoint returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("stream error: {0}")]
    Stream(String),
    #[error("invalid auth token: {0}")]
    InvalidToken(String),
    #[error("channel closed")]
    Closed,
}

impl ConnectionError {
    /// Client-side faults that another attempt with the same inputs cannot fix.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::InvalidToken(_) | Self::Closed)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("request timeout: {0}")]
    Timeout(String),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            return Self::Timeout(value.to_string());
        }
        if value.is_decode() {
            return Self::InvalidResponse(value.to_string());
        }
        Self::Request(value.to_string())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ReconciliationError {
    #[error("refresh fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("refresh cancelled")]
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Reconciliation(#[from] ReconciliationError),
}

impl From<std::io::Error> for SyncError {
    fn from(value: std::io::Error) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(value: serde_json::Error) -> Self {
        Self::Config(value.to_string())
    }
}
