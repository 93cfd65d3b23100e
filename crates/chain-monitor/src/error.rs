//! Error types for the chain-monitor's own I/O shell. Anything that bubbles
//! up from `wallet_coord_core` (reconciliation, storage) is wrapped rather
//! than translated, since the engine's `Error::code()` is already the
//! canonical classification.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("HTTP request failed: {url}, status: {status:?}, error: {error}")]
    HttpRequest {
        url: String,
        status: Option<u16>,
        error: String,
    },

    #[error("network timeout after {timeout_secs}s: {context}")]
    NetworkTimeout { timeout_secs: u64, context: String },

    #[error("network connection error: {0}")]
    NetworkConnection(String),

    #[error("rate limit exceeded, retry after: {retry_after:?}s")]
    RateLimitExceeded { retry_after: Option<u64> },

    #[error("ledger node API error: {endpoint}, status: {status}, message: {message}")]
    NodeApi {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("JSON parsing error: {context}: {error}")]
    JsonParse { context: String, error: String },

    #[error("missing required field: {field} in {context}")]
    MissingField { field: String, context: String },

    #[error(transparent)]
    Engine(#[from] wallet_coord_core::error::Error),
}

pub type Result<T> = std::result::Result<T, MonitorError>;

impl MonitorError {
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        match self {
            Self::NetworkConnection(_) | Self::HttpRequest { .. } => Level::WARN,
            Self::RateLimitExceeded { .. } | Self::NetworkTimeout { .. } => Level::WARN,
            Self::Config(_) => Level::ERROR,
            Self::JsonParse { .. } | Self::MissingField { .. } => Level::WARN,
            Self::NodeApi { .. } => Level::WARN,
            Self::Engine(e) => e.log_level(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NetworkTimeout { .. } | Self::NetworkConnection(_) | Self::RateLimitExceeded { .. } | Self::HttpRequest { .. } => true,
            Self::NodeApi { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for MonitorError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string()).unwrap_or_default();
        let status = err.status().map(|s| s.as_u16());

        if err.is_timeout() {
            Self::NetworkTimeout { timeout_secs: 30, context: url }
        } else if err.is_connect() {
            Self::NetworkConnection(format!("failed to connect to {url}: {err}"))
        } else {
            Self::HttpRequest { url, status, error: err.to_string() }
        }
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonParse {
            context: "JSON deserialization".to_string(),
            error: err.to_string(),
        }
    }
}
