//! Error taxonomy for the scraping pipeline.
//!
//! Only [`SourceListError`], [`ConfigError`] and [`ChatError`] ever reach
//! the command handlers. [`FetchError`] and [`RenderError`] are per-source conditions:
//! the orchestrator folds them into a failed
//! [`SourceOutcome`](crate::models::SourceOutcome) and the batch carries on.
//! An extractor finding nothing is not an error at all, it returns an empty
//! vector and the next strategy gets its turn.

use thiserror::Error;

/// The source list could not be read from its file or remote location.
///
/// Callers recover by falling back to the built-in default list.
#[derive(Debug, Error)]
pub enum SourceListError {
    #[error("source list unavailable at {location}: {reason}")]
    Unavailable { location: String, reason: String },
}

/// Classified failure of a single page fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("HTTP {status}")]
    HttpError { status: u16 },
    #[error("fetch failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_connect() {
            FetchError::ConnectionFailed(e.to_string())
        } else if let Some(status) = e.status() {
            FetchError::HttpError {
                status: status.as_u16(),
            }
        } else {
            FetchError::Other(e.to_string())
        }
    }
}

/// Failure of the headless-browser path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("render engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("render timed out")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache file is not valid CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Failure talking to the chat completion endpoint.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The endpoint refused the request itself (bad key, unknown model,
    /// malformed body). Sending it again cannot help.
    #[error("chat endpoint rejected the request: HTTP {0}")]
    Rejected(u16),
    #[error("chat endpoint failed: HTTP {0}")]
    Unavailable(u16),
    #[error("chat request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("chat completion contained no message")]
    EmptyReply,
}

impl ChatError {
    pub fn from_status(status: u16) -> Self {
        match status {
            408 | 429 => ChatError::Unavailable(status),
            400..=499 => ChatError::Rejected(status),
            _ => ChatError::Unavailable(status),
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, ChatError::Rejected(_))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}
