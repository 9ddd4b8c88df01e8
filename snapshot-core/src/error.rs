use std::time::Duration;

use thiserror::Error;

/// Failure of a single call into a [`DataSource`](crate::source::DataSource).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("upstream returned status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("payload parsing error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid upstream url: {0}")]
    Url(#[from] url::ParseError),
    #[error("upstream url {0} cannot carry a path")]
    UnsupportedBase(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("source error: {0}")]
    Other(String),
}

/// Why a refresh cycle did not publish.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    #[error("aggregate fetch failed: {0}")]
    Aggregate(String),
    #[error("refresh cycle panicked: {0}")]
    Panicked(String),
    #[error("refresh worker stopped")]
    Stopped,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("refresh worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum HubError {
    #[error("connection closed")]
    Closed,
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection panicked: {0}")]
    Panicked(String),
    #[error("frame serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parsing error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no configuration directory available on this platform")]
    NoConfigDir,
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
