//! Unified error type for rain-watch.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Network or HTTP failure after retries were exhausted.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The upstream answered, but not in the shape we expect.
    #[error("Malformed upstream response: {0}")]
    MalformedUpstreamResponse(String),

    /// Cache is empty or the requested time lies beyond the cached range.
    #[error("No forecast data available: {0}")]
    NoDataAvailable(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for failures that only degrade a scan (a source goes absent).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::UpstreamUnavailable(_)
                | Error::MalformedUpstreamResponse(_)
                | Error::NoDataAvailable(_)
        )
    }
}
