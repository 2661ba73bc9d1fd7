//! Error types for the best-stories service

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for a single upstream retrieval
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Failure of a single upstream retrieval.
///
/// Cloneable so one failed cache population can be handed to every caller
/// that was waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Upstream unreachable, connection reset, or timed out
    #[error("Upstream transport error for {url}: {reason}")]
    Transport { url: String, reason: String },

    /// Upstream answered with a non-success status
    #[error("Upstream returned status {status} for {url}")]
    Status { url: String, status: u16 },

    /// Payload did not match the expected shape
    #[error("Failed to decode upstream response from {url}: {reason}")]
    Decode { url: String, reason: String },

    /// Upstream explicitly signalled that the item does not exist
    #[error("Item {id} not found upstream")]
    NotFound { id: u64 },
}

impl FetchError {
    /// Build a transport error from a reqwest failure
    pub fn transport(url: &str, err: &reqwest::Error) -> Self {
        FetchError::Transport {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }

    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Transport { .. } => "transport",
            FetchError::Status { .. } => "status",
            FetchError::Decode { .. } => "decode",
            FetchError::NotFound { .. } => "not_found",
        }
    }

    /// True when the upstream reported the resource as absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }
}

/// Errors that can occur in the best-stories service
#[derive(Error, Debug)]
pub enum Error {
    /// Caller deadline elapsed before the ranking completed
    #[error("Deadline of {0:?} exceeded while ranking stories")]
    DeadlineExceeded(std::time::Duration),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fetch_error_kinds() {
        let transport = FetchError::Transport {
            url: "http://x".into(),
            reason: "refused".into(),
        };
        let status = FetchError::Status {
            url: "http://x".into(),
            status: 503,
        };
        let decode = FetchError::Decode {
            url: "http://x".into(),
            reason: "expected array".into(),
        };
        let not_found = FetchError::NotFound { id: 7 };

        assert_eq!(transport.kind(), "transport");
        assert_eq!(status.kind(), "status");
        assert_eq!(decode.kind(), "decode");
        assert_eq!(not_found.kind(), "not_found");
        assert!(not_found.is_not_found());
        assert!(!transport.is_not_found());
    }

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::Status {
            url: "http://upstream/item/1.json".into(),
            status: 502,
        };
        assert_eq!(
            err.to_string(),
            "Upstream returned status 502 for http://upstream/item/1.json"
        );
        assert_eq!(
            FetchError::NotFound { id: 42 }.to_string(),
            "Item 42 not found upstream"
        );
    }

    #[test]
    fn test_deadline_display() {
        let err = Error::DeadlineExceeded(Duration::from_millis(250));
        assert!(err.to_string().contains("250ms"));
    }
}
