//! Store adapter errors

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by a single store call
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached at all
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store answered with a non-success status
    #[error("request failed with status {status}: {message}")]
    Request { status: u16, message: String },

    /// The response body could not be interpreted
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The adapter is misconfigured (missing URL or key, bad header value)
    #[error("store configuration error: {0}")]
    Config(String),

    /// Transport-level HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl StoreError {
    pub fn request(status: u16, message: impl Into<String>) -> Self {
        Self::Request {
            status,
            message: message.into(),
        }
    }

    /// True when the failure means the store itself is unreachable
    pub fn is_unavailable(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }

    /// True when repeating the same idempotent call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Request { status, .. } => *status == 429 || *status >= 500,
            StoreError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            StoreError::Decode(_) | StoreError::Config(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(StoreError::Unavailable("down".into()).is_unavailable());
        assert!(StoreError::Unavailable("down".into()).is_transient());
        assert!(StoreError::request(503, "busy").is_transient());
        assert!(StoreError::request(429, "slow down").is_transient());
        assert!(!StoreError::request(404, "no such table").is_transient());
        assert!(!StoreError::request(503, "busy").is_unavailable());
        assert!(!StoreError::Decode("bad json".into()).is_transient());
    }

    #[test]
    fn test_display_includes_status() {
        let err = StoreError::request(409, "duplicate key");
        assert_eq!(
            err.to_string(),
            "request failed with status 409: duplicate key"
        );
    }
}
