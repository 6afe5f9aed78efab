//! Chain access error types
//!
//! Errors a LogSource or snapshot reader can report. The indexer treats all of
//! them as per-item failures except when fetching the initial head block.

use thiserror::Error;

/// Errors returned by chain data providers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Provider throttled the request
    #[error("Rate limited by provider")]
    RateLimited,

    /// Provider unreachable, timed out, or returned a non-success status
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// JSON-RPC error object returned by the provider
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Response could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
}

impl SourceError {
    /// Whether waiting and retrying the same request may succeed
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SourceError::RateLimited)
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.status().map(|s| s.as_u16()) == Some(429) {
            SourceError::RateLimited
        } else if err.is_decode() {
            SourceError::Decode(err.to_string())
        } else {
            SourceError::Unavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Decode(err.to_string())
    }
}

/// Result type alias for chain operations
pub type SourceResult<T> = Result<T, SourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SourceError::Rpc {
            code: -32005,
            message: "query returned more than 10000 results".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "RPC error -32005: query returned more than 10000 results"
        );
        assert_eq!(SourceError::RateLimited.to_string(), "Rate limited by provider");
    }

    #[test]
    fn test_rate_limited_classification() {
        assert!(SourceError::RateLimited.is_rate_limited());
        assert!(!SourceError::Unavailable("down".into()).is_rate_limited());
    }
}
