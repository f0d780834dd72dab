//! Error types for metadata acquisition and persistence.

use thiserror::Error;

/// Errors that can occur while acquiring or persisting instance metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The source could not produce a result at all: connectivity lost,
    /// retries exhausted, missing file or device, no matching certificate.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// A response was received but could not be interpreted as expected.
    #[error("parse failed: {0}")]
    ParseFailed(String),

    /// The requested writer operation has no read-back counterpart.
    #[error("read not supported by this writer")]
    ReadUnsupported,

    /// JSON serialization or deserialization error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error from a writer or reader.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MetadataError {
    /// Whether this error means "the backend could not answer", as opposed
    /// to an answer that could not be understood.
    pub fn is_query_failed(&self) -> bool {
        matches!(self, MetadataError::QueryFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            MetadataError::QueryFailed("connection refused".into()).to_string(),
            "query failed: connection refused"
        );
        assert_eq!(
            MetadataError::ParseFailed("bad status line".into()).to_string(),
            "parse failed: bad status line"
        );
        assert_eq!(
            MetadataError::ReadUnsupported.to_string(),
            "read not supported by this writer"
        );
    }

    #[test]
    fn test_is_query_failed() {
        assert!(MetadataError::QueryFailed("x".into()).is_query_failed());
        assert!(!MetadataError::ParseFailed("x".into()).is_query_failed());
    }
}
