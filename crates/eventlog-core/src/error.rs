//! Error types for the eventlog pipeline.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while accepting, storing or counting events.
#[derive(Error, Debug)]
pub enum Error {
    /// The submission names an event type that is not registered.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// The submission path or structure does not have the expected shape.
    #[error("malformed submission: {0}")]
    MalformedSubmission(String),

    /// The append-log writer hit an unrecoverable I/O error and stopped.
    #[error("storage failure: {0}")]
    StorageFatal(String),

    /// The append-log writer was stopped and accepts no more records.
    #[error("writer stopped")]
    WriterStopped,

    /// The count index backend failed.
    #[error("count index error: {0}")]
    CountIndex(String),

    /// Count query bounds are negative or reversed.
    #[error("invalid query range: since={since}, until={until}")]
    InvalidQueryRange {
        /// Lower bound in seconds (0 = unbounded).
        since: i64,
        /// Upper bound in seconds (0 = unbounded).
        until: i64,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON encoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error means the submission itself was bad, as opposed to
    /// the service being unable to take it.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::UnknownEventType(_) | Self::MalformedSubmission(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_event_type_display() {
        let err = Error::UnknownEventType("page_view".to_string());
        let msg = err.to_string();
        assert!(msg.contains("unknown event type"));
        assert!(msg.contains("page_view"));
    }

    #[test]
    fn test_invalid_query_range_display() {
        let err = Error::InvalidQueryRange {
            since: 300,
            until: 100,
        };
        let msg = err.to_string();
        assert!(msg.contains("since=300"));
        assert!(msg.contains("until=100"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("read-only"));
    }

    #[test]
    fn test_rejection_classification() {
        assert!(Error::UnknownEventType("x".into()).is_rejection());
        assert!(Error::MalformedSubmission("/v1/a/b".into()).is_rejection());
        assert!(!Error::WriterStopped.is_rejection());
        assert!(!Error::StorageFatal("disk full".into()).is_rejection());
    }
}
