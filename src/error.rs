//! Error types shared by the store, provider and job layers.

use thiserror::Error;

/// Failure talking to the document store.
///
/// Reads and writes are kept apart because callers treat them differently:
/// a failed read during index resolution aborts a job before anything is
/// mutated, while a failed write is usually local to one language.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store read failed: {message}")]
    Read {
        message: String,
        /// HTTP status when the store answered, `None` for transport failures
        status: Option<u16>,
    },

    #[error("store write failed: {message}")]
    Write {
        message: String,
        status: Option<u16>,
    },
}

impl StoreError {
    pub fn read(message: impl Into<String>) -> Self {
        Self::Read {
            message: message.into(),
            status: None,
        }
    }

    pub fn write(message: impl Into<String>) -> Self {
        Self::Write {
            message: message.into(),
            status: None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Read { status, .. } | Self::Write { status, .. } => *status,
        }
    }

    /// Transport failures, 429 and 5xx are worth another attempt; other 4xx are not
    pub fn is_retryable(&self) -> bool {
        match self.status() {
            None => true,
            Some(status) => status == 429 || status >= 500,
        }
    }
}

/// Failure from the translation provider. Always local to one language.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("translation request failed: {0}")]
    Request(String),

    #[error("translation provider responded with {status}: {message}")]
    Api { status: u16, message: String },

    #[error("translation response was not usable: {0}")]
    InvalidResponse(String),
}

/// Failures that abort a whole translation job.
///
/// Per-language problems never show up here; they are folded into the
/// job summary instead.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("source language '{0}' is not a supported language")]
    UnsupportedSourceLanguage(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("translation job was cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_failures_are_retryable() {
        assert!(StoreError::read("connection reset").is_retryable());
        assert!(StoreError::write("timed out").is_retryable());
    }

    #[test]
    fn test_status_based_retry_decision() {
        let retryable = |status| StoreError::Read {
            message: "x".to_string(),
            status: Some(status),
        }
        .is_retryable();

        assert!(retryable(429));
        assert!(retryable(500));
        assert!(retryable(503));
        assert!(!retryable(400));
        assert!(!retryable(401));
        assert!(!retryable(404));
    }

    #[test]
    fn test_job_error_wraps_store_error() {
        let err: JobError = StoreError::write("create rejected").into();
        assert!(matches!(err, JobError::Store(StoreError::Write { .. })));
        assert_eq!(err.to_string(), "store write failed: create rejected");
    }
}
