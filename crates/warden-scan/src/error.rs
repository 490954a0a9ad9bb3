//! Scan service error taxonomy.

use thiserror::Error;

/// Errors from the remote scan service.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The service could not be reached.
    #[error("scan service unavailable: {0}")]
    Unavailable(String),

    /// The service rejected the stored credential.
    #[error("scan service rejected the stored credential")]
    AuthRequired,

    /// The request did not complete in time.
    #[error("scan request timed out")]
    Timeout,

    /// The service answered with something we could not interpret.
    #[error("unexpected scan service response: {0}")]
    Protocol(String),

    /// The service base URL is not a valid URL.
    #[error("invalid scan service URL: {0}")]
    InvalidBaseUrl(String),
}

/// Result type for scan operations.
pub type Result<T> = std::result::Result<T, ScanError>;
