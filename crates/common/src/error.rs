//! Errors reported by the record storage transport.

use thiserror::Error;

/// Error returned by a record storage transport.
///
/// Variants mirror the status families of the backing storage service:
/// - [`StoreError::BadRequest`] → 400
/// - [`StoreError::NotFound`] → 404
/// - [`StoreError::Unavailable`] → 503
/// - [`StoreError::Internal`] → 500
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage service rejected the request (bad filter, malformed record).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The addressed record does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The storage service is temporarily unreachable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// An unexpected error occurred inside the transport.
    #[error("internal storage error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Returns the HTTP status code the storage service used for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            StoreError::BadRequest(_) => 400,
            StoreError::NotFound(_) => 404,
            StoreError::Unavailable(_) => 503,
            StoreError::Internal(_) => 500,
        }
    }

    /// Whether the transport layer may retry the request.
    ///
    /// Only availability failures qualify; the crypto layer never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}
