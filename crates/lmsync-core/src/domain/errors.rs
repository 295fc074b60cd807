//! Domain error types
//!
//! [`DomainError`] covers validation failures of domain values.
//! [`ProviderError`] is the closed set of failures a course provider can
//! report to the sync engine; each variant is produced deliberately at the
//! adapter's throw site so the engine never has to classify errors by text.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A course name is empty after sanitization
    #[error("Invalid course name: {0:?}")]
    InvalidCourseName(String),
}

/// Failures reported by an [`ICourseProvider`](crate::ports::ICourseProvider)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// No credential token is held
    #[error("Not logged in")]
    NotAuthenticated,

    /// The token was rejected and re-authentication did not succeed
    #[error("Re-authentication failed")]
    ReauthenticationFailed,

    /// Transport-level failure (timeout, DNS, refused connection, HTTP status)
    #[error("Network error: {0}")]
    Network(String),

    /// The remote platform answered with a structured exception
    #[error("Remote error {code}: {message}")]
    Remote {
        /// Platform error code
        code: String,
        /// Human-readable message from the platform
        message: String,
    },

    /// The response could not be parsed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Persisting discovered state failed
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ProviderError {
    /// Returns true for transport-level failures
    pub fn is_network(&self) -> bool {
        matches!(self, ProviderError::Network(_))
    }
}
