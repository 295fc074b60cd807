//! lmsync Moodle - Moodle web-service adapter
//!
//! Provides:
//! - a resilient REST client with transparent re-authentication and
//!   retry-until-connected semantics
//! - the login manager, keyring token storage and launch-token decoding
//! - the course/content resolver implementing `ICourseProvider`
//! - popup notifications
//!
//! ## Modules
//!
//! - [`client`] - `MoodleClient::call` and connectivity tracking
//! - [`auth`] - token ownership and the mobile-launch login handshake
//! - [`contents`] - content-tree traversal into file descriptors
//! - [`resolver`] - courses, files and downloads for the sync engine
//! - [`notifications`] - forum-post notifications

pub mod auth;
pub mod client;
pub mod contents;
pub mod notifications;
pub mod resolver;

use lmsync_core::domain::ProviderError;
use thiserror::Error;

/// Errors that can occur when talking to the platform
#[derive(Debug, Error)]
pub enum ApiError {
    /// No token is held
    #[error("Not logged in")]
    NotAuthenticated,

    /// Timeout, DNS failure, refused connection or non-success HTTP status
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Structured web-service exception other than an invalid token
    #[error("Remote error {code}: {message}")]
    Remote {
        /// Moodle `errorcode`
        code: String,
        /// Moodle `message`
        message: String,
    },

    /// The response body was not the expected JSON
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }
}

impl From<ApiError> for ProviderError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::NotAuthenticated => ProviderError::NotAuthenticated,
            ApiError::Network(e) => ProviderError::Network(e.to_string()),
            ApiError::Remote { code, message } => ProviderError::Remote { code, message },
            ApiError::InvalidResponse(msg) => ProviderError::InvalidResponse(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_maps_to_provider_error() {
        let err: ProviderError = ApiError::Remote {
            code: "nopermissions".into(),
            message: "Sorry".into(),
        }
        .into();
        assert_eq!(
            err,
            ProviderError::Remote {
                code: "nopermissions".into(),
                message: "Sorry".into()
            }
        );

        let err: ProviderError = ApiError::NotAuthenticated.into();
        assert_eq!(err, ProviderError::NotAuthenticated);

        let err: ProviderError = ApiError::InvalidResponse("eof".into()).into();
        assert!(!err.is_network());
    }
}
