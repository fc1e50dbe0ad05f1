//! Error types for the mock catalog.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the mock catalog.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or wrong signature.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Request refused on purpose (injected 403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// No such resource.
    #[error("not found: {0}")]
    NotFound(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Internal(_))
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) => 400,
            ServerError::AuthenticationFailed(_) | ServerError::Forbidden(_) => 403,
            ServerError::NotFound(_) => 404,
            ServerError::Internal(_) => 500,
        }
    }
}
