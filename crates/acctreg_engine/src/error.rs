//! Error types for the sync engine.

use acctreg_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Longest body excerpt kept in a remote error.
const BODY_EXCERPT_CHARS: usize = 200;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote could not be reached (connect, DNS, timeout).
    #[error("remote unreachable: {0}")]
    Unreachable(String),

    /// The remote answered with a non-2xx status.
    #[error("remote error {status}: [{body}]")]
    RemoteError {
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        body: String,
    },

    /// The response body could not be decoded or lacks a required cursor.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// No usable credentials for signing.
    #[error("authentication unavailable: {0}")]
    AuthenticationUnavailable(String),

    /// A single account failed validation and was skipped.
    #[error("account {account:?} rejected: {reason}")]
    ValidationRejected {
        /// Account name, or a placeholder if the name itself was missing.
        account: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Local configuration is invalid (templates, URLs).
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl SyncError {
    /// Creates a remote error with a body excerpt.
    pub fn remote(status: u16, body: &[u8]) -> Self {
        Self::RemoteError {
            status,
            body: body_excerpt(body),
        }
    }

    /// Creates a validation rejection.
    pub fn rejected(account: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ValidationRejected {
            account: account.into(),
            reason: reason.into(),
        }
    }

    /// HTTP status, if this is a remote error.
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::RemoteError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if the remote blamed the request (4xx).
    pub fn is_client_error(&self) -> bool {
        self.status().is_some_and(|s| (400..500).contains(&s))
    }

    /// Returns true if a later attempt may succeed without a config change.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Unreachable(_)
            | SyncError::MalformedResponse(_)
            | SyncError::AuthenticationUnavailable(_) => true,
            SyncError::RemoteError { status, .. } => {
                *status >= 500 || *status == 429 || *status == 403
            }
            SyncError::ValidationRejected { .. } | SyncError::Configuration(_) => false,
        }
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Decode(msg) | ProtocolError::Encode(msg) => {
                SyncError::MalformedResponse(msg)
            }
            ProtocolError::InvalidUrl(msg) => SyncError::Configuration(msg),
            ProtocolError::Signing(msg) | ProtocolError::InvalidAuthorization(msg) => {
                SyncError::AuthenticationUnavailable(msg)
            }
        }
    }
}

fn body_excerpt(body: &[u8]) -> String {
    if body.is_empty() {
        return "[no body]".to_string();
    }
    let text = String::from_utf8_lossy(body);
    let count = text.chars().count();
    if count <= BODY_EXCERPT_CHARS {
        text.into_owned()
    } else {
        let head: String = text.chars().take(BODY_EXCERPT_CHARS).collect();
        format!("{head}... ({} bytes)", body.len())
    }
}
