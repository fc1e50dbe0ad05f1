//! Error types for the account protocol.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while decoding, encoding or signing protocol messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The body could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// A URL could not be parsed or has no host.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Signature computation failed.
    #[error("signing error: {0}")]
    Signing(String),

    /// An `Authorization` header did not follow the SigV4 layout.
    #[error("malformed authorization header: {0}")]
    InvalidAuthorization(String),
}

impl From<url::ParseError> for ProtocolError {
    fn from(err: url::ParseError) -> Self {
        ProtocolError::InvalidUrl(err.to_string())
    }
}
