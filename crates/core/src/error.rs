//! Error types shared by the venue adapters.
//!
//! Every network failure is converted to a value-typed result inside an
//! adapter; these errors surface only for misconfiguration or where a
//! caller explicitly asks for a fallible operation (balance reads, auth).

use thiserror::Error;

/// Errors that can occur when talking to a venue.
#[derive(Debug, Error)]
pub enum VenueError {
    /// Network-level failure (connect, DNS, TLS).
    #[error("transport error: {0}")]
    Transport(String),

    /// Request exceeded its deadline.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Authentication failed (401/403 class).
    #[error("authentication error: {0}")]
    Auth(String),

    /// API request failed with an HTTP status.
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Error message from the venue.
        message: String,
    },

    /// Request rejected locally before any network call.
    #[error("validation error: {0}")]
    Validation(String),

    /// Business rejection from the venue.
    #[error("venue rejected: {0}")]
    VenueReject(String),

    /// Adapter misconfiguration (missing account, bad URL).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl VenueError {
    /// Creates an API error from status code and message.
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }

    /// Returns true if the failure is worth a bounded local retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Api { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }

    /// Returns true if a one-shot re-authentication may clear the failure.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        match self {
            Self::Auth(_) => true,
            Self::Api { status_code, .. } => *status_code == 401 || *status_code == 403,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for VenueError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_decode() {
            Self::Serialization(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Errors from signing operations.
#[derive(Debug, Error)]
pub enum SignerError {
    /// Private key has invalid format.
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    /// Signing operation failed.
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// Transaction submission failed.
    #[error("transaction failed: {0}")]
    TransactionFailed(String),
}
