//! Shared error type across meshpep crates.

use thiserror::Error;

use crate::protocol::token::TokenError;

/// Operator-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Configuration rejected at load or validation time.
    Config,
    /// Unsupported configuration schema version.
    UnsupportedVersion,
    /// Credential could not be decoded or failed a claim check.
    Credential,
    /// Forwarding to the protected application failed.
    Upstream,
    /// Internal error.
    Internal,
}

impl ErrorCode {
    /// String representation used in logs and JSON bodies.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Config => "CONFIG",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::Credential => "CREDENTIAL",
            ErrorCode::Upstream => "UPSTREAM",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, PepError>;

/// Unified error type used by core and sidecar.
#[derive(Debug, Error)]
pub enum PepError {
    #[error("invalid config: {0}")]
    Config(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
    #[error("credential: {0}")]
    Credential(#[from] TokenError),
    #[error("upstream: {0}")]
    Upstream(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl PepError {
    /// Map the error to a stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            PepError::Config(_) => ErrorCode::Config,
            PepError::UnsupportedVersion => ErrorCode::UnsupportedVersion,
            PepError::Credential(_) => ErrorCode::Credential,
            PepError::Upstream(_) => ErrorCode::Upstream,
            PepError::Internal(_) => ErrorCode::Internal,
        }
    }
}
