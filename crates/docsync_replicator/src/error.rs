//! Error types for the replicator.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for replicator operations.
pub type ReplicatorResult<T> = Result<T, ReplicatorError>;

/// The layer an error code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorDomain {
    /// Errors raised by the replicator or database layer.
    Core,
    /// Network errors (DNS, TLS, unreachable host).
    Network,
    /// WebSocket close codes and HTTP statuses.
    WebSocket,
}

impl fmt::Display for ErrorDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorDomain::Core => "Core",
            ErrorDomain::Network => "Network",
            ErrorDomain::WebSocket => "WebSocket",
        };
        f.write_str(name)
    }
}

/// Codes in the [`ErrorDomain::Core`] domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ErrorCode {
    /// The operation is not supported by this replicator.
    Unsupported = 1,
    /// An argument was invalid.
    InvalidParameter = 3,
    /// The local database failed.
    Database = 4,
    /// Encoding or decoding failed.
    Codec = 5,
}

/// A plain error value, as carried in a status or per-document report.
///
/// Engines report failures this way instead of returning them, so they can
/// travel through notifications without being treated as control flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Domain of `code`.
    pub domain: ErrorDomain,
    /// Domain-specific code.
    pub code: i32,
    /// Human-readable description.
    pub message: String,
    /// Whether a retry might succeed.
    pub transient: bool,
}

impl ErrorInfo {
    /// Creates a non-transient error.
    pub fn new(domain: ErrorDomain, code: i32, message: impl Into<String>) -> Self {
        Self {
            domain,
            code,
            message: message.into(),
            transient: false,
        }
    }

    /// Creates an error that may go away on retry.
    pub fn transient(domain: ErrorDomain, code: i32, message: impl Into<String>) -> Self {
        Self {
            transient: true,
            ..Self::new(domain, code, message)
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error {}, \"{}\"", self.domain, self.code, self.message)
    }
}

/// Errors returned by replicator operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReplicatorError {
    /// The operation is not supported by this kind of replicator.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// An argument was invalid.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The peer address could not be used.
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl {
        /// The rejected address.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The local database reported a failure.
    #[error("database error: {0}")]
    Database(String),

    /// CBOR encoding failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// An error reported by the sync engine.
    #[error("engine error: {0}")]
    Engine(ErrorInfo),
}

impl ReplicatorError {
    /// Creates an unsupported-operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// Wraps an error reported by the sync engine.
    pub fn engine(info: ErrorInfo) -> Self {
        Self::Engine(info)
    }

    /// Returns the domain this error is reported under.
    pub fn domain(&self) -> ErrorDomain {
        match self {
            ReplicatorError::Engine(info) => info.domain,
            _ => ErrorDomain::Core,
        }
    }

    /// Returns the domain-specific code.
    pub fn code(&self) -> i32 {
        let code = match self {
            ReplicatorError::Unsupported(_) => ErrorCode::Unsupported,
            ReplicatorError::InvalidParameter(_) | ReplicatorError::InvalidUrl { .. } => {
                ErrorCode::InvalidParameter
            }
            ReplicatorError::Database(_) => ErrorCode::Database,
            ReplicatorError::Codec(_) => ErrorCode::Codec,
            ReplicatorError::Engine(info) => return info.code,
        };
        code as i32
    }

    /// Returns true if retrying the failed operation might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ReplicatorError::Engine(info) => info.transient,
            _ => false,
        }
    }

    /// Converts this error into the value carried by a status report.
    pub fn to_error_info(&self) -> ErrorInfo {
        match self {
            ReplicatorError::Engine(info) => info.clone(),
            other => ErrorInfo::new(other.domain(), other.code(), other.to_string()),
        }
    }
}

impl From<ErrorInfo> for ReplicatorError {
    fn from(info: ErrorInfo) -> Self {
        Self::engine(info)
    }
}
