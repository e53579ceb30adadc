use std::fmt;
use thiserror::Error;

pub type TcasResult<T> = Result<T, TcasError>;

/// Result type used by digest, buffer and blob access operations.
pub type CasResult<T> = Result<T, CasError>;

/// Classification of a [`CasError`]. The variants follow the status codes
/// used by the remote execution protocol, so errors can be forwarded to
/// clients without translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// Malformed digests, out-of-range offsets, objects that exceed a limit.
    InvalidArgument,
    /// The backing store does not contain the requested object.
    NotFound,
    /// Data corruption: checksum or size mismatches, malformed manifests.
    Internal,
    /// Space or quota exhaustion reported by a storage backend.
    ResourceExhausted,
    /// Transient backend failure that may succeed when retried.
    Unavailable,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Code::InvalidArgument => "InvalidArgument",
            Code::NotFound => "NotFound",
            Code::Internal => "Internal",
            Code::ResourceExhausted => "ResourceExhausted",
            Code::Unavailable => "Unavailable",
        };
        f.write_str(s)
    }
}

/// Error returned by all CAS operations: a code plus a human readable
/// message. Context is added with [`CasError::wrap`], which keeps the code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CasError {
    code: Code,
    message: String,
}

impl CasError {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        CasError {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Prefix the message with `context`, e.g. "Failed to load manifest: ...".
    pub fn wrap(self, context: impl fmt::Display) -> Self {
        CasError {
            code: self.code,
            message: format!("{context}: {}", self.message),
        }
    }
}

/// Umbrella error for configuration loading and binaries.
#[derive(Debug, Error)]
pub enum TcasError {
    #[error("config error: {0}")]
    Config(String),

    #[error("CAS error ({}): {0}", .0.code())]
    Cas(#[from] CasError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
