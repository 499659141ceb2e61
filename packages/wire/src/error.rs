//! Error taxonomy shared by every layer of the client.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a transport could not deliver an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// The host could not be reached or the connection broke.
    Connection,
    /// No answer arrived before the deadline.
    Timeout,
    /// The exchange was abandoned without producing an outcome.
    Aborted,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Connection => "connection",
            FailureKind::Timeout => "timeout",
            FailureKind::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The request was malformed before it ever reached a transport.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("transport failure ({kind}): {detail}")]
    TransportFailure { kind: FailureKind, detail: String },

    /// The server answered, but with an error status.
    #[error("server error {code}: {message}")]
    Server { code: u16, message: String },

    #[error("redirect limit of {limit} hops exceeded")]
    RedirectLimitExceeded { limit: u16 },

    /// A redirect arrived while redirects are not followed.
    #[error("redirected to {host}{target}")]
    Redirected { host: String, target: String },

    /// The payload could not be interpreted.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    #[error("{failed} of {total} batch members failed")]
    PartialBatch { failed: usize, total: usize },

    #[error("operation cancelled")]
    Cancelled,

    #[error("response already resolved")]
    AlreadyResolved,
}

impl Error {
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol {
            message: message.into(),
        }
    }

    pub fn transport(kind: FailureKind, detail: impl Into<String>) -> Self {
        Error::TransportFailure {
            kind,
            detail: detail.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::TransportFailure {
                kind: FailureKind::Timeout,
                ..
            }
        )
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
