//! What a transport hands back for one hop.

use bytes::Bytes;

use crate::cgi::CgiMap;
use crate::error::{Error, FailureKind};

/// A successful answer from the server that handled the hop.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reply {
    pub body: Bytes,
    /// The server only managed part of a fan-out (for example, some
    /// locations could not be queried).
    pub partial: bool,
}

impl Reply {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            partial: false,
        }
    }

    pub fn partial(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            partial: true,
        }
    }

    pub fn text(&self) -> Result<&str, Error> {
        std::str::from_utf8(&self.body)
            .map_err(|e| Error::protocol(format!("reply body is not UTF-8: {}", e)))
    }
}

/// Server instruction to retry the same operation elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectSignal {
    pub host: String,
    /// `None` or empty keeps the current path.
    pub path: Option<String>,
    pub cgi: CgiMap,
    /// Colliding CGI keys are overwritten when set, appended otherwise.
    pub replace: bool,
}

impl RedirectSignal {
    pub fn to(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            path: None,
            cgi: CgiMap::new(),
            replace: true,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_cgi(mut self, cgi: CgiMap, replace: bool) -> Self {
        self.cgi = cgi;
        self.replace = replace;
        self
    }
}

/// A failed hop, as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// Nothing usable came back from the host.
    Transport { kind: FailureKind, detail: String },
    /// The server refused the request with an error status.
    Server { code: u16, message: String },
}

impl Failure {
    pub fn connection(detail: impl Into<String>) -> Self {
        Failure::Transport {
            kind: FailureKind::Connection,
            detail: detail.into(),
        }
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Failure::Transport {
            kind: FailureKind::Timeout,
            detail: detail.into(),
        }
    }

    pub fn aborted(detail: impl Into<String>) -> Self {
        Failure::Transport {
            kind: FailureKind::Aborted,
            detail: detail.into(),
        }
    }

    pub fn server(code: u16, message: impl Into<String>) -> Self {
        Failure::Server {
            code,
            message: message.into(),
        }
    }
}

impl From<Failure> for Error {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Transport { kind, detail } => Error::TransportFailure { kind, detail },
            Failure::Server { code, message } => Error::Server { code, message },
        }
    }
}

/// The three ways a hop can end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ok(Reply),
    Error(Failure),
    Redirect(RedirectSignal),
}
