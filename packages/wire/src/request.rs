//! The request envelope and the frame a transport actually sends.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::cgi::CgiMap;
use crate::error::{Error, Result};
use crate::xattr::{self, AttributeEntry};

/// Kind of operation carried by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Locate,
    Stat,
    StatVfs,
    Rm,
    Mv,
    MkDir,
    RmDir,
    ChMod,
    Truncate,
    Ping,
    Query,
    Prepare,
    DirList,
    Protocol,
    SetXAttr,
    GetXAttr,
    DelXAttr,
    ListXAttr,
    /// Hands the server a line of client information or cache directives.
    Set,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Locate => "locate",
            OpKind::Stat => "stat",
            OpKind::StatVfs => "statvfs",
            OpKind::Rm => "rm",
            OpKind::Mv => "mv",
            OpKind::MkDir => "mkdir",
            OpKind::RmDir => "rmdir",
            OpKind::ChMod => "chmod",
            OpKind::Truncate => "truncate",
            OpKind::Ping => "ping",
            OpKind::Query => "query",
            OpKind::Prepare => "prepare",
            OpKind::DirList => "dirlist",
            OpKind::Protocol => "protocol",
            OpKind::SetXAttr => "setxattr",
            OpKind::GetXAttr => "getxattr",
            OpKind::DelXAttr => "delxattr",
            OpKind::ListXAttr => "listxattr",
            OpKind::Set => "set",
        }
    }

    /// Parse the name produced by [`OpKind::as_str`].
    pub fn parse(name: &str) -> Option<Self> {
        const ALL: [OpKind; 19] = [
            OpKind::Locate,
            OpKind::Stat,
            OpKind::StatVfs,
            OpKind::Rm,
            OpKind::Mv,
            OpKind::MkDir,
            OpKind::RmDir,
            OpKind::ChMod,
            OpKind::Truncate,
            OpKind::Ping,
            OpKind::Query,
            OpKind::Prepare,
            OpKind::DirList,
            OpKind::Protocol,
            OpKind::SetXAttr,
            OpKind::GetXAttr,
            OpKind::DelXAttr,
            OpKind::ListXAttr,
            OpKind::Set,
        ];
        ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation specific body of a request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Payload {
    #[default]
    Empty,
    /// Opaque argument bytes, sent unchanged on every hop.
    Raw(Bytes),
    /// Attribute records, re-encoded against the current target each hop.
    Attributes(Vec<AttributeEntry>),
}

/// A request as built by the caller-facing API.
///
/// Only the redirect resolver changes `host`, `path` and `cgi` once the
/// request has been submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub kind: OpKind,
    pub host: String,
    pub path: String,
    pub cgi: CgiMap,
    pub payload: Payload,
    /// Overrides the configured default when set.
    pub timeout: Option<Duration>,
}

impl Request {
    pub fn new(kind: OpKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            host: String::new(),
            path: path.into(),
            cgi: CgiMap::new(),
            payload: Payload::Empty,
            timeout: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_cgi(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.cgi.insert(key, value);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Path and query string as sent on the wire.
    pub fn target(&self) -> String {
        if self.cgi.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.cgi)
        }
    }

    /// Build the frame for the current hop.
    pub fn frame(&self) -> Result<Frame> {
        if self.host.is_empty() {
            return Err(Error::invalid(format!(
                "{} request has no target host",
                self.kind
            )));
        }
        let target = self.target();
        let body = match &self.payload {
            Payload::Empty => Bytes::new(),
            Payload::Raw(bytes) => bytes.clone(),
            Payload::Attributes(entries) => xattr::encode(entries, &target)?,
        };
        Ok(Frame {
            kind: self.kind,
            target,
            body,
        })
    }
}

/// A framed request, ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: OpKind,
    /// Path plus query string.
    pub target: String,
    pub body: Bytes,
}
