//! The final, typed answer a caller observes.

use crate::error::{Error, Result};

/// One host visited while handling an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub host: String,
    /// Path requested from this host.
    pub path: String,
}

impl HostInfo {
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
        }
    }
}

/// Hosts in visitation order, the responding one last.
pub type HostList = Vec<HostInfo>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Ok,
    /// Some but not all sub-results of a fan-out are present.
    Partial,
    Error(Error),
}

impl Status {
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, Status::Partial)
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            Status::Error(e) => Some(e),
            _ => None,
        }
    }
}

/// Status, optional typed payload and the hosts that were visited.
///
/// The payload is owned: whoever takes it out of the response is its only
/// owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response<T> {
    pub status: Status,
    pub payload: Option<T>,
    pub hosts: HostList,
}

impl<T> Response<T> {
    pub fn ok(payload: T, hosts: HostList) -> Self {
        Self {
            status: Status::Ok,
            payload: Some(payload),
            hosts,
        }
    }

    pub fn partial(payload: T, hosts: HostList) -> Self {
        Self {
            status: Status::Partial,
            payload: Some(payload),
            hosts,
        }
    }

    pub fn error(error: Error, hosts: HostList) -> Self {
        Self {
            status: Status::Error(error),
            payload: None,
            hosts,
        }
    }

    /// Ok or partial with a payload.
    pub fn is_success(&self) -> bool {
        !matches!(self.status, Status::Error(_)) && self.payload.is_some()
    }

    pub fn host_names(&self) -> Vec<&str> {
        self.hosts.iter().map(|h| h.host.as_str()).collect()
    }

    /// The payload, treating a partial answer as success.
    pub fn into_result(self) -> Result<T> {
        match (self.status, self.payload) {
            (Status::Error(e), _) => Err(e),
            (_, Some(payload)) => Ok(payload),
            (_, None) => Err(Error::protocol("successful response carried no payload")),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        Response {
            status: self.status,
            payload: self.payload.map(f),
            hosts: self.hosts,
        }
    }
}
