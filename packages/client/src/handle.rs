//! Handles for operations that complete in the background.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use hopline_wire::Response;

use crate::bridge::ResponseBridge;

/// Where an operation submitted through [`Dispatcher::spawn`](crate::Dispatcher::spawn) stands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    /// Still travelling along its redirect chain
    Pending,
    /// The response arrived and has not been taken yet
    Ready,
    /// The response was taken by the owner of the handle
    Taken,
}

/// Handle to one in-flight operation.
pub struct PendingHandle<T> {
    id: u64,
    bridge: Arc<ResponseBridge<Response<T>>>,
}

impl<T> PendingHandle<T> {
    pub(crate) fn new(id: u64, bridge: Arc<ResponseBridge<Response<T>>>) -> Self {
        Self { id, bridge }
    }

    /// Operation id, as also logged by the dispatcher.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> RequestState {
        if !self.bridge.is_resolved() {
            RequestState::Pending
        } else if self.bridge.is_taken() {
            RequestState::Taken
        } else {
            RequestState::Ready
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == RequestState::Ready
    }

    /// Take the response if it has arrived.
    pub fn try_take(&self) -> Option<Response<T>> {
        self.bridge.try_take()
    }

    /// Block until the response arrives.
    pub fn wait(self) -> Response<T> {
        self.bridge
            .wait()
            .unwrap_or_else(|e| Response::error(e, Vec::new()))
    }

    /// Block for at most `timeout`; the handle stays usable when it expires.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Response<T>> {
        match self.bridge.wait_timeout(timeout) {
            Ok(response) => response,
            Err(e) => Some(Response::error(e, Vec::new())),
        }
    }
}
