//! Submission and completion of operations.
//!
//! Every submitted operation becomes a [`PendingOperation`] that travels with
//! its own hop callbacks: the transport hands it back together with the hop
//! outcome, and the dispatcher either delivers the final response or
//! retargets the operation and sends it again. Resubmission always goes
//! through the transport, so a long redirect chain never deepens the stack.
//!
//! Whatever happens, the operation's sink fires exactly once: consuming
//! completion methods fire it, and dropping an operation that never completed
//! fires it with an aborted transport failure.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use hopline_wire::{Decode, Error, FailureKind, Outcome, Reply, Request, Response, Result};

use crate::bridge::ResponseBridge;
use crate::config::{ClientConfig, TimeoutScope};
use crate::handle::PendingHandle;
use crate::ops::Operation;
use crate::parallel::{GroupHandle, ParallelGroup};
use crate::redirect::{RedirectResolver, Route, Verdict};
use crate::transport::Transport;

/// Where the final response of an operation goes.
pub(crate) enum Sink<T> {
    Bridge(Arc<ResponseBridge<Response<T>>>),
    Callback(Box<dyn FnOnce(Response<T>) + Send + 'static>),
}

impl<T> Sink<T> {
    fn fire(self, id: u64, response: Response<T>) {
        match self {
            Sink::Bridge(bridge) => {
                if bridge.resolve(response).is_err() {
                    warn!(op_id = id, "response bridge was already resolved");
                }
            }
            Sink::Callback(callback) => callback(response),
        }
    }
}

/// One submitted operation, owned by whichever hop is currently in flight.
struct PendingOperation<T> {
    id: u64,
    route: Route,
    started: Instant,
    timeout: Duration,
    scope: TimeoutScope,
    sink: Option<Sink<T>>,
}

impl<T: Decode> PendingOperation<T> {
    /// Time the next hop may take, or `None` once the chain deadline passed.
    fn hop_timeout(&self) -> Option<Duration> {
        if self.route.hosts.is_empty() {
            return Some(self.timeout);
        }
        match self.scope {
            TimeoutScope::PerHop => Some(self.timeout),
            TimeoutScope::Chain => self
                .timeout
                .checked_sub(self.started.elapsed())
                .filter(|left| !left.is_zero()),
        }
    }

    fn succeed(self, reply: Reply) {
        let partial = reply.partial;
        match T::decode(reply) {
            Ok(payload) => {
                let hosts = self.route.hosts.clone();
                debug!(op_id = self.id, hops = self.route.hops, partial, "operation completed");
                let response = if partial {
                    Response::partial(payload, hosts)
                } else {
                    Response::ok(payload, hosts)
                };
                self.deliver(response);
            }
            Err(e) => self.fail(e),
        }
    }

    fn fail(self, error: Error) {
        debug!(op_id = self.id, hops = self.route.hops, error = %error, "operation failed");
        let hosts = self.route.hosts.clone();
        self.deliver(Response::error(error, hosts));
    }

    fn deliver(mut self, response: Response<T>) {
        if let Some(sink) = self.sink.take() {
            sink.fire(self.id, response);
        }
    }
}

impl<T> Drop for PendingOperation<T> {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            warn!(op_id = self.id, "operation dropped before completing");
            let error = Error::transport(
                FailureKind::Aborted,
                format!("operation {} was abandoned", self.id),
            );
            sink.fire(self.id, Response::error(error, std::mem::take(&mut self.route.hosts)));
        }
    }
}

struct Inner {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    resolver: RedirectResolver,
    next_id: AtomicU64,
}

impl Inner {
    /// Send the operation's current hop.
    fn launch<T: Decode>(self: &Arc<Self>, mut op: PendingOperation<T>) {
        let frame = match op.route.request.frame() {
            Ok(frame) => frame,
            // Only a server's redirect can break a request that was admitted.
            Err(e) if op.route.hops > 0 => {
                let message = format!("redirect left an unusable request: {}", e);
                return op.fail(Error::protocol(message));
            }
            Err(e) => return op.fail(e),
        };
        let Some(timeout) = op.hop_timeout() else {
            let error = Error::transport(
                FailureKind::Timeout,
                format!(
                    "deadline of {:?} passed after {} redirects",
                    op.timeout, op.route.hops
                ),
            );
            return op.fail(error);
        };

        op.route.record_visit();
        let host = op.route.request.host.clone();
        debug!(
            op_id = op.id,
            host = %host,
            hop = op.route.hops,
            kind = %frame.kind,
            target = %frame.target,
            "sending hop"
        );

        let inner = Arc::clone(self);
        self.transport.send(
            &host,
            frame,
            timeout,
            Box::new(move |outcome| inner.complete(op, outcome)),
        );
    }

    /// Handle the outcome of one hop.
    fn complete<T: Decode>(self: &Arc<Self>, mut op: PendingOperation<T>, outcome: Outcome) {
        match outcome {
            Outcome::Ok(reply) => op.succeed(reply),
            Outcome::Error(failure) => op.fail(failure.into()),
            Outcome::Redirect(signal) => {
                debug!(op_id = op.id, host = %signal.host, hop = op.route.hops, "redirected");
                match self.resolver.apply(&mut op.route, signal) {
                    Verdict::Continue => self.launch(op),
                    Verdict::LimitExceeded => {
                        let limit = self.resolver.limit();
                        warn!(op_id = op.id, limit, "redirect limit exceeded");
                        op.fail(Error::RedirectLimitExceeded { limit });
                    }
                    Verdict::NotFollowed => {
                        op.route.record_visit();
                        let request = &op.route.request;
                        let error = Error::Redirected {
                            host: request.host.clone(),
                            target: request.target(),
                        };
                        op.fail(error);
                    }
                    Verdict::Invalid(reason) => {
                        warn!(op_id = op.id, %reason, "malformed redirect");
                        op.fail(Error::protocol(reason));
                    }
                }
            }
        }
    }
}

/// Submits operations to a [`Transport`] and follows their redirects.
///
/// Cloning is cheap; clones share the transport and the id counter.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn new(transport: impl Transport + 'static, config: ClientConfig) -> Self {
        Self::with_transport(Arc::new(transport), config)
    }

    pub fn with_transport(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        let resolver =
            RedirectResolver::new(config.redirect_limit).with_follow(config.follow_redirects);
        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                resolver,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Check a request before anything is sent and return its timeout.
    fn admit(&self, request: &Request) -> Result<Duration> {
        request.frame()?;
        let timeout = request.timeout.unwrap_or(self.inner.config.request_timeout);
        if timeout.is_zero() {
            return Err(Error::invalid("timeout must be positive"));
        }
        Ok(timeout)
    }

    fn launch<T: Decode>(&self, request: Request, timeout: Duration, sink: Sink<T>) -> u64 {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(
            op_id = id,
            kind = %request.kind,
            host = %request.host,
            path = %request.path,
            "submitting"
        );
        let op = PendingOperation {
            id,
            route: Route::new(request),
            started: Instant::now(),
            timeout,
            scope: self.inner.config.timeout_scope,
            sink: Some(sink),
        };
        self.inner.launch(op);
        id
    }

    fn request_for<O: Operation>(host: &str, op: O) -> Result<Request> {
        Ok(op.into_request()?.with_host(host))
    }

    /// Submit `op` to `host`; `callback` runs exactly once with the final
    /// response, on a transport thread.
    ///
    /// Invalid arguments are reported here and the callback never runs.
    pub fn submit<O, F>(&self, host: &str, op: O, callback: F) -> Result<u64>
    where
        O: Operation,
        F: FnOnce(Response<O::Output>) + Send + 'static,
    {
        let request = Self::request_for(host, op)?;
        let timeout = self.admit(&request)?;
        Ok(self.launch(request, timeout, Sink::Callback(Box::new(callback))))
    }

    /// Submit `op` and return a handle to wait on.
    pub fn spawn<O: Operation>(&self, host: &str, op: O) -> Result<PendingHandle<O::Output>> {
        let request = Self::request_for(host, op)?;
        let timeout = self.admit(&request)?;
        let bridge = Arc::new(ResponseBridge::new());
        let id = self.launch(request, timeout, Sink::Bridge(Arc::clone(&bridge)));
        Ok(PendingHandle::new(id, bridge))
    }

    /// Run `op` and block until its final response.
    pub fn call<O: Operation>(&self, host: &str, op: O) -> Response<O::Output> {
        match self.spawn(host, op) {
            Ok(handle) => handle.wait(),
            Err(e) => Response::error(e, Vec::new()),
        }
    }

    /// Run `ops` against `host` concurrently.
    ///
    /// See [`parallel_at`](Dispatcher::parallel_at).
    pub fn parallel<O: Operation>(
        &self,
        host: &str,
        ops: Vec<O>,
        min_success: usize,
    ) -> Result<GroupHandle<O::Output>> {
        let targets = ops.into_iter().map(|op| (host.to_string(), op)).collect();
        self.parallel_at(targets, min_success)
    }

    /// Run each operation against its own host concurrently and aggregate
    /// the results.
    ///
    /// Every member is validated before any is sent: one invalid member
    /// rejects the whole batch. `min_success` above the member count is an
    /// invalid argument.
    pub fn parallel_at<O: Operation>(
        &self,
        targets: Vec<(String, O)>,
        min_success: usize,
    ) -> Result<GroupHandle<O::Output>> {
        let group = ParallelGroup::new(targets.len(), min_success)?;

        let mut admitted = Vec::with_capacity(targets.len());
        for (host, op) in targets {
            let request = Self::request_for(&host, op)?;
            let timeout = self.admit(&request)?;
            admitted.push((request, timeout));
        }

        for (index, (request, timeout)) in admitted.into_iter().enumerate() {
            self.launch(request, timeout, Sink::Callback(Box::new(group.member(index))));
        }
        Ok(group.handle())
    }
}
