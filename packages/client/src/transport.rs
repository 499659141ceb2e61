//! The seam between the dispatcher and the network.
//!
//! A [`Transport`] accepts a frame and reports exactly one [`Outcome`] for it
//! later, on a thread of its own. Blocking protocol clients implement the
//! simpler [`Exchange`] trait and are lifted into a transport by
//! [`ThreadedTransport`], which also owns the hop timer.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::trace;

use hopline_wire::{Failure, Frame, Outcome};

/// Called with the outcome of one hop.
pub type Completion = Box<dyn FnOnce(Outcome) + Send + 'static>;

/// Asynchronous delivery of frames to hosts.
pub trait Transport: Send + Sync {
    /// Send `frame` to `host` and return immediately.
    ///
    /// `done` runs exactly once, never on the calling thread. A hop that
    /// produces nothing within `timeout` completes with a timeout failure.
    fn send(&self, host: &str, frame: Frame, timeout: Duration, done: Completion);
}

/// One blocking request/reply exchange with a host.
///
/// Implementations can talk to real servers or replay scripted outcomes in
/// tests. They should give up once `timeout` has passed: the hop is failed
/// at that point anyway, and the thread running the exchange only ends when
/// the call returns.
pub trait Exchange: Send + Sync + 'static {
    fn exchange(&self, host: &str, frame: &Frame, timeout: Duration) -> Outcome;
}

/// Runs an [`Exchange`] on a background thread per hop.
///
/// Each hop uses two threads: one runs the exchange and one waits for it
/// with the hop timer. When the timer fires first the completion runs at
/// once with a timeout failure; the exchange thread keeps going until the
/// exchange honours its own timeout, and its outcome is dropped.
pub struct ThreadedTransport<E> {
    exchange: Arc<E>,
}

impl<E: Exchange> ThreadedTransport<E> {
    pub fn new(exchange: E) -> Self {
        Self {
            exchange: Arc::new(exchange),
        }
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }
}

impl<E: Exchange> Transport for ThreadedTransport<E> {
    fn send(&self, host: &str, frame: Frame, timeout: Duration, done: Completion) {
        let exchange = Arc::clone(&self.exchange);
        let host = host.to_string();

        thread::spawn(move || {
            let (tx, rx) = mpsc::channel();
            let target = host.clone();
            thread::spawn(move || {
                let outcome = exchange.exchange(&target, &frame, timeout);
                // The receiver is gone if the timer already fired.
                let _ = tx.send(outcome);
            });

            let outcome = match rx.recv_timeout(timeout) {
                Ok(outcome) => outcome,
                Err(RecvTimeoutError::Timeout) => {
                    trace!(host = %host, ?timeout, "hop timed out");
                    Outcome::Error(Failure::timeout(format!(
                        "no answer from {} within {:?}",
                        host, timeout
                    )))
                }
                Err(RecvTimeoutError::Disconnected) => Outcome::Error(Failure::aborted(format!(
                    "exchange with {} ended without an outcome",
                    host
                ))),
            };
            done(outcome);
        });
    }
}


#[cfg(test)]
mod tests {
    use super::mock::ScriptedExchange;
    use super::*;
    use hopline_wire::{FailureKind, OpKind, Reply};

    fn frame() -> Frame {
        Frame {
            kind: OpKind::Ping,
            target: String::new(),
            body: Default::default(),
        }
    }

    fn send_and_wait(
        transport: &dyn Transport,
        host: &str,
        timeout: Duration,
    ) -> (Outcome, thread::ThreadId) {
        let (tx, rx) = mpsc::channel();
        transport.send(
            host,
            frame(),
            timeout,
            Box::new(move |outcome| {
                tx.send((outcome, thread::current().id())).unwrap();
            }),
        );
        rx.recv_timeout(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn outcome_arrives_on_another_thread() {
        let transport = ThreadedTransport::new(
            ScriptedExchange::new().on("s1", Outcome::Ok(Reply::new("pong"))),
        );
        let (outcome, thread_id) = send_and_wait(&transport, "s1", Duration::from_secs(1));
        assert_eq!(outcome, Outcome::Ok(Reply::new("pong")));
        assert_ne!(thread_id, thread::current().id());
        assert_eq!(transport.exchange().hosts_contacted(), vec!["s1"]);
    }

    #[test]
    fn slow_host_times_out() {
        let transport = ThreadedTransport::new(
            ScriptedExchange::new()
                .on("s1", Outcome::Ok(Reply::new("late")))
                .slow("s1", Duration::from_millis(300)),
        );
        let (outcome, _) = send_and_wait(&transport, "s1", Duration::from_millis(20));
        match outcome {
            Outcome::Error(Failure::Transport { kind, .. }) => {
                assert_eq!(kind, FailureKind::Timeout)
            }
            other => panic!("expected a timeout, got {:?}", other),
        }
    }

    #[test]
    fn exchange_sees_the_hop_timeout() {
        let transport = ThreadedTransport::new(
            ScriptedExchange::new().on("s1", Outcome::Ok(Reply::new("pong"))),
        );
        send_and_wait(&transport, "s1", Duration::from_millis(750));
        assert_eq!(transport.exchange().timeouts(), vec![Duration::from_millis(750)]);
    }

    #[test]
    fn unscripted_host_fails_to_connect() {
        let transport = ThreadedTransport::new(ScriptedExchange::new());
        let (outcome, _) = send_and_wait(&transport, "nowhere", Duration::from_secs(1));
        match outcome {
            Outcome::Error(Failure::Transport { kind, .. }) => {
                assert_eq!(kind, FailureKind::Connection)
            }
            other => panic!("expected a connection failure, got {:?}", other),
        }
    }

    struct Panicking;

    impl Exchange for Panicking {
        fn exchange(&self, _host: &str, _frame: &Frame, _timeout: Duration) -> Outcome {
            panic!("exchange blew up");
        }
    }

    #[test]
    fn panicking_exchange_is_reported_as_aborted() {
        let transport = ThreadedTransport::new(Panicking);
        let (outcome, _) = send_and_wait(&transport, "s1", Duration::from_secs(1));
        match outcome {
            Outcome::Error(Failure::Transport { kind, .. }) => {
                assert_eq!(kind, FailureKind::Aborted)
            }
            other => panic!("expected an abort, got {:?}", other),
        }
    }
}
