//! # hopline-client
//!
//! The request/response engine: operations are submitted to an entry host,
//! follow server redirects under a hop limit and complete exactly once,
//! either through a callback, a blocking call or a pending handle. Several
//! operations can run as a parallel group with a minimum success count.
//!
//! The network sits behind the [`Transport`] trait; blocking protocol
//! clients implement [`Exchange`] and are wrapped in a [`ThreadedTransport`].
//!
//! ```no_run
//! use hopline_client::{ClientConfig, Dispatcher, FileSystem, ThreadedTransport};
//! # use hopline_client::Exchange;
//! # fn run(exchange: impl Exchange) {
//! let dispatcher = Dispatcher::new(ThreadedTransport::new(exchange), ClientConfig::default());
//! let fs = FileSystem::new(dispatcher, "redirector:1094");
//! let stat = fs.stat("/data/file");
//! println!("answered by {:?}", stat.host_names());
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod dispatcher;
pub mod filesystem;
pub mod handle;
pub mod ops;
pub mod parallel;
pub mod redirect;
pub mod transport;

// Re-export main types
pub use bridge::ResponseBridge;
pub use config::{ClientConfig, TimeoutScope};
pub use dispatcher::Dispatcher;
pub use filesystem::FileSystem;
pub use handle::{PendingHandle, RequestState};
pub use ops::Operation;
pub use parallel::{aggregate_status, AggregateStatus, BatchResult, GroupHandle, ParallelGroup};
pub use redirect::{RedirectResolver, Route, Verdict};
pub use transport::{Completion, Exchange, ThreadedTransport, Transport};

pub use hopline_wire as wire;
pub use hopline_wire::{Error, Response, Result, Status};
