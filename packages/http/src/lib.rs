//! # hopline-http
//!
//! An [`Exchange`](hopline_client::Exchange) that carries frames over HTTP,
//! for deployments that front the storage cluster with HTTP gateways.
//! Server redirects arrive as `3xx` answers and are followed by the
//! dispatcher, not by the HTTP client.
//!
//! ```no_run
//! use hopline_client::ClientConfig;
//!
//! let fs = hopline_http::connect("gateway:8080", ClientConfig::default())?;
//! let stat = fs.stat("/data/file").into_result()?;
//! println!("{} bytes", stat.size);
//! # Ok::<(), hopline_wire::Error>(())
//! ```

pub mod error;
pub mod exchange;

// Re-export main types
pub use error::Error;
pub use exchange::{redirect_signal, HttpExchange, CGI_MODE_HEADER, OP_HEADER, PARTIAL_HEADER};

use hopline_client::{ClientConfig, Dispatcher, FileSystem, ThreadedTransport};

/// A [`FileSystem`] for `host`, reached over HTTP.
pub fn connect(host: &str, config: ClientConfig) -> hopline_wire::Result<FileSystem> {
    config.validate()?;
    let exchange = HttpExchange::new()?;
    let dispatcher = Dispatcher::new(ThreadedTransport::new(exchange), config);
    Ok(FileSystem::new(dispatcher, host))
}
