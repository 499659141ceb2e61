//! Frames carried as HTTP requests.
//!
//! Each frame becomes a `POST http://{host}{target}` with the operation name
//! in a header and the frame body as request body. The answer maps back to
//! an [`Outcome`]:
//!
//! - `2xx` is a reply; the partial marker travels in a header.
//! - `3xx` with a `Location` is a redirect. Its query string is merged into
//!   the request's, replacing values unless the server asks to append.
//! - Anything else is a server error carrying the status code and body text.

use std::time::Duration;

use http::header::LOCATION;
use http::HeaderMap;
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use tracing::debug;
use url::Url;

use hopline_client::Exchange;
use hopline_wire::{CgiMap, Failure, Frame, Outcome, RedirectSignal, Reply};

use crate::error::Error;

/// Header naming the operation kind.
pub const OP_HEADER: &str = "x-hopline-op";

/// Reply header marking a partial answer (`1` or `true`).
pub const PARTIAL_HEADER: &str = "x-hopline-partial";

/// Redirect header choosing how query parameters merge: `replace` or `append`.
pub const CGI_MODE_HEADER: &str = "x-hopline-cgi";

/// Blocking HTTP exchange. Redirects are never followed by the HTTP client;
/// they are handed back to the dispatcher.
pub struct HttpExchange {
    client: Client,
    scheme: String,
}

impl HttpExchange {
    pub fn new() -> Result<Self, Error> {
        let client = Client::builder().redirect(Policy::none()).build()?;
        Ok(Self {
            client,
            scheme: "http".to_string(),
        })
    }

    /// Use `https` or another scheme instead of `http`.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    fn url(&self, host: &str, frame: &Frame) -> Result<Url, Error> {
        Ok(Url::parse(&format!("{}://{}{}", self.scheme, host, frame.target))?)
    }

    fn send(&self, url: Url, frame: &Frame, timeout: Duration) -> Result<Outcome, reqwest::Error> {
        let response = self
            .client
            .post(url.clone())
            .timeout(timeout)
            .header(OP_HEADER, frame.kind.as_str())
            .body(frame.body.clone())
            .send()?;

        let status = response.status();
        if status.is_redirection() {
            return Ok(match redirect_signal(&url, response.headers()) {
                Ok(signal) => Outcome::Redirect(signal),
                Err(e) => Outcome::Error(Failure::server(status.as_u16(), e.to_string())),
            });
        }

        let partial = response
            .headers()
            .get(PARTIAL_HEADER)
            .is_some_and(|v| v.as_bytes() == b"1" || v.as_bytes().eq_ignore_ascii_case(b"true"));
        let body = response.bytes()?;

        if status.is_success() {
            Ok(Outcome::Ok(Reply { body, partial }))
        } else {
            let message = String::from_utf8_lossy(&body).trim().to_string();
            Ok(Outcome::Error(Failure::server(status.as_u16(), message)))
        }
    }
}

impl Exchange for HttpExchange {
    fn exchange(&self, host: &str, frame: &Frame, timeout: Duration) -> Outcome {
        let url = match self.url(host, frame) {
            Ok(url) => url,
            Err(e) => return Outcome::Error(Failure::connection(e.to_string())),
        };
        debug!(%url, kind = %frame.kind, "http exchange");

        self.send(url, frame, timeout)
            .unwrap_or_else(|e| Outcome::Error(transport_failure(&e)))
    }
}

fn transport_failure(error: &reqwest::Error) -> Failure {
    if error.is_timeout() {
        Failure::timeout(error.to_string())
    } else if error.is_connect() {
        Failure::connection(error.to_string())
    } else {
        Failure::aborted(error.to_string())
    }
}

/// Turn a redirect answer into a [`RedirectSignal`].
///
/// A relative `Location` resolves against the URL that was requested. A
/// root or empty path keeps the request's current path.
pub fn redirect_signal(requested: &Url, headers: &HeaderMap) -> Result<RedirectSignal, Error> {
    let location = headers
        .get(LOCATION)
        .ok_or_else(|| invalid("redirect without a Location header"))?
        .to_str()
        .map_err(|_| invalid("Location header is not valid text"))?;
    let target = requested.join(location)?;

    let host = target
        .host_str()
        .ok_or_else(|| invalid(format!("redirect to '{}' names no host", location)))?;
    let host = match target.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let append = headers
        .get(CGI_MODE_HEADER)
        .is_some_and(|v| v.as_bytes().eq_ignore_ascii_case(b"append"));
    let cgi = target.query().map(CgiMap::parse).unwrap_or_default();

    let mut signal = RedirectSignal::to(host).with_cgi(cgi, !append);
    if target.path() != "/" {
        signal = signal.with_path(target.path());
    }
    Ok(signal)
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidRedirect {
        message: message.into(),
    }
}
