//! Client configuration.
//!
//! Configuration is an explicit value handed to the dispatcher; nothing is
//! read from process-wide state unless [`ClientConfig::from_env`] is called.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use hopline_wire::{build_path, Error, Result};

pub const DEFAULT_REDIRECT_LIMIT: u16 = 16;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(1800);

const ENV_REDIRECT_LIMIT: &str = "HOPLINE_REDIRECT_LIMIT";
const ENV_REQUEST_TIMEOUT: &str = "HOPLINE_REQUEST_TIMEOUT";
const ENV_TIMEOUT_SCOPE: &str = "HOPLINE_TIMEOUT_SCOPE";
const ENV_CWD: &str = "HOPLINE_CWD";
const ENV_FOLLOW_REDIRECTS: &str = "HOPLINE_FOLLOW_REDIRECTS";

/// What a request timeout covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutScope {
    /// One deadline for the whole redirect chain.
    #[default]
    Chain,
    /// Every hop gets the full timeout again.
    #[serde(rename = "hop")]
    PerHop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Redirects followed before giving up.
    pub redirect_limit: u16,

    /// When off, the first redirect ends the operation with
    /// [`Error::Redirected`] and its target in the host list.
    pub follow_redirects: bool,

    /// Default timeout, used when a request does not carry its own.
    #[serde(with = "seconds")]
    pub request_timeout: Duration,

    pub timeout_scope: TimeoutScope,

    /// Directory relative paths are resolved against.
    pub cwd: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            redirect_limit: DEFAULT_REDIRECT_LIMIT,
            follow_redirects: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            timeout_scope: TimeoutScope::Chain,
            cwd: "/".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn with_redirect_limit(mut self, limit: u16) -> Self {
        self.redirect_limit = limit;
        self
    }

    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_timeout_scope(mut self, scope: TimeoutScope) -> Self {
        self.timeout_scope = scope;
        self
    }

    /// Defaults overlaid with `HOPLINE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`, keyed like the
    /// environment variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(limit) = lookup(ENV_REDIRECT_LIMIT) {
            config.redirect_limit = limit.trim().parse().map_err(|_| {
                Error::invalid(format!("{} must be a number, got '{}'", ENV_REDIRECT_LIMIT, limit))
            })?;
        }

        if let Some(timeout) = lookup(ENV_REQUEST_TIMEOUT) {
            let secs: u64 = timeout.trim().parse().map_err(|_| {
                Error::invalid(format!(
                    "{} must be a number of seconds, got '{}'",
                    ENV_REQUEST_TIMEOUT, timeout
                ))
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }

        if let Some(scope) = lookup(ENV_TIMEOUT_SCOPE) {
            config.timeout_scope = match scope.trim() {
                "chain" => TimeoutScope::Chain,
                "hop" => TimeoutScope::PerHop,
                other => {
                    return Err(Error::invalid(format!(
                        "{} must be 'chain' or 'hop', got '{}'",
                        ENV_TIMEOUT_SCOPE, other
                    )))
                }
            };
        }

        if let Some(follow) = lookup(ENV_FOLLOW_REDIRECTS) {
            config.follow_redirects = match follow.trim() {
                "true" | "1" => true,
                "false" | "0" => false,
                other => {
                    return Err(Error::invalid(format!(
                        "{} must be 'true' or 'false', got '{}'",
                        ENV_FOLLOW_REDIRECTS, other
                    )))
                }
            };
        }

        if let Some(cwd) = lookup(ENV_CWD) {
            config.cwd = build_path("/", &cwd)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            return Err(Error::invalid("request timeout must be positive"));
        }
        if !self.cwd.starts_with('/') {
            return Err(Error::invalid(format!(
                "working directory '{}' is not absolute",
                self.cwd
            )));
        }
        Ok(())
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
