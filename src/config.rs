//! Client configuration.
//!
//! [`ClientConfig`] can be built in code through
//! [`ClientBuilder`](crate::ClientBuilder) or deserialized from any serde
//! format. Missing fields take their defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default Open Protocol port.
pub const DEFAULT_PORT: u16 = 4545;

/// Default bound for connect, handshake and request replies.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default pause after an unexpected dispatch failure.
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Settings for one controller session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Controller host name or address.
    pub host: String,
    /// Controller port.
    pub port: u16,
    /// Bound on opening the transport.
    pub connect_timeout: Duration,
    /// Bound on the Communication-Start reply.
    pub handshake_timeout: Duration,
    /// Bound used by requests that do not pass their own.
    pub request_timeout: Duration,
    /// Send MID 9999 at this interval while connected.
    pub keepalive_interval: Option<Duration>,
    /// Pause after an unexpected failure in the dispatch loop.
    pub error_backoff: Duration,
}

impl ClientConfig {
    /// `host:port` for the TCP transport.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_TIMEOUT,
            handshake_timeout: DEFAULT_TIMEOUT,
            request_timeout: DEFAULT_TIMEOUT,
            keepalive_interval: None,
            error_backoff: DEFAULT_ERROR_BACKOFF,
        }
    }
}
