//! Network configuration for the worker listener and outbound calls.

use std::time::Duration;

use dispatch_core::DEFAULT_MAX_FRAME_LENGTH;

/// Default host for both the listener and outbound calls.
pub const DEFAULT_HOST: &str = "localhost";

/// Default port for both the listener and outbound calls.
pub const DEFAULT_PORT: u16 = 6666;

/// Listener address, default call target, and per-connection settings.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind host, also the host `call()` connects to.
    pub host: String,
    /// Port to listen on and call. 0 asks the OS for an ephemeral port when
    /// binding; the bound port is written back so calls reach the listener.
    pub port: u16,
    pub connection: ConnectionConfig,
    /// How long shutdown waits for in-flight connections and tasks.
    pub drain_timeout: Duration,
}

impl NetworkConfig {
    /// `host:port` string suitable for binding or connecting.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connection: ConnectionConfig::default(),
            drain_timeout: Duration::from_secs(30),
        }
    }
}

/// Per-connection settings shared by the worker and caller sides.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Largest accepted frame payload in bytes.
    pub max_frame_length: usize,
    /// Bound on establishing an outbound connection. `None` waits indefinitely.
    /// The response itself is never subject to a timeout.
    pub connect_timeout: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            connect_timeout: None,
        }
    }
}
