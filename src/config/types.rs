//! Configuration Types

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use crate::relay::engine::DEFAULT_BUFFER_SIZE;
use crate::resolver::dns::DEFAULT_RESOLVER_TIMEOUT;

/// Address the relay accepts TLS connections on
pub const LISTEN_ADDR: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 443));

/// Port dialled on the resolved backend address
pub const BACKEND_PORT: u16 = 443;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub resolver: ResolverConfig,
    pub timeouts: TimeoutConfig,
    pub relay: RelayTuning,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Upstream DNS server used instead of the system resolver
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// `host:port` of the trusted DNS server
    pub server: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

/// Per-session deadlines
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    #[serde(with = "humantime_serde")]
    pub client_hello: Duration,
    #[serde(with = "humantime_serde")]
    pub upstream_connect: Duration,
}

/// Copy loop settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayTuning {
    pub buffer_size: usize,
    /// Close sessions that move no data in either direction for this long
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Option<Duration>,
}

/// Process-level settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

/// Immutable settings every session reads; built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub dns_server: String,
    pub resolver_timeout: Duration,
    pub client_hello_timeout: Duration,
    pub upstream_connect_timeout: Duration,
    pub backend_port: u16,
    pub buffer_size: usize,
    pub idle_timeout: Option<Duration>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            server: "114.114.114.114:53".to_string(),
            timeout: DEFAULT_RESOLVER_TIMEOUT,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            client_hello: Duration::from_secs(5),
            upstream_connect: Duration::from_secs(5),
        }
    }
}

impl Default for RelayTuning {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            idle_timeout: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Config::default().relay_config()
    }
}

impl Config {
    /// Snapshot of the values sessions need
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            dns_server: self.resolver.server.clone(),
            resolver_timeout: self.resolver.timeout,
            client_hello_timeout: self.timeouts.client_hello,
            upstream_connect_timeout: self.timeouts.upstream_connect,
            backend_port: BACKEND_PORT,
            buffer_size: self.relay.buffer_size,
            idle_timeout: self.relay.idle_timeout,
        }
    }
}
