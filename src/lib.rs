//! SNI Relay Library
//!
//! A transparent TCP relay for TLS traffic. The relay reads the server name
//! from each client's ClientHello, resolves it through a trusted DNS server,
//! and connects to the answer on port 443. The TLS session itself is never
//! terminated: the consumed ClientHello is replayed to the backend and both
//! directions are copied byte for byte.

pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod resolver;
pub mod shutdown;

pub use config::{Config, RelayConfig};
pub use connection::{ConnectionManager, Connector, SessionHandler, TcpConnector};
pub use resolver::{DnsResolver, Resolver};
pub use shutdown::ShutdownCoordinator;

/// Common error type for startup and configuration code
pub type Result<T> = anyhow::Result<T>;
