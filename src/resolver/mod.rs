//! Name Resolution
//!
//! The relay never trusts the local resolver: every lookup goes to the DNS
//! server named in the configuration.

pub mod dns;

use std::net::Ipv4Addr;

use async_trait::async_trait;

use crate::error::ResolveError;

pub use dns::DnsResolver;

/// Maps a sniffed host name to the IPv4 address the backend lives at.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve_ipv4(&self, hostname: &str) -> Result<Ipv4Addr, ResolveError>;
}
