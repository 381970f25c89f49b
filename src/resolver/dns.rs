//! DNS Resolver
//!
//! Sends a single A query over UDP to one configured server and takes the
//! first A record of the answer section. Wire encoding is done with
//! `hickory-proto`; the exchange itself is a plain tokio UDP socket.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RData, RecordType};
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, trace};

use super::Resolver;
use crate::error::ResolveError;

/// How long to wait for the server's answer.
pub const DEFAULT_RESOLVER_TIMEOUT: Duration = Duration::from_secs(2);

// Largest UDP response accepted without EDNS
const MAX_UDP_RESPONSE: usize = 4096;

/// Resolver bound to one upstream DNS server.
#[derive(Debug, Clone)]
pub struct DnsResolver {
    server: String,
    timeout: Duration,
}

impl DnsResolver {
    /// Create a resolver for `server` (`host:port`) with the default timeout
    pub fn new(server: impl Into<String>) -> Self {
        Self::with_timeout(server, DEFAULT_RESOLVER_TIMEOUT)
    }

    pub fn with_timeout(server: impl Into<String>, timeout: Duration) -> Self {
        Self {
            server: server.into(),
            timeout,
        }
    }

    /// Build the A query for `hostname` with a random message id.
    pub fn build_query(hostname: &str) -> Result<Message, ResolveError> {
        let mut name = Name::from_ascii(hostname).map_err(|e| ResolveError::InvalidName {
            hostname: hostname.to_string(),
            reason: e.to_string(),
        })?;
        name.set_fqdn(true);

        let mut message = Message::new();
        message
            .set_id(rand::random::<u16>())
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true)
            .add_query(Query::query(name, RecordType::A));
        Ok(message)
    }

    /// First A record in the answer section, in the order the server sent them.
    pub fn first_ipv4(response: &Message) -> Option<Ipv4Addr> {
        response.answers().iter().find_map(|record| match record.data() {
            Some(RData::A(a)) => Some(a.0),
            _ => None,
        })
    }

    async fn exchange(&self, hostname: &str, query: &Message) -> Result<Message, ResolveError> {
        let transport = |source| ResolveError::Transport {
            hostname: hostname.to_string(),
            server: self.server.clone(),
            source,
        };

        let server_addr = lookup_host(self.server.as_str())
            .await
            .map_err(transport)?
            .next()
            .ok_or_else(|| {
                transport(std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    "dns server address did not resolve",
                ))
            })?;

        let bind_addr: SocketAddr = if server_addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).await.map_err(transport)?;
        socket.connect(server_addr).await.map_err(transport)?;

        let request = query.to_vec().map_err(|source| ResolveError::Protocol {
            hostname: hostname.to_string(),
            source,
        })?;
        socket.send(&request).await.map_err(transport)?;
        trace!(server = %server_addr, id = query.id(), "dns query sent");

        let mut buf = vec![0u8; MAX_UDP_RESPONSE];
        loop {
            let n = socket.recv(&mut buf).await.map_err(transport)?;
            let response = match Message::from_vec(&buf[..n]) {
                Ok(response) => response,
                Err(e) => {
                    debug!(server = %server_addr, "discarding undecodable dns packet: {}", e);
                    continue;
                }
            };
            if response.id() != query.id() || response.message_type() != MessageType::Response {
                debug!(server = %server_addr, id = response.id(), "discarding unrelated dns packet");
                continue;
            }
            return Ok(response);
        }
    }
}

#[async_trait]
impl Resolver for DnsResolver {
    async fn resolve_ipv4(&self, hostname: &str) -> Result<Ipv4Addr, ResolveError> {
        let query = Self::build_query(hostname)?;

        let response = timeout(self.timeout, self.exchange(hostname, &query))
            .await
            .map_err(|_| ResolveError::Timeout {
                hostname: hostname.to_string(),
                server: self.server.clone(),
                timeout: self.timeout,
            })??;

        debug!(
            hostname,
            rcode = ?response.response_code(),
            answers = response.answers().len(),
            "dns response received"
        );

        Self::first_ipv4(&response).ok_or_else(|| ResolveError::NoAddress {
            hostname: hostname.to_string(),
        })
    }
}
