//! Per-connection Session Handling
//!
//! Drives one accepted connection through
//! `Sniffing -> Resolving -> Connecting -> Relaying -> Closed`. A failure at
//! any step moves the session to `Failed` and drops the client socket; no
//! later step runs.

use std::fmt;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use super::backend::Connector;
use crate::config::RelayConfig;
use crate::error::{SessionError, SniffError};
use crate::protocol::peek_client_hello;
use crate::relay::{ConnectionStats, RelayEngine, RelaySession};
use crate::resolver::Resolver;

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Accepted,
    Sniffing,
    Resolving,
    Connecting,
    Relaying,
    Closed,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Accepted => "accepted",
            SessionState::Sniffing => "sniffing",
            SessionState::Resolving => "resolving",
            SessionState::Connecting => "connecting",
            SessionState::Relaying => "relaying",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Runs sessions. Holds only read-only configuration and stateless
/// collaborators, so one instance is shared by every connection.
pub struct SessionHandler {
    config: Arc<RelayConfig>,
    resolver: Arc<dyn Resolver>,
    connector: Arc<dyn Connector>,
    relay_engine: RelayEngine,
}

impl SessionHandler {
    pub fn new(
        config: Arc<RelayConfig>,
        resolver: Arc<dyn Resolver>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let relay_engine = RelayEngine::from_config(&config);
        Self {
            config,
            resolver,
            connector,
            relay_engine,
        }
    }

    /// Handle one client connection to completion.
    ///
    /// The client socket is owned here and closed on every return path.
    #[instrument(skip_all, fields(connection_id = %connection_id, peer = %peer, server_name = tracing::field::Empty))]
    pub async fn handle(
        &self,
        client: TcpStream,
        peer: SocketAddr,
        connection_id: &str,
    ) -> Result<ConnectionStats, SessionError> {
        info!("Received connection from {}", peer);
        let mut state = SessionState::Accepted;

        let result = self.run(client, peer, connection_id, &mut state).await;
        match &result {
            Ok(_) => transition(&mut state, SessionState::Closed),
            Err(e) => {
                warn!(failed_in = %state, "Session from {} aborted: {}", peer, e);
                transition(&mut state, SessionState::Failed);
            }
        }
        result
    }

    async fn run(
        &self,
        client: TcpStream,
        peer: SocketAddr,
        connection_id: &str,
        state: &mut SessionState,
    ) -> Result<ConnectionStats, SessionError> {
        let (client_read, client_write) = client.into_split();

        // Only the sniff is bounded by the hello deadline.
        transition(state, SessionState::Sniffing);
        let hello_timeout = self.config.client_hello_timeout;
        let (hello, client_input) = timeout(hello_timeout, peek_client_hello(client_read))
            .await
            .map_err(|_| SniffError::Timeout(hello_timeout))??;
        tracing::Span::current().record("server_name", hello.server_name.as_str());
        debug!("Client hello sniffed");

        transition(state, SessionState::Resolving);
        let ip = self.resolver.resolve_ipv4(&hello.server_name).await?;
        info!(
            "Proxying requests for domain {} (resolved as {}) from client {}",
            hello.server_name, ip, peer
        );

        transition(state, SessionState::Connecting);
        let backend_addr = SocketAddrV4::new(ip, self.config.backend_port);
        let backend = self
            .connector
            .connect(backend_addr)
            .await
            .map_err(|source| SessionError::Connect {
                hostname: hello.server_name.clone(),
                source,
            })?;
        let backend_peer = backend.peer_addr().unwrap_or(SocketAddr::V4(backend_addr));
        info!("Successfully connected to backend {} for client {}", backend_peer, peer);

        transition(state, SessionState::Relaying);
        let session = Arc::new(RelaySession::new(
            connection_id.to_string(),
            hello.server_name,
            peer,
            backend_peer,
        ));
        let report = self
            .relay_engine
            .relay(&session, client_input, client_write, backend)
            .await;

        if !report.is_clean() {
            debug!("Relay finished with errors: up={:?} down={:?}",
                   report.upstream.result, report.downstream.result);
        }
        session.log_stats();
        Ok(session.to_stats())
    }
}

fn transition(state: &mut SessionState, next: SessionState) {
    debug!(from = %state, to = %next, "Session state change");
    *state = next;
}
