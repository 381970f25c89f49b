//! Relay Engine
//!
//! Copies bytes between the client and the backend in two independent
//! tasks. When one direction reaches EOF (or fails) only the write side of
//! its destination is shut down, so the opposite direction keeps flowing
//! until it finishes on its own.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::RelaySession;
use crate::config::RelayConfig;
use crate::error::RelayError;

/// Default copy buffer per direction (32KB)
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

/// Which way bytes flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// client -> backend
    Upstream,
    /// backend -> client
    Downstream,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Upstream => f.write_str("client to backend"),
            Direction::Downstream => f.write_str("backend to client"),
        }
    }
}

/// How one direction ended
#[derive(Debug)]
pub struct DirectionReport {
    pub direction: Direction,
    pub bytes: u64,
    pub result: Result<(), RelayError>,
}

/// Outcome of a finished relay; both directions are always present.
#[derive(Debug)]
pub struct RelayReport {
    pub upstream: DirectionReport,
    pub downstream: DirectionReport,
}

impl RelayReport {
    pub fn is_clean(&self) -> bool {
        self.upstream.result.is_ok() && self.downstream.result.is_ok()
    }
}

/// Handles data relay between client and backend connections
#[derive(Debug, Clone)]
pub struct RelayEngine {
    buffer_size: usize,
    idle_timeout: Option<Duration>,
}

impl RelayEngine {
    /// Create a new relay engine
    pub fn new() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            idle_timeout: None,
        }
    }

    /// Create a relay engine that gives up on sessions idle for `idle_timeout`
    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout: Some(idle_timeout),
            ..Self::new()
        }
    }

    /// Create a new relay engine from configuration
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            buffer_size: config.buffer_size,
            idle_timeout: config.idle_timeout,
        }
    }

    /// Relay until both directions are done.
    ///
    /// `client_input` is what the backend should see from the client (the
    /// replayed ClientHello followed by the live socket); `client_output` is
    /// the client's write side. Every half is dropped before this returns,
    /// which closes both sockets.
    pub async fn relay<R, W>(
        &self,
        session: &Arc<RelaySession>,
        client_input: R,
        client_output: W,
        backend: TcpStream,
    ) -> RelayReport
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (backend_input, backend_output) = backend.into_split();

        let upstream = self.spawn_direction(Direction::Upstream, session, client_input, backend_output);
        let downstream = self.spawn_direction(Direction::Downstream, session, backend_input, client_output);

        let (upstream, downstream) = tokio::join!(upstream, downstream);
        let report = RelayReport {
            upstream: joined(Direction::Upstream, upstream),
            downstream: joined(Direction::Downstream, downstream),
        };

        debug!(
            session_id = %session.session_id,
            bytes_up = report.upstream.bytes,
            bytes_down = report.downstream.bytes,
            "Both relay directions finished"
        );
        report
    }

    fn spawn_direction<R, W>(
        &self,
        direction: Direction,
        session: &Arc<RelaySession>,
        reader: R,
        writer: W,
    ) -> JoinHandle<DirectionReport>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let engine = self.clone();
        let session = Arc::clone(session);
        tokio::spawn(async move { engine.copy_half(direction, &session, reader, writer).await })
    }

    /// Copy `reader` into `writer` until EOF or error, then half-close `writer`.
    pub async fn copy_half<R, W>(
        &self,
        direction: Direction,
        session: &RelaySession,
        mut reader: R,
        mut writer: W,
    ) -> DirectionReport
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = vec![0u8; self.buffer_size];
        let mut bytes = 0u64;

        let result = loop {
            let n = match self.read_chunk(session, &mut reader, &mut buf).await {
                Ok(0) => break Ok(()),
                Ok(n) => n,
                Err(e) => break Err(e),
            };
            if let Err(e) = writer.write_all(&buf[..n]).await {
                break Err(RelayError::Io(e));
            }

            bytes += n as u64;
            match direction {
                Direction::Upstream => session.add_bytes_up(n as u64),
                Direction::Downstream => session.add_bytes_down(n as u64),
            }
        };

        if let Err(e) = &result {
            warn!(session_id = %session.session_id, "Error copying data from {}: {}", direction, e);
        }

        // Half-close: the peer sees EOF but can still send to us.
        if let Err(e) = writer.shutdown().await {
            debug!(session_id = %session.session_id, "Shutdown after {} copy failed: {}", direction, e);
        }

        DirectionReport { direction, bytes, result }
    }

    async fn read_chunk<R>(&self, session: &RelaySession, reader: &mut R, buf: &mut [u8]) -> Result<usize, RelayError>
    where
        R: AsyncRead + Unpin,
    {
        let Some(idle_timeout) = self.idle_timeout else {
            return Ok(reader.read(buf).await?);
        };

        loop {
            let remaining = idle_timeout.saturating_sub(session.idle_for());
            if remaining.is_zero() {
                return Err(RelayError::Idle(idle_timeout));
            }
            // The other direction may have been active meanwhile; re-check on expiry.
            if let Ok(read) = timeout(remaining, reader.read(buf)).await {
                return Ok(read?);
            }
        }
    }
}

impl Default for RelayEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn joined(direction: Direction, result: Result<DirectionReport, tokio::task::JoinError>) -> DirectionReport {
    result.unwrap_or_else(|e| DirectionReport {
        direction,
        bytes: 0,
        result: Err(RelayError::Io(io::Error::new(io::ErrorKind::Other, e))),
    })
}
