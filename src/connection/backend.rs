//! Backend Connector

use std::net::SocketAddrV4;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::error::ConnectError;

/// Opens the outbound leg of a session.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, address: SocketAddrV4) -> Result<TcpStream, ConnectError>;
}

/// Plain TCP connect bounded by a timeout. No retries.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, address: SocketAddrV4) -> Result<TcpStream, ConnectError> {
        debug!("Connecting to backend {} (timeout {:?})", address, self.connect_timeout);

        match timeout(self.connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(ConnectError::Io { address, source }),
            Err(_) => Err(ConnectError::Timeout {
                address,
                timeout: self.connect_timeout,
            }),
        }
    }
}
