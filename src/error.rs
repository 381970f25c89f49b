//! Error types for the relay
//!
//! Startup and configuration code uses `anyhow`; everything on the
//! per-connection path reports one of the typed errors below so a session
//! can log exactly which step failed.

use std::io;
use std::net::{SocketAddr, SocketAddrV4};
use std::time::Duration;

use thiserror::Error;

/// The listening socket could not be opened. Fatal at startup.
#[derive(Error, Debug)]
#[error("failed to listen on {addr}: {source}")]
pub struct ListenError {
    pub addr: SocketAddr,
    #[source]
    pub source: io::Error,
}

/// Reading the TLS ClientHello failed.
#[derive(Error, Debug)]
pub enum SniffError {
    #[error("read error while sniffing client hello: {0}")]
    Io(#[from] io::Error),

    #[error("client hello not received within {0:?}")]
    Timeout(Duration),

    #[error("stream ended inside the client hello")]
    UnexpectedEof,

    #[error("first record is not a TLS handshake record (content type {0:#04x})")]
    NotHandshake(u8),

    #[error("first handshake message is not a ClientHello (type {0:#04x})")]
    NotClientHello(u8),

    #[error("malformed client hello: {0}")]
    Malformed(&'static str),

    #[error("client hello carries no server name")]
    MissingServerName,

    #[error("client hello server name is not a valid host name")]
    InvalidServerName,
}

/// Looking up the sniffed host name failed.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("no A record for {hostname}")]
    NoAddress { hostname: String },

    #[error("invalid host name {hostname}: {reason}")]
    InvalidName { hostname: String, reason: String },

    #[error("dns exchange with {server} for {hostname} failed: {source}")]
    Transport {
        hostname: String,
        server: String,
        #[source]
        source: io::Error,
    },

    #[error("dns server {server} did not answer for {hostname} within {timeout:?}")]
    Timeout {
        hostname: String,
        server: String,
        timeout: Duration,
    },

    #[error("failed to encode or decode dns message for {hostname}: {source}")]
    Protocol {
        hostname: String,
        #[source]
        source: hickory_proto::error::ProtoError,
    },
}

/// Opening the backend connection failed.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("connect to {address} timed out after {timeout:?}")]
    Timeout {
        address: SocketAddrV4,
        timeout: Duration,
    },

    #[error("connect to {address} failed: {source}")]
    Io {
        address: SocketAddrV4,
        #[source]
        source: io::Error,
    },
}

/// One relay direction stopped on something other than a clean EOF.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("copy failed: {0}")]
    Io(#[from] io::Error),

    #[error("no data for {0:?}")]
    Idle(Duration),
}

/// A session ended before relaying started.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("sniffing client hello failed: {0}")]
    Sniff(#[from] SniffError),

    #[error("failed to resolve server name: {0}")]
    Resolve(#[from] ResolveError),

    #[error("failed to connect to backend for {hostname}: {source}")]
    Connect {
        hostname: String,
        #[source]
        source: ConnectError,
    },
}
