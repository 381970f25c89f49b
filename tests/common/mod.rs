//! Shared helpers for the integration tests: ClientHello builders, a stub
//! DNS server, spy resolver/connector, and small TCP backends.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{RData, Record};
use rustls::pki_types::ServerName;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use sni_relay::error::{ConnectError, ResolveError};
use sni_relay::{ConnectionManager, Connector, RelayConfig, Resolver, SessionHandler};

/// Hand-built ClientHello record carrying `server_name`.
pub fn client_hello(server_name: &str) -> Vec<u8> {
    let name = server_name.as_bytes();

    let mut sni = Vec::new();
    sni.extend_from_slice(&((name.len() + 3) as u16).to_be_bytes());
    sni.push(0x00);
    sni.extend_from_slice(&(name.len() as u16).to_be_bytes());
    sni.extend_from_slice(name);

    let mut extensions = Vec::new();
    extensions.extend_from_slice(&0x0000u16.to_be_bytes());
    extensions.extend_from_slice(&(sni.len() as u16).to_be_bytes());
    extensions.extend_from_slice(&sni);

    let mut body = Vec::new();
    body.extend_from_slice(&[0x03, 0x03]);
    body.extend_from_slice(&[0x42; 32]);
    body.push(0);
    body.extend_from_slice(&[0x00, 0x02, 0x13, 0x01]);
    body.extend_from_slice(&[0x01, 0x00]);
    body.extend_from_slice(&(extensions.len() as u16).to_be_bytes());
    body.extend_from_slice(&extensions);

    let mut handshake = vec![0x01];
    handshake.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
    handshake.extend_from_slice(&body);

    let mut record = vec![0x16, 0x03, 0x01];
    record.extend_from_slice(&(handshake.len() as u16).to_be_bytes());
    record.extend_from_slice(&handshake);
    record
}

/// The first flight a real TLS client sends for `server_name`.
///
/// Pass an IP literal to get a ClientHello without the SNI extension.
pub fn rustls_client_hello(server_name: &str) -> Vec<u8> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(rustls::RootCertStore::empty())
        .with_no_client_auth();

    let name = ServerName::try_from(server_name.to_string()).unwrap();
    let mut conn = rustls::ClientConnection::new(Arc::new(config), name).unwrap();

    let mut out = Vec::new();
    while conn.wants_write() {
        conn.write_tls(&mut out).unwrap();
    }
    out
}

/// What the stub DNS server answers to every query
#[derive(Debug, Clone)]
pub enum DnsAnswer {
    /// NOERROR with these A records, in this order
    Records(Vec<Ipv4Addr>),
    NxDomain,
    /// Never reply
    Silent,
}

/// UDP DNS server on loopback that answers every query the same way.
pub struct StubDns {
    pub addr: SocketAddr,
    queried: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl StubDns {
    pub async fn spawn(answer: DnsAnswer) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let queried = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&queried);

        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                let Ok((n, peer)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                let Ok(query) = Message::from_vec(&buf[..n]) else {
                    continue;
                };
                for q in query.queries() {
                    log.lock().unwrap().push(q.name().to_ascii());
                }

                let mut response = Message::new();
                response
                    .set_id(query.id())
                    .set_message_type(MessageType::Response)
                    .set_op_code(OpCode::Query)
                    .set_recursion_desired(query.recursion_desired())
                    .set_recursion_available(true);
                response.add_queries(query.queries().to_vec());

                match &answer {
                    DnsAnswer::Records(ips) => {
                        let name = query.queries()[0].name().clone();
                        for ip in ips {
                            response.add_answer(Record::from_rdata(name.clone(), 60, RData::A(A(*ip))));
                        }
                    }
                    DnsAnswer::NxDomain => {
                        response.set_response_code(ResponseCode::NXDomain);
                    }
                    DnsAnswer::Silent => continue,
                }

                let bytes = response.to_vec().unwrap();
                let _ = socket.send_to(&bytes, peer).await;
            }
        });

        Self { addr, queried, task }
    }

    /// Names queried so far, as sent on the wire
    pub fn queried(&self) -> Vec<String> {
        self.queried.lock().unwrap().clone()
    }
}

impl Drop for StubDns {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Resolver with fixed answers that records every lookup.
#[derive(Default)]
pub struct SpyResolver {
    answers: HashMap<String, Ipv4Addr>,
    calls: Mutex<Vec<String>>,
}

impl SpyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_answer(mut self, hostname: &str, ip: Ipv4Addr) -> Self {
        self.answers.insert(hostname.to_string(), ip);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Resolver for SpyResolver {
    async fn resolve_ipv4(&self, hostname: &str) -> Result<Ipv4Addr, ResolveError> {
        self.calls.lock().unwrap().push(hostname.to_string());
        self.answers
            .get(hostname)
            .copied()
            .ok_or_else(|| ResolveError::NoAddress {
                hostname: hostname.to_string(),
            })
    }
}

/// Connector that sends each requested backend address to a local listener
/// instead, and records what was asked for.
#[derive(Default)]
pub struct SpyConnector {
    routes: HashMap<Ipv4Addr, SocketAddr>,
    calls: Mutex<Vec<SocketAddrV4>>,
}

impl SpyConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, ip: Ipv4Addr, local: SocketAddr) -> Self {
        self.routes.insert(ip, local);
        self
    }

    pub fn calls(&self) -> Vec<SocketAddrV4> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for SpyConnector {
    async fn connect(&self, address: SocketAddrV4) -> Result<TcpStream, ConnectError> {
        self.calls.lock().unwrap().push(address);
        let Some(local) = self.routes.get(address.ip()) else {
            return Err(ConnectError::Io {
                address,
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "no route in test"),
            });
        };
        TcpStream::connect(local)
            .await
            .map_err(|source| ConnectError::Io { address, source })
    }
}

/// Backend that reads until the client half-closes, then sends `reply` and
/// closes. Resolves to everything it received.
pub async fn spawn_reply_backend(reply: &'static [u8]) -> (SocketAddr, JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        stream.read_to_end(&mut received).await.unwrap();
        stream.write_all(reply).await.unwrap();
        stream.shutdown().await.unwrap();
        received
    });

    (addr, handle)
}

/// Backend that speaks first: sends `banner`, half-closes, then reads until
/// EOF. Resolves to everything it received.
pub async fn spawn_banner_backend(banner: &'static [u8]) -> (SocketAddr, JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(banner).await.unwrap();
        stream.shutdown().await.unwrap();
        let mut received = Vec::new();
        stream.read_to_end(&mut received).await.unwrap();
        received
    });

    (addr, handle)
}

/// Backend that echoes everything back until the client half-closes.
pub async fn spawn_echo_backend() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (mut reader, mut writer) = stream.into_split();
        tokio::io::copy(&mut reader, &mut writer).await.unwrap();
        writer.shutdown().await.unwrap();
    });

    (addr, handle)
}

/// Relay config tuned for tests
pub fn test_config() -> RelayConfig {
    RelayConfig {
        client_hello_timeout: Duration::from_millis(500),
        upstream_connect_timeout: Duration::from_secs(1),
        ..RelayConfig::default()
    }
}

/// A running relay on an ephemeral loopback port
pub struct TestRelay {
    pub addr: SocketAddr,
    pub manager: Arc<ConnectionManager>,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl TestRelay {
    pub async fn start(
        config: RelayConfig,
        resolver: Arc<dyn Resolver>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let handler = Arc::new(SessionHandler::new(Arc::new(config), resolver, connector));
        let manager = Arc::new(
            ConnectionManager::bind("127.0.0.1:0".parse().unwrap(), handler)
                .await
                .unwrap(),
        );
        let addr = manager.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let runner = Arc::clone(&manager);
        let task = tokio::spawn(async move { runner.run(shutdown_rx).await });

        Self {
            addr,
            manager,
            shutdown_tx,
            task,
        }
    }

    /// Stop accepting and wait for the accept loop to exit
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        self.task.await.unwrap();
    }
}

/// Read until the relay closes the connection. A reset counts as closed.
pub async fn read_until_closed(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf).await;
    buf
}
