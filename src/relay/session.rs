//! Relay Session

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use serde::{Deserialize, Serialize};
use tracing::{info, debug};

/// Byte accounting for one relayed connection
#[derive(Debug)]
pub struct RelaySession {
    pub session_id: String,
    pub server_name: String,
    pub client_addr: SocketAddr,
    pub backend_addr: SocketAddr,
    pub start_time: Instant,
    pub bytes_up: AtomicU64,
    pub bytes_down: AtomicU64,
    last_activity_ms: AtomicU64,
}

/// Statistics for a finished session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStats {
    pub session_id: String,
    pub server_name: String,
    pub client_addr: SocketAddr,
    pub backend_addr: SocketAddr,
    pub start_time: std::time::SystemTime,
    pub duration_ms: u64,
    pub bytes_up: u64,
    pub bytes_down: u64,
    pub total_bytes: u64,
}

impl RelaySession {
    /// Create a new relay session
    pub fn new(
        session_id: String,
        server_name: String,
        client_addr: SocketAddr,
        backend_addr: SocketAddr,
    ) -> Self {
        debug!("Creating relay session: {} ({} -> {} for {})",
               session_id, client_addr, backend_addr, server_name);

        Self {
            session_id,
            server_name,
            client_addr,
            backend_addr,
            start_time: Instant::now(),
            bytes_up: AtomicU64::new(0),
            bytes_down: AtomicU64::new(0),
            last_activity_ms: AtomicU64::new(0),
        }
    }

    /// Bytes sent client -> backend, including the replayed ClientHello
    pub fn bytes_up(&self) -> u64 {
        self.bytes_up.load(Ordering::Relaxed)
    }

    /// Bytes sent backend -> client
    pub fn bytes_down(&self) -> u64 {
        self.bytes_down.load(Ordering::Relaxed)
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes_up() + self.bytes_down()
    }

    pub fn duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Time since either direction last moved data
    pub fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_activity_ms.load(Ordering::Relaxed));
        self.duration().saturating_sub(last)
    }

    pub fn add_bytes_up(&self, bytes: u64) {
        self.bytes_up.fetch_add(bytes, Ordering::Relaxed);
        self.touch();
    }

    pub fn add_bytes_down(&self, bytes: u64) {
        self.bytes_down.fetch_add(bytes, Ordering::Relaxed);
        self.touch();
    }

    fn touch(&self) {
        let now_ms = self.duration().as_millis() as u64;
        self.last_activity_ms.fetch_max(now_ms, Ordering::Relaxed);
    }

    /// Generate connection statistics
    pub fn to_stats(&self) -> ConnectionStats {
        let duration = self.duration();
        let start_time = std::time::SystemTime::now() - duration;

        ConnectionStats {
            session_id: self.session_id.clone(),
            server_name: self.server_name.clone(),
            client_addr: self.client_addr,
            backend_addr: self.backend_addr,
            start_time,
            duration_ms: duration.as_millis() as u64,
            bytes_up: self.bytes_up(),
            bytes_down: self.bytes_down(),
            total_bytes: self.total_bytes(),
        }
    }

    /// Log session statistics
    pub fn log_stats(&self) {
        info!(
            session_id = %self.session_id,
            server_name = %self.server_name,
            client_addr = %self.client_addr,
            backend_addr = %self.backend_addr,
            duration_ms = self.duration().as_millis() as u64,
            bytes_up = self.bytes_up(),
            bytes_down = self.bytes_down(),
            "Finished proxying for client {} to backend {}",
            self.client_addr,
            self.backend_addr
        );
    }
}
