//! Connection Manager Implementation

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use super::SessionHandler;
use crate::error::ListenError;

/// Accept loop and session bookkeeping
pub struct ConnectionManager {
    listener: TcpListener,
    handler: Arc<SessionHandler>,
    active_connections: Arc<AtomicUsize>,
    next_connection_id: Arc<AtomicUsize>,
    shutdown_flag: Arc<AtomicBool>,
}

/// Keeps the active-session gauge honest even if a session task panics.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl ConnectionManager {
    /// Bind the listener. Failing here is fatal for the process.
    pub async fn bind(addr: SocketAddr, handler: Arc<SessionHandler>) -> Result<Self, ListenError> {
        info!("Binding TCP listener to {}", addr);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenError { addr, source })?;

        let bound = listener.local_addr().unwrap_or(addr);
        info!("Listening on {}", bound);

        Ok(Self {
            listener,
            handler,
            active_connections: Arc::new(AtomicUsize::new(0)),
            next_connection_id: Arc::new(AtomicUsize::new(1)),
            shutdown_flag: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Accept connections until a shutdown signal arrives.
    ///
    /// Every accepted socket gets its own task immediately; session errors
    /// stay inside that task. Sessions already running are left alone when
    /// the loop stops.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Starting connection acceptance loop");

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            let connection_id = format!("conn_{}",
                                self.next_connection_id.fetch_add(1, Ordering::Relaxed));
                            debug!("Accepted connection {} from {}", connection_id, addr);

                            let handler = Arc::clone(&self.handler);
                            let guard = ActiveGuard::acquire(&self.active_connections);

                            tokio::spawn(async move {
                                let _guard = guard;
                                let start_time = Instant::now();

                                if let Err(e) = handler.handle(stream, addr, &connection_id).await {
                                    debug!("Connection {} from {} failed: {}", connection_id, addr, e);
                                }

                                debug!("Connection {} from {} closed after {:?}",
                                       connection_id, addr, start_time.elapsed());
                            });
                        }
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal, stopping connection acceptance");
                    self.shutdown_flag.store(true, Ordering::Relaxed);
                    break;
                }
            }
        }

        info!("Connection acceptance loop stopped");
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Get the number of sessions still running
    pub fn get_active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Check if the accept loop has been told to stop
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    /// Get connection statistics
    pub fn get_connection_stats(&self) -> ListenerStats {
        ListenerStats {
            active_connections: self.get_active_connections(),
            total_connections_served: self
                .next_connection_id
                .load(Ordering::Relaxed)
                .saturating_sub(1),
        }
    }

    /// Wait up to `timeout` for running sessions to finish on their own.
    ///
    /// Returns `true` when none are left.
    pub async fn wait_for_sessions(&self, timeout: Duration) -> bool {
        let start_time = Instant::now();
        let mut last_count = self.get_active_connections();

        if last_count > 0 {
            info!("Waiting for {} active sessions to finish (timeout: {:?})", last_count, timeout);
        }

        while last_count > 0 && start_time.elapsed() < timeout {
            tokio::time::sleep(Duration::from_millis(100)).await;

            let current_count = self.get_active_connections();
            if current_count != last_count {
                debug!("Active sessions: {} -> {}", last_count, current_count);
                last_count = current_count;
            }
        }

        let remaining = self.get_active_connections();
        if remaining == 0 {
            info!("All sessions finished in {:?}", start_time.elapsed());
            true
        } else {
            warn!("Shutdown timeout reached after {:?} with {} sessions still active",
                  start_time.elapsed(), remaining);
            false
        }
    }
}

/// Listener counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerStats {
    pub active_connections: usize,
    pub total_connections_served: usize,
}
