//! sni-relay - transparent TLS relay driven by the ClientHello server name

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

use sni_relay::{
    config::{ConfigManager, LISTEN_ADDR},
    ConnectionManager, DnsResolver, SessionHandler, ShutdownCoordinator, TcpConnector,
};

/// CLI arguments for sni-relay
#[derive(Parser, Debug)]
#[command(name = "sni-relay")]
#[command(about = "Relay TLS connections to the host named in their ClientHello")]
#[command(version)]
#[command(long_about = "
sni-relay accepts TLS connections on 0.0.0.0:443, reads the server name from
the ClientHello, resolves it with a trusted DNS server, and relays the
connection untouched to the resolved address on port 443.

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  SNIRELAY_DNS_SERVER               - DNS server (e.g., 8.8.8.8:53)
  SNIRELAY_CLIENT_HELLO_TIMEOUT     - ClientHello deadline (e.g., 5s)
  SNIRELAY_UPSTREAM_CONNECT_TIMEOUT - Backend connect deadline (e.g., 5s)
  SNIRELAY_IDLE_TIMEOUT             - Close relays idle this long (e.g., 10m)
  SNIRELAY_LOG_LEVEL                - Log level (trace, debug, info, warn, error)
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "sni-relay.toml",
        help = "Path to configuration file"
    )]
    pub config: PathBuf,

    /// DNS server used to resolve server names
    #[arg(long, help = "DNS server to query (host:port)")]
    pub dns_server: Option<String>,

    /// Deadline for receiving the full ClientHello
    #[arg(long, value_parser = humantime::parse_duration, help = "Timeout for the TLS ClientHello (e.g., 5s)")]
    pub tls_client_hello_timeout: Option<Duration>,

    /// Deadline for connecting to the backend
    #[arg(long, value_parser = humantime::parse_duration, help = "Timeout for the upstream connection (e.g., 5s)")]
    pub upstream_connect_timeout: Option<Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, help = "Log level")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Initialize tracing before config loading so its messages are kept
    let filter_handle = init_tracing(&args)?;

    // Load configuration with priority: CLI args > config file > environment > defaults
    let mut config = if args.config.exists() {
        ConfigManager::load_from_file(&args.config)?
    } else {
        ConfigManager::load_from_env()?
    };

    config.merge_with_cli_args(
        args.dns_server.as_deref(),
        args.tls_client_hello_timeout,
        args.upstream_connect_timeout,
        args.log_level.as_deref(),
    );

    config
        .validate()
        .context("Final configuration validation failed")?;

    apply_log_level(&args, &filter_handle, &config.logging.level)?;

    let relay_config = Arc::new(config.relay_config());

    if args.validate_config {
        info!("Configuration is valid");
        info!("  DNS server: {}", relay_config.dns_server);
        info!("  TLS client hello timeout: {:?}", relay_config.client_hello_timeout);
        info!("  Upstream connect timeout: {:?}", relay_config.upstream_connect_timeout);
        info!("  Relay idle timeout: {:?}", relay_config.idle_timeout);
        return Ok(());
    }

    info!("Starting sni-relay v{}", env!("CARGO_PKG_VERSION"));
    info!("Using DNS server {}", relay_config.dns_server);
    info!("TLS client hello timeout: {:?}", relay_config.client_hello_timeout);
    info!("Upstream connect timeout: {:?}", relay_config.upstream_connect_timeout);

    let resolver = Arc::new(DnsResolver::with_timeout(
        relay_config.dns_server.clone(),
        relay_config.resolver_timeout,
    ));
    let connector = Arc::new(TcpConnector::new(relay_config.upstream_connect_timeout));
    let handler = Arc::new(SessionHandler::new(Arc::clone(&relay_config), resolver, connector));

    let connection_manager = Arc::new(ConnectionManager::bind(LISTEN_ADDR, handler).await?);
    let shutdown_coordinator = ShutdownCoordinator::new(config.server.shutdown_timeout);

    let server_handle = {
        let manager = Arc::clone(&connection_manager);
        let shutdown_rx = shutdown_coordinator.subscribe();
        tokio::spawn(async move { manager.run(shutdown_rx).await })
    };

    info!("Press Ctrl+C or send SIGTERM/SIGINT to shutdown gracefully");

    if let Err(e) = shutdown_coordinator.listen_for_signals().await {
        error!("Error setting up signal handlers: {}", e);
        shutdown_coordinator.trigger();
    }

    if let Err(e) = server_handle.await {
        if !e.is_cancelled() {
            error!("Server task failed: {}", e);
        }
    }

    shutdown_coordinator.drain(&connection_manager).await;
    info!("Server shutdown complete");

    Ok(())
}

/// Initialize tracing/logging
///
/// Starts at `--log-level` (or `-v`); the returned handle lets the level from
/// the config file take over once it is loaded.
fn init_tracing(args: &CliArgs) -> Result<reload::Handle<EnvFilter, Registry>> {
    let log_level = if args.verbose {
        "debug"
    } else {
        args.log_level.as_deref().unwrap_or("info")
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));
    let (filter, handle) = reload::Layer::new(env_filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .init();

    Ok(handle)
}

/// Switch to the configured level unless RUST_LOG or `-v` already decided it
fn apply_log_level(
    args: &CliArgs,
    handle: &reload::Handle<EnvFilter, Registry>,
    level: &str,
) -> Result<()> {
    if args.verbose || std::env::var_os("RUST_LOG").is_some() {
        return Ok(());
    }
    handle
        .reload(EnvFilter::new(level))
        .context("Failed to apply configured log level")?;
    Ok(())
}
