//! Configuration Manager

use super::Config;
use crate::Result;
use anyhow::{Context, bail};
use std::path::Path;
use std::time::Duration;

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            config.validate()
                .with_context(|| "Configuration validation failed")?;

            tracing::info!("Configuration loaded and validated successfully");
            Ok(config)
        } else {
            tracing::warn!("Configuration file not found at {}, using defaults", path.display());
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        let mut config = Config::default();

        if let Ok(server) = std::env::var("SNIRELAY_DNS_SERVER") {
            config.resolver.server = server;
        }

        if let Ok(timeout) = std::env::var("SNIRELAY_CLIENT_HELLO_TIMEOUT") {
            config.timeouts.client_hello = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid SNIRELAY_CLIENT_HELLO_TIMEOUT: {}", timeout))?;
        }

        if let Ok(timeout) = std::env::var("SNIRELAY_UPSTREAM_CONNECT_TIMEOUT") {
            config.timeouts.upstream_connect = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid SNIRELAY_UPSTREAM_CONNECT_TIMEOUT: {}", timeout))?;
        }

        if let Ok(timeout) = std::env::var("SNIRELAY_IDLE_TIMEOUT") {
            config.relay.idle_timeout = Some(humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid SNIRELAY_IDLE_TIMEOUT: {}", timeout))?);
        }

        if let Ok(log_level) = std::env::var("SNIRELAY_LOG_LEVEL") {
            config.logging.level = log_level;
        }

        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_resolver_config()
            .with_context(|| "Resolver configuration validation failed")?;

        self.validate_timeouts()
            .with_context(|| "Timeout configuration validation failed")?;

        self.validate_relay_config()
            .with_context(|| "Relay configuration validation failed")?;

        self.validate_logging_config()
            .with_context(|| "Logging configuration validation failed")?;

        Ok(())
    }

    /// Validate the DNS server address
    fn validate_resolver_config(&self) -> Result<()> {
        let server = self.resolver.server.trim();
        let Some((host, port)) = server.rsplit_once(':') else {
            bail!("resolver.server must be host:port, got '{}'", server);
        };

        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            bail!("resolver.server has an empty host");
        }

        match port.parse::<u16>() {
            Ok(0) | Err(_) => bail!("resolver.server has an invalid port '{}'", port),
            Ok(_) => {}
        }

        if self.resolver.timeout.is_zero() {
            bail!("resolver.timeout must be greater than 0");
        }

        Ok(())
    }

    /// Validate session deadlines
    fn validate_timeouts(&self) -> Result<()> {
        if self.timeouts.client_hello.is_zero() {
            bail!("timeouts.client_hello must be greater than 0");
        }

        if self.timeouts.upstream_connect.is_zero() {
            bail!("timeouts.upstream_connect must be greater than 0");
        }

        if self.server.shutdown_timeout > Duration::from_secs(3600) {
            bail!("server.shutdown_timeout cannot exceed 1 hour");
        }

        Ok(())
    }

    /// Validate relay settings
    fn validate_relay_config(&self) -> Result<()> {
        if self.relay.buffer_size < 1024 {
            bail!("buffer_size must be at least 1024 bytes");
        }

        if self.relay.buffer_size > 1048576 {
            bail!("buffer_size cannot exceed 1MB");
        }

        if let Some(idle) = self.relay.idle_timeout {
            if idle.is_zero() {
                bail!("relay.idle_timeout must be greater than 0 when set");
            }
        }

        Ok(())
    }

    /// Validate logging configuration
    fn validate_logging_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            bail!("logging.level must be one of: {}", valid_log_levels.join(", "));
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(
        &mut self,
        dns_server: Option<&str>,
        client_hello_timeout: Option<Duration>,
        upstream_connect_timeout: Option<Duration>,
        log_level: Option<&str>,
    ) {
        if let Some(server) = dns_server {
            self.resolver.server = server.to_string();
            tracing::info!("CLI override: DNS server set to {}", server);
        }

        if let Some(timeout) = client_hello_timeout {
            self.timeouts.client_hello = timeout;
            tracing::info!("CLI override: TLS client hello timeout set to {:?}", timeout);
        }

        if let Some(timeout) = upstream_connect_timeout {
            self.timeouts.upstream_connect = timeout;
            tracing::info!("CLI override: upstream connect timeout set to {:?}", timeout);
        }

        if let Some(level) = log_level {
            self.logging.level = level.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());

        let relay = config.relay_config();
        assert_eq!(relay.dns_server, "114.114.114.114:53");
        assert_eq!(relay.client_hello_timeout, Duration::from_secs(5));
        assert_eq!(relay.upstream_connect_timeout, Duration::from_secs(5));
        assert_eq!(relay.backend_port, 443);
        assert_eq!(relay.idle_timeout, None);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[resolver]
server = "9.9.9.9:53"

[timeouts]
client_hello = "750ms"

[relay]
idle_timeout = "10m"
"#
        )
        .unwrap();

        let config = ConfigManager::load_from_file(file.path()).unwrap();
        assert_eq!(config.resolver.server, "9.9.9.9:53");
        assert_eq!(config.timeouts.client_hello, Duration::from_millis(750));
        assert_eq!(config.timeouts.upstream_connect, Duration::from_secs(5));
        assert_eq!(config.relay.idle_timeout, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigManager::load_from_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.resolver.server, "114.114.114.114:53");
    }

    #[test]
    fn test_rejects_server_without_port() {
        let mut config = Config::default();
        config.resolver.server = "8.8.8.8".to_string();
        assert!(config.validate().is_err());

        config.resolver.server = "[2001:db8::1]:53".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_timeouts() {
        let mut config = Config::default();
        config.timeouts.client_hello = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.relay.idle_timeout = Some(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = Config::default();
        config.merge_with_cli_args(
            Some("1.1.1.1:53"),
            Some(Duration::from_secs(2)),
            None,
            Some("debug"),
        );

        assert_eq!(config.resolver.server, "1.1.1.1:53");
        assert_eq!(config.timeouts.client_hello, Duration::from_secs(2));
        assert_eq!(config.timeouts.upstream_connect, Duration::from_secs(5));
        assert_eq!(config.logging.level, "debug");
    }
}
