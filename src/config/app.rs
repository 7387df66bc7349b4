//! Main application configuration
//!
//! This module defines the primary configuration structures for the duet
//! signaling service, including file and environment loading and validation.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub transport: TransportSettings,
    pub matchmaking: MatchmakingSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Host both servers bind to
    pub bind_host: String,
    /// Port for the WebSocket endpoint
    pub http_port: u16,
    /// Port for health and metrics endpoints
    pub metrics_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Client transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Browser origin allowed by CORS, `*` for any
    pub cors_allowed_origin: String,
}

/// Matchmaking-specific settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingSettings {
    /// Open proposals older than this are withdrawn; `None` keeps them forever
    pub proposal_timeout_seconds: Option<u64>,
    /// How often the expiry sweep runs when a timeout is set
    pub expiry_sweep_interval_seconds: u64,
    /// How often gauges are refreshed from engine stats
    pub metrics_update_interval_seconds: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "duet".to_string(),
            log_level: "info".to_string(),
            bind_host: "0.0.0.0".to_string(),
            http_port: 4000,
            metrics_port: 9090,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            cors_allowed_origin: "http://localhost:3000".to_string(),
        }
    }
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        Self {
            proposal_timeout_seconds: None,
            expiry_sweep_interval_seconds: 5,
            metrics_update_interval_seconds: 30,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("Invalid {} value: {}", name, value))
}

impl AppConfig {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Ok(host) = env::var("BIND_HOST") {
            self.service.bind_host = host;
        }
        if let Ok(port) = env::var("HTTP_PORT") {
            self.service.http_port = parse_var("HTTP_PORT", &port)?;
        }
        if let Ok(port) = env::var("METRICS_PORT") {
            self.service.metrics_port = parse_var("METRICS_PORT", &port)?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            self.service.shutdown_timeout_seconds =
                parse_var("SHUTDOWN_TIMEOUT_SECONDS", &timeout)?;
        }

        // Transport settings
        if let Ok(origin) = env::var("CORS_ALLOWED_ORIGIN") {
            self.transport.cors_allowed_origin = origin;
        }

        // Matchmaking settings
        if let Ok(timeout) = env::var("PROPOSAL_TIMEOUT_SECONDS") {
            self.matchmaking.proposal_timeout_seconds = if timeout.is_empty() {
                None
            } else {
                Some(parse_var("PROPOSAL_TIMEOUT_SECONDS", &timeout)?)
            };
        }
        if let Ok(interval) = env::var("EXPIRY_SWEEP_INTERVAL_SECONDS") {
            self.matchmaking.expiry_sweep_interval_seconds =
                parse_var("EXPIRY_SWEEP_INTERVAL_SECONDS", &interval)?;
        }
        if let Ok(interval) = env::var("METRICS_UPDATE_INTERVAL_SECONDS") {
            self.matchmaking.metrics_update_interval_seconds =
                parse_var("METRICS_UPDATE_INTERVAL_SECONDS", &interval)?;
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get proposal timeout as Duration, if expiry is enabled
    pub fn proposal_timeout(&self) -> Option<Duration> {
        self.matchmaking
            .proposal_timeout_seconds
            .map(Duration::from_secs)
    }

    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.matchmaking.expiry_sweep_interval_seconds)
    }

    pub fn metrics_update_interval(&self) -> Duration {
        Duration::from_secs(self.matchmaking.metrics_update_interval_seconds)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    // Validate ports
    if config.service.http_port == 0 {
        return Err(anyhow!("HTTP port cannot be 0"));
    }
    if config.service.metrics_port == 0 {
        return Err(anyhow!("Metrics port cannot be 0"));
    }
    if config.service.http_port == config.service.metrics_port {
        return Err(anyhow!(
            "HTTP and metrics ports must differ (both {})",
            config.service.http_port
        ));
    }
    if config.service.bind_host.is_empty() {
        return Err(anyhow!("Bind host cannot be empty"));
    }

    // Validate timeouts
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    // Validate transport settings
    if config.transport.cors_allowed_origin.is_empty() {
        return Err(anyhow!("CORS allowed origin cannot be empty"));
    }

    // Validate matchmaking settings
    if config.matchmaking.proposal_timeout_seconds == Some(0) {
        return Err(anyhow!("Proposal timeout must be greater than 0 when set"));
    }
    if config.matchmaking.expiry_sweep_interval_seconds == 0 {
        return Err(anyhow!("Expiry sweep interval must be greater than 0"));
    }
    if config.matchmaking.metrics_update_interval_seconds == 0 {
        return Err(anyhow!("Metrics update interval must be greater than 0"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.service.http_port, 4000);
        assert_eq!(config.transport.cors_allowed_origin, "http://localhost:3000");
        assert!(config.proposal_timeout().is_none());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.service.log_level = "loud".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.service.metrics_port = config.service.http_port;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.matchmaking.proposal_timeout_seconds = Some(0);
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.transport.cors_allowed_origin.clear();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [service]
            http_port = 5000

            [matchmaking]
            proposal_timeout_seconds = 20
            "#,
        )
        .unwrap();

        assert_eq!(config.service.http_port, 5000);
        assert_eq!(config.service.metrics_port, 9090);
        assert_eq!(config.proposal_timeout(), Some(Duration::from_secs(20)));
        assert_eq!(config.expiry_sweep_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_from_file_reports_missing_and_invalid_files() {
        assert!(AppConfig::from_file(Path::new("/nonexistent/duet.toml")).is_err());

        let path = env::temp_dir().join(format!("duet-config-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[service]\nlog_level = \"shout\"").unwrap();

        assert!(AppConfig::from_file(&path).is_err());
        std::fs::remove_file(&path).unwrap();
    }
}
