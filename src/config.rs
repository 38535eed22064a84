//! Client configuration

use crate::transport::{non_zero, CP750_PORT};
use crate::{Cp750Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Connection settings for a CP750 session
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    /// Automatic status refresh period, 0 disables it
    pub refresh_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: CP750_PORT,
            connect_timeout_ms: DEFAULT_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_TIMEOUT_MS,
            refresh_interval_ms: 0,
        }
    }
}

impl ClientConfig {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            ..Self::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| Cp750Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::load_from_str(&contents)
    }

    pub fn load_from_str(contents: &str) -> Result<Self> {
        let config: ClientConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Cp750Error::Config("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(Cp750Error::Config("port must be between 1 and 65535".to_string()));
        }
        Ok(())
    }

    /// Connect timeout, zero falls back to the default
    pub fn connect_timeout(&self) -> Duration {
        non_zero(Duration::from_millis(self.connect_timeout_ms))
    }

    /// Read timeout, zero falls back to the default
    pub fn read_timeout(&self) -> Duration {
        non_zero(Duration::from_millis(self.read_timeout_ms))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.port, 61408);
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.read_timeout(), Duration::from_secs(10));
        assert_eq!(config.refresh_interval(), Duration::ZERO);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = ClientConfig::load_from_str("host: 192.168.1.136\nrefresh_interval_ms: 5000\n").unwrap();
        assert_eq!(config.host, "192.168.1.136");
        assert_eq!(config.port, CP750_PORT);
        assert_eq!(config.refresh_interval(), Duration::from_secs(5));
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            ClientConfig::load_from_str("host: ''\n"),
            Err(Cp750Error::Config(_))
        ));
        assert!(matches!(
            ClientConfig::load_from_str("host: cp750\nport: 0\n"),
            Err(Cp750Error::Config(_))
        ));
        assert!(matches!(
            ClientConfig::load_from_str("port: [1, 2]\n"),
            Err(Cp750Error::Yaml(_))
        ));
    }

    #[test]
    fn zero_timeouts_fall_back_to_default() {
        let config =
            ClientConfig::load_from_str("connect_timeout_ms: 0\nread_timeout_ms: 0\n").unwrap();
        assert_eq!(config.connect_timeout(), crate::DEFAULT_TIMEOUT);
        assert_eq!(config.read_timeout(), crate::DEFAULT_TIMEOUT);
        assert_eq!(config.refresh_interval(), Duration::ZERO);
    }

    #[test]
    fn builder_helpers() {
        let config = ClientConfig::new("cp750.local")
            .with_port(1234)
            .with_read_timeout(Duration::from_millis(1500))
            .with_refresh_interval(Duration::from_secs(2));
        assert_eq!(config.host, "cp750.local");
        assert_eq!(config.port, 1234);
        assert_eq!(config.read_timeout_ms, 1500);
        assert_eq!(config.refresh_interval_ms, 2000);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        assert!(matches!(
            ClientConfig::load_from_path("/nonexistent/cp750.yaml"),
            Err(Cp750Error::Config(_))
        ));
    }
}
