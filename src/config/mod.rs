use crate::utils::error::{Result, WarmsocksError};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Idle connections kept warm per destination
    #[serde(default = "default_pool_reserved")]
    pub reserved: usize,
    /// Evict a destination pool after this long without activity
    #[serde(default = "default_pool_idle_ttl_ms")]
    pub idle_ttl_ms: u64,
    /// Eviction check period
    #[serde(default = "default_pool_evict_interval_ms")]
    pub evict_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String, // "json" or "pretty"
}

// Default values
fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_bind_port() -> u16 {
    51210
}

fn default_pool_reserved() -> usize {
    5
}

fn default_pool_idle_ttl_ms() -> u64 {
    60_000
}

fn default_pool_evict_interval_ms() -> u64 {
    60_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            bind_port: default_bind_port(),
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            reserved: default_pool_reserved(),
            idle_ttl_ms: default_pool_idle_ttl_ms(),
            evict_interval_ms: default_pool_evict_interval_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            pool: PoolSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| WarmsocksError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| WarmsocksError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.bind_address.trim().is_empty() {
            return Err(WarmsocksError::Config(
                "bind_address cannot be empty".to_string(),
            ));
        }

        if self.pool.idle_ttl_ms == 0 {
            return Err(WarmsocksError::Config(
                "pool.idle_ttl_ms must be greater than zero".to_string(),
            ));
        }

        if self.pool.evict_interval_ms == 0 {
            return Err(WarmsocksError::Config(
                "pool.evict_interval_ms must be greater than zero".to_string(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(WarmsocksError::Config(format!(
                "Invalid log format: {}. Must be 'pretty' or 'json'",
                self.logging.format
            )));
        }

        Ok(())
    }

    /// Create example configuration file
    pub fn create_example<P: AsRef<Path>>(path: P) -> Result<()> {
        let example = r#"[server]
bind_address = "127.0.0.1"
bind_port = 51210

[pool]
reserved = 5              # idle connections kept warm per destination
idle_ttl_ms = 60000       # evict a destination pool after this long without activity
evict_interval_ms = 60000 # eviction check period

[logging]
level = "info"    # Options: "trace", "debug", "info", "warn", "error"
format = "pretty" # Options: "pretty", "json"
"#;

        std::fs::write(path.as_ref(), example).map_err(|e| {
            WarmsocksError::Config(format!("Failed to write example config: {}", e))
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.server.bind_port, 51210);
        assert_eq!(config.pool.reserved, 5);
        assert_eq!(config.pool.idle_ttl_ms, 60_000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pool.idle_ttl_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.bind_address = "  ".to_string();
        assert!(config.validate().is_err());

        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warmsocks.toml");

        Config::create_example(&path).unwrap();
        let config = Config::from_file(&path).unwrap();

        assert_eq!(config.server.bind_port, 51210);
        assert_eq!(config.pool.reserved, 5);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            bind_port = 1080
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind_port, 1080);
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.pool.reserved, 5);
    }
}
