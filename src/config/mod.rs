//! Configuration management

use crate::proxy::{LocalSettings, RemoteSettings};
use crate::transport::TransportConfig;
use crate::tunnel::RelayConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local (client-facing) side
    pub local: LocalConfig,
    /// Remote (origin-facing) side
    pub remote: RemoteConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, crate::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from file, falling back to defaults when the
    /// file does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, crate::Error> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), crate::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| crate::Error::Config(format!("Failed to write config: {}", e)))
    }
}

/// Local side configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Address proxy clients connect to
    pub listen: String,
    /// Remote side address for the persistent link
    pub remote: String,
    /// Per-read bound while reading a client's request head (milliseconds)
    pub header_read_timeout_ms: u64,
    /// Tunnel inactivity timeout (seconds)
    pub relay_idle_timeout_secs: u64,
    /// Bound on dialing the remote side (seconds)
    pub connect_timeout_secs: u64,
    /// Relay read size in bytes
    pub relay_chunk_size: usize,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            listen: format!("0.0.0.0:{}", crate::DEFAULT_LOCAL_PORT),
            remote: format!("offshore_proxy_server:{}", crate::DEFAULT_REMOTE_PORT),
            header_read_timeout_ms: 2000,
            relay_idle_timeout_secs: 30,
            connect_timeout_secs: 10,
            relay_chunk_size: 4096,
        }
    }
}

impl LocalConfig {
    /// Processor tuning derived from this section
    pub fn settings(&self) -> LocalSettings {
        LocalSettings {
            header_read_timeout: Duration::from_millis(self.header_read_timeout_ms),
            relay: RelayConfig {
                idle_timeout: Duration::from_secs(self.relay_idle_timeout_secs),
                chunk_size: self.relay_chunk_size,
            },
        }
    }

    /// Dialing options for the persistent link
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: self.connect_timeout_secs,
        }
    }
}

/// Remote side configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Address the local side dials
    pub listen: String,
    /// Origin port for plain HTTP targets without one
    pub http_port: u16,
    /// Tunnel inactivity timeout (seconds)
    pub relay_idle_timeout_secs: u64,
    /// Bound on reaching an upstream (seconds)
    pub connect_timeout_secs: u64,
    /// Bound on each read of an origin response (seconds)
    pub upstream_read_timeout_secs: u64,
    /// Relay read size in bytes
    pub relay_chunk_size: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            listen: format!("0.0.0.0:{}", crate::DEFAULT_REMOTE_PORT),
            http_port: crate::protocol::DEFAULT_HTTP_PORT,
            relay_idle_timeout_secs: 30,
            connect_timeout_secs: 10,
            upstream_read_timeout_secs: 30,
            relay_chunk_size: 4096,
        }
    }
}

impl RemoteConfig {
    /// Dispatcher tuning derived from this section
    pub fn settings(&self) -> RemoteSettings {
        RemoteSettings {
            http_port: self.http_port,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            upstream_read_timeout: Duration::from_secs(self.upstream_read_timeout_secs),
            relay: RelayConfig {
                idle_timeout: Duration::from_secs(self.relay_idle_timeout_secs),
                chunk_size: self.relay_chunk_size,
            },
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (pretty, compact, full)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "full".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Install the global tracing subscriber. `level` overrides the
    /// configured filter.
    pub fn init(&self, level: Option<&str>) -> Result<(), crate::Error> {
        let filter = level.unwrap_or(&self.level);
        let builder = tracing_subscriber::fmt().with_env_filter(filter);

        let result = match self.format.to_lowercase().as_str() {
            "pretty" => builder.pretty().try_init(),
            "compact" => builder.compact().try_init(),
            _ => builder.try_init(),
        };
        result.map_err(|e| crate::Error::Config(format!("Failed to init logging: {}", e)))
    }
}

/// Generate example configuration
pub fn generate_example_config() -> Config {
    Config::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_wire_constants() {
        let config = Config::default();
        assert_eq!(config.local.listen, "0.0.0.0:8080");
        assert_eq!(config.remote.listen, "0.0.0.0:9999");

        let local = config.local.settings();
        assert_eq!(local.header_read_timeout, Duration::from_secs(2));
        assert_eq!(local.relay.idle_timeout, Duration::from_secs(30));
        assert_eq!(local.relay.chunk_size, 4096);

        assert_eq!(config.remote.settings().http_port, 80);
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: Config = toml::from_str(
            r#"
            [local]
            remote = "10.0.0.2:9999"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.local.remote, "10.0.0.2:9999");
        assert_eq!(config.local.listen, "0.0.0.0:8080");
        assert_eq!(config.remote.upstream_read_timeout_secs, 30);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "full");
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("ferrylink-config-{}.toml", std::process::id()));

        let mut config = generate_example_config();
        config.remote.http_port = 8081;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.remote.http_port, 8081);
        std::fs::remove_file(&path).ok();

        assert!(Config::load(&path).is_err());
        assert_eq!(Config::load_or_default(&path).unwrap().remote.http_port, 80);
    }
}
