//! Configuration handling for the VPN helper

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Hostname that must always be reachable through the tunnel in include mode.
pub const DEFAULT_DIAGNOSTIC_HOSTNAME: &str = "checkip.windscribe.com";

const LOCAL_CONFIG_FILE: &str = "vpn-helper.toml";

#[cfg(unix)]
const DEFAULT_SOCKET_PATH: &str = "/var/run/vpn-helper.sock";
#[cfg(windows)]
const DEFAULT_SOCKET_PATH: &str = r"\\.\pipe\vpn-helper";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelperConfig {
    pub server: ServerConfig,
    pub dns: DnsConfig,
    pub split_tunnel: SplitTunnelConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub socket_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    /// Per-attempt lookup timeout
    pub timeout_secs: u64,
    pub attempts: usize,
}

impl DnsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            attempts: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitTunnelConfig {
    pub diagnostic_hostname: String,
}

impl Default for SplitTunnelConfig {
    fn default() -> Self {
        Self {
            diagnostic_hostname: DEFAULT_DIAGNOSTIC_HOSTNAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl HelperConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: HelperConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load config from the first default location that exists
    ///
    /// Looks in the current directory, then the user config directory,
    /// and falls back to built-in defaults.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load(&local_config);
        }

        if let Some(dir) = dirs::config_dir() {
            let user_config = dir.join("vpn-helper").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }
}
