//! Server configuration.

use anyhow::Result;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base URL of the HTTP persistence backend.
    #[serde(default = "default_store_url")]
    pub store_url: String,
    /// Request timeout for persistence calls, in seconds.
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,
    /// Inbound WebSocket frames larger than this are a protocol violation.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    6789
}

fn default_store_url() -> String {
    "http://localhost:9090".to_string()
}

fn default_store_timeout_secs() -> u64 {
    10
}

fn default_max_frame_bytes() -> usize {
    256 * 1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            store_url: default_store_url(),
            store_timeout_secs: default_store_timeout_secs(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load config from the default location (config/default.toml) or fall
    /// back to defaults.
    pub fn load() -> Result<Self> {
        let config_path = Path::new("config/default.toml");
        if config_path.exists() {
            return Self::load_from(config_path);
        }
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.port, 6789);
        assert!(config.max_frame_bytes > 0);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: Config = toml::from_str("port = 7000\n").unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.store_timeout_secs, 10);
    }
}
