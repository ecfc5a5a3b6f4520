use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::info;

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the HTTP server binds to
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Path of the SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Session retention policy
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Sessions older than this are purged
    #[serde(default = "default_threshold_days")]
    pub threshold_days: i64,

    /// How often the sweeper runs
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3030))
}

fn default_database_path() -> PathBuf {
    PathBuf::from("simulator.db")
}

fn default_threshold_days() -> i64 {
    10
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            database_path: default_database_path(),
            retention: RetentionConfig::default(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            threshold_days: default_threshold_days(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(bind = %config.bind, database = %config.database_path.display(), "configuration loaded");
        Ok(config)
    }
}

impl RetentionConfig {
    pub fn threshold(&self) -> chrono::Duration {
        chrono::Duration::days(self.threshold_days)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.retention.threshold_days, 10);
        assert_eq!(config.retention.threshold(), chrono::Duration::days(10));
        assert_eq!(config.bind.port(), 3030);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str("bind = \"0.0.0.0:8080\"").unwrap();
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.retention.threshold_days, 10);
        assert_eq!(config.database_path, PathBuf::from("simulator.db"));
    }

    #[test]
    fn test_retention_section_overrides() {
        let config: Config =
            toml::from_str("[retention]\nthreshold_days = 3\nsweep_interval_secs = 60").unwrap();
        assert_eq!(config.retention.threshold_days, 3);
        assert_eq!(config.retention.sweep_interval(), std::time::Duration::from_secs(60));
    }
}
