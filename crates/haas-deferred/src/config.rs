//! Configuration file support for haas-networkd
//!
//! Loads and validates daemon configuration from TOML files.
//! Default location: /etc/haas/networkd.toml

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/haas/networkd.toml";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// The config path.
        path: PathBuf,
        /// IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between background drains
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Drain as soon as the daemon starts
    #[serde(default = "default_drain_on_start")]
    pub drain_on_start: bool,
}

/// Switch driver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriversConfig {
    /// Timeout for every command run by shell-backed drivers
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Log linux-bridge commands instead of running them
    #[serde(default)]
    pub bridge_dry_run: bool,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

/// Topology storage configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// JSON topology snapshot loaded at startup when there is no state file yet
    #[serde(default)]
    pub seed_file: Option<PathBuf>,

    /// JSON state file rewritten after every commit; resumed from on restart
    #[serde(default)]
    pub state_file: Option<PathBuf>,
}

/// Complete haas-networkd configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HaasConfig {
    /// Engine configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Driver configuration
    #[serde(default)]
    pub drivers: DriversConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Topology configuration
    #[serde(default)]
    pub topology: TopologyConfig,
}

fn default_poll_interval() -> u64 {
    5
}

fn default_drain_on_start() -> bool {
    true
}

fn default_command_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            drain_on_start: default_drain_on_start(),
        }
    }
}

impl Default for DriversConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout(),
            bridge_dry_run: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl std::str::FromStr for HaasConfig {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config: HaasConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

impl HaasConfig {
    /// Loads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    /// Loads a configuration file, falling back to defaults if it does not
    /// exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Get poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.engine.poll_interval_secs)
    }

    /// Get driver command timeout as Duration
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.drivers.command_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_secs must be > 0".to_string(),
            ));
        }

        if self.drivers.command_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "command_timeout_secs must be > 0".to_string(),
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "unknown log level '{}'",
                self.logging.level
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = HaasConfig::default();
        assert_eq!(config.engine.poll_interval_secs, 5);
        assert!(config.engine.drain_on_start);
        assert_eq!(config.drivers.command_timeout_secs, 10);
        assert!(!config.drivers.bridge_dry_run);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.topology.seed_file, None);
        assert_eq!(config.topology.state_file, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: HaasConfig = "[engine]\npoll_interval_secs = 30\n".parse().unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert!(config.engine.drain_on_start);
        assert_eq!(config.command_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_full_config() {
        let toml = r#"
[engine]
poll_interval_secs = 2
drain_on_start = false

[drivers]
command_timeout_secs = 3
bridge_dry_run = true

[logging]
level = "debug"
json = true

[topology]
seed_file = "/var/lib/haas/topology.json"
state_file = "/var/lib/haas/state.json"
"#;
        let config: HaasConfig = toml.parse().unwrap();
        assert!(!config.engine.drain_on_start);
        assert!(config.drivers.bridge_dry_run);
        assert!(config.logging.json);
        assert_eq!(
            config.topology.seed_file,
            Some(PathBuf::from("/var/lib/haas/topology.json"))
        );
        assert_eq!(
            config.topology.state_file,
            Some(PathBuf::from("/var/lib/haas/state.json"))
        );
    }

    #[test]
    fn test_invalid_values() {
        let err = "[engine]\npoll_interval_secs = 0\n"
            .parse::<HaasConfig>()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = "[logging]\nlevel = \"loud\"\n"
            .parse::<HaasConfig>()
            .unwrap_err();
        assert!(err.to_string().contains("loud"));

        let err = "[engine\n".parse::<HaasConfig>().unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[drivers]\ncommand_timeout_secs = 7").unwrap();

        let config = HaasConfig::load(file.path()).unwrap();
        assert_eq!(config.drivers.command_timeout_secs, 7);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("networkd.toml");

        assert!(matches!(
            HaasConfig::load(&path),
            Err(ConfigError::Io { .. })
        ));
        assert_eq!(HaasConfig::load_or_default(&path).unwrap(), HaasConfig::default());
    }
}
