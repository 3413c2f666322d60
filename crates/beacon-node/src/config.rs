//! Configuration loading and typed config structures for a replica.
//!
//! The configuration lives in `beacon.yaml` in the working directory, or at
//! the path named by `BEACON_CONFIG`. Every field has a default, so a
//! missing file or a partial file is fine. Environment variables override
//! file values after parsing:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `BEACON_MODE` | `node.mode` |
//! | `BEACON_LABEL` | `node.label` |
//! | `BEACON_REPLICA` | `node.replica` |
//! | `BEACON_HOST` | `server.host` |
//! | `BEACON_PORT` | `server.port` |
//! | `BEACON_LOG_FORMAT` | `logging.format` |

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use beacon_core::IdBand;
use serde::Deserialize;

/// Default config file name.
pub const DEFAULT_CONFIG_PATH: &str = "beacon.yaml";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value (from the file or the environment) is out of range.
    #[error("invalid value {value:?} for {key}")]
    Invalid {
        /// The config key or environment variable.
        key: &'static str,
        /// The rejected value.
        value: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Which demo application the node serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Replicated todo list.
    #[default]
    Todo,
    /// Collaborative sudoku board.
    Sudoku,
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "todo" => Ok(Self::Todo),
            "sudoku" => Ok(Self::Sudoku),
            _ => Err(ConfigError::Invalid {
                key: "node.mode",
                value: s.to_owned(),
            }),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Todo => "todo",
            Self::Sudoku => "sudoku",
        })
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::Invalid {
                key: "logging.format",
                value: s.to_owned(),
            }),
        }
    }
}

/// Top-level replica configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NodeConfig {
    /// What this replica serves and how it identifies itself.
    #[serde(default)]
    pub node: NodeSection,

    /// Listener settings.
    #[serde(default)]
    pub server: ServerSection,

    /// Peer pull settings.
    #[serde(default)]
    pub sync: SyncSection,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl NodeConfig {
    /// Load from `path`, or defaults if the file does not exist, then apply
    /// environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file exists but cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply `BEACON_*` overrides using `lookup` to read variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a variable does not parse.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("BEACON_MODE") {
            self.node.mode = val.parse()?;
        }
        if let Some(val) = lookup("BEACON_LABEL") {
            self.node.label = val;
        }
        if let Some(val) = lookup("BEACON_REPLICA") {
            self.node.replica = val.trim().parse().map_err(|e| ConfigError::Invalid {
                key: "BEACON_REPLICA",
                value: format!("{val} ({e})"),
            })?;
        }
        if let Some(val) = lookup("BEACON_HOST") {
            self.server.host = val;
        }
        if let Some(val) = lookup("BEACON_PORT") {
            self.server.port = val.trim().parse().map_err(|e| ConfigError::Invalid {
                key: "BEACON_PORT",
                value: format!("{val} ({e})"),
            })?;
        }
        if let Some(val) = lookup("BEACON_LOG_FORMAT") {
            self.logging.format = val.parse()?;
        }
        Ok(())
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the replica index has no ID band.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id_band().is_none() {
            return Err(ConfigError::Invalid {
                key: "node.replica",
                value: self.node.replica.to_string(),
            });
        }
        Ok(())
    }

    /// The ID band todo replicas issue record IDs from.
    pub const fn id_band(&self) -> Option<IdBand> {
        IdBand::for_replica(self.node.replica)
    }
}

/// Resolve the config path from `BEACON_CONFIG`, falling back to
/// [`DEFAULT_CONFIG_PATH`].
pub fn config_path() -> PathBuf {
    std::env::var_os("BEACON_CONFIG").map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Identity and mode of the replica.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeSection {
    /// Demo application to serve.
    #[serde(default)]
    pub mode: Mode,

    /// Label reported by status endpoints.
    #[serde(default = "default_label")]
    pub label: String,

    /// Replica index; selects the todo ID band `[100 * replica, 100 * replica + 99]`.
    #[serde(default = "default_replica")]
    pub replica: u64,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            label: default_label(),
            replica: default_replica(),
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSection {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Peer pull configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SyncSection {
    /// Timeout for a single `/export` fetch from a peer.
    #[serde(default = "default_peer_timeout_ms")]
    pub peer_timeout_ms: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            peer_timeout_ms: default_peer_timeout_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingSection {
    /// Filter used when `RUST_LOG` is unset (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_label() -> String {
    "blue".to_owned()
}

const fn default_replica() -> u64 {
    1
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    8080
}

const fn default_peer_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_owned()
}
