//! Configuration system for the rendezvous relay server.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/rendezvous-relay/config.toml`)
//! 4. Compiled defaults

use std::fmt;
use std::path::PathBuf;

use crate::registry::{DEFAULT_MAX_ROOM_MEMBERS, Registry};
use crate::relay::{DEFAULT_MAX_MESSAGE_SIZE, RelayState};

/// Errors that can occur when loading relay configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A setting is out of range.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Setting name.
        key: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure for the relay.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RelayConfigFile {
    server: ServerFileConfig,
}

/// `[server]` section of the relay config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    max_message_size: Option<usize>,
    max_room_members: Option<usize>,
    app_secret: Option<String>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the relay server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Rendezvous signaling relay server")]
pub struct RelayCliArgs {
    /// Address to bind the relay server to.
    #[arg(short, long, env = "RENDEZVOUS_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/rendezvous-relay/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum inbound message size in bytes.
    #[arg(long)]
    pub max_message_size: Option<usize>,

    /// Maximum connections per room.
    #[arg(long)]
    pub max_room_members: Option<usize>,

    /// Process secret mixed into every room token (random if unset).
    #[arg(long, env = "RENDEZVOUS_APP_SECRET", hide_env_values = true)]
    pub app_secret: Option<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "RENDEZVOUS_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved relay server configuration.
#[derive(Clone)]
pub struct RelayConfig {
    /// Address to bind the server to (e.g., `0.0.0.0:9000`).
    pub bind_addr: String,
    /// Maximum allowed inbound message size in bytes.
    pub max_message_size: usize,
    /// Maximum number of connections per room.
    pub max_room_members: usize,
    /// Process secret for token derivation; `None` means random per process.
    pub app_secret: Option<String>,
    /// Log level filter string.
    pub log_level: String,
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("bind_addr", &self.bind_addr)
            .field("max_message_size", &self.max_message_size)
            .field("max_room_members", &self.max_room_members)
            .field("app_secret", &self.app_secret.as_ref().map(|_| "<redacted>"))
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9000".to_string(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_room_members: DEFAULT_MAX_ROOM_MEMBERS,
            app_secret: None,
            log_level: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and missing file
    /// is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or a resolved value is out of range.
    pub fn load(cli: &RelayCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file).validate()
    }

    /// Resolve a `RelayConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &RelayCliArgs, file: &RelayConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            max_message_size: cli
                .max_message_size
                .or(file.server.max_message_size)
                .unwrap_or(defaults.max_message_size),
            max_room_members: cli
                .max_room_members
                .or(file.server.max_room_members)
                .unwrap_or(defaults.max_room_members),
            app_secret: cli
                .app_secret
                .clone()
                .or_else(|| file.server.app_secret.clone()),
            log_level: cli.log_level.clone(),
        }
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.max_room_members == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_room_members",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_message_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.app_secret.as_deref() == Some("") {
            return Err(ConfigError::InvalidValue {
                key: "app_secret",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(self)
    }

    /// Builds the shared relay state described by this configuration.
    #[must_use]
    pub fn build_state(&self) -> RelayState {
        let registry = match &self.app_secret {
            Some(secret) => {
                Registry::with_max_room_members(secret.as_bytes(), self.max_room_members)
            }
            None => Registry::with_random_secret(self.max_room_members),
        };
        RelayState::with_config(self.max_message_size, registry)
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file for the relay.
fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<RelayConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(RelayConfigFile::default());
        };
        config_dir.join("rendezvous-relay").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RelayConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
