//! Configuration for the `TaskDeck` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskdeck/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::cli::Command;
use crate::realtime::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY, RealtimeConfig,
};
use crate::sync::SyncSettings;
use crate::sync::workspace::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_TITLE_LEN, DEFAULT_NOT_FOUND_REDIRECT, DEFAULT_PAGE_SIZE,
};

/// Default task server root.
pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Errors that can occur when loading configuration.
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

    /// A configured URL is malformed.
    #[error("invalid {field} {value:?}: {source}")]
    InvalidUrl {
        /// Setting name.
        field: &'static str,
        /// Configured value.
        value: String,
        /// Parser error.
        source: url::ParseError,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    session: SessionFileConfig,
    realtime: RealtimeFileConfig,
    ui: UiFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    api_url: Option<String>,
    ws_url: Option<String>,
    request_timeout_secs: Option<u64>,
}

/// `[session]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    token_path: Option<PathBuf>,
}

/// `[realtime]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RealtimeFileConfig {
    reconnect_attempts: Option<u32>,
    reconnect_delay_ms: Option<u64>,
    connect_timeout_secs: Option<u64>,
    channel_capacity: Option<usize>,
}

/// `[ui]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct UiFileConfig {
    max_task_title_len: Option<usize>,
    not_found_redirect_ms: Option<u64>,
    page_size: Option<u32>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Server --
    /// Root of the REST API.
    pub api_url: String,
    /// Event broker origin; the API origin when unset.
    pub ws_url: Option<String>,
    /// Timeout for each HTTP request.
    pub request_timeout: Duration,

    // -- Session --
    /// File holding the persisted token.
    pub token_path: PathBuf,

    // -- Realtime --
    /// Reconnection attempts after a dropped event channel.
    pub reconnect_attempts: u32,
    /// Delay between reconnection attempts.
    pub reconnect_delay: Duration,
    /// Timeout for the event channel handshake.
    pub connect_timeout: Duration,
    /// Capacity of notice and change channels.
    pub channel_capacity: usize,

    // -- UI --
    /// Maximum task title length in characters.
    pub max_task_title_len: usize,
    /// Delay before a missing task's view returns to the list.
    pub not_found_redirect: Duration,
    /// Default page size for task lists.
    pub page_size: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: None,
            request_timeout: Duration::from_secs(15),
            token_path: default_token_path(),
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_task_title_len: DEFAULT_MAX_TITLE_LEN,
            not_found_redirect: DEFAULT_NOT_FOUND_REDIRECT,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// Otherwise the default path (`~/.config/taskdeck/config.toml`) is
    /// tried and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            api_url: cli
                .api_url
                .clone()
                .or_else(|| file.server.api_url.clone())
                .unwrap_or(defaults.api_url),
            ws_url: cli.ws_url.clone().or_else(|| file.server.ws_url.clone()),
            request_timeout: file
                .server
                .request_timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            token_path: cli
                .token_path
                .clone()
                .or_else(|| file.session.token_path.clone())
                .unwrap_or(defaults.token_path),
            reconnect_attempts: file
                .realtime
                .reconnect_attempts
                .unwrap_or(defaults.reconnect_attempts),
            reconnect_delay: file
                .realtime
                .reconnect_delay_ms
                .map_or(defaults.reconnect_delay, Duration::from_millis),
            connect_timeout: file
                .realtime
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            channel_capacity: file
                .realtime
                .channel_capacity
                .unwrap_or(defaults.channel_capacity),
            max_task_title_len: file
                .ui
                .max_task_title_len
                .unwrap_or(defaults.max_task_title_len),
            not_found_redirect: file
                .ui
                .not_found_redirect_ms
                .map_or(defaults.not_found_redirect, Duration::from_millis),
            page_size: file.ui.page_size.unwrap_or(defaults.page_size),
        }
    }

    /// The parsed API root.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] if `api_url` does not parse.
    pub fn api_base(&self) -> Result<Url, ConfigError> {
        parse_url("api_url", &self.api_url)
    }

    /// Event channel parameters. Without a `ws_url` the broker is assumed
    /// to share the API's origin.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] if a URL does not parse.
    pub fn realtime_config(&self) -> Result<RealtimeConfig, ConfigError> {
        let url = match &self.ws_url {
            Some(ws) => parse_url("ws_url", ws)?,
            None => {
                let mut origin = self.api_base()?;
                origin.set_path("/");
                origin.set_query(None);
                origin
            }
        };
        Ok(RealtimeConfig {
            url,
            reconnect_attempts: self.reconnect_attempts,
            reconnect_delay: self.reconnect_delay,
            connect_timeout: self.connect_timeout,
        })
    }

    /// Tunables for the sync workspace.
    #[must_use]
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            max_title_len: self.max_task_title_len,
            not_found_redirect: self.not_found_redirect,
            page_size: self.page_size,
            channel_capacity: self.channel_capacity,
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Collaborative task tracker client")]
pub struct CliArgs {
    /// Root URL of the task API.
    #[arg(long, env = "TASKDECK_API_URL")]
    pub api_url: Option<String>,

    /// Event broker URL (default: the API origin).
    #[arg(long, env = "TASKDECK_WS_URL")]
    pub ws_url: Option<String>,

    /// File holding the session token.
    #[arg(long, env = "TASKDECK_TOKEN_PATH")]
    pub token_path: Option<PathBuf>,

    /// Path to config file (default: `~/.config/taskdeck/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKDECK_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/taskdeck.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// What to do.
    #[command(subcommand)]
    pub command: Option<Command>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn default_token_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("taskdeck")
        .join("token")
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        source,
    })
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("taskdeck").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
