//! TOML configuration for benchctl.
//!
//! The config file is looked up in this order:
//!
//! 1. the path given with `--config`,
//! 2. the path in `$BENCHLINK_CONFIG`,
//! 3. the platform config directory:
//!    - Windows:  `%APPDATA%\benchlink\config.toml`
//!    - Linux:    `~/.config/benchlink/config.toml`
//!    - macOS:    `~/Library/Application Support/benchlink/config.toml`
//!
//! # Example
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 9600
//! timeout_ms = 100
//!
//! [scpi]
//! channel_count = 2
//!
//! [relay]
//! default_invert = false
//!
//! [[relay.channel]]
//! relay = 1
//! name = "dut_power"
//! wiring = "NO"
//!
//! [calibration.1]
//! offset = 0.196375
//! slope = -0.029375
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent, so a config file only has to
//! mention what differs from the defaults.
//!
//! The relay section is the exception: relay aliases and wiring cannot be
//! guessed, so a missing file or a missing `[relay]` table is an error for
//! relay commands rather than an empty default.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bench_core::relay::{RelayChannel, RelayConfig, RelayError};
use bench_core::scpi::error_register::{
    DEFAULT_ERROR_DELIMITER, DEFAULT_ERROR_QUERY, NO_ERROR_CODE,
};
use bench_core::scpi::framing::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_IDLE_READS};
use bench_core::scpi::{ChannelCalibration, ErrorRegister, LinearCalibration, LineFramer};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "BENCHLINK_CONFIG";

const CONFIG_FILE_NAME: &str = "config.toml";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// The config file does not exist.
    #[error("config file {0} not found")]
    Missing(PathBuf),

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The TOML parsed but a value is unusable.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BenchConfig {
    #[serde(default)]
    pub serial: SerialSection,
    #[serde(default)]
    pub scpi: ScpiSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay: Option<RelaySection>,
    /// Set-point corrections keyed by output channel number.
    #[serde(default)]
    pub calibration: BTreeMap<String, LinearCalibration>,
}

/// Serial link of the text instrument.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SerialSection {
    /// Port name, e.g. `/dev/ttyUSB0` or `COM3`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Per-read timeout; one idle read costs this long.
    #[serde(default = "default_serial_timeout_ms")]
    pub timeout_ms: u64,
}

/// Text protocol tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScpiSection {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_max_idle_reads")]
    pub max_idle_reads: u32,
    /// Optional cap on one response; unset means unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_frame_len: Option<usize>,
    #[serde(default = "default_error_query")]
    pub error_query: String,
    #[serde(default = "default_error_delimiter")]
    pub error_delimiter: String,
    /// Error code that means "no error".
    #[serde(default = "default_no_error_code")]
    pub no_error_code: String,
    #[serde(default = "default_status_query")]
    pub status_query: String,
    /// Number of output channels on the supply.
    #[serde(default = "default_channel_count")]
    pub channel_count: u8,
}

/// USB relay board.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelaySection {
    #[serde(default = "default_transfer_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub default_invert: bool,
    #[serde(default)]
    pub channel: Vec<RelayChannel>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_baud_rate() -> u32 {
    9600
}
fn default_serial_timeout_ms() -> u64 {
    100
}
fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_max_idle_reads() -> u32 {
    DEFAULT_MAX_IDLE_READS
}
fn default_no_error_code() -> String {
    NO_ERROR_CODE.to_string()
}
fn default_error_query() -> String {
    DEFAULT_ERROR_QUERY.to_string()
}
fn default_error_delimiter() -> String {
    DEFAULT_ERROR_DELIMITER.to_string()
}
fn default_status_query() -> String {
    "SYSTem:STATus?".to_string()
}
fn default_channel_count() -> u8 {
    2
}
fn default_transfer_timeout_ms() -> u64 {
    5000
}

impl Default for SerialSection {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            timeout_ms: default_serial_timeout_ms(),
        }
    }
}

impl Default for ScpiSection {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_idle_reads: default_max_idle_reads(),
            max_frame_len: None,
            error_query: default_error_query(),
            error_delimiter: default_error_delimiter(),
            no_error_code: default_no_error_code(),
            status_query: default_status_query(),
            channel_count: default_channel_count(),
        }
    }
}

// ── Conversions into bench-core types ─────────────────────────────────────────

impl SerialSection {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ScpiSection {
    pub fn framer(&self) -> LineFramer {
        LineFramer::new()
            .with_chunk_size(self.chunk_size)
            .with_max_idle_reads(self.max_idle_reads)
            .with_max_frame_len(self.max_frame_len)
    }

    pub fn error_register(&self) -> ErrorRegister {
        ErrorRegister::new()
            .with_query(self.error_query.as_str())
            .with_delimiter(self.error_delimiter.as_str())
            .with_no_error_code(self.no_error_code.as_str())
    }
}

impl RelaySection {
    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Validates the channel list.
    ///
    /// # Errors
    ///
    /// See [`RelayConfig::from_channels`].
    pub fn relay_config(&self) -> Result<RelayConfig, RelayError> {
        RelayConfig::from_channels(self.default_invert, self.channel.iter().cloned())
    }
}

impl BenchConfig {
    /// The `[relay]` table as a validated [`RelayConfig`].
    ///
    /// # Errors
    ///
    /// [`RelayError::ConfigMissing`] when there is no `[relay]` table or it
    /// lists no channels.
    pub fn relay_config(&self) -> Result<RelayConfig, RelayError> {
        self.relay
            .as_ref()
            .ok_or(RelayError::ConfigMissing)?
            .relay_config()
    }

    /// Calibration constants keyed by numeric channel.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if a key is not a channel number.
    pub fn calibration_table(&self) -> Result<BTreeMap<u8, LinearCalibration>, ConfigError> {
        self.calibration
            .iter()
            .map(|(key, cal)| {
                key.trim()
                    .parse::<u8>()
                    .map(|channel| (channel, *cal))
                    .map_err(|_| {
                        ConfigError::Invalid(format!("calibration key {key:?} is not a channel"))
                    })
            })
            .collect()
    }

    /// Builds the per-channel calibration strategy.
    ///
    /// # Errors
    ///
    /// See [`calibration_table`](Self::calibration_table).
    pub fn channel_calibration(&self) -> Result<ChannelCalibration, ConfigError> {
        Ok(self
            .calibration_table()?
            .into_iter()
            .fold(ChannelCalibration::new(), |acc, (channel, cal)| {
                acc.with_channel(channel, cal)
            }))
    }
}

// ── Config lookup ─────────────────────────────────────────────────────────────

/// Resolves which config file to read: `explicit`, then
/// `$BENCHLINK_CONFIG`, then the platform default.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when nothing else applies and
/// the platform directory is unknown.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    resolve_with(explicit, std::env::var_os(CONFIG_ENV_VAR), platform_config_dir())
}

fn resolve_with(
    explicit: Option<&Path>,
    env_value: Option<OsString>,
    platform_dir: Option<PathBuf>,
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(value) = env_value.filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(value));
    }
    platform_dir
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config file at `path`.
///
/// # Errors
///
/// - [`ConfigError::Missing`] if the file does not exist.
/// - [`ConfigError::Io`] for any other file-system error.
/// - [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<BenchConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ConfigError::Missing(path.to_path_buf()))
        }
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Resolves and loads the config file.
///
/// # Errors
///
/// See [`resolve_config_path`] and [`load_config_from`].
pub fn load_config(explicit: Option<&Path>) -> Result<BenchConfig, ConfigError> {
    load_config_from(&resolve_config_path(explicit)?)
}

/// Resolves the platform config base directory including the `benchlink`
/// subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        // %APPDATA% e.g. C:\Users\<user>\AppData\Roaming
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("benchlink"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("benchlink"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("benchlink")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
