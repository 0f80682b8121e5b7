//! TOML configuration for the AWG tools.
//!
//! Every tool keeps its settings in one TOML document with a `[shared]`
//! table on top. [`ConfigLoader`] is blanket-implemented, so a tool only
//! derives `Deserialize` on its root struct:
//!
//! ```rust,no_run
//! use awg_common::config::{ConfigError, ConfigLoader, SharedConfig};
//! use serde::Deserialize;
//! use std::path::Path;
//!
//! #[derive(Debug, Deserialize)]
//! struct CardTool {
//!     shared: SharedConfig,
//!     sample_rate_hz: u64,
//! }
//!
//! fn main() -> Result<(), ConfigError> {
//!     let tool = CardTool::load(Path::new("awg.toml"))?;
//!     tool.shared.validate()?;
//!     println!("{} @ {} Hz", tool.shared.service_name, tool.sample_rate_hz);
//!     Ok(())
//! }
//! ```

use crate::card::consts::AWG_SERVICE_NAME;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure to obtain a usable configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// No file at the given path.
    #[error("configuration file {0} does not exist")]
    FileNotFound(PathBuf),

    /// File exists but could not be read, or is not valid TOML for the
    /// target type.
    #[error("cannot parse configuration: {0}")]
    ParseError(String),

    /// Parsed, but a value is out of its allowed range.
    #[error("invalid configuration: {0}")]
    ValidationError(String),
}

/// `[shared] log_level`, lowercase in TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Per-sample and per-register detail.
    Trace,
    /// Register writes and state transitions.
    Debug,
    /// Session lifecycle.
    #[default]
    Info,
    /// Clamped parameters.
    Warn,
    /// Device faults only.
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// The `[shared]` table.
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "awg-tweezer-01"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Default verbosity; `RUST_LOG` still overrides it.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Names this card session in logs and session file names.
    pub service_name: String,
}

impl SharedConfig {
    /// Shared settings for the named instance at the default log level.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: service_name.into(),
        }
    }

    /// Reject names that cannot be used as a file-name stem.
    ///
    /// # Errors
    ///
    /// `ConfigError::ValidationError` for an empty name or one containing a
    /// path separator.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        if self.service_name.contains(['/', '\\']) {
            return Err(ConfigError::ValidationError(format!(
                "service_name '{}' contains a path separator",
                self.service_name
            )));
        }
        Ok(())
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(AWG_SERVICE_NAME)
    }
}

/// Load a TOML document into any deserializable type.
///
/// A missing file is reported as `FileNotFound` so callers can fall back
/// to defaults; every other read or syntax failure is a `ParseError`.
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Read and parse `path`.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound(path.to_path_buf()),
            _ => ConfigError::ParseError(format!("{}: {e}", path.display())),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse an in-memory document.
    fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
