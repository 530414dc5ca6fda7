//! Settings layering: command line flags, then environment, then the
//! configuration file, then built-in defaults.
//!
//! The configuration file is TOML:
//! - Linux: `~/.config/rflogs/config.toml`
//! - macOS: `~/Library/Application Support/rflogs/config.toml`
//! - Windows: `%APPDATA%/rflogs/config.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use client::locator::{DEFAULT_LOG, DEFAULT_OUTPUT, DEFAULT_REPORT, UploadPlan};
use client::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT, Error, Result};
use serde::{Deserialize, Serialize};

const APP_DIR: &str = "rflogs";
const CONFIG_FILE: &str = "config.toml";
const CREDENTIALS_FILE: &str = "credentials.toml";

/// Optional keys of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub output: Option<String>,
    pub log: Option<String>,
    pub report: Option<String>,
    pub retries: Option<u32>,
    pub timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Reads the file at `path`. A missing file is only an error when the
    /// location was given explicitly.
    pub fn load(path: &Path, explicit: bool) -> Result<Self> {
        if !path.exists() {
            if explicit {
                return Err(Error::Config(format!(
                    "configuration file {} not found",
                    path.display()
                )));
            }
            tracing::debug!(path = %path.display(), "no configuration file");
            return Ok(FileConfig::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read configuration {}: {e}", path.display()))
        })?;
        let config: FileConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!("malformed configuration {}: {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }
}

/// Values every command works with after all sources are merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_url: String,
    pub output: String,
    pub log: String,
    pub report: String,
    pub retries: u32,
    pub timeout: Duration,
    /// Where `login` keeps its token, `None` when no config directory exists
    pub credentials: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            output: DEFAULT_OUTPUT.to_owned(),
            log: DEFAULT_LOG.to_owned(),
            report: DEFAULT_REPORT.to_owned(),
            retries: 0,
            timeout: DEFAULT_TIMEOUT,
            credentials: credentials_path(),
        }
    }
}

impl Settings {
    /// Merges the sources, `flag_base_url` winning over `env_base_url`
    /// winning over the file.
    #[must_use]
    pub fn resolve(
        file: FileConfig,
        env_base_url: Option<String>,
        flag_base_url: Option<String>,
    ) -> Self {
        let defaults = Settings::default();
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Self {
            base_url: non_empty(flag_base_url)
                .or_else(|| non_empty(env_base_url))
                .or_else(|| non_empty(file.base_url))
                .unwrap_or(defaults.base_url),
            output: file.output.unwrap_or(defaults.output),
            log: file.log.unwrap_or(defaults.log),
            report: file.report.unwrap_or(defaults.report),
            retries: file.retries.unwrap_or(defaults.retries),
            timeout: file
                .timeout_secs
                .map_or(defaults.timeout, Duration::from_secs),
            credentials: defaults.credentials,
        }
    }

    /// File name selection for an upload, flag values overriding settings.
    #[must_use]
    pub fn plan(&self, output: Option<&str>, log: Option<&str>, report: Option<&str>) -> UploadPlan {
        UploadPlan::new(
            output.unwrap_or(&self.output),
            log.unwrap_or(&self.log),
            report.unwrap_or(&self.report),
        )
    }
}

/// Configuration file location: the override when given, the platform
/// config directory otherwise.
#[must_use]
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE)))
}

fn credentials_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join(CREDENTIALS_FILE))
}
