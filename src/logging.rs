//! Logging System
//!
//! `tracing` events from every layer go through one subscriber installed by
//! the binary. The `[logging]` config section picks level, format and
//! destination; `DEDUPFS_LOG`, `DEDUPFS_LOG_FORMAT`, `DEDUPFS_LOG_OUTPUT` and
//! `DEDUPFS_LOG_FILE` override it.

use crate::config::xdg;
use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt as stdfmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const ENV_FILTER: &str = "DEDUPFS_LOG";
const ENV_FORMAT: &str = "DEDUPFS_LOG_FORMAT";
const ENV_OUTPUT: &str = "DEDUPFS_LOG_OUTPUT";
const ENV_FILE: &str = "DEDUPFS_LOG_FILE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format {:?} (text or json)", other)),
        }
    }
}

impl stdfmt::Display for LogFormat {
    fn fmt(&self, f: &mut stdfmt::Formatter<'_>) -> stdfmt::Result {
        f.write_str(match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        })
    }
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogTarget {
    #[serde(rename = "stdout")]
    Stdout,
    #[default]
    #[serde(rename = "stderr")]
    Stderr,
    #[serde(rename = "file")]
    File,
    #[serde(rename = "file+stderr")]
    FileAndStderr,
}

impl LogTarget {
    fn writes_file(self) -> bool {
        matches!(self, LogTarget::File | LogTarget::FileAndStderr)
    }
}

impl FromStr for LogTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdout" => Ok(LogTarget::Stdout),
            "stderr" => Ok(LogTarget::Stderr),
            "file" => Ok(LogTarget::File),
            "file+stderr" => Ok(LogTarget::FileAndStderr),
            other => Err(format!(
                "unknown log output {:?} (stdout, stderr, file or file+stderr)",
                other
            )),
        }
    }
}

/// The `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    /// Default directive: trace, debug, info, warn, error or off.
    pub level: String,
    pub format: LogFormat,
    pub output: LogTarget,
    /// Used when `output` includes a file; unset means the platform state dir.
    pub file: Option<PathBuf>,
    /// ANSI colours for text output on a terminal stream.
    pub color: bool,
    /// Per-module levels, e.g. `dedupfs::store = "debug"`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "warn".to_string(),
            format: LogFormat::Text,
            output: LogTarget::Stderr,
            file: None,
            color: true,
            modules: BTreeMap::new(),
        }
    }
}

/// Pick the log file: explicit argument, then `DEDUPFS_LOG_FILE`, then the
/// configured path, then the platform default.
pub fn resolve_log_file_path(
    explicit: Option<PathBuf>,
    configured: Option<PathBuf>,
) -> Result<PathBuf, ApiError> {
    let from_env = std::env::var_os(ENV_FILE).map(PathBuf::from);
    match [explicit, from_env, configured]
        .into_iter()
        .flatten()
        .find(|p| !p.as_os_str().is_empty())
    {
        Some(path) => Ok(path),
        None => xdg::default_log_file(),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), ApiError> {
    let defaults = LoggingConfig::default();
    let config = config.unwrap_or(&defaults);
    let installed = if !config.enabled {
        Registry::default().with(EnvFilter::new("off")).try_init()
    } else {
        let filter = env_filter(config)?;
        let format = env_override(ENV_FORMAT).unwrap_or(config.format);
        let target = env_override(ENV_OUTPUT).unwrap_or(config.output);
        let writer = make_writer(target, config)?;
        let subscriber = Registry::default().with(filter);
        match format {
            LogFormat::Json => subscriber
                .with(
                    fmt::layer()
                        .json()
                        .with_timer(ChronoUtc::rfc_3339())
                        .with_writer(writer),
                )
                .try_init(),
            LogFormat::Text => subscriber
                .with(
                    fmt::layer()
                        .with_timer(ChronoUtc::rfc_3339())
                        .with_ansi(config.color && !target.writes_file())
                        .with_writer(writer),
                )
                .try_init(),
        }
    };
    installed.map_err(|e| ApiError::ConfigError(format!("Failed to install logger: {}", e)))
}

/// A set, well-formed environment value wins; anything else is ignored.
fn env_override<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, ApiError> {
    if let Ok(filter) = EnvFilter::try_from_env(ENV_FILTER) {
        return Ok(filter);
    }
    let mut filter = EnvFilter::try_new(&config.level).map_err(|e| {
        ApiError::ConfigError(format!("Invalid log level {:?}: {}", config.level, e))
    })?;
    for (module, level) in &config.modules {
        let directive = format!("{}={}", module, level).parse().map_err(|e| {
            ApiError::ConfigError(format!("Invalid level for module {}: {}", module, e))
        })?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}

fn make_writer(target: LogTarget, config: &LoggingConfig) -> Result<BoxMakeWriter, ApiError> {
    Ok(match target {
        LogTarget::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogTarget::Stderr => BoxMakeWriter::new(std::io::stderr),
        LogTarget::File => BoxMakeWriter::new(open_log_file(config)?),
        LogTarget::FileAndStderr => {
            BoxMakeWriter::new(open_log_file(config)?.and(std::io::stderr))
        }
    })
}

fn open_log_file(config: &LoggingConfig) -> Result<Arc<File>, ApiError> {
    let path = resolve_log_file_path(None, config.file.clone())?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| log_file_error(parent, e))?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| log_file_error(&path, e))?;
    Ok(Arc::new(file))
}

fn log_file_error(path: &Path, err: std::io::Error) -> ApiError {
    ApiError::ConfigError(format!("Cannot open log file {}: {}", path.display(), err))
}
