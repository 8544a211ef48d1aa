use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use thiserror::Error;
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;

use crate::connections::{default_config_dir, ConfigError};

pub const LOG_FILTER_ENV: &str = "LAZYTAB_LOG";
pub const LOG_FILE_NAME: &str = "lazytab.log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub log_path: PathBuf,
    pub default_filter: String,
}

impl LoggingConfig {
    #[must_use]
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            default_filter: "info".to_string(),
        }
    }

    pub fn load_default() -> Result<Self, LoggingError> {
        Ok(Self::new(default_config_dir()?.join(LOG_FILE_NAME)))
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to install tracing subscriber: {0}")]
    Install(#[from] tracing::subscriber::SetGlobalDefaultError),
}

fn open_log_file(config: &LoggingConfig) -> Result<File, LoggingError> {
    if let Some(parent) = config.log_path.parent() {
        fs::create_dir_all(parent).map_err(|source| LoggingError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)
        .map_err(|source| LoggingError::Open {
            path: config.log_path.clone(),
            source,
        })
}

pub fn subscriber(
    config: &LoggingConfig,
) -> Result<impl Subscriber + Send + Sync + 'static, LoggingError> {
    let file = open_log_file(config)?;
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    Ok(tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .finish())
}

/// Installs the file subscriber as the process-wide default. Fails if one is
/// already installed.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    tracing::subscriber::set_global_default(subscriber(config)?)?;
    tracing::info!(path = %config.log_path.display(), "logging initialized");
    Ok(())
}
