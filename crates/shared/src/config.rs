use std::io::ErrorKind;
use std::path::PathBuf;

use thiserror::Error;

use crate::config_env::{optional_trimmed_env, parse_bool_env, parse_u64_env};
use crate::diff_log::WriteMode;
use crate::source::GithubSourceConfig;

const DEFAULT_SNAPSHOT_DIR: &str = "comfydiff";
const DEFAULT_IDLE_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Clone)]
pub struct CheckerConfig {
    pub snapshot_dir: PathBuf,
    pub github: GithubSourceConfig,
    pub idle_timeout_seconds: u64,
    pub diff_write_mode: WriteMode,
    pub editor_command: Option<String>,
    pub file_browser_command: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid integer in env var {0}")]
    ParseInt(String),
    #[error("invalid boolean in env var {0}")]
    ParseBool(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("failed to load .env file: {0}")]
    Dotenv(String),
}

/// Loads `.env` when one exists. A missing file is fine; a malformed one is not.
pub fn load_dotenv() -> Result<(), ConfigError> {
    accept_missing_dotenv(dotenvy::dotenv().map(|_| ()))
}

fn accept_missing_dotenv(result: Result<(), dotenvy::Error>) -> Result<(), ConfigError> {
    match result {
        Ok(()) => Ok(()),
        Err(dotenvy::Error::Io(err)) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(ConfigError::Dotenv(err.to_string())),
    }
}

impl CheckerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let idle_timeout_seconds =
            parse_u64_env("COMFYDIFF_IDLE_TIMEOUT_SECONDS", DEFAULT_IDLE_TIMEOUT_SECONDS)?;
        if idle_timeout_seconds == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "COMFYDIFF_IDLE_TIMEOUT_SECONDS must be greater than zero".to_string(),
            ));
        }

        let diff_write_mode = if parse_bool_env("COMFYDIFF_DIFF_APPEND", false)? {
            WriteMode::Append
        } else {
            WriteMode::Overwrite
        };

        Ok(Self {
            snapshot_dir: optional_trimmed_env("COMFYDIFF_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR)),
            github: GithubSourceConfig::from_env()?,
            idle_timeout_seconds,
            diff_write_mode,
            editor_command: optional_trimmed_env("COMFYDIFF_EDITOR"),
            file_browser_command: optional_trimmed_env("COMFYDIFF_FILE_BROWSER"),
        })
    }
}
