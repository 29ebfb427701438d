use std::path::PathBuf;

use shared::config::CheckerConfig;
use shared::diff_log::WriteMode;
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOptions {
    pub auto: bool,
    pub append: bool,
    pub snapshot_dir: Option<PathBuf>,
    pub idle_timeout_seconds: Option<u64>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CliError {
    #[error("unknown argument: {0}")]
    UnknownArgument(String),
    #[error("missing value for argument: {0}")]
    MissingValue(String),
    #[error("invalid --timeout value: {0}")]
    InvalidTimeout(String),
    #[error("help requested")]
    HelpRequested,
}

impl CliOptions {
    pub fn parse<I>(args: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = Self::default();

        let mut iter = args.into_iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--help" | "-h" => return Err(CliError::HelpRequested),
                "--auto" => options.auto = true,
                "--append" => options.append = true,
                "--dir" => {
                    let value = iter.next().ok_or(CliError::MissingValue(arg.clone()))?;
                    options.snapshot_dir = Some(PathBuf::from(value));
                }
                "--timeout" => {
                    let value = iter.next().ok_or(CliError::MissingValue(arg.clone()))?;
                    options.idle_timeout_seconds = Some(parse_timeout(&value)?);
                }
                unknown => return Err(CliError::UnknownArgument(unknown.to_string())),
            }
        }

        Ok(options)
    }

    pub fn apply(&self, config: &mut CheckerConfig) {
        if self.append {
            config.diff_write_mode = WriteMode::Append;
        }
        if let Some(dir) = &self.snapshot_dir {
            config.snapshot_dir = dir.clone();
        }
        if let Some(seconds) = self.idle_timeout_seconds {
            config.idle_timeout_seconds = seconds;
        }
    }
}

fn parse_timeout(value: &str) -> Result<u64, CliError> {
    match value.trim().parse::<u64>() {
        Ok(seconds) if seconds > 0 => Ok(seconds),
        _ => Err(CliError::InvalidTimeout(value.to_string())),
    }
}
