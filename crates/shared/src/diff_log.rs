use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use thiserror::Error;

use crate::diff::JsonDiff;

pub const DIFF_LOG_HEADER: &str = "=== ComfyDiff Differences ===";
pub const NO_DIFFERENCES_SENTINEL: &str = "No differences found.";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    #[default]
    Overwrite,
    Append,
}

#[derive(Debug, Error)]
pub enum DiffLogError {
    #[error("failed to encode diff for {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write diff log {path}: {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct DiffLog {
    path: PathBuf,
    mode: WriteMode,
}

impl DiffLog {
    pub fn new(path: impl Into<PathBuf>, mode: WriteMode) -> Self {
        Self {
            path: path.into(),
            mode,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, diff: &JsonDiff, now: DateTime<Local>) -> Result<(), DiffLogError> {
        let block = render_block(diff, now).map_err(|source| DiffLogError::Encode {
            path: self.path.display().to_string(),
            source,
        })?;

        let mut options = OpenOptions::new();
        options.create(true);
        match self.mode {
            WriteMode::Overwrite => options.write(true).truncate(true),
            WriteMode::Append => options.append(true),
        };

        options
            .open(&self.path)
            .and_then(|mut file| file.write_all(block.as_bytes()))
            .map_err(|source| DiffLogError::WriteFile {
                path: self.path.display().to_string(),
                source,
            })
    }
}

pub fn render_block(diff: &JsonDiff, now: DateTime<Local>) -> Result<String, serde_json::Error> {
    let body = if diff.is_empty() {
        NO_DIFFERENCES_SENTINEL.to_string()
    } else {
        serde_json::to_string_pretty(diff.entries())?
    };

    Ok(format!(
        "\n{DIFF_LOG_HEADER}\n{}\n{body}\n",
        now.format(TIMESTAMP_FORMAT)
    ))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::{DateTime, Local, TimeZone};
    use serde_json::json;

    use super::{DIFF_LOG_HEADER, DiffLog, NO_DIFFERENCES_SENTINEL, WriteMode, render_block};
    use crate::diff::{JsonDiff, diff_values};

    fn fixed_now() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 1, 2, 9, 30, 15)
            .single()
            .expect("valid local datetime")
    }

    #[test]
    fn empty_diff_renders_header_timestamp_and_sentinel() {
        let block = render_block(&JsonDiff::empty(), fixed_now()).expect("render");

        assert_eq!(
            block,
            format!("\n{DIFF_LOG_HEADER}\n2024-01-02 09:30:15\n{NO_DIFFERENCES_SENTINEL}\n")
        );
    }

    #[test]
    fn non_empty_diff_renders_entries_as_json() {
        let diff = diff_values(&json!({"a": 1}), &json!({"a": 2}));
        let block = render_block(&diff, fixed_now()).expect("render");

        let body = block
            .split_once("2024-01-02 09:30:15\n")
            .map(|(_, body)| body)
            .expect("timestamp line present");
        let parsed: serde_json::Value = serde_json::from_str(body).expect("body is JSON");
        assert_eq!(
            parsed,
            json!([{"path": "/a", "change": "changed", "old": 1, "new": 2}])
        );
        assert!(!block.contains(NO_DIFFERENCES_SENTINEL));
    }

    #[test]
    fn overwrite_mode_keeps_only_the_latest_block() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let log = DiffLog::new(temp.path().join("differences.txt"), WriteMode::Overwrite);

        log.write(&diff_values(&json!(1), &json!(2)), fixed_now())
            .expect("first write");
        log.write(&JsonDiff::empty(), fixed_now())
            .expect("second write");

        let contents = fs::read_to_string(log.path()).expect("log readable");
        assert_eq!(contents.matches(DIFF_LOG_HEADER).count(), 1);
        assert_eq!(contents.matches("2024-01-02 09:30:15").count(), 1);
        assert!(contents.contains(NO_DIFFERENCES_SENTINEL));
    }

    #[test]
    fn append_mode_adds_one_header_per_write() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let log = DiffLog::new(temp.path().join("differences.txt"), WriteMode::Append);

        for _ in 0..3 {
            log.write(&JsonDiff::empty(), fixed_now())
                .expect("append write");
        }

        let contents = fs::read_to_string(log.path()).expect("log readable");
        assert_eq!(contents.matches(DIFF_LOG_HEADER).count(), 3);
        assert_eq!(contents.matches(NO_DIFFERENCES_SENTINEL).count(), 3);
    }
}
