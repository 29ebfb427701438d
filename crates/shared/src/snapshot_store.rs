use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::dates::SnapshotDate;

const SNAPSHOT_PREFIX: &str = "manifest-";
const DIFF_LOG_FILE_NAME: &str = "differences.txt";

#[derive(Debug, Error)]
pub enum SnapshotStoreError {
    #[error("failed to create snapshot directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot {path} does not exist")]
    Missing { path: String },
    #[error("failed to read snapshot {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot {path} is not valid JSON: {source}")]
    ParseJson {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write snapshot {path}: {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to delete snapshot {path}: {source}")]
    DeleteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    AlreadyPresent,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SnapshotStoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| SnapshotStoreError::CreateDir {
            path: dir.display().to_string(),
            source,
        })?;

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, date: SnapshotDate) -> PathBuf {
        self.dir.join(format!("{SNAPSHOT_PREFIX}{date}.json"))
    }

    pub fn diff_log_path(&self) -> PathBuf {
        self.dir.join(DIFF_LOG_FILE_NAME)
    }

    pub fn exists(&self, date: SnapshotDate) -> bool {
        self.path_for(date).is_file()
    }

    pub fn write_new(
        &self,
        date: SnapshotDate,
        contents: &str,
    ) -> Result<WriteOutcome, SnapshotStoreError> {
        let path = self.path_for(date);
        let file = OpenOptions::new().write(true).create_new(true).open(&path);
        let mut file = match file {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Ok(WriteOutcome::AlreadyPresent);
            }
            Err(source) => {
                return Err(SnapshotStoreError::WriteFile {
                    path: path.display().to_string(),
                    source,
                });
            }
        };

        if let Err(source) = file.write_all(contents.as_bytes()) {
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(SnapshotStoreError::WriteFile {
                path: path.display().to_string(),
                source,
            });
        }

        Ok(WriteOutcome::Created)
    }

    pub fn load(&self, date: SnapshotDate) -> Result<Value, SnapshotStoreError> {
        let path = self.path_for(date);
        let raw = fs::read_to_string(&path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                SnapshotStoreError::Missing {
                    path: path.display().to_string(),
                }
            } else {
                SnapshotStoreError::ReadFile {
                    path: path.display().to_string(),
                    source,
                }
            }
        })?;

        serde_json::from_str(&raw).map_err(|source| SnapshotStoreError::ParseJson {
            path: path.display().to_string(),
            source,
        })
    }

    /// Only today's snapshot is ever removed; older dates are kept forever.
    pub fn delete_today(&self, today: SnapshotDate) -> Result<bool, SnapshotStoreError> {
        let path = self.path_for(today);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(SnapshotStoreError::DeleteFile {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{SnapshotStore, SnapshotStoreError, WriteOutcome};
    use crate::dates::SnapshotDate;

    fn date(raw: &str) -> SnapshotDate {
        SnapshotDate::parse(raw).expect("valid test date")
    }

    #[test]
    fn open_creates_missing_directory() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let nested = temp.path().join("a").join("comfydiff");

        let store = SnapshotStore::open(&nested).expect("store should open");

        assert!(nested.is_dir());
        assert_eq!(
            store.path_for(date("2024-01-02")),
            nested.join("manifest-2024-01-02.json")
        );
        assert_eq!(store.diff_log_path(), nested.join("differences.txt"));
    }

    #[test]
    fn write_new_never_overwrites_an_existing_snapshot() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let store = SnapshotStore::open(temp.path()).expect("store should open");
        let day = date("2024-01-01");

        assert_eq!(
            store.write_new(day, r#"{"a":1}"#).expect("first write"),
            WriteOutcome::Created
        );
        assert_eq!(
            store.write_new(day, r#"{"a":2}"#).expect("second write"),
            WriteOutcome::AlreadyPresent
        );

        let raw = fs::read_to_string(store.path_for(day)).expect("snapshot readable");
        assert_eq!(raw, r#"{"a":1}"#);
    }

    #[test]
    fn load_distinguishes_missing_and_invalid_snapshots() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let store = SnapshotStore::open(temp.path()).expect("store should open");

        assert!(matches!(
            store.load(date("2024-01-01")),
            Err(SnapshotStoreError::Missing { .. })
        ));

        store
            .write_new(date("2024-01-02"), "{not json")
            .expect("write should succeed");
        assert!(matches!(
            store.load(date("2024-01-02")),
            Err(SnapshotStoreError::ParseJson { .. })
        ));
    }

    #[test]
    fn delete_today_is_a_no_op_when_snapshot_is_missing() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let store = SnapshotStore::open(temp.path()).expect("store should open");
        let today = date("2024-05-10");

        assert!(!store.delete_today(today).expect("delete should not fail"));

        store.write_new(today, "{}").expect("write should succeed");
        assert!(store.delete_today(today).expect("delete should succeed"));
        assert!(!store.exists(today));
    }
}
