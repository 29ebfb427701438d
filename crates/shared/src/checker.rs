use std::path::Path;
use std::sync::Arc;

use chrono::Local;
use tracing::{info, warn};

use crate::dates::SnapshotDate;
use crate::diff::{JsonDiff, diff_snapshots};
use crate::diff_log::{DiffLog, WriteMode};
use crate::fetcher::{FetchOutcome, SnapshotFetcher};
use crate::snapshot_store::{SnapshotStore, SnapshotStoreError};
use crate::source::ManifestSource;

/// Whether an operation that computes a diff should also record it in the diff log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffWrite {
    Write,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOutcome {
    Compared { changes: usize, written: bool },
    Unavailable,
}

#[derive(Debug)]
pub enum LatestOutcome {
    Unavailable(FetchOutcome),
    PreviousMissing {
        latest: FetchOutcome,
        written: bool,
    },
    Compared {
        latest: FetchOutcome,
        comparison: CompareOutcome,
    },
    /// Both snapshots exist but one of them is not valid JSON.
    Unreadable {
        latest: FetchOutcome,
        written: bool,
    },
}

#[derive(Debug)]
pub struct AutoOutcome {
    pub deleted: bool,
    pub latest: LatestOutcome,
}

#[derive(Clone)]
pub struct ComfyDiffChecker {
    store: SnapshotStore,
    fetcher: SnapshotFetcher,
    diff_log: DiffLog,
}

impl ComfyDiffChecker {
    pub fn new(store: SnapshotStore, source: Arc<dyn ManifestSource>, mode: WriteMode) -> Self {
        let fetcher = SnapshotFetcher::new(store.clone(), source);
        let diff_log = DiffLog::new(store.diff_log_path(), mode);
        Self {
            store,
            fetcher,
            diff_log,
        }
    }

    pub fn snapshot_dir(&self) -> &Path {
        self.store.dir()
    }

    pub fn diff_log_path(&self) -> &Path {
        self.diff_log.path()
    }

    pub async fn compare_dates(
        &self,
        older: SnapshotDate,
        newer: SnapshotDate,
        write: DiffWrite,
    ) -> CompareOutcome {
        self.fetcher.fetch(older).await;
        self.fetcher.fetch(newer).await;
        self.compare_cached(older, newer, write)
    }

    pub async fn compare_with_previous(
        &self,
        date: SnapshotDate,
        write: DiffWrite,
    ) -> CompareOutcome {
        match date.previous() {
            Some(previous) => self.compare_dates(previous, date, write).await,
            None => CompareOutcome::Unavailable,
        }
    }

    pub async fn download_latest(&self, today: SnapshotDate, write: DiffWrite) -> LatestOutcome {
        let latest = self.fetcher.fetch(today).await;
        if !latest.is_available() {
            return LatestOutcome::Unavailable(latest);
        }

        let previous = match today.previous() {
            Some(previous) if self.fetcher.fetch(previous).await.is_available() => previous,
            _ => {
                info!(%today, "previous snapshot unavailable, skipping comparison");
                let written = self.record(&JsonDiff::empty(), write);
                return LatestOutcome::PreviousMissing { latest, written };
            }
        };

        let comparison = self.compare_cached(previous, today, write);
        if comparison == CompareOutcome::Unavailable {
            warn!(%today, "latest or previous snapshot unreadable, recording an empty comparison");
            let written = self.record(&JsonDiff::empty(), write);
            return LatestOutcome::Unreadable { latest, written };
        }

        LatestOutcome::Compared { latest, comparison }
    }

    pub fn delete_latest(&self, today: SnapshotDate) -> Result<bool, SnapshotStoreError> {
        let deleted = self.store.delete_today(today)?;
        if deleted {
            info!(%today, "deleted latest snapshot");
        }
        Ok(deleted)
    }

    /// Runs on inactivity: refresh today's snapshot and record its diff against yesterday.
    pub async fn auto_action(&self, today: SnapshotDate) -> AutoOutcome {
        let deleted = match self.delete_latest(today) {
            Ok(deleted) => deleted,
            Err(err) => {
                warn!("auto action could not delete latest snapshot: {err}");
                false
            }
        };
        let latest = self.download_latest(today, DiffWrite::Write).await;
        AutoOutcome { deleted, latest }
    }

    fn compare_cached(
        &self,
        older: SnapshotDate,
        newer: SnapshotDate,
        write: DiffWrite,
    ) -> CompareOutcome {
        match diff_snapshots(&self.store, older, newer) {
            Some(diff) => CompareOutcome::Compared {
                changes: diff.len(),
                written: self.record(&diff, write),
            },
            None => CompareOutcome::Unavailable,
        }
    }

    fn record(&self, diff: &JsonDiff, write: DiffWrite) -> bool {
        if write == DiffWrite::Skip {
            return false;
        }

        match self.diff_log.write(diff, Local::now()) {
            Ok(()) => true,
            Err(err) => {
                warn!("failed to write diff log: {err}");
                false
            }
        }
    }
}
