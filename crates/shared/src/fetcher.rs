use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::dates::SnapshotDate;
use crate::snapshot_store::{SnapshotStore, WriteOutcome};
use crate::source::{ManifestSource, ManifestSourceError};

#[derive(Debug)]
pub enum FetchOutcome {
    Cached(PathBuf),
    Downloaded { path: PathBuf, commit: String },
    Unavailable(FetchUnavailable),
}

impl FetchOutcome {
    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Unavailable(_))
    }
}

#[derive(Debug, Error)]
pub enum FetchUnavailable {
    #[error("no commit found at or before {0}")]
    NoCommit(SnapshotDate),
    #[error("commit lookup failed: {0}")]
    CommitLookup(#[source] ManifestSourceError),
    #[error("manifest download failed: {0}")]
    Download(#[source] ManifestSourceError),
    #[error("snapshot could not be stored: {0}")]
    Storage(String),
}

#[derive(Clone)]
pub struct SnapshotFetcher {
    store: SnapshotStore,
    source: Arc<dyn ManifestSource>,
}

impl SnapshotFetcher {
    pub fn new(store: SnapshotStore, source: Arc<dyn ManifestSource>) -> Self {
        Self { store, source }
    }

    /// A snapshot that already exists for `date` is never refetched, even if
    /// the remote manifest has changed since.
    pub async fn fetch(&self, date: SnapshotDate) -> FetchOutcome {
        let path = self.store.path_for(date);
        if self.store.exists(date) {
            return FetchOutcome::Cached(path);
        }

        let commit = match self.source.resolve_commit(date).await {
            Ok(Some(commit)) => commit,
            Ok(None) => {
                warn!(%date, "no manifest commit found");
                return FetchOutcome::Unavailable(FetchUnavailable::NoCommit(date));
            }
            Err(err) => {
                warn!(%date, "manifest commit lookup failed: {err}");
                return FetchOutcome::Unavailable(FetchUnavailable::CommitLookup(err));
            }
        };

        let contents = match self.source.fetch_manifest(&commit).await {
            Ok(contents) => contents,
            Err(err) => {
                warn!(%date, %commit, "manifest download failed: {err}");
                return FetchOutcome::Unavailable(FetchUnavailable::Download(err));
            }
        };

        match self.store.write_new(date, &contents) {
            Ok(WriteOutcome::Created) => {
                info!(%date, %commit, path = %path.display(), "snapshot saved");
                FetchOutcome::Downloaded { path, commit }
            }
            Ok(WriteOutcome::AlreadyPresent) => FetchOutcome::Cached(path),
            Err(err) => {
                warn!(%date, "failed to store snapshot: {err}");
                FetchOutcome::Unavailable(FetchUnavailable::Storage(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{FetchOutcome, FetchUnavailable, SnapshotFetcher};
    use crate::dates::SnapshotDate;
    use crate::snapshot_store::SnapshotStore;
    use crate::source::{ManifestSource, ManifestSourceError, ManifestSourceFuture};

    #[derive(Default)]
    struct CountingSource {
        commit: Option<&'static str>,
        lookup_fails: bool,
        download_fails: bool,
        calls: AtomicUsize,
    }

    impl ManifestSource for CountingSource {
        fn resolve_commit<'a>(
            &'a self,
            _date: SnapshotDate,
        ) -> ManifestSourceFuture<'a, Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if self.lookup_fails {
                    return Err(ManifestSourceError::RequestFailed("status=503".to_string()));
                }
                Ok(self.commit.map(ToString::to_string))
            })
        }

        fn fetch_manifest<'a>(&'a self, commit: &'a str) -> ManifestSourceFuture<'a, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if self.download_fails {
                    return Err(ManifestSourceError::Timeout);
                }
                Ok(format!(r#"{{"commit":"{commit}"}}"#))
            })
        }
    }

    fn date(raw: &str) -> SnapshotDate {
        SnapshotDate::parse(raw).expect("valid test date")
    }

    #[tokio::test]
    async fn existing_snapshot_is_served_without_network_calls() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let store = SnapshotStore::open(temp.path()).expect("store should open");
        store
            .write_new(date("2024-01-01"), r#"{"a":1}"#)
            .expect("seed snapshot");
        let source = Arc::new(CountingSource {
            commit: Some("abc"),
            ..CountingSource::default()
        });
        let fetcher = SnapshotFetcher::new(store.clone(), source.clone());

        let outcome = fetcher.fetch(date("2024-01-01")).await;

        assert!(matches!(outcome, FetchOutcome::Cached(_)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        let value = store.load(date("2024-01-01")).expect("snapshot untouched");
        assert_eq!(value["a"], 1);
    }

    #[tokio::test]
    async fn downloaded_body_is_persisted_verbatim() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let store = SnapshotStore::open(temp.path()).expect("store should open");
        let source = Arc::new(CountingSource {
            commit: Some("abc123"),
            ..CountingSource::default()
        });
        let fetcher = SnapshotFetcher::new(store.clone(), source.clone());

        let outcome = fetcher.fetch(date("2024-01-02")).await;

        match outcome {
            FetchOutcome::Downloaded { path, commit } => {
                assert_eq!(commit, "abc123");
                let raw = std::fs::read_to_string(path).expect("snapshot readable");
                assert_eq!(raw, r#"{"commit":"abc123"}"#);
            }
            other => panic!("expected download, got {other:?}"),
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unresolved_commit_writes_nothing() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let store = SnapshotStore::open(temp.path()).expect("store should open");
        let fetcher = SnapshotFetcher::new(store.clone(), Arc::new(CountingSource::default()));

        let outcome = fetcher.fetch(date("2024-01-03")).await;

        assert!(matches!(
            outcome,
            FetchOutcome::Unavailable(FetchUnavailable::NoCommit(_))
        ));
        assert!(!store.exists(date("2024-01-03")));
    }

    #[tokio::test]
    async fn network_failures_are_reported_as_unavailable() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let store = SnapshotStore::open(temp.path()).expect("store should open");

        let lookup = SnapshotFetcher::new(
            store.clone(),
            Arc::new(CountingSource {
                lookup_fails: true,
                ..CountingSource::default()
            }),
        );
        assert!(matches!(
            lookup.fetch(date("2024-01-04")).await,
            FetchOutcome::Unavailable(FetchUnavailable::CommitLookup(_))
        ));

        let download = SnapshotFetcher::new(
            store.clone(),
            Arc::new(CountingSource {
                commit: Some("abc"),
                download_fails: true,
                ..CountingSource::default()
            }),
        );
        assert!(matches!(
            download.fetch(date("2024-01-04")).await,
            FetchOutcome::Unavailable(FetchUnavailable::Download(_))
        ));
        assert!(!store.exists(date("2024-01-04")));
    }

    #[tokio::test]
    async fn storage_failure_is_reported_as_unavailable() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let dir = temp.path().join("snapshots");
        let store = SnapshotStore::open(&dir).expect("store should open");
        std::fs::remove_dir_all(&dir).expect("snapshot folder removed");
        let source = Arc::new(CountingSource {
            commit: Some("abc"),
            ..CountingSource::default()
        });
        let fetcher = SnapshotFetcher::new(store.clone(), source.clone());

        let outcome = fetcher.fetch(date("2024-01-06")).await;

        assert!(matches!(
            outcome,
            FetchOutcome::Unavailable(FetchUnavailable::Storage(_))
        ));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert!(!store.exists(date("2024-01-06")));
    }
}
