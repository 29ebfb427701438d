pub mod github;

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::dates::SnapshotDate;

pub use github::{GithubManifestSource, GithubSourceConfig, GithubSourceError};

pub type ManifestSourceFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, ManifestSourceError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum ManifestSourceError {
    #[error("manifest source request timed out")]
    Timeout,
    #[error("manifest source request failed: {0}")]
    RequestFailed(String),
    #[error("manifest source returned an invalid payload: {0}")]
    InvalidPayload(String),
}

/// Commit-addressable origin of the manifest. Both calls are read-only.
pub trait ManifestSource: Send + Sync {
    fn resolve_commit<'a>(&'a self, date: SnapshotDate) -> ManifestSourceFuture<'a, Option<String>>;

    fn fetch_manifest<'a>(&'a self, commit: &'a str) -> ManifestSourceFuture<'a, String>;
}
