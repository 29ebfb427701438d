use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{ManifestSource, ManifestSourceError, ManifestSourceFuture};
use crate::config::ConfigError;
use crate::config_env::{
    optional_trimmed_env, parse_http_url_env, parse_u32_env, parse_u64_env, string_env_or,
};
use crate::dates::SnapshotDate;

const DEFAULT_API_BASE_URL: &str = "https://api.github.com";
const DEFAULT_RAW_BASE_URL: &str = "https://raw.githubusercontent.com";
const DEFAULT_REPO_OWNER: &str = "ltdrdata";
const DEFAULT_REPO_NAME: &str = "ComfyUI-Manager";
const DEFAULT_MANIFEST_PATH: &str = "custom-node-list.json";
const DEFAULT_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_RETRY_BASE_BACKOFF_MS: u64 = 250;

const GITHUB_JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const USER_AGENT: &str = concat!("comfydiff/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct GithubSourceConfig {
    pub api_base_url: String,
    pub raw_base_url: String,
    pub owner: String,
    pub repo: String,
    pub branch: Option<String>,
    pub manifest_path: String,
    pub token: Option<String>,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_base_backoff_ms: u64,
}

impl GithubSourceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let manifest_path = string_env_or("COMFYDIFF_MANIFEST_PATH", DEFAULT_MANIFEST_PATH)
            .trim_start_matches('/')
            .to_string();
        if manifest_path.is_empty() {
            return Err(ConfigError::InvalidConfiguration(
                "COMFYDIFF_MANIFEST_PATH must name a file".to_string(),
            ));
        }

        Ok(Self {
            api_base_url: parse_http_url_env("COMFYDIFF_API_BASE_URL", DEFAULT_API_BASE_URL)?,
            raw_base_url: parse_http_url_env("COMFYDIFF_RAW_BASE_URL", DEFAULT_RAW_BASE_URL)?,
            owner: string_env_or("COMFYDIFF_REPO_OWNER", DEFAULT_REPO_OWNER),
            repo: string_env_or("COMFYDIFF_REPO_NAME", DEFAULT_REPO_NAME),
            branch: optional_trimmed_env("COMFYDIFF_BRANCH"),
            manifest_path,
            token: optional_trimmed_env("COMFYDIFF_GITHUB_TOKEN"),
            timeout_ms: parse_u64_env("COMFYDIFF_HTTP_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)?,
            max_retries: parse_u32_env("COMFYDIFF_HTTP_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            retry_base_backoff_ms: parse_u64_env(
                "COMFYDIFF_HTTP_RETRY_BASE_BACKOFF_MS",
                DEFAULT_RETRY_BASE_BACKOFF_MS,
            )?,
        })
    }

    pub fn for_repository(owner: &str, repo: &str, manifest_path: &str) -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            raw_base_url: DEFAULT_RAW_BASE_URL.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: None,
            manifest_path: manifest_path.to_string(),
            token: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_backoff_ms: DEFAULT_RETRY_BASE_BACKOFF_MS,
        }
    }

    fn commits_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/commits",
            self.api_base_url, self.owner, self.repo
        )
    }

    fn raw_url(&self, commit: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.raw_base_url, self.owner, self.repo, commit, self.manifest_path
        )
    }
}

#[derive(Debug, Error)]
pub enum GithubSourceError {
    #[error("failed to build GitHub http client: {0}")]
    HttpClient(String),
}

#[derive(Clone)]
pub struct GithubManifestSource {
    client: reqwest::Client,
    config: GithubSourceConfig,
}

impl GithubManifestSource {
    pub fn new(config: GithubSourceConfig) -> Result<Self, GithubSourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| GithubSourceError::HttpClient(err.to_string()))?;

        Ok(Self { client, config })
    }

    async fn get_with_retries(
        &self,
        request: &GithubRequest<'_>,
    ) -> Result<String, ManifestSourceError> {
        let mut attempt = 0_u32;

        loop {
            match self.send_once(request).await {
                Ok(body) => return Ok(body),
                Err(err) => {
                    if err.retryable && attempt < self.config.max_retries {
                        let backoff_multiplier = 2_u64.saturating_pow(attempt);
                        let backoff_ms = self
                            .config
                            .retry_base_backoff_ms
                            .saturating_mul(backoff_multiplier);
                        warn!(
                            url = %request.url,
                            attempt = attempt + 1,
                            "transient GitHub failure, retrying in {backoff_ms}ms: {}",
                            err.error
                        );
                        sleep(Duration::from_millis(backoff_ms)).await;
                        attempt = attempt.saturating_add(1);
                        continue;
                    }

                    return Err(err.error);
                }
            }
        }
    }

    async fn send_once(&self, request: &GithubRequest<'_>) -> Result<String, AttemptError> {
        let mut builder = self.client.get(request.url).query(&request.query);
        if request.api {
            builder = builder.header(ACCEPT, GITHUB_JSON_MEDIA_TYPE);
            if let Some(token) = self.config.token.as_deref() {
                builder = builder.bearer_auth(token);
            }
        }

        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                AttemptError::retryable(ManifestSourceError::Timeout)
            } else {
                AttemptError::retryable(ManifestSourceError::RequestFailed(
                    "request_unavailable".to_string(),
                ))
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|_| {
            AttemptError::non_retryable(ManifestSourceError::InvalidPayload(
                "response_body_read_failed".to_string(),
            ))
        })?;

        if !status.is_success() {
            let error = ManifestSourceError::RequestFailed(format!("status={}", status.as_u16()));
            return Err(if is_retryable_status(status) {
                AttemptError::retryable(error)
            } else {
                AttemptError::non_retryable(error)
            });
        }

        Ok(body)
    }
}

impl ManifestSource for GithubManifestSource {
    fn resolve_commit<'a>(
        &'a self,
        date: SnapshotDate,
    ) -> ManifestSourceFuture<'a, Option<String>> {
        Box::pin(async move {
            let url = self.config.commits_url();
            let mut query = vec![
                ("path", self.config.manifest_path.clone()),
                ("until", format!("{date}T23:59:59Z")),
                ("per_page", "1".to_string()),
            ];
            if let Some(branch) = self.config.branch.as_deref() {
                query.push(("sha", branch.to_string()));
            }

            debug!(%date, url = %url, "resolving manifest commit");
            let body = self
                .get_with_retries(&GithubRequest {
                    url: &url,
                    query,
                    api: true,
                })
                .await?;

            let commits: Vec<GithubCommit> = serde_json::from_str(&body).map_err(|_| {
                ManifestSourceError::InvalidPayload("commit_list_parse_failed".to_string())
            })?;

            Ok(commits.into_iter().next().map(|commit| commit.sha))
        })
    }

    fn fetch_manifest<'a>(&'a self, commit: &'a str) -> ManifestSourceFuture<'a, String> {
        Box::pin(async move {
            let url = self.config.raw_url(commit);
            debug!(%commit, url = %url, "fetching manifest content");
            self.get_with_retries(&GithubRequest {
                url: &url,
                query: Vec::new(),
                api: false,
            })
            .await
        })
    }
}

struct GithubRequest<'a> {
    url: &'a str,
    query: Vec<(&'static str, String)>,
    api: bool,
}

#[derive(Debug)]
struct AttemptError {
    error: ManifestSourceError,
    retryable: bool,
}

impl AttemptError {
    fn retryable(error: ManifestSourceError) -> Self {
        Self {
            error,
            retryable: true,
        }
    }

    fn non_retryable(error: ManifestSourceError) -> Self {
        Self {
            error,
            retryable: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GithubCommit {
    sha: String,
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}
