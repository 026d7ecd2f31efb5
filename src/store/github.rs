//! GitHub-hosted content store.
//!
//! Raw files come from the raw-content host (`{raw_url}/{owner}/{repo}/{branch}/...`),
//! the root directory listing from the REST contents API.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::TryStreamExt;
use reqwest::Url;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use tracing::debug;

use crate::config::UpstreamConfig;
use crate::metrics::{MetricsRegistry, UpstreamEndpoint, UpstreamLabels};

use super::{ContentStore, RawObject};

const API_ACCEPT: &str = "application/vnd.github.v3+json";

// ---------------------------------------------------------------------------
// Store struct
// ---------------------------------------------------------------------------

pub struct GitHubStore {
    client: reqwest::Client,
    api_url: String,
    raw_url: String,
    owner: String,
    repo: String,
    branch: String,
    token: Option<String>,
    request_timeout: Duration,
    metrics: MetricsRegistry,
}

impl GitHubStore {
    pub fn new(
        upstream: &UpstreamConfig,
        token: Option<String>,
        metrics: MetricsRegistry,
    ) -> Result<Self> {
        let (owner, repo) = upstream
            .owner_and_name()
            .with_context(|| format!("invalid repository {:?}", upstream.repository))?;

        let request_timeout = Duration::from_secs(upstream.timeout_secs);
        let client = reqwest::Client::builder()
            .user_agent(concat!("modgate/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(upstream.connect_timeout_secs))
            .read_timeout(request_timeout)
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            client,
            api_url: upstream.api_url.trim_end_matches('/').to_string(),
            raw_url: upstream.raw_url.trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: upstream.branch.clone(),
            token,
            request_timeout,
            metrics,
        })
    }

    /// URL of a raw file.  Every segment is percent-encoded separately.
    fn raw_file_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.raw_url)
            .with_context(|| format!("invalid raw_url: {}", self.raw_url))?;
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("raw_url cannot be a base: {}", self.raw_url))?
            .pop_if_empty()
            .push(&self.owner)
            .push(&self.repo)
            .extend(self.branch.split('/'))
            .extend(segments);
        Ok(url)
    }

    /// URL of the repository resource in the REST API, with `extra` segments
    /// appended.
    fn api_repo_url(&self, extra: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.api_url)
            .with_context(|| format!("invalid api_url: {}", self.api_url))?;
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("api_url cannot be a base: {}", self.api_url))?
            .pop_if_empty()
            .push("repos")
            .push(&self.owner)
            .push(&self.repo)
            .extend(extra);
        Ok(url)
    }

    fn contents_url(&self) -> Result<Url> {
        let mut url = self.api_repo_url(&["contents"])?;
        url.query_pairs_mut().append_pair("ref", &self.branch);
        Ok(url)
    }

    /// Attach the bearer credential when one is configured.
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }

    /// Send a request once, recording upstream metrics for `endpoint`.
    async fn send(
        &self,
        endpoint: UpstreamEndpoint,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let labels = UpstreamLabels { endpoint };
        let metrics = &self.metrics.metrics;
        metrics.upstream_requests_total.get_or_create(&labels).inc();

        let started = Instant::now();
        let result = self.authorize(request).send().await;
        metrics
            .upstream_duration_seconds
            .get_or_create(&labels)
            .observe(started.elapsed().as_secs_f64());

        result.map_err(|e| {
            metrics.upstream_errors_total.get_or_create(&labels).inc();
            anyhow::Error::new(e)
        })
    }
}

// ---------------------------------------------------------------------------
// Trait implementation
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
impl ContentStore for GitHubStore {
    async fn fetch_raw(&self, segments: &[&str]) -> Result<Option<RawObject>> {
        let url = self.raw_file_url(segments)?;

        let resp = self
            .send(UpstreamEndpoint::Raw, self.client.get(url.clone()))
            .await
            .with_context(|| format!("GET {url} failed"))?;

        let status = resp.status();
        if !status.is_success() {
            debug!(%url, %status, "content store returned non-success for raw file");
            return Ok(None);
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let content_length = resp.content_length();
        let body = resp.bytes_stream().map_err(std::io::Error::other);

        Ok(Some(RawObject {
            content_type,
            content_length,
            body: Box::pin(body),
        }))
    }

    async fn list_directories(&self) -> Result<Vec<String>> {
        let url = self.contents_url()?;

        let request = self
            .client
            .get(url.clone())
            .header(ACCEPT, API_ACCEPT)
            .timeout(self.request_timeout);
        let resp = self
            .send(UpstreamEndpoint::Listing, request)
            .await
            .with_context(|| format!("GET {url} failed"))?;

        let status = resp.status();
        anyhow::ensure!(
            status.is_success(),
            "contents listing returned {status} for {url}"
        );

        let entries: Vec<ContentsEntry> = resp
            .json()
            .await
            .context("failed to parse contents listing")?;

        Ok(directory_names(entries))
    }

    async fn ping(&self) -> Result<()> {
        let url = self.api_repo_url(&[])?;

        let request = self
            .client
            .head(url.clone())
            .header(ACCEPT, API_ACCEPT)
            .timeout(self.request_timeout);
        let resp = self
            .send(UpstreamEndpoint::Ping, request)
            .await
            .with_context(|| format!("HEAD {url} failed"))?;

        let status = resp.status();
        anyhow::ensure!(
            status.is_success() || status.is_redirection(),
            "HEAD {url} returned {status}"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// One element of the contents API array.
#[derive(Debug, Deserialize)]
struct ContentsEntry {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

/// Keep directory entries, in the order the API returned them.
fn directory_names(entries: Vec<ContentsEntry>) -> Vec<String> {
    entries
        .into_iter()
        .filter(|e| e.kind == "dir")
        .map(|e| e.name)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
