//! Content store abstraction layer.
//!
//! Provides the [`ContentStore`] trait that encapsulates every read the proxy
//! makes against the repository hosting the mods.  Manifest resolution, the
//! listing aggregator and the file relay all dispatch through this trait so
//! that no host-specific URL construction leaks outside this module, and so
//! tests can substitute an in-memory store.

pub mod github;

use std::pin::Pin;

use anyhow::Result;
use bytes::Bytes;
use futures::Stream;

use crate::config::Config;
use crate::metrics::MetricsRegistry;

/// Body of a raw file, yielded chunk by chunk as the origin delivers it.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// A raw file the store answered with.
pub struct RawObject {
    /// `Content-Type` declared by the origin, if any.
    pub content_type: Option<String>,
    /// `Content-Length` declared by the origin, if any.
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl std::fmt::Debug for RawObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawObject")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Read-only access to the repository holding the mods.
///
/// Every call makes a single attempt bounded by the configured timeouts.
#[async_trait::async_trait]
pub trait ContentStore: Send + Sync {
    /// Fetch a raw file addressed by its path segments below the repository
    /// root.  Each segment is percent-encoded on its own.
    ///
    /// Returns `Ok(None)` when the origin answers with a non-success status,
    /// and `Err` on transport failure or timeout.
    async fn fetch_raw(&self, segments: &[&str]) -> Result<Option<RawObject>>;

    /// Names of the directories at the repository root, in store order.
    async fn list_directories(&self) -> Result<Vec<String>>;

    /// Cheap reachability probe used by the health endpoint.
    async fn ping(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Build the [`ContentStore`] implementation for the configured upstream.
pub fn build_store(config: &Config, metrics: MetricsRegistry) -> Result<Box<dyn ContentStore>> {
    let token = std::env::var(&config.upstream.token_env)
        .ok()
        .filter(|t| !t.is_empty());
    if token.is_none() {
        tracing::info!(
            token_env = %config.upstream.token_env,
            "no upstream token configured, using anonymous access"
        );
    }
    Ok(Box::new(github::GitHubStore::new(
        &config.upstream,
        token,
        metrics,
    )?))
}

// ---------------------------------------------------------------------------
// In-memory store for tests
// ---------------------------------------------------------------------------
