//! Per-mod manifest (`mod.json`) model and resolution.
//!
//! Resolution collapses every failure (missing file, store outage, timeout,
//! malformed JSON) into `None`.  Callers answer all of those with the same
//! "Mod not found" response; the cause is only visible in the logs.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::BytesMut;
use futures::TryStreamExt;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, warn};

use crate::store::ContentStore;

/// Manifests larger than this are treated as malformed.
pub const MAX_MANIFEST_BYTES: usize = 64 * 1024;

/// Descriptor of a single mod, read fresh from the store on every request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Manifest {
    /// Numeric versions are kept in their JSON spelling (`1.2` becomes `"1.2"`).
    #[serde(default, deserialize_with = "lenient_version")]
    pub version: Option<String>,
    /// Epoch seconds at which the mod becomes public.  Absent means public.
    #[serde(default)]
    pub release_timestamp: Option<i64>,
    /// Tier needed while the mod is still locked.
    #[serde(default)]
    pub tier_required: Option<String>,
    /// Anything other than a JSON boolean counts as absent.
    #[serde(default, deserialize_with = "lenient_bool")]
    pub auto_install: Option<bool>,
}

fn lenient_version<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => Some(b),
        _ => None,
    })
}

impl Manifest {
    pub fn release_timestamp(&self) -> i64 {
        self.release_timestamp.unwrap_or(0)
    }

    pub fn auto_install(&self) -> bool {
        self.auto_install.unwrap_or(false)
    }
}

/// Parse a manifest body.
pub fn parse_manifest(body: &[u8]) -> Result<Manifest> {
    serde_json::from_slice(body).context("manifest is not valid JSON")
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ManifestResolver {
    store: Arc<dyn ContentStore>,
    manifest_file: String,
    timeout: Duration,
}

impl ManifestResolver {
    pub fn new(store: Arc<dyn ContentStore>, manifest_file: &str, timeout: Duration) -> Self {
        Self {
            store,
            manifest_file: manifest_file.to_string(),
            timeout,
        }
    }

    /// Fetch and parse the manifest of `mod_name`.
    ///
    /// An empty name, `.` or `..` returns `None` without touching the store.
    pub async fn resolve(&self, mod_name: &str) -> Option<Manifest> {
        if matches!(mod_name, "" | "." | "..") {
            debug!(mod_name, "not a mod name");
            return None;
        }

        match tokio::time::timeout(self.timeout, self.fetch(mod_name)).await {
            Ok(Ok(Some(manifest))) => Some(manifest),
            Ok(Ok(None)) => {
                debug!(mod_name, "manifest not found");
                None
            }
            Ok(Err(e)) => {
                warn!(mod_name, error = %format!("{e:#}"), "manifest unavailable");
                None
            }
            Err(_) => {
                warn!(mod_name, timeout_secs = self.timeout.as_secs(), "manifest fetch timed out");
                None
            }
        }
    }

    async fn fetch(&self, mod_name: &str) -> Result<Option<Manifest>> {
        let Some(object) = self
            .store
            .fetch_raw(&[mod_name, self.manifest_file.as_str()])
            .await?
        else {
            return Ok(None);
        };

        let mut buf = BytesMut::new();
        let mut body = object.body;
        while let Some(chunk) = body.try_next().await.context("manifest body read failed")? {
            anyhow::ensure!(
                buf.len() + chunk.len() <= MAX_MANIFEST_BYTES,
                "manifest exceeds {MAX_MANIFEST_BYTES} bytes"
            );
            buf.extend_from_slice(&chunk);
        }

        parse_manifest(&buf).map(Some)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::testing::FakeStore;

    fn resolver(store: FakeStore) -> (Arc<FakeStore>, ManifestResolver) {
        let store = Arc::new(store);
        let resolver = ManifestResolver::new(store.clone(), "mod.json", Duration::from_secs(5));
        (store, resolver)
    }

    // ── Parsing ─────────────────────────────────────────────────────────

    #[test]
    fn parse_full_manifest() {
        let m = parse_manifest(
            br#"{"version":"1.2","release_timestamp":1700000000,"tier_required":"silver","auto_install":true}"#,
        )
        .unwrap();
        assert_eq!(m.version.as_deref(), Some("1.2"));
        assert_eq!(m.release_timestamp(), 1_700_000_000);
        assert_eq!(m.tier_required.as_deref(), Some("silver"));
        assert!(m.auto_install());
    }

    #[test]
    fn missing_fields_default() {
        let m = parse_manifest(b"{}").unwrap();
        assert_eq!(m.version, None);
        assert_eq!(m.release_timestamp(), 0);
        assert_eq!(m.tier_required, None);
        assert!(!m.auto_install());
    }

    #[test]
    fn null_release_timestamp_is_public() {
        let m = parse_manifest(br#"{"version":"1","release_timestamp":null}"#).unwrap();
        assert_eq!(m.release_timestamp(), 0);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let m = parse_manifest(br#"{"version":"1","changelog":["x"]}"#).unwrap();
        assert_eq!(m.version.as_deref(), Some("1"));
    }

    #[test]
    fn numeric_version_is_kept_as_written() {
        let m = parse_manifest(br#"{"version":1.2}"#).unwrap();
        assert_eq!(m.version.as_deref(), Some("1.2"));

        let m = parse_manifest(br#"{"version":3}"#).unwrap();
        assert_eq!(m.version.as_deref(), Some("3"));
    }

    #[test]
    fn non_scalar_version_is_absent() {
        let m = parse_manifest(br#"{"version":["1"],"release_timestamp":5}"#).unwrap();
        assert_eq!(m.version, None);
        assert_eq!(m.release_timestamp(), 5);
    }

    #[test]
    fn non_boolean_auto_install_is_absent() {
        for body in [
            br#"{"version":"1","auto_install":"true"}"#.as_slice(),
            br#"{"version":"1","auto_install":1}"#.as_slice(),
            br#"{"version":"1","auto_install":null}"#.as_slice(),
        ] {
            let m = parse_manifest(body).unwrap();
            assert_eq!(m.auto_install, None);
            assert!(!m.auto_install());
            assert_eq!(m.version.as_deref(), Some("1"));
        }
    }

    #[test]
    fn non_integer_timestamp_is_malformed() {
        assert!(parse_manifest(br#"{"release_timestamp":"soon"}"#).is_err());
    }

    #[test]
    fn non_object_is_malformed() {
        assert!(parse_manifest(b"[1,2,3]").is_err());
        assert!(parse_manifest(b"<html>404</html>").is_err());
    }

    // ── Resolution ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn resolves_existing_manifest() {
        let (store, resolver) =
            resolver(FakeStore::new().with_manifest("skyrim", json!({"version": "3.1"})));
        let m = resolver.resolve("skyrim").await.unwrap();
        assert_eq!(m.version.as_deref(), Some("3.1"));
        assert_eq!(store.calls(), vec!["skyrim/mod.json"]);
    }

    #[tokio::test]
    async fn empty_name_short_circuits() {
        let (store, resolver) = resolver(FakeStore::new());
        assert!(resolver.resolve("").await.is_none());
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn dot_names_short_circuit() {
        let (store, resolver) = resolver(FakeStore::new().with_file(
            "mod.json",
            None,
            br#"{"version":"root"}"#,
        ));
        assert!(resolver.resolve("..").await.is_none());
        assert!(resolver.resolve(".").await.is_none());
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn resolves_numeric_version_and_loose_install_flag() {
        let (_, resolver) = resolver(FakeStore::new().with_manifest(
            "skyrim",
            json!({"version": 1.2, "release_timestamp": 0, "auto_install": "true"}),
        ));
        let m = resolver.resolve("skyrim").await.unwrap();
        assert_eq!(m.version.as_deref(), Some("1.2"));
        assert_eq!(m.auto_install, None);
    }

    #[tokio::test]
    async fn missing_manifest_is_none() {
        let (_, resolver) = resolver(FakeStore::new().with_directory("empty"));
        assert!(resolver.resolve("empty").await.is_none());
    }

    #[tokio::test]
    async fn malformed_manifest_is_none() {
        let (_, resolver) = resolver(FakeStore::new().with_raw_manifest("bad", b"{not json"));
        assert!(resolver.resolve("bad").await.is_none());
    }

    #[tokio::test]
    async fn store_failure_is_none() {
        let (_, resolver) = resolver(
            FakeStore::new()
                .with_manifest("down", json!({"version": "1"}))
                .failing_path("down/mod.json"),
        );
        assert!(resolver.resolve("down").await.is_none());
    }

    #[tokio::test]
    async fn oversized_manifest_is_none() {
        let huge = format!(r#"{{"version":"{}"}}"#, "x".repeat(MAX_MANIFEST_BYTES));
        let (_, resolver) =
            resolver(FakeStore::new().with_raw_manifest("huge", huge.as_bytes()));
        assert!(resolver.resolve("huge").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_times_out_to_none() {
        let store = Arc::new(
            FakeStore::new()
                .with_manifest("slow", json!({"version": "1"}))
                .stalling(Duration::from_secs(60)),
        );
        let resolver = ManifestResolver::new(store, "mod.json", Duration::from_secs(10));
        assert!(resolver.resolve("slow").await.is_none());
    }
}
