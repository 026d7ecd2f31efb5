//! File download pass-through.
//!
//! Paths are validated before anything is sent upstream; accepted paths are
//! split on `/` and forwarded segment by segment, and the origin body is
//! handed back as a stream so no file is ever held in memory.

use tracing::{instrument, warn};

use crate::store::{ContentStore, RawObject};

/// Content type used when the origin does not declare one.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// The requested path could escape the repository root or is malformed.
    InvalidPath(String),
    /// The origin has no such file, or could not be reached.
    NotFound,
}

/// Validate a download path relative to the repository root.
///
/// Rejects empty paths, absolute paths, `..` segments and NUL bytes.  Both
/// `/` and `\` count as separators for the traversal check.  Returns the
/// non-empty segments to forward.
pub fn validate_relay_path(path: &str) -> Result<Vec<&str>, RelayError> {
    if path.is_empty() {
        return Err(RelayError::InvalidPath("path must not be empty".into()));
    }
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(RelayError::InvalidPath(format!(
            "absolute path not allowed: {path:?}"
        )));
    }
    if path.contains('\0') {
        return Err(RelayError::InvalidPath(format!(
            "NUL byte in path: {path:?}"
        )));
    }
    if path.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(RelayError::InvalidPath(format!(
            "parent segment in path: {path:?}"
        )));
    }

    // The first segment is non-empty: the path has no leading separator.
    Ok(path.split('/').filter(|s| !s.is_empty()).collect())
}

/// Validate `path` and open the corresponding file in the store.
#[instrument(skip(store))]
pub async fn relay(store: &dyn ContentStore, path: &str) -> Result<RawObject, RelayError> {
    let segments = validate_relay_path(path).inspect_err(|e| {
        warn!(?e, "rejected download path");
    })?;

    match store.fetch_raw(&segments).await {
        Ok(Some(object)) => Ok(object),
        Ok(None) => Err(RelayError::NotFound),
        Err(e) => {
            warn!(error = %format!("{e:#}"), "download failed upstream");
            Err(RelayError::NotFound)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
