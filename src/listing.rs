//! Mod listing with a change-detection digest.
//!
//! The listing is best-effort: an enumeration failure yields an empty
//! listing, and mods whose manifest cannot be resolved are left out.
//!
//! # Digest
//!
//! Entries are sorted by name and serialised compactly as
//! `[{"name":..,"version":..},..]`.  The digest is the first 16 bytes of the
//! SHA-256 of those bytes, hex-encoded.  It only serves as a "nothing
//! changed" token for clients.

use futures::StreamExt;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use crate::manifest::ManifestResolver;
use crate::store::ContentStore;

/// Bytes of the SHA-256 kept in the digest.
const DIGEST_BYTES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ListingEntry {
    pub name: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub hash: String,
    pub mods: Vec<ListingEntry>,
}

impl Listing {
    /// Build a listing from entries in any order.
    pub fn from_entries(mut entries: Vec<ListingEntry>) -> Self {
        entries.sort();
        let hash = listing_digest(&entries);
        Self {
            hash,
            mods: entries,
        }
    }
}

/// Digest of an already sorted slice of entries.
pub fn listing_digest(entries: &[ListingEntry]) -> String {
    // Serialising plain strings and options cannot fail.
    let canonical = serde_json::to_vec(entries).unwrap_or_default();
    let digest = Sha256::digest(&canonical);
    hex::encode(&digest[..DIGEST_BYTES])
}

/// Enumerate every mod directory and resolve its manifest.
///
/// At most `concurrency` manifest fetches are in flight at once.
#[instrument(skip_all)]
pub async fn list_bundles(
    store: &dyn ContentStore,
    resolver: &ManifestResolver,
    concurrency: usize,
) -> Listing {
    let names = match store.list_directories().await {
        Ok(names) => names,
        Err(e) => {
            warn!(error = %format!("{e:#}"), "mod enumeration failed; serving empty listing");
            Vec::new()
        }
    };

    let entries: Vec<ListingEntry> = futures::stream::iter(names)
        .map(|name| async move {
            match resolver.resolve(&name).await {
                Some(manifest) => Some(ListingEntry {
                    name,
                    version: manifest.version,
                }),
                None => {
                    debug!(%name, "skipping mod without a usable manifest");
                    None
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .filter_map(|entry| async move { entry })
        .collect()
        .await;

    Listing::from_entries(entries)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
