use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub listing: ListingConfig,
}

// ---------------------------------------------------------------------------
// Upstream content store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Full URL to the GitHub API root (e.g. `https://api.github.com`).
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Base URL serving raw file contents.
    #[serde(default = "default_raw_url")]
    pub raw_url: String,
    /// Repository holding the mods, as `owner/name`.
    pub repository: String,
    /// Branch that downloads and manifests are read from.
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Name of the environment variable that holds the bearer token.
    ///
    /// When the variable is unset or empty, requests go out anonymously.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// File name of the per-mod manifest inside each mod directory.
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
    /// Connect timeout (seconds) for every upstream call.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Read timeout (seconds) for every upstream call.  Also bounds listing
    /// and ping requests and each manifest resolution as a whole.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_raw_url() -> String {
    "https://raw.githubusercontent.com".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_manifest_file() -> String {
    "mod.json".to_string()
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_timeout() -> u64 {
    10
}

impl UpstreamConfig {
    /// Split `repository` into `(owner, name)`.
    pub fn owner_and_name(&self) -> Option<(&str, &str)> {
        let (owner, name) = self.repository.split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some((owner, name))
    }
}

// ---------------------------------------------------------------------------
// Proxy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Socket address for the HTTP listener (e.g. `0.0.0.0:5000`).
    #[serde(default = "default_http_listen")]
    pub http_listen: String,
    /// Environment variable that, when set, overrides the listen port.
    #[serde(default = "default_port_env")]
    pub port_env: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            http_listen: default_http_listen(),
            port_env: default_port_env(),
        }
    }
}

fn default_http_listen() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_port_env() -> String {
    "PORT".to_string()
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ListingConfig {
    /// Manifest fetches in flight at once while building a listing.
    #[serde(default = "default_listing_concurrency")]
    pub concurrency: usize,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            concurrency: default_listing_concurrency(),
        }
    }
}

fn default_listing_concurrency() -> usize {
    8
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load and validate a [`Config`] from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let mut config = parse_config(&contents)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config)?;
    Ok(config)
}

/// Parse a YAML document into a [`Config`] without validating it.
pub fn parse_config(contents: &str) -> Result<Config> {
    Ok(serde_yaml::from_str(contents)?)
}

/// Replace the listen port with the value of `proxy.port_env`, if set.
///
/// `lookup` abstracts the process environment so tests stay hermetic.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(port) = lookup(&config.proxy.port_env).filter(|p| !p.trim().is_empty()) else {
        return Ok(());
    };
    let port: u16 = port
        .trim()
        .parse()
        .with_context(|| format!("{} is not a valid port: {port:?}", config.proxy.port_env))?;

    let host = config
        .proxy
        .http_listen
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or("0.0.0.0");
    config.proxy.http_listen = format!("{host}:{port}");
    Ok(())
}

/// Basic sanity checks that cannot be expressed purely with serde.
pub fn validate_config(config: &Config) -> Result<()> {
    let upstream = &config.upstream;
    anyhow::ensure!(
        upstream.owner_and_name().is_some(),
        "upstream.repository must be of the form owner/name, got {:?}",
        upstream.repository
    );
    anyhow::ensure!(
        upstream.timeout_secs > 0 && upstream.connect_timeout_secs > 0,
        "upstream timeouts must be greater than zero"
    );
    anyhow::ensure!(
        upstream.connect_timeout_secs <= upstream.timeout_secs,
        "connect_timeout_secs must not exceed timeout_secs"
    );
    anyhow::ensure!(
        !upstream.manifest_file.is_empty() && !upstream.manifest_file.contains('/'),
        "manifest_file must be a bare file name"
    );
    anyhow::ensure!(
        !upstream.branch.is_empty(),
        "upstream.branch must not be empty"
    );
    anyhow::ensure!(
        config.listing.concurrency >= 1,
        "listing.concurrency must be at least 1"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
