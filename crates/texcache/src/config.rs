//! # Loader Configuration
//!
//! Settings for the cache location, cacheable categories and HTTP client.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;

use crate::error::{ResourceError, Result};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 13) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Mobile Safari/537.36";

/// Category marker used when no cacheable roots are configured.
pub const DEFAULT_CACHEABLE_ROOT: &str = "miniGame/resource/";

/// What the processor does when a cacheable resource cannot be downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheFailureMode {
    /// Log the failure and resolve the load with no texture.
    #[default]
    Degrade,
    /// Return the `FetchFailed` error to the caller.
    Propagate,
}

/// Configuration for the image loader
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Directory holding cached remote images
    pub cache_dir: PathBuf,

    /// Base directory for bare local addresses
    pub asset_dir: PathBuf,

    /// Root markers whose resources are persisted before decoding
    pub cacheable_roots: Vec<String>,

    /// Behaviour when a cacheable download fails
    pub on_cache_failure: CacheFailureMode,

    /// Whether downloaded files are recorded in the keep-manifest
    pub pin_cached_files: bool,

    /// Overall timeout for a single HTTP request
    #[serde(with = "duration_secs")]
    pub timeout: Duration,

    /// Connection timeout
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// User agent string
    pub user_agent: String,

    /// Whether to use system proxy settings if available
    pub use_system_proxy: bool,

    /// Extra HTTP headers sent with every request
    pub headers: BTreeMap<String, String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("texcache"),
            asset_dir: PathBuf::from("."),
            cacheable_roots: vec![DEFAULT_CACHEABLE_ROOT.to_owned()],
            on_cache_failure: CacheFailureMode::default(),
            pin_cached_files: true,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            use_system_proxy: true,
            headers: BTreeMap::new(),
        }
    }
}

impl LoaderConfig {
    pub fn builder() -> crate::builder::LoaderConfigBuilder {
        crate::builder::LoaderConfigBuilder::new()
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ResourceError::Config(e.to_string()))
    }

    /// Build the header map sent with every request.
    pub fn header_map(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("image/avif,image/webp,image/png,image/*;q=0.8,*/*;q=0.5"),
        );

        for (name, value) in &self.headers {
            let name = name
                .parse::<HeaderName>()
                .map_err(|e| ResourceError::Config(format!("invalid header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ResourceError::Config(format!("invalid value for {name}: {e}")))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
