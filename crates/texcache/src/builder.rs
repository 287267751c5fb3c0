//! # Builder for LoaderConfig
//!
//! Fluent construction of [`LoaderConfig`] instances.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use texcache::{CacheFailureMode, LoaderConfig};
//!
//! let config = LoaderConfig::builder()
//!     .with_cache_dir("/tmp/texcache")
//!     .with_cacheable_root("miniGame/resource/")
//!     .with_timeout(Duration::from_secs(15))
//!     .with_cache_failure_mode(CacheFailureMode::Propagate)
//!     .build();
//!
//! assert_eq!(config.timeout, Duration::from_secs(15));
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::config::{CacheFailureMode, LoaderConfig};

/// Builder for creating LoaderConfig instances with a fluent API
#[derive(Debug, Clone)]
pub struct LoaderConfigBuilder {
    config: LoaderConfig,
    roots_overridden: bool,
}

impl LoaderConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: LoaderConfig::default(),
            roots_overridden: false,
        }
    }

    /// Set the directory that holds cached files
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = dir.into();
        self
    }

    /// Set the base directory for bare local addresses
    pub fn with_asset_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.asset_dir = dir.into();
        self
    }

    /// Add a cacheable root marker.
    ///
    /// The first call replaces the default marker.
    pub fn with_cacheable_root(mut self, root: impl Into<String>) -> Self {
        if !self.roots_overridden {
            self.config.cacheable_roots.clear();
            self.roots_overridden = true;
        }
        self.config.cacheable_roots.push(root.into());
        self
    }

    pub fn with_cache_failure_mode(mut self, mode: CacheFailureMode) -> Self {
        self.config.on_cache_failure = mode;
        self
    }

    pub fn with_pinning(mut self, enabled: bool) -> Self {
        self.config.pin_cached_files = enabled;
        self
    }

    /// Set the overall timeout for a single HTTP request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set whether to follow redirects
    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Add a custom HTTP header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(name.into(), value.into());
        self
    }

    /// Set whether to use system proxy settings
    pub fn with_system_proxy(mut self, enabled: bool) -> Self {
        self.config.use_system_proxy = enabled;
        self
    }

    /// Build the final LoaderConfig
    pub fn build(self) -> LoaderConfig {
        self.config
    }
}

impl Default for LoaderConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_root_replaces_default() {
        let config = LoaderConfigBuilder::new()
            .with_cacheable_root("a/")
            .with_cacheable_root("b/")
            .build();
        assert_eq!(config.cacheable_roots, vec!["a/".to_string(), "b/".to_string()]);
    }

    #[test]
    fn untouched_builder_matches_default() {
        let config = LoaderConfigBuilder::default().build();
        assert_eq!(config.cacheable_roots, LoaderConfig::default().cacheable_roots);
        assert!(config.follow_redirects);
    }
}
