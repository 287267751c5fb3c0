//! # Image Processor
//!
//! Composes path resolution, cache policy, the downloader and the texture
//! loader into the two engine-facing operations, [`ImageProcessor::acquire`]
//! and [`ImageProcessor::release`].
//!
//! Per request:
//!
//! ```text
//! classify ──local──────────────────────────────► decode(address)
//!    │
//!    └─remote─► policy ──not cacheable──────────► decode(address)
//!                  │
//!                  └─cacheable─► resolve path ─► download ─► decode(file url)
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::{CacheFailureMode, LoaderConfig};
use crate::downloader::Downloader;
use crate::error::{ResourceError, Result};
use crate::ledger::{CacheLedger, KeepManifest, NoopLedger};
use crate::path::PathResolver;
use crate::policy::{CachePolicy, CategoryPolicy};
use crate::texture::{TextureDecoder, TextureHandle, TextureLoader};
use crate::transport::{HttpTransport, Transport};

/// A logical root plus a locator relative to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub root: String,
    pub url: String,
}

impl ResourceDescriptor {
    pub fn new(root: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            url: url.into(),
        }
    }

    /// `root + url`.
    pub fn address(&self) -> String {
        format!("{}{}", self.root, self.url)
    }
}

/// Cache-aware image loader.
pub struct ImageProcessor {
    resolver: PathResolver,
    policy: Arc<dyn CachePolicy>,
    downloader: Downloader,
    decoder: Arc<dyn TextureDecoder>,
    on_cache_failure: CacheFailureMode,
}

impl ImageProcessor {
    /// Wire up the default HTTP transport, keep-manifest and decoder.
    pub async fn new(config: &LoaderConfig) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::from_config(config)?);

        let ledger: Arc<dyn CacheLedger> = if config.pin_cached_files {
            Arc::new(KeepManifest::open(&config.cache_dir).await?)
        } else {
            Arc::new(NoopLedger)
        };

        Ok(Self::from_parts(
            PathResolver::new(&config.cache_dir),
            Arc::new(CategoryPolicy::new(config.cacheable_roots.iter().cloned())),
            Downloader::new(transport.clone(), ledger),
            Arc::new(TextureLoader::new(transport, &config.asset_dir)),
            config.on_cache_failure,
        ))
    }

    pub fn from_parts(
        resolver: PathResolver,
        policy: Arc<dyn CachePolicy>,
        downloader: Downloader,
        decoder: Arc<dyn TextureDecoder>,
        on_cache_failure: CacheFailureMode,
    ) -> Self {
        Self {
            resolver,
            policy,
            downloader,
            decoder,
            on_cache_failure,
        }
    }

    pub fn downloader(&self) -> &Downloader {
        &self.downloader
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Load the texture for `descriptor`.
    ///
    /// `Ok(None)` is returned when a cacheable resource could not be
    /// downloaded and the processor is configured to degrade.
    #[instrument(skip(self), level = "debug")]
    pub async fn acquire(&self, descriptor: &ResourceDescriptor) -> Result<Option<TextureHandle>> {
        let address = descriptor.address();

        if !self.resolver.is_remote(&address) {
            debug!(address = %address, "Loading local image");
            return self.decoder.decode(&address).await.map(Some);
        }

        if !self.policy.should_cache(&descriptor.root) {
            debug!(address = %address, "Loading remote image without caching");
            return self.decoder.decode(&address).await.map(Some);
        }

        match self.fetch_cached(&address).await {
            Ok(loadable) => self.decoder.decode(&loadable).await.map(Some),
            Err(e) => match self.on_cache_failure {
                CacheFailureMode::Degrade => {
                    warn!(address = %address, error = %e, "Cached load failed, returning no texture");
                    Ok(None)
                }
                CacheFailureMode::Propagate => Err(e),
            },
        }
    }

    /// Dispose a texture previously returned by [`acquire`](Self::acquire).
    #[instrument(skip(self), level = "debug")]
    pub async fn release(&self, handle: &TextureHandle) {
        handle.dispose();
    }

    async fn fetch_cached(&self, address: &str) -> Result<String> {
        let remote = Url::parse(address)
            .map_err(|e| ResourceError::InvalidUrl(format!("{address}: {e}")))?;
        let local_path = self.resolver.resolve_local_path(address)?;
        let cached = self.downloader.fetch_to_cache(&remote, &local_path).await?;
        self.resolver.to_loadable_path(&cached)
    }
}
