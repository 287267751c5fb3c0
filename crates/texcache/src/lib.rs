//! # texcache
//!
//! Image loading with selective on-disk caching for network resources.
//!
//! Local addresses and remote addresses outside the cacheable categories are
//! decoded directly. Remote addresses in a cacheable category are downloaded
//! once into a deterministic location under the cache directory and decoded
//! from there on every later request, including after a restart.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use texcache::{HandlerRegistry, IMAGE_TYPE, ImageProcessor, LoaderConfig, ResourceDescriptor};
//!
//! # async fn run() -> Result<(), texcache::ResourceError> {
//! let config = LoaderConfig::builder()
//!     .with_cache_dir("/data/usr/texcache")
//!     .with_cacheable_root("miniGame/resource/")
//!     .build();
//!
//! let processor = Arc::new(ImageProcessor::new(&config).await?);
//! let mut registry = HandlerRegistry::new();
//! registry.register(IMAGE_TYPE, processor.clone());
//!
//! let descriptor = ResourceDescriptor::new("https://cdn.example.com/miniGame/resource/", "hero.png");
//! if let Some(texture) = processor.acquire(&descriptor).await? {
//!     println!("{}x{}", texture.width(), texture.height());
//!     processor.release(&texture).await;
//! }
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod downloader;
pub mod error;
pub mod host;
pub mod ledger;
pub mod path;
pub mod policy;
pub mod processor;
pub mod texture;
pub mod transport;

pub use builder::LoaderConfigBuilder;
pub use config::{CacheFailureMode, LoaderConfig};
pub use downloader::{DownloadStats, Downloader};
pub use error::{DECODE_ERROR_CODE, FetchFailure, ResourceError, TransportError};
pub use host::{HandlerRegistry, IMAGE_TYPE, ResourceHandler, ResourceHost};
pub use ledger::{CacheLedger, KeepManifest, NoopLedger};
pub use path::{PathResolver, Source, is_remote};
pub use policy::{CachePolicy, CategoryPolicy};
pub use processor::{ImageProcessor, ResourceDescriptor};
pub use texture::{TextureDecoder, TextureHandle, TextureLoader};
pub use transport::{HttpTransport, Transport, create_client};
