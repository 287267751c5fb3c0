//! # Texture Loader
//!
//! Reads image bytes from a loadable address and decodes them into
//! [`TextureHandle`]s.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{ResourceError, Result};
use crate::path::Source;
use crate::transport::Transport;

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

/// Decoded RGBA8 image owned by the engine once handed out.
pub struct Texture {
    id: u64,
    source: String,
    width: u32,
    height: u32,
    pixels: RwLock<Option<Bytes>>,
}

/// Cheaply clonable handle to a decoded texture.
#[derive(Clone)]
pub struct TextureHandle(Arc<Texture>);

impl TextureHandle {
    pub fn new(source: impl Into<String>, width: u32, height: u32, pixels: Bytes) -> Self {
        Self(Arc::new(Texture {
            id: NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed),
            source: source.into(),
            width,
            height,
            pixels: RwLock::new(Some(pixels)),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Address the texture was decoded from.
    pub fn source(&self) -> &str {
        &self.0.source
    }

    pub fn width(&self) -> u32 {
        self.0.width
    }

    pub fn height(&self) -> u32 {
        self.0.height
    }

    /// RGBA8 pixel data, or `None` once disposed.
    pub fn pixels(&self) -> Option<Bytes> {
        self.0.pixels.read().clone()
    }

    /// Release the pixel data. Disposing twice is a no-op.
    pub fn dispose(&self) {
        if self.0.pixels.write().take().is_some() {
            debug!(id = self.0.id, source = %self.0.source, "Disposed texture");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.0.pixels.read().is_none()
    }

    /// Whether two handles hold the same image content.
    pub fn same_content(&self, other: &TextureHandle) -> bool {
        self.width() == other.width()
            && self.height() == other.height()
            && self.pixels() == other.pixels()
    }
}

impl fmt::Debug for TextureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureHandle")
            .field("id", &self.0.id)
            .field("source", &self.0.source)
            .field("width", &self.0.width)
            .field("height", &self.0.height)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Turns a loadable address into a texture.
#[async_trait]
pub trait TextureDecoder: Send + Sync {
    async fn decode(&self, loadable: &str) -> Result<TextureHandle>;
}

/// Decoder backed by the `image` crate.
pub struct TextureLoader {
    transport: Arc<dyn Transport>,
    asset_dir: PathBuf,
}

impl TextureLoader {
    pub fn new(transport: Arc<dyn Transport>, asset_dir: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            asset_dir: asset_dir.into(),
        }
    }

    async fn read_source(&self, loadable: &str) -> Result<Bytes> {
        match Source::classify(loadable)? {
            Source::Remote(url) => {
                let (status, body) = self
                    .transport
                    .fetch(&url)
                    .await
                    .map_err(|e| ResourceError::fetch(loadable, e))?;
                if status.is_client_error() || status.is_server_error() {
                    return Err(ResourceError::fetch(loadable, status));
                }
                Ok(body)
            }
            Source::File(path) => Ok(fs::read(&path).await?.into()),
            Source::Local(path) => Ok(fs::read(self.asset_dir.join(path)).await?.into()),
        }
    }
}

#[async_trait]
impl TextureDecoder for TextureLoader {
    async fn decode(&self, loadable: &str) -> Result<TextureHandle> {
        let bytes = match self.read_source(loadable).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(source = %loadable, error = %e, "Failed to read image");
                return Err(ResourceError::decode(loadable));
            }
        };

        let decoded = tokio::task::spawn_blocking(move || {
            image::load_from_memory(&bytes).map(|img| img.to_rgba8())
        })
        .await;

        let rgba = match decoded {
            Ok(Ok(rgba)) => rgba,
            Ok(Err(e)) => {
                warn!(source = %loadable, error = %e, "Failed to decode image");
                return Err(ResourceError::decode(loadable));
            }
            Err(e) => {
                warn!(source = %loadable, error = %e, "Decode task failed");
                return Err(ResourceError::decode(loadable));
            }
        };

        let (width, height) = rgba.dimensions();
        let texture = TextureHandle::new(loadable, width, height, Bytes::from(rgba.into_raw()));

        // Hand the texture back on the next scheduler turn, not from inside the
        // decode completion.
        tokio::task::yield_now().await;

        debug!(source = %loadable, width, height, id = texture.id(), "Decoded texture");
        Ok(texture)
    }
}
