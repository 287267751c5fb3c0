//! # Cache Ledger
//!
//! Records which cached files must be kept by storage accounting outside this
//! crate. The existence of a cached file is the cache record itself; the
//! ledger only pins it.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::fs;
use tokio::io;
use tracing::{debug, warn};

/// File name of the keep-manifest inside the cache directory.
pub const MANIFEST_FILE: &str = ".keep.json";

#[async_trait]
pub trait CacheLedger: Send + Sync {
    /// Mark `path` as one that must not be reclaimed.
    async fn pin(&self, path: &Path) -> io::Result<()>;

    fn is_pinned(&self, path: &Path) -> bool;
}

/// Ledger that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLedger;

#[async_trait]
impl CacheLedger for NoopLedger {
    async fn pin(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    fn is_pinned(&self, _path: &Path) -> bool {
        false
    }
}

/// JSON keep-manifest persisted next to the cached files.
#[derive(Debug)]
pub struct KeepManifest {
    manifest_path: PathBuf,
    pinned: Mutex<BTreeSet<PathBuf>>,
    // Serializes manifest writes so the last rename always carries the full set.
    write_lock: tokio::sync::Mutex<()>,
}

impl KeepManifest {
    /// Open the manifest in `cache_dir`, loading any previously pinned paths.
    ///
    /// An unreadable or corrupt manifest is discarded.
    pub async fn open(cache_dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(cache_dir).await?;
        let manifest_path = cache_dir.join(MANIFEST_FILE);

        let pinned = match fs::read(&manifest_path).await {
            Ok(bytes) => match serde_json::from_slice::<BTreeSet<PathBuf>>(&bytes) {
                Ok(set) => set,
                Err(e) => {
                    warn!(path = ?manifest_path, error = %e, "Discarding corrupt keep-manifest");
                    BTreeSet::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => return Err(e),
        };

        debug!(path = ?manifest_path, entries = pinned.len(), "Opened keep-manifest");

        Ok(Self {
            manifest_path,
            pinned: Mutex::new(pinned),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn len(&self) -> usize {
        self.pinned.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pinned.lock().is_empty()
    }

    async fn persist(&self) -> io::Result<()> {
        let _guard = self.write_lock.lock().await;

        let json = {
            let pinned = self.pinned.lock();
            serde_json::to_vec_pretty(&*pinned)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        };

        let temp_path = self.manifest_path.with_extension("tmp");
        fs::write(&temp_path, &json).await?;
        if let Err(e) = fs::rename(&temp_path, &self.manifest_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl CacheLedger for KeepManifest {
    async fn pin(&self, path: &Path) -> io::Result<()> {
        let inserted = self.pinned.lock().insert(path.to_path_buf());
        if !inserted {
            return Ok(());
        }

        if let Err(e) = self.persist().await {
            // Leave the path unpinned so the next pin writes it again.
            self.pinned.lock().remove(path);
            return Err(e);
        }
        Ok(())
    }

    fn is_pinned(&self, path: &Path) -> bool {
        self.pinned.lock().contains(path)
    }
}
