//! # Downloader
//!
//! Fetches remote images into their cache location. A file present at the
//! cache location is a complete earlier download and is returned without any
//! network I/O. Transfers land in a sibling `.part` file and are renamed into
//! place only on success, so partial writes are never visible at the cache
//! path.
//!
//! Requests for the same cache path issued while a transfer is running share
//! that transfer instead of starting their own.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::fs;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ResourceError, Result};
use crate::ledger::CacheLedger;
use crate::transport::Transport;

type SharedTransfer = Shared<BoxFuture<'static, Result<PathBuf>>>;

/// Snapshot of downloader counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadStats {
    /// Requests answered from a file already on disk
    pub cache_hits: u64,
    /// Network transfers started
    pub transfers: u64,
    /// Transfers that ended in an error
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    cache_hits: AtomicU64,
    transfers: AtomicU64,
    failures: AtomicU64,
}

struct Inner {
    transport: Arc<dyn Transport>,
    ledger: Arc<dyn CacheLedger>,
    in_flight: Mutex<HashMap<PathBuf, SharedTransfer>>,
    counters: Counters,
}

/// Downloads remote files into the cache, at most once per cache path.
#[derive(Clone)]
pub struct Downloader {
    inner: Arc<Inner>,
}

impl Downloader {
    pub fn new(transport: Arc<dyn Transport>, ledger: Arc<dyn CacheLedger>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                ledger,
                in_flight: Mutex::new(HashMap::new()),
                counters: Counters::default(),
            }),
        }
    }

    /// Return `local_path` once it holds the content of `remote`.
    pub async fn fetch_to_cache(&self, remote: &Url, local_path: &Path) -> Result<PathBuf> {
        if fs::try_exists(local_path).await? {
            self.inner.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!(url = %remote, path = ?local_path, "Cache hit");
            self.inner.pin(local_path).await;
            return Ok(local_path.to_path_buf());
        }

        let transfer = {
            let mut in_flight = self.inner.in_flight.lock();
            match in_flight.get(local_path) {
                Some(pending) => {
                    debug!(url = %remote, path = ?local_path, "Joining in-flight transfer");
                    pending.clone()
                }
                None => {
                    let transfer = Arc::clone(&self.inner)
                        .transfer(remote.clone(), local_path.to_path_buf())
                        .boxed()
                        .shared();
                    in_flight.insert(local_path.to_path_buf(), transfer.clone());
                    transfer
                }
            }
        };

        transfer.await
    }

    pub fn stats(&self) -> DownloadStats {
        let c = &self.inner.counters;
        DownloadStats {
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            transfers: c.transfers.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
        }
    }

    /// Number of transfers currently running.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.lock().len()
    }
}

impl Inner {
    async fn transfer(self: Arc<Self>, remote: Url, local_path: PathBuf) -> Result<PathBuf> {
        let result = self.run_transfer(&remote, &local_path).await;
        self.in_flight.lock().remove(&local_path);
        if result.is_err() {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    async fn run_transfer(&self, remote: &Url, local_path: &Path) -> Result<PathBuf> {
        // A transfer for this path may have completed between the caller's
        // existence check and the in-flight registration.
        if fs::try_exists(local_path).await? {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            self.pin(local_path).await;
            return Ok(local_path.to_path_buf());
        }

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let part_path = part_path(local_path);
        self.counters.transfers.fetch_add(1, Ordering::Relaxed);
        debug!(url = %remote, path = ?local_path, "Cache miss, downloading");

        let status = match self.transport.download(remote, &part_path).await {
            Ok(status) => status,
            Err(e) => {
                remove_best_effort(&part_path).await;
                return Err(ResourceError::fetch(remote.as_str(), e));
            }
        };

        if status.is_client_error() || status.is_server_error() {
            remove_best_effort(&part_path).await;
            return Err(ResourceError::fetch(remote.as_str(), status));
        }

        if let Err(e) = fs::rename(&part_path, local_path).await {
            warn!(from = ?part_path, to = ?local_path, error = %e, "Failed to move download into cache");
            remove_best_effort(&part_path).await;
            return Err(e.into());
        }

        self.pin(local_path).await;

        debug!(url = %remote, path = ?local_path, "Cached download");
        Ok(local_path.to_path_buf())
    }

    /// Pin a cached file; failures are logged and retried on the next request.
    async fn pin(&self, local_path: &Path) {
        if let Err(e) = self.ledger.pin(local_path).await {
            warn!(path = ?local_path, error = %e, "Failed to pin cached file");
        }
    }
}

fn part_path(local_path: &Path) -> PathBuf {
    let mut name = local_path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".part");
    local_path.with_file_name(name)
}

async fn remove_best_effort(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!(path = ?path, "Removed partial download"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = ?path, error = %e, "Failed to remove partial download"),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::{FetchFailure, TransportError};
    use crate::ledger::{KeepManifest, NoopLedger};
    use async_trait::async_trait;
    use bytes::Bytes;
    use reqwest::StatusCode;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Scripted transport that counts calls.
    pub(crate) struct FakeTransport {
        pub status: StatusCode,
        pub body: Bytes,
        pub refuse: bool,
        pub delay: Duration,
        pub downloads: AtomicUsize,
        pub fetches: AtomicUsize,
    }

    impl FakeTransport {
        pub fn serving(body: impl Into<Bytes>) -> Self {
            Self {
                status: StatusCode::OK,
                body: body.into(),
                refuse: false,
                delay: Duration::ZERO,
                downloads: AtomicUsize::new(0),
                fetches: AtomicUsize::new(0),
            }
        }

        pub fn failing(status: StatusCode) -> Self {
            Self {
                status,
                ..Self::serving(Bytes::from_static(b"<html>error</html>"))
            }
        }

        pub fn refusing() -> Self {
            Self {
                refuse: true,
                ..Self::serving(Bytes::new())
            }
        }

        pub fn downloads(&self) -> usize {
            self.downloads.load(Ordering::SeqCst)
        }

        pub fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn download(
            &self,
            _url: &Url,
            destination: &Path,
        ) -> Result<StatusCode, TransportError> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.refuse {
                return Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into());
            }
            fs::write(destination, &self.body).await?;
            Ok(self.status)
        }

        async fn fetch(&self, _url: &Url) -> Result<(StatusCode, Bytes), TransportError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.refuse {
                return Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into());
            }
            Ok((self.status, self.body.clone()))
        }
    }

    fn url() -> Url {
        Url::parse("https://cdn.test/miniGame/resource/a.png").unwrap()
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("cdn.test").join("a.png");
        let transport = Arc::new(FakeTransport::serving("image"));
        let ledger = Arc::new(KeepManifest::open(dir.path()).await.unwrap());
        let downloader = Downloader::new(transport.clone(), ledger.clone());

        let first = downloader.fetch_to_cache(&url(), &target).await.unwrap();
        let second = downloader.fetch_to_cache(&url(), &target).await.unwrap();

        assert_eq!(first, target);
        assert_eq!(second, target);
        assert_eq!(transport.downloads(), 1);
        assert_eq!(std::fs::read(&target).unwrap(), b"image");
        assert!(!part_path(&target).exists());
        assert!(ledger.is_pinned(&target));
        assert_eq!(
            downloader.stats(),
            DownloadStats {
                cache_hits: 1,
                transfers: 1,
                failures: 0
            }
        );
    }

    #[tokio::test]
    async fn existing_file_is_never_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.png");
        std::fs::write(&target, b"from a previous run").unwrap();
        let transport = Arc::new(FakeTransport::serving("new"));
        let downloader = Downloader::new(transport.clone(), Arc::new(NoopLedger));

        downloader.fetch_to_cache(&url(), &target).await.unwrap();

        assert_eq!(transport.downloads(), 0);
        assert_eq!(std::fs::read(&target).unwrap(), b"from a previous run");
    }

    #[tokio::test]
    async fn cache_hit_pins_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.png");
        std::fs::write(&target, b"cached with pinning off").unwrap();
        let transport = Arc::new(FakeTransport::serving("new"));
        let ledger = Arc::new(KeepManifest::open(dir.path()).await.unwrap());
        let downloader = Downloader::new(transport.clone(), ledger.clone());
        assert!(!ledger.is_pinned(&target));

        downloader.fetch_to_cache(&url(), &target).await.unwrap();

        assert_eq!(transport.downloads(), 0);
        assert!(ledger.is_pinned(&target));
        let reopened = KeepManifest::open(dir.path()).await.unwrap();
        assert!(reopened.is_pinned(&target));
    }

    #[tokio::test]
    async fn error_status_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("cdn.test").join("a.png");
        let transport = Arc::new(FakeTransport::failing(StatusCode::NOT_FOUND));
        let ledger = Arc::new(KeepManifest::open(dir.path()).await.unwrap());
        let downloader = Downloader::new(transport, ledger.clone());

        let err = downloader.fetch_to_cache(&url(), &target).await.unwrap_err();

        match err {
            ResourceError::FetchFailed {
                url: failed,
                reason: FetchFailure::Status(status),
            } => {
                assert_eq!(failed, url().as_str());
                assert_eq!(status, StatusCode::NOT_FOUND);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!target.exists());
        assert!(!part_path(&target).exists());
        assert!(ledger.is_empty());
        assert_eq!(downloader.stats().failures, 1);
    }

    #[tokio::test]
    async fn transport_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.png");
        let downloader = Downloader::new(Arc::new(FakeTransport::refusing()), Arc::new(NoopLedger));

        let err = downloader.fetch_to_cache(&url(), &target).await.unwrap_err();

        assert!(matches!(
            err,
            ResourceError::FetchFailed {
                reason: FetchFailure::Transport(_),
                ..
            }
        ));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn failed_transfer_is_retried_on_next_call() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.png");
        let transport = Arc::new(FakeTransport::failing(StatusCode::SERVICE_UNAVAILABLE));
        let downloader = Downloader::new(transport.clone(), Arc::new(NoopLedger));

        assert!(downloader.fetch_to_cache(&url(), &target).await.is_err());
        assert!(downloader.fetch_to_cache(&url(), &target).await.is_err());

        assert_eq!(transport.downloads(), 2);
        assert_eq!(downloader.in_flight(), 0);
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("cdn.test").join("a.png");
        let transport = Arc::new(FakeTransport {
            delay: Duration::from_millis(50),
            ..FakeTransport::serving("image")
        });
        let downloader = Downloader::new(transport.clone(), Arc::new(NoopLedger));

        let remote = url();
        let results = futures::future::join_all(
            (0..8).map(|_| downloader.fetch_to_cache(&remote, &target)),
        )
        .await;

        assert!(results.iter().all(|r| r.as_ref().is_ok_and(|p| p == &target)));
        assert_eq!(transport.downloads(), 1);
        assert_eq!(downloader.in_flight(), 0);
    }

    #[test]
    fn part_path_is_a_sibling() {
        let path = Path::new("/cache/cdn.test/abc.png");
        assert_eq!(part_path(path), PathBuf::from("/cache/cdn.test/abc.png.part"));
    }
}
