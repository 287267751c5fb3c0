//! # Path Resolver
//!
//! Classifies resource addresses and maps remote addresses onto stable
//! locations inside the cache directory.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{ResourceError, Result};

const REMOTE_SCHEMES: [&str; 2] = ["http://", "https://"];

/// Longest file extension kept on cached file names.
const MAX_EXTENSION_LEN: usize = 5;

/// Returns true if `address` uses a network scheme.
pub fn is_remote(address: &str) -> bool {
    REMOTE_SCHEMES.iter().any(|scheme| {
        address
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    })
}

/// Where the bytes of a decodable address come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// An `http(s)://` address
    Remote(Url),
    /// A `file://` URL produced by [`PathResolver::to_loadable_path`]
    File(PathBuf),
    /// A bare path relative to the asset directory (or absolute)
    Local(PathBuf),
}

impl Source {
    /// Classify a loadable address.
    pub fn classify(address: &str) -> Result<Self> {
        if is_remote(address) {
            let url = Url::parse(address)
                .map_err(|e| ResourceError::InvalidUrl(format!("{address}: {e}")))?;
            return Ok(Source::Remote(url));
        }

        if let Ok(url) = Url::parse(address)
            && url.scheme() == "file"
        {
            let path = url
                .to_file_path()
                .map_err(|_| ResourceError::InvalidUrl(address.to_owned()))?;
            return Ok(Source::File(path));
        }

        Ok(Source::Local(PathBuf::from(address)))
    }
}

/// Maps remote addresses to cache paths and cache paths to loadable addresses.
#[derive(Debug, Clone)]
pub struct PathResolver {
    cache_dir: PathBuf,
}

impl PathResolver {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn is_remote(&self, address: &str) -> bool {
        is_remote(address)
    }

    /// Deterministic cache location for a remote address.
    ///
    /// Layout: `<cache_dir>/<host[_port]>/<sha256 of normalized url>[.ext]`.
    /// Normalization lower-cases the host, drops default ports, resolves dot
    /// segments and strips the fragment.
    pub fn resolve_local_path(&self, address: &str) -> Result<PathBuf> {
        if !is_remote(address) {
            return Err(ResourceError::InvalidUrl(format!(
                "{address}: not a remote address"
            )));
        }

        let mut url =
            Url::parse(address).map_err(|e| ResourceError::InvalidUrl(format!("{address}: {e}")))?;
        url.set_fragment(None);

        let mut host_dir = sanitize(url.host_str().unwrap_or("unknown-host"));
        if let Some(port) = url.port() {
            host_dir.push('_');
            host_dir.push_str(&port.to_string());
        }

        let mut hasher = Sha256::new();
        hasher.update(url.as_str().as_bytes());
        let mut file_name = hex::encode(hasher.finalize());

        if let Some(ext) = extension_of(&url) {
            file_name.push('.');
            file_name.push_str(&ext);
        }

        Ok(self.cache_dir.join(host_dir).join(file_name))
    }

    /// Convert a storage path into the address form the decoder accepts.
    pub fn to_loadable_path(&self, path: &Path) -> Result<String> {
        let absolute = std::path::absolute(path)?;
        Url::from_file_path(&absolute)
            .map(String::from)
            .map_err(|_| ResourceError::InvalidUrl(absolute.display().to_string()))
    }
}

fn sanitize(component: &str) -> String {
    // An all-dot or empty host would name the cache dir itself or its parent.
    if component.chars().all(|c| c == '.') {
        return "_".to_owned();
    }

    component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn extension_of(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    let (_, ext) = last.rsplit_once('.')?;
    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
