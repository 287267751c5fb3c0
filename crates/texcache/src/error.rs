use std::sync::Arc;

use reqwest::StatusCode;

/// Error code carried by every decode failure.
pub const DECODE_ERROR_CODE: u32 = 1001;

/// Errors raised while loading or caching an image resource.
#[derive(Debug, thiserror::Error, Clone)]
pub enum ResourceError {
    #[error("Failed to fetch {url}: {reason}")]
    FetchFailed { url: String, reason: FetchFailure },

    #[error("Failed to decode {path} (code {code})")]
    DecodeFailed { path: String, code: u32 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: Arc<std::io::Error>,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ResourceError {
    pub(crate) fn fetch(url: impl Into<String>, reason: impl Into<FetchFailure>) -> Self {
        ResourceError::FetchFailed {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn decode(path: impl Into<String>) -> Self {
        ResourceError::DecodeFailed {
            path: path.into(),
            code: DECODE_ERROR_CODE,
        }
    }

    /// Numeric code of a decode failure, if this is one.
    pub fn code(&self) -> Option<u32> {
        match self {
            ResourceError::DecodeFailed { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ResourceError {
    fn from(err: std::io::Error) -> Self {
        ResourceError::Io {
            source: Arc::new(err),
        }
    }
}

/// Why a network transfer did not produce a usable file.
#[derive(Debug, thiserror::Error, Clone)]
pub enum FetchFailure {
    #[error("server returned status code {0}")]
    Status(StatusCode),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl From<StatusCode> for FetchFailure {
    fn from(status: StatusCode) -> Self {
        FetchFailure::Status(status)
    }
}

/// Failure of the transport itself: no response was obtained or the body
/// could not be written out.
#[derive(Debug, thiserror::Error, Clone)]
pub enum TransportError {
    #[error("Network error: {source}")]
    Network {
        #[from]
        source: Arc<reqwest::Error>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: Arc<std::io::Error>,
    },
}

// Manual implementations because of the Arc wrapping.
impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Network {
            source: Arc::new(err),
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io {
            source: Arc::new(err),
        }
    }
}

pub type Result<T, E = ResourceError> = std::result::Result<T, E>;
