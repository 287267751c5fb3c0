//! # Cache Policy
//!
//! Decides from a resource root whether remote files should be persisted.

/// Decides whether resources under a root are worth persisting locally.
pub trait CachePolicy: Send + Sync {
    fn should_cache(&self, root: &str) -> bool;
}

/// Caches any root containing one of the configured category markers.
#[derive(Debug, Clone)]
pub struct CategoryPolicy {
    markers: Vec<String>,
}

impl CategoryPolicy {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(Into::into)
                .filter(|m: &String| !m.is_empty())
                .collect(),
        }
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }
}

impl CachePolicy for CategoryPolicy {
    fn should_cache(&self, root: &str) -> bool {
        self.markers.iter().any(|marker| root.contains(marker.as_str()))
    }
}
