//! # Host Registration
//!
//! Capability interface through which a host engine drives resource loading,
//! and the registry that maps resource type tags to handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::Result;
use crate::processor::{ImageProcessor, ResourceDescriptor};
use crate::texture::TextureHandle;

/// Type tag image handlers are registered under.
pub const IMAGE_TYPE: &str = "image";

/// Lookup of textures the host has already received.
pub trait ResourceHost: Send + Sync {
    fn get(&self, resource: &ResourceDescriptor) -> Option<TextureHandle>;
}

#[async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn on_load_start(
        &self,
        host: &dyn ResourceHost,
        resource: &ResourceDescriptor,
    ) -> Result<Option<TextureHandle>>;

    async fn on_remove_start(
        &self,
        host: &dyn ResourceHost,
        resource: &ResourceDescriptor,
    ) -> Result<()>;
}

#[async_trait]
impl ResourceHandler for ImageProcessor {
    async fn on_load_start(
        &self,
        _host: &dyn ResourceHost,
        resource: &ResourceDescriptor,
    ) -> Result<Option<TextureHandle>> {
        self.acquire(resource).await
    }

    async fn on_remove_start(
        &self,
        host: &dyn ResourceHost,
        resource: &ResourceDescriptor,
    ) -> Result<()> {
        match host.get(resource) {
            Some(texture) => self.release(&texture).await,
            None => debug!(resource = ?resource, "No texture to release"),
        }
        Ok(())
    }
}

/// Handlers keyed by resource type tag.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ResourceHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `type_tag`, returning the handler it replaces.
    pub fn register(
        &mut self,
        type_tag: impl Into<String>,
        handler: Arc<dyn ResourceHandler>,
    ) -> Option<Arc<dyn ResourceHandler>> {
        let type_tag = type_tag.into();
        info!(type_tag = %type_tag, "Registered resource handler");
        self.handlers.insert(type_tag, handler)
    }

    pub fn get(&self, type_tag: &str) -> Option<Arc<dyn ResourceHandler>> {
        self.handlers.get(type_tag).cloned()
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.handlers.contains_key(type_tag)
    }
}
