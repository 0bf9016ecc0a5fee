//! Collaborator abstractions
//!
//! The resolver never touches storage, locks or image processing directly.
//! It talks to these traits so the same protocol runs against in-memory
//! backends in tests and the local filesystem from the CLI.

pub mod image_engine;
pub mod local;
pub mod memory;

pub use image_engine::{content_type, ImageTransformEngine};
pub use local::{FileLockService, LocalFileStore};
pub use memory::{MemoryFileStore, MemoryLockService};

use crate::crop::Crop;
use crate::error::CropResult;
use crate::style::ImageStyle;
use crate::uri::StreamUri;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Named, non-blocking mutual exclusion
pub trait LockService: Send + Sync {
    /// Take the lock if it is free; never waits
    fn try_acquire(&self, name: &str) -> CropResult<bool>;

    /// Release a lock held by this service
    fn release(&self, name: &str);
}

/// Holds a lock until dropped
pub struct LockGuard {
    service: Arc<dyn LockService>,
    name: String,
}

impl LockGuard {
    /// Acquire `name`, or `None` if someone else holds it
    pub fn try_acquire(service: &Arc<dyn LockService>, name: &str) -> CropResult<Option<Self>> {
        if !service.try_acquire(name)? {
            debug!("Lock {} is held elsewhere", name);
            return Ok(None);
        }
        Ok(Some(Self {
            service: Arc::clone(service),
            name: name.to_string(),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.service.release(&self.name);
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").field("name", &self.name).finish()
    }
}

/// Byte storage addressed by stream URIs
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn exists(&self, uri: &StreamUri) -> CropResult<bool>;

    async fn read(&self, uri: &StreamUri) -> CropResult<Vec<u8>>;

    /// Write a complete file; readers never observe partial content
    async fn write(&self, uri: &StreamUri, bytes: &[u8]) -> CropResult<()>;

    /// Delete one file; returns whether it existed
    async fn delete(&self, uri: &StreamUri) -> CropResult<bool>;

    /// Delete a folder and everything below it; missing folders are fine
    async fn delete_recursive(&self, uri: &StreamUri) -> CropResult<()>;
}

/// Applies a style's effect chain to a source image
#[async_trait]
pub trait TransformEngine: Send + Sync {
    /// Write the derivative of `source` to `dest`
    ///
    /// Returns `false` when the engine declined to produce the file.
    async fn create_derivative(
        &self,
        style: &ImageStyle,
        source: &StreamUri,
        dest: &StreamUri,
        crop: Option<&Crop>,
    ) -> CropResult<bool>;
}

/// Outcome of a download access check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileAccess {
    /// Allowed, with headers to add to the response
    Allow(Vec<(String, String)>),
    Deny,
    NoOpinion,
}

/// Decides whether a non-public file may be downloaded
pub trait AccessPolicy: Send + Sync {
    fn file_download(&self, uri: &StreamUri) -> FileAccess;
}

/// Grants every download, marking responses private
#[derive(Debug, Clone, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn file_download(&self, _uri: &StreamUri) -> FileAccess {
        FileAccess::Allow(vec![(
            "Cache-Control".to_string(),
            "private".to_string(),
        )])
    }
}
