//! Command-line interface
//!
//! Wires the resolver to the local filesystem: crops in a JSON file under
//! the state directory, derivatives under `files.root`, generation locks
//! as lock files.

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};

use crate::backend::{
    AccessPolicy, AllowAll, FileLockService, FileStore, ImageTransformEngine, LocalFileStore,
};
use crate::config::{Config, ConfigManager};
use crate::crop::JsonCropStore;
use crate::derivative::{Collaborators, DerivativeResolver};
use crate::error::CropResult;
use crate::uri::StreamUri;
use std::sync::Arc;
use tracing::debug;

/// A resolver over one site's files plus handles to its backends
pub struct Site {
    pub resolver: DerivativeResolver,
    pub crops: Arc<JsonCropStore>,
    pub files: Arc<LocalFileStore>,
}

impl Site {
    /// Open the site described by `config`
    ///
    /// With `grant`, every non-public download is allowed.
    pub async fn open(config: &Config, grant: bool) -> CropResult<Self> {
        ConfigManager::ensure_state_dirs(config).await?;

        let crops = Arc::new(JsonCropStore::open(ConfigManager::crop_store_path(config)).await?);
        let files = Arc::new(LocalFileStore::from_config(&config.files));
        let locks = Arc::new(FileLockService::new(ConfigManager::lock_dir(config)));
        let engine = Arc::new(ImageTransformEngine::new(files.clone()));

        let mut policies: Vec<Arc<dyn AccessPolicy>> = Vec::new();
        if grant {
            policies.push(Arc::new(AllowAll));
        }

        let resolver = DerivativeResolver::new(
            config.clone(),
            Collaborators {
                crops: crops.clone(),
                files: files.clone(),
                locks,
                engine,
                policies,
            },
        );

        Ok(Self {
            resolver,
            crops,
            files,
        })
    }

    /// Record a source image as a managed file if it exists on disk
    ///
    /// Crops can only be created for managed files.
    pub async fn register_source(&self, source_uri: &str) -> CropResult<()> {
        let source = StreamUri::parse(source_uri)?;
        if self.files.exists(&source).await? {
            let id = self.crops.register_file(&source.to_string()).await?;
            debug!("Source {} is file record {}", source, id);
        }
        Ok(())
    }
}
