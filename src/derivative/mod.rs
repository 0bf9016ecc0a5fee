//! Contextual derivative resolver
//!
//! Owns path computation and generation orchestration for contextually
//! cropped derivatives. Crops live in the [`CropStore`], bytes in the
//! [`FileStore`]; the resolver coordinates them.
//!
//! # Flow
//!
//! 1. Renderers call [`DerivativeResolver::contextualize`] or
//!    [`DerivativeResolver::build_public_url`] to get a URL.
//! 2. The inbound decoder maps a request path back to a [`DeliverRequest`].
//! 3. [`DerivativeResolver::deliver`] generates the file once and serves it.
//! 4. Style flushes and crop changes delete stale derivatives.

pub mod deliver;
pub mod invalidate;
pub mod path;

pub use deliver::{CropTarget, DeliverRequest, DerivativeResponse};
pub use path::{
    compose_url, contextual_folder, derivative_path, source_folder, UrlQuery, CONTEXTUAL_FOLDER,
};

use crate::backend::{AccessPolicy, FileStore, LockService, TransformEngine};
use crate::config::Config;
use crate::crop::{
    CropId, CropPluginRegistry, CropSettings, CropStore, CropTypeDefinition, ImageItem,
    SaveCropRequest,
};
use crate::error::CropResult;
use crate::style::{ImageStyle, StyleCropIndex, StyleRegistry};
use crate::uri::StreamUri;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// External services the resolver drives
#[derive(Clone)]
pub struct Collaborators {
    pub crops: Arc<dyn CropStore>,
    pub files: Arc<dyn FileStore>,
    pub locks: Arc<dyn LockService>,
    pub engine: Arc<dyn TransformEngine>,
    pub policies: Vec<Arc<dyn AccessPolicy>>,
}

/// Resolves, generates and invalidates contextual derivatives
pub struct DerivativeResolver {
    config: Config,
    styles: StyleRegistry,
    plugins: CropPluginRegistry,
    crop_types: Vec<CropTypeDefinition>,
    crop_index: StyleCropIndex,
    crops: Arc<dyn CropStore>,
    files: Arc<dyn FileStore>,
    locks: Arc<dyn LockService>,
    engine: Arc<dyn TransformEngine>,
    policies: Vec<Arc<dyn AccessPolicy>>,
}

impl DerivativeResolver {
    /// Build a resolver with styles and crop types from `config`
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let styles = StyleRegistry::from_config(&config);
        let plugins = CropPluginRegistry::from_config(&config);
        let crop_types = plugins.definitions();

        Self {
            config,
            styles,
            plugins,
            crop_types,
            crop_index: StyleCropIndex::new(),
            crops: collaborators.crops,
            files: collaborators.files,
            locks: collaborators.locks,
            engine: collaborators.engine,
            policies: collaborators.policies,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn styles(&self) -> &StyleRegistry {
        &self.styles
    }

    pub fn plugins(&self) -> &CropPluginRegistry {
        &self.plugins
    }

    pub fn crop_store(&self) -> &dyn CropStore {
        self.crops.as_ref()
    }

    /// Crop types consumed by a style, memoized per resolver
    fn style_crop_types(&self, style: &ImageStyle) -> Vec<String> {
        self.crop_index.crop_types(style, &self.crop_types)
    }

    /// Storage path of the derivative for a source, style and crop
    pub fn compute_derivative_path(
        &self,
        source_uri: &str,
        style_id: &str,
        crop_id: Option<CropId>,
    ) -> CropResult<StreamUri> {
        let source = StreamUri::parse(source_uri)?;
        let style = self.styles.get(style_id)?;
        derivative_path(style, &source, crop_id)
    }

    /// Access token for a style and source
    pub fn path_token(&self, style_id: &str, source_uri: &str) -> CropResult<String> {
        let source = StreamUri::parse(source_uri)?;
        let style = self.styles.get(style_id)?;
        Ok(style.path_token(&source, &self.config.image.private_key))
    }

    /// Hash of a stored crop's geometry, if the crop exists
    pub async fn crop_hash_token(&self, crop_id: Option<CropId>) -> CropResult<Option<String>> {
        let Some(id) = crop_id else {
            return Ok(None);
        };
        Ok(self.crops.load(id).await?.map(|crop| crop.hash_token()))
    }

    /// Public URL for a derivative path
    pub async fn build_public_url(
        &self,
        path: &StreamUri,
        source_uri: &str,
        style_id: &str,
        crop_id: Option<CropId>,
    ) -> CropResult<Url> {
        let token = if self.config.image.suppress_itok_output {
            None
        } else {
            Some(self.path_token(style_id, source_uri)?)
        };
        let query = UrlQuery {
            token,
            hash: self.crop_hash_token(crop_id).await?,
        };

        let exists = if self.config.image.clean_urls == Some(false) {
            self.files.exists(path).await?
        } else {
            true
        };

        compose_url(&self.config, path, &query, exists)
    }

    /// Save the crop described by `settings` and return the derivative URL
    ///
    /// A crop whose geometry changed has its existing derivatives deleted
    /// so they are regenerated with the new framing.
    pub async fn contextualize(
        &self,
        image: &ImageItem,
        style_id: &str,
        settings: &CropSettings,
    ) -> CropResult<Url> {
        let source = StreamUri::parse(&image.uri)?.to_string();
        let plugin = self.plugins.get(&settings.plugin_id)?;
        let crop_type = plugin.definition().stored_crop_type().to_string();
        self.styles.get(style_id)?;

        let before = self
            .crops
            .find_by_keys(&source, &crop_type, &settings.context)
            .await?;

        let crop_id = plugin
            .save_crop(
                self.crops.as_ref(),
                SaveCropRequest {
                    settings: &settings.crop_setting,
                    style_id,
                    uri: &source,
                    context: &settings.context,
                    width: image.width,
                    height: image.height,
                },
            )
            .await?;

        if let (Some(before), Some(id)) = (before, crop_id) {
            if let Some(after) = self.crops.load(id).await? {
                if before.position() != after.position() || before.anchor() != after.anchor() {
                    debug!("Crop {} moved, dropping its derivatives", id);
                    self.delete_derivatives_for_crop(&after).await?;
                }
            }
        }

        let path = self.compute_derivative_path(&source, style_id, crop_id)?;
        self.build_public_url(&path, &source, style_id, crop_id).await
    }
}
