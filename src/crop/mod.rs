//! Contextual crop records
//!
//! A crop is a point or rectangle applied to one source image for one
//! usage context, so the same image can be framed differently wherever it
//! is shown. Records are owned by a [`CropStore`]; this crate only reads,
//! creates and updates them.
//!
//! # Identity
//!
//! At most one crop exists per (uri, crop type, context). Ids are non-zero;
//! "no crop" is `None` and renders as `0` in derivative paths.

pub mod plugin;
pub mod store;
pub mod use_case;

pub use plugin::{CropPlugin, CropPluginRegistry, CropTypeDefinition, FocalPoint, SaveCropRequest};
pub use store::{JsonCropStore, MemoryCropStore};
pub use use_case::{
    CropSettings, ImageItem, MediaParent, ReferenceOverride, References, UseCase, UseCaseRegistry,
};

use crate::error::{CropError, CropResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::num::NonZeroU64;
use tracing::debug;

/// Path segment used when no crop applies
pub const NO_CROP_SEGMENT: &str = "0";

/// Crop record identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CropId(NonZeroU64);

impl CropId {
    /// Wrap a raw id; zero is not a valid id
    pub fn new(id: u64) -> Option<Self> {
        NonZeroU64::new(id).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }

    /// Parse a derivative path segment; `0` means "no crop"
    pub fn from_segment(segment: &str) -> CropResult<Option<Self>> {
        let raw: u64 = segment
            .parse()
            .map_err(|_| CropError::NotFound(format!("invalid crop id '{}'", segment)))?;
        Ok(Self::new(raw))
    }

    /// Render an optional id as a derivative path segment
    pub fn segment(id: Option<Self>) -> String {
        id.map(|id| id.to_string())
            .unwrap_or_else(|| NO_CROP_SEGMENT.to_string())
    }
}

impl fmt::Display for CropId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Values for a crop that has not been stored yet
#[derive(Debug, Clone)]
pub struct NewCrop {
    pub crop_type: String,
    pub uri: String,
    pub context: String,
    pub file_id: u64,
}

/// A crop record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crop {
    /// Assigned on first save
    pub id: Option<CropId>,

    /// Crop type the record belongs to
    pub crop_type: String,

    /// Source image URI
    pub uri: String,

    /// Usage site, e.g. `node:article:5.field_image.0`
    pub context: String,

    /// Managed file record of the source image
    pub file_id: u64,

    /// Centre point
    pub x: i64,
    pub y: i64,

    /// Size (zero for point crops)
    pub width: u32,
    pub height: u32,
}

impl Crop {
    /// Unsaved crop with no adjustment
    pub fn new(values: NewCrop) -> Self {
        Self {
            id: None,
            crop_type: values.crop_type,
            uri: values.uri,
            context: values.context,
            file_id: values.file_id,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
        }
    }

    pub fn position(&self) -> (i64, i64) {
        (self.x, self.y)
    }

    /// Top-left corner
    pub fn anchor(&self) -> (i64, i64) {
        (
            self.x - i64::from(self.width / 2),
            self.y - i64::from(self.height / 2),
        )
    }

    pub fn set_position(&mut self, x: i64, y: i64) {
        self.x = x;
        self.y = y;
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Short digest of position and anchor
    ///
    /// Appended to derivative URLs so browsers and CDNs refetch an image
    /// whose crop changed while its path stayed the same.
    pub fn hash_token(&self) -> String {
        let (x, y) = self.position();
        let (ax, ay) = self.anchor();
        let mut hasher = Sha256::new();
        hasher.update(format!("{}{}{}{}", x, y, ax, ay).as_bytes());
        let digest = hex::encode(hasher.finalize());
        digest[..8].to_string()
    }
}

/// Storage for crop records
#[async_trait]
pub trait CropStore: Send + Sync {
    /// Load a crop by id
    async fn load(&self, id: CropId) -> CropResult<Option<Crop>>;

    /// Find the crop for a (uri, type, context) triple
    async fn find_by_keys(
        &self,
        uri: &str,
        crop_type: &str,
        context: &str,
    ) -> CropResult<Option<Crop>>;

    /// All crops whose context starts with `prefix`
    async fn find_by_context_prefix(&self, prefix: &str) -> CropResult<Vec<Crop>>;

    /// Managed file record id for a source URI
    async fn source_file_id(&self, uri: &str) -> CropResult<Option<u64>>;

    /// Build an unsaved crop
    fn create(&self, values: NewCrop) -> Crop {
        Crop::new(values)
    }

    /// Persist a crop, assigning an id if it has none
    ///
    /// Saving an unsaved crop whose triple already exists updates the
    /// existing record.
    async fn save(&self, crop: &mut Crop) -> CropResult<CropId>;
}

/// Load the crop for a context, or create an unsaved one
///
/// Fails with `NotFound` when the source has no managed file record.
pub async fn retrieve_contextual_crop(
    store: &dyn CropStore,
    context: &str,
    crop_type: &str,
    uri: &str,
) -> CropResult<Crop> {
    if let Some(crop) = store.find_by_keys(uri, crop_type, context).await? {
        return Ok(crop);
    }

    let file_id = store
        .source_file_id(uri)
        .await?
        .ok_or_else(|| CropError::NotFound(format!("no file record for {}", uri)))?;

    debug!("Creating {} crop for {} in context {}", crop_type, uri, context);
    Ok(store.create(NewCrop {
        crop_type: crop_type.to_string(),
        uri: uri.to_string(),
        context: context.to_string(),
        file_id,
    }))
}

/// Context prefix identifying an entity, optionally narrowed to a field
/// and delta: `entity_type:bundle:id.field.delta`
pub fn base_context(
    entity_type: &str,
    bundle: &str,
    entity_id: &str,
    field_name: Option<&str>,
    delta: Option<u32>,
) -> String {
    let mut context = format!("{}:{}:{}.", entity_type, bundle, entity_id);
    if let Some(field) = field_name {
        context.push_str(field);
    }
    if let Some(delta) = delta {
        context.push('.');
        context.push_str(&delta.to_string());
    }
    context
}
