//! Crop-type plugins
//!
//! Each registered crop type knows which style effects consume it, which
//! override field carries its settings, and how to turn those settings into
//! a stored crop. The registry is an explicit map built from configuration.

use super::{retrieve_contextual_crop, CropId, CropStore};
use crate::config::Config;
use crate::error::{CropError, CropResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Static description of a crop type plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CropTypeDefinition {
    pub id: String,
    pub label: String,
    pub target_field_name: String,
    pub image_style_effects: Vec<String>,
    pub crop_type: Option<String>,
}

impl CropTypeDefinition {
    /// All definitions declared in configuration
    pub fn from_config(config: &Config) -> Vec<Self> {
        config
            .crop_types
            .iter()
            .map(|(id, def)| Self {
                id: id.clone(),
                label: def.label.clone(),
                target_field_name: def.target_field_name.clone(),
                image_style_effects: def.image_style_effects.clone(),
                crop_type: def.crop_type.clone(),
            })
            .collect()
    }

    /// Crop type stored on records created by this plugin
    pub fn stored_crop_type(&self) -> &str {
        self.crop_type.as_deref().unwrap_or(&self.id)
    }
}

/// Inputs for saving a contextual crop
#[derive(Debug, Clone, Copy)]
pub struct SaveCropRequest<'a> {
    /// Plugin-specific settings string
    pub settings: &'a str,
    pub style_id: &'a str,
    pub uri: &'a str,
    pub context: &'a str,
    /// Source image dimensions
    pub width: u32,
    pub height: u32,
}

/// A crop type implementation
#[async_trait]
pub trait CropPlugin: Send + Sync {
    fn definition(&self) -> &CropTypeDefinition;

    /// Create or update the crop for a context, returning its id
    ///
    /// `None` means the crop matches the default and was left unsaved.
    async fn save_crop(
        &self,
        store: &dyn CropStore,
        request: SaveCropRequest<'_>,
    ) -> CropResult<Option<CropId>>;
}

/// Point crop positioned from relative `x,y` percentages
#[derive(Debug, Clone)]
pub struct FocalPoint {
    definition: CropTypeDefinition,
}

impl FocalPoint {
    pub fn new(definition: CropTypeDefinition) -> Self {
        Self { definition }
    }

    /// Parse `"x,y"` percentages in 0..=100
    pub fn parse_settings(settings: &str) -> CropResult<(f64, f64)> {
        let invalid = |reason: &str| CropError::InvalidCropSettings {
            settings: settings.to_string(),
            reason: reason.to_string(),
        };

        let (x, y) = settings
            .split_once(',')
            .ok_or_else(|| invalid("expected 'x,y'"))?;
        let x: f64 = x.trim().parse().map_err(|_| invalid("x is not a number"))?;
        let y: f64 = y.trim().parse().map_err(|_| invalid("y is not a number"))?;

        if !(0.0..=100.0).contains(&x) || !(0.0..=100.0).contains(&y) {
            return Err(invalid("coordinates must be between 0 and 100"));
        }
        Ok((x, y))
    }

    /// Convert relative percentages to pixel coordinates
    pub fn relative_to_absolute(x: f64, y: f64, width: u32, height: u32) -> (i64, i64) {
        (
            (x / 100.0 * f64::from(width)).round() as i64,
            (y / 100.0 * f64::from(height)).round() as i64,
        )
    }
}

#[async_trait]
impl CropPlugin for FocalPoint {
    fn definition(&self) -> &CropTypeDefinition {
        &self.definition
    }

    async fn save_crop(
        &self,
        store: &dyn CropStore,
        request: SaveCropRequest<'_>,
    ) -> CropResult<Option<CropId>> {
        let (rx, ry) = Self::parse_settings(request.settings)?;

        let mut crop = retrieve_contextual_crop(
            store,
            request.context,
            self.definition.stored_crop_type(),
            request.uri,
        )
        .await?;

        let absolute = Self::relative_to_absolute(rx, ry, request.width, request.height);
        if crop.anchor() != absolute {
            crop.set_position(absolute.0, absolute.1);
            let id = store.save(&mut crop).await?;
            debug!(
                "Saved {} crop {} at {:?} for {}",
                self.definition.id, id, absolute, request.context
            );
        }

        Ok(crop.id)
    }
}

/// Registered crop plugins by id
#[derive(Clone, Default)]
pub struct CropPluginRegistry {
    plugins: BTreeMap<String, Arc<dyn CropPlugin>>,
}

impl CropPluginRegistry {
    /// Register every configured crop type as a point crop plugin
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::default();
        for definition in CropTypeDefinition::from_config(config) {
            registry.register(Arc::new(FocalPoint::new(definition)));
        }
        registry
    }

    pub fn register(&mut self, plugin: Arc<dyn CropPlugin>) {
        self.plugins
            .insert(plugin.definition().id.clone(), plugin);
    }

    /// Look up a plugin by id
    pub fn get(&self, id: &str) -> CropResult<Arc<dyn CropPlugin>> {
        self.plugins
            .get(id)
            .cloned()
            .ok_or_else(|| CropError::UnknownCropType(id.to_string()))
    }

    /// Definitions of all registered plugins
    pub fn definitions(&self) -> Vec<CropTypeDefinition> {
        self.plugins
            .values()
            .map(|p| p.definition().clone())
            .collect()
    }

    /// Plugin whose target field is `field_name`
    pub fn by_target_field(&self, field_name: &str) -> Option<Arc<dyn CropPlugin>> {
        self.plugins
            .values()
            .find(|p| p.definition().target_field_name == field_name)
            .cloned()
    }
}

impl std::fmt::Debug for CropPluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CropPluginRegistry")
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crop::MemoryCropStore;

    fn focal_point() -> Arc<dyn CropPlugin> {
        CropPluginRegistry::from_config(&Config::default())
            .get("focal_point")
            .unwrap()
    }

    fn request<'a>(settings: &'a str, context: &'a str) -> SaveCropRequest<'a> {
        SaveCropRequest {
            settings,
            style_id: "focal_card",
            uri: "public://photos/dog.jpg",
            context,
            width: 800,
            height: 600,
        }
    }

    #[test]
    fn parse_settings_validates() {
        assert_eq!(FocalPoint::parse_settings("25, 75").unwrap(), (25.0, 75.0));
        assert!(FocalPoint::parse_settings("25").is_err());
        assert!(FocalPoint::parse_settings("a,b").is_err());
        assert!(FocalPoint::parse_settings("120,5").is_err());
    }

    #[test]
    fn relative_to_absolute_rounds() {
        assert_eq!(FocalPoint::relative_to_absolute(50.0, 50.0, 801, 600), (401, 300));
        assert_eq!(FocalPoint::relative_to_absolute(0.0, 100.0, 800, 600), (0, 600));
    }

    #[test]
    fn unknown_plugin() {
        let registry = CropPluginRegistry::from_config(&Config::default());
        assert!(matches!(
            registry.get("manual"),
            Err(CropError::UnknownCropType(_))
        ));
        assert!(registry.by_target_field("focal_point").is_some());
    }

    #[tokio::test]
    async fn save_crop_stores_new_position() {
        let store = MemoryCropStore::new();
        store.register_file("public://photos/dog.jpg");

        let id = focal_point()
            .save_crop(&store, request("25,50", "node:article:5.field_image.0"))
            .await
            .unwrap()
            .unwrap();

        let crop = store.load(id).await.unwrap().unwrap();
        assert_eq!(crop.position(), (200, 300));
        assert_eq!(crop.crop_type, "focal_point");
    }

    #[tokio::test]
    async fn save_crop_is_idempotent() {
        let store = MemoryCropStore::new();
        store.register_file("public://photos/dog.jpg");
        let plugin = focal_point();

        let first = plugin.save_crop(&store, request("25,50", "ctx")).await.unwrap();
        let second = plugin.save_crop(&store, request("25,50", "ctx")).await.unwrap();
        let moved = plugin.save_crop(&store, request("75,50", "ctx")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first, moved);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn untouched_default_is_not_saved() {
        let store = MemoryCropStore::new();
        store.register_file("public://photos/dog.jpg");

        let id = focal_point()
            .save_crop(&store, request("0,0", "ctx"))
            .await
            .unwrap();

        assert_eq!(id, None);
        assert!(store.is_empty());
    }
}
