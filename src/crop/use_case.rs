//! Use cases deciding where crop settings for an image come from

use super::plugin::CropTypeDefinition;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-reference override attached to a media entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceOverride {
    /// Usage context of the referencing field item
    pub context: String,

    /// JSON map `{"<source field>": [{"<target field>": <value>}]}`
    pub overwritten_property_map: Option<String>,
}

/// Media entity owning an image item
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaParent {
    /// Name of the media source field
    pub source_field: String,

    /// Whether the source field holds images
    pub source_is_image: bool,

    /// Override carried by the referencing item, if any
    pub reference: Option<ReferenceOverride>,
}

/// An image field item about to be rendered
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageItem {
    pub uri: String,
    pub width: u32,
    pub height: u32,
    pub parent: Option<MediaParent>,
}

/// Crop settings resolved for an image item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CropSettings {
    pub plugin_id: String,
    pub crop_setting: String,
    pub context: String,
}

/// A source of contextual crop settings
pub trait UseCase: Send + Sync {
    fn id(&self) -> &str;

    fn label(&self) -> &str;

    /// Whether this use case can handle `item`
    fn is_competent(&self, item: &ImageItem) -> bool;

    /// Settings for `item`, if it carries any
    fn crop_settings(&self, item: &ImageItem) -> Option<CropSettings>;
}

/// Settings from entity reference overrides on media items
#[derive(Debug, Clone)]
pub struct References {
    definitions: Vec<CropTypeDefinition>,
}

impl References {
    pub fn new(definitions: Vec<CropTypeDefinition>) -> Self {
        Self { definitions }
    }

    fn reference<'a>(item: &'a ImageItem) -> Option<(&'a MediaParent, &'a ReferenceOverride)> {
        let parent = item.parent.as_ref()?;
        let reference = parent.reference.as_ref()?;
        Some((parent, reference))
    }

    /// Match an override entry against registered target field names
    fn plugin_setting(&self, entry: &Map<String, Value>) -> Option<(String, String)> {
        self.definitions.iter().find_map(|definition| {
            entry
                .get(&definition.target_field_name)
                .map(|value| (definition.id.clone(), setting_string(value)))
        })
    }
}

fn setting_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl UseCase for References {
    fn id(&self) -> &str {
        "references"
    }

    fn label(&self) -> &str {
        "References"
    }

    fn is_competent(&self, item: &ImageItem) -> bool {
        matches!(Self::reference(item), Some((parent, _)) if parent.source_is_image)
    }

    fn crop_settings(&self, item: &ImageItem) -> Option<CropSettings> {
        let (parent, reference) = Self::reference(item)?;
        if !parent.source_is_image {
            return None;
        }

        let raw = reference.overwritten_property_map.as_deref()?;
        let map: Map<String, Value> = match serde_json::from_str(raw) {
            Ok(map) => map,
            Err(e) => {
                warn!("Ignoring malformed override map for {}: {}", item.uri, e);
                return None;
            }
        };

        let entry = map
            .get(&parent.source_field)?
            .as_array()?
            .first()?
            .as_object()?;

        let (plugin_id, crop_setting) = self.plugin_setting(entry)?;
        debug!(
            "Override for {} selects {} in {}",
            item.uri, plugin_id, reference.context
        );

        Some(CropSettings {
            plugin_id,
            crop_setting,
            context: reference.context.clone(),
        })
    }
}

/// Ordered use cases; the first competent one wins
#[derive(Clone, Default)]
pub struct UseCaseRegistry {
    use_cases: Vec<Arc<dyn UseCase>>,
}

impl UseCaseRegistry {
    /// Registry with the references use case
    pub fn with_defaults(definitions: Vec<CropTypeDefinition>) -> Self {
        let mut registry = Self::default();
        registry.register(Arc::new(References::new(definitions)));
        registry
    }

    pub fn register(&mut self, use_case: Arc<dyn UseCase>) {
        self.use_cases.push(use_case);
    }

    /// First competent use case for `item`
    pub fn find_competent(&self, item: &ImageItem) -> Option<Arc<dyn UseCase>> {
        self.use_cases
            .iter()
            .find(|use_case| use_case.is_competent(item))
            .cloned()
    }

    /// Crop settings from the first competent use case
    pub fn crop_settings(&self, item: &ImageItem) -> Option<CropSettings> {
        self.find_competent(item)?.crop_settings(item)
    }
}

impl std::fmt::Debug for UseCaseRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.use_cases.iter().map(|u| u.id()))
            .finish()
    }
}
