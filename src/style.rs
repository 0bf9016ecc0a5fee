//! Image styles
//!
//! A style is a named, ordered chain of effects. The resolver only needs
//! three things from it: the extension its derivatives end up with, the
//! access token for a source, and which crop types its effects consume.

use crate::config::{Config, EffectConfig, StyleConfig};
use crate::crop::plugin::CropTypeDefinition;
use crate::error::{CropError, CropResult};
use crate::uri::StreamUri;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tracing::debug;

/// Effect id that changes the derivative format
pub const CONVERT_EFFECT: &str = "image_convert";

/// Length of the derivative access token
const TOKEN_LEN: usize = 8;

/// A configured image style
#[derive(Debug, Clone, PartialEq)]
pub struct ImageStyle {
    pub id: String,
    pub label: String,
    pub effects: Vec<EffectConfig>,
}

impl ImageStyle {
    /// Build a style from its config entry
    pub fn from_config(id: &str, config: &StyleConfig) -> Self {
        Self {
            id: id.to_string(),
            label: config.label.clone(),
            effects: config.effects.clone(),
        }
    }

    /// Extension of derivatives produced from a source with `source_ext`
    ///
    /// Conversion effects override the extension; the last one wins.
    /// Otherwise the source extension is kept as written.
    pub fn derivative_extension(&self, source_ext: Option<&str>) -> Option<String> {
        self.effects
            .iter()
            .filter(|e| e.id == CONVERT_EFFECT)
            .filter_map(|e| e.data.extension.as_deref())
            .last()
            .or(source_ext)
            .map(str::to_string)
    }

    /// Source URI with the derivative extension appended when it changes
    fn with_derivative_extension(&self, source: &StreamUri) -> String {
        match self.derivative_extension(source.extension()) {
            Some(ext) if source.extension() != Some(ext.as_str()) => {
                format!("{}.{}", source, ext)
            }
            _ => source.to_string(),
        }
    }

    /// Access token guarding derivative generation for `source`
    ///
    /// Keyed SHA-256 over the style id and the normalized source, first
    /// eight hex characters.
    pub fn path_token(&self, source: &StreamUri, private_key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(private_key.as_bytes());
        hasher.update(b":");
        hasher.update(self.id.as_bytes());
        hasher.update(b":");
        hasher.update(self.with_derivative_extension(source).as_bytes());
        let digest = hex::encode(hasher.finalize());
        digest[..TOKEN_LEN].to_string()
    }

    /// Crop types consumed by this style's effects
    pub fn crop_types(&self, definitions: &[CropTypeDefinition]) -> Vec<String> {
        let mut types = Vec::new();
        for effect in &self.effects {
            for definition in definitions {
                if definition.image_style_effects.iter().any(|id| *id == effect.id) {
                    let crop_type = effect
                        .data
                        .crop_type
                        .clone()
                        .unwrap_or_else(|| definition.stored_crop_type().to_string());
                    if !types.contains(&crop_type) {
                        types.push(crop_type);
                    }
                }
            }
        }
        types
    }

    /// Whether any effect explicitly reads `crop_type`
    pub fn references_crop_type(&self, crop_type: &str) -> bool {
        self.effects
            .iter()
            .any(|e| e.data.crop_type.as_deref() == Some(crop_type))
    }
}

/// All configured styles
#[derive(Debug, Clone, Default)]
pub struct StyleRegistry {
    styles: BTreeMap<String, ImageStyle>,
}

impl StyleRegistry {
    /// Build the registry from configuration
    pub fn from_config(config: &Config) -> Self {
        let styles = config
            .styles
            .iter()
            .map(|(id, style)| (id.clone(), ImageStyle::from_config(id, style)))
            .collect();
        Self { styles }
    }

    /// Look up a style by id
    pub fn get(&self, id: &str) -> CropResult<&ImageStyle> {
        self.styles
            .get(id)
            .ok_or_else(|| CropError::UnknownStyle(id.to_string()))
    }

    /// Iterate styles in id order
    pub fn iter(&self) -> impl Iterator<Item = &ImageStyle> {
        self.styles.values()
    }

    /// Styles whose effects consume `crop_type`
    pub fn using_crop_type<'a>(
        &'a self,
        crop_type: &'a str,
        definitions: &'a [CropTypeDefinition],
    ) -> impl Iterator<Item = &'a ImageStyle> + 'a {
        self.styles.values().filter(move |style| {
            style.references_crop_type(crop_type)
                || style.crop_types(definitions).iter().any(|t| t == crop_type)
        })
    }
}

/// Memoized style id → crop types lookup
///
/// Lives as long as the resolver that owns it; styles are immutable for
/// that lifetime.
#[derive(Debug, Default)]
pub struct StyleCropIndex {
    cache: Mutex<HashMap<String, Vec<String>>>,
}

impl StyleCropIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Crop types consumed by `style`, computed once per style id
    pub fn crop_types(&self, style: &ImageStyle, definitions: &[CropTypeDefinition]) -> Vec<String> {
        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache
            .entry(style.id.clone())
            .or_insert_with(|| {
                let types = style.crop_types(definitions);
                debug!("Style {} consumes crop types {:?}", style.id, types);
                types
            })
            .clone()
    }

    /// Drop all memoized entries
    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }
}
