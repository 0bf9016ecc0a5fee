//! Configuration schema for ctxcrop
//!
//! Configuration is stored at `~/.config/ctxcrop/config.toml`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// File scheme layout and URL base
    pub files: FilesConfig,

    /// Derivative token settings
    pub image: ImageConfig,

    /// Where crop records and locks live
    pub state: StateConfig,

    /// Image styles keyed by id
    pub styles: BTreeMap<String, StyleConfig>,

    /// Crop types that consume contextual crops, keyed by plugin id
    pub crop_types: BTreeMap<String, CropTypeConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            files: FilesConfig::default(),
            image: ImageConfig::default(),
            state: StateConfig::default(),
            styles: default_styles(),
            crop_types: default_crop_types(),
        }
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// File schemes and URL generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Site root on disk; scheme directories are relative to it
    pub root: PathBuf,

    /// Public files directory, also its URL path
    pub public_dir: String,

    /// Private files directory
    pub private_dir: String,

    /// Temporary files directory
    pub temporary_dir: String,

    /// Base URL for generated links
    pub base_url: String,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            public_dir: "sites/default/files".to_string(),
            private_dir: "private".to_string(),
            temporary_dir: "tmp".to_string(),
            base_url: "http://localhost".to_string(),
        }
    }
}

impl FilesConfig {
    /// Schemes served by this site
    pub const SCHEMES: [&'static str; 3] = ["public", "private", "temporary"];

    /// Check whether a scheme is registered
    pub fn is_valid_scheme(&self, scheme: &str) -> bool {
        Self::SCHEMES.contains(&scheme)
    }

    /// Directory backing a scheme, relative to `root`
    pub fn scheme_dir(&self, scheme: &str) -> Option<&str> {
        match scheme {
            "public" => Some(&self.public_dir),
            "private" => Some(&self.private_dir),
            "temporary" => Some(&self.temporary_dir),
            _ => None,
        }
    }

    /// URL path prefix under which a scheme's files are served
    pub fn url_prefix(&self, scheme: &str) -> Option<&str> {
        match scheme {
            "public" => Some(&self.public_dir),
            "private" => Some("system/files"),
            "temporary" => Some("system/temporary"),
            _ => None,
        }
    }
}

/// Derivative token and URL settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Skip token validation on delivery
    pub allow_insecure_derivatives: bool,

    /// Do not append the token to generated URLs
    pub suppress_itok_output: bool,

    /// Secret mixed into derivative tokens
    pub private_key: String,

    /// Whether the site uses clean URLs (unset = assume yes)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean_urls: Option<bool>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            allow_insecure_derivatives: false,
            suppress_itok_output: false,
            private_key: "change-me".to_string(),
            clean_urls: None,
        }
    }
}

/// Persistent state location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// State directory (defaults to the user state dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

/// One image style
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    /// Human-readable label
    pub label: String,

    /// Ordered effect chain
    pub effects: Vec<EffectConfig>,
}

/// One effect step of a style
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectConfig {
    /// Effect plugin id (e.g. "image_scale", "focal_point_scale_and_crop")
    pub id: String,

    /// Effect settings
    #[serde(default)]
    pub data: EffectData,
}

/// Settings shared by the supported effects
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    pub upscale: bool,

    /// Crop type read by crop-aware effects
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_type: Option<String>,

    /// Target extension for format conversion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

/// A crop type plugin definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CropTypeConfig {
    /// Human-readable label
    pub label: String,

    /// Field name carrying this plugin's settings in override maps
    pub target_field_name: String,

    /// Effect ids that consume this crop type
    pub image_style_effects: Vec<String>,

    /// Stored crop type (defaults to the plugin id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_type: Option<String>,
}

fn effect(id: &str, data: EffectData) -> EffectConfig {
    EffectConfig {
        id: id.to_string(),
        data,
    }
}

fn sized(width: u32, height: u32) -> EffectData {
    EffectData {
        width: Some(width),
        height: Some(height),
        ..EffectData::default()
    }
}

fn default_styles() -> BTreeMap<String, StyleConfig> {
    let mut styles = BTreeMap::new();
    styles.insert(
        "thumbnail".to_string(),
        StyleConfig {
            label: "Thumbnail (100x100)".to_string(),
            effects: vec![effect("image_scale", sized(100, 100))],
        },
    );
    styles.insert(
        "medium".to_string(),
        StyleConfig {
            label: "Medium (220x220)".to_string(),
            effects: vec![effect("image_scale", sized(220, 220))],
        },
    );
    styles.insert(
        "focal_card".to_string(),
        StyleConfig {
            label: "Focal card (400x250)".to_string(),
            effects: vec![effect(
                "focal_point_scale_and_crop",
                EffectData {
                    crop_type: Some("focal_point".to_string()),
                    ..sized(400, 250)
                },
            )],
        },
    );
    styles.insert(
        "webp_card".to_string(),
        StyleConfig {
            label: "WebP card (400x250)".to_string(),
            effects: vec![
                effect(
                    "focal_point_scale_and_crop",
                    EffectData {
                        crop_type: Some("focal_point".to_string()),
                        ..sized(400, 250)
                    },
                ),
                effect(
                    "image_convert",
                    EffectData {
                        extension: Some("webp".to_string()),
                        ..EffectData::default()
                    },
                ),
            ],
        },
    );
    styles
}

fn default_crop_types() -> BTreeMap<String, CropTypeConfig> {
    let mut types = BTreeMap::new();
    types.insert(
        "focal_point".to_string(),
        CropTypeConfig {
            label: "Focal Point".to_string(),
            target_field_name: "focal_point".to_string(),
            image_style_effects: vec![
                "focal_point_scale_and_crop".to_string(),
                "focal_point".to_string(),
                "focal_point_crop".to_string(),
            ],
            crop_type: None,
        },
    );
    types
}
