//! Inbound request path decoding
//!
//! Maps a contextual derivative URL path back to the style, crop and
//! source it was built from, and rewrites it to the generation route
//! `<prefix>styles/<style>/<crop id>/<scheme>`.

use crate::crop::{CropId, CropStore};
use crate::derivative::{CropTarget, DeliverRequest, CONTEXTUAL_FOLDER};
use crate::error::{CropError, CropResult};
use crate::uri::{escape_target, unescape_file_name, StreamUri};
use tracing::{debug, warn};

/// URL path of private contextual derivatives
const PRIVATE_PREFIX: &str = "/system/files/contextual/";

/// Minimum segments after the prefix: `styles`, style, scheme, target, file
const MIN_SEGMENTS: usize = 5;

/// Result of decoding an inbound path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundRoute {
    /// Not a contextual derivative path
    Passthrough(String),

    Contextual(ContextualRoute),
}

/// A decoded contextual derivative request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextualRoute {
    /// Matched prefix, e.g. `/sites/default/files/contextual/`
    pub prefix: String,
    pub style_id: String,
    pub crop_id: Option<CropId>,
    pub scheme: String,

    /// Source image; exact when a crop vouched for it, best effort otherwise
    pub source_uri: String,
}

impl ContextualRoute {
    /// Path of the generation route
    pub fn route_path(&self) -> String {
        format!(
            "{}styles/{}/{}/{}",
            self.prefix,
            self.style_id,
            CropId::segment(self.crop_id),
            self.scheme
        )
    }

    /// Delivery request for this route
    pub fn into_request(self, token: Option<String>) -> DeliverRequest {
        DeliverRequest {
            source_uri: self.source_uri,
            style_id: self.style_id,
            target: CropTarget::from(self.crop_id),
            token,
        }
    }
}

/// Decodes inbound paths for one site layout
#[derive(Debug, Clone)]
pub struct PathProcessor {
    public_prefix: String,
}

impl PathProcessor {
    pub fn new(public_dir: &str) -> Self {
        Self {
            public_prefix: format!("/{}/{}/", public_dir.trim_matches('/'), CONTEXTUAL_FOLDER),
        }
    }

    /// Split off the contextual prefix, if the path has one
    fn split_prefix<'a>(&self, path: &'a str) -> Option<(&str, &'a str)> {
        if let Some(rest) = path.strip_prefix(self.public_prefix.as_str()) {
            return Some((self.public_prefix.as_str(), rest));
        }
        let start = path.find(PRIVATE_PREFIX)?;
        Some((PRIVATE_PREFIX, &path[start + PRIVATE_PREFIX.len()..]))
    }

    /// Decode `path`, or pass it through untouched
    pub async fn process_inbound(
        &self,
        path: &str,
        crops: &dyn CropStore,
    ) -> CropResult<InboundRoute> {
        let Some((prefix, rest)) = self.split_prefix(path) else {
            return Ok(InboundRoute::Passthrough(path.to_string()));
        };

        let segments: Vec<&str> = rest.split('/').collect();
        if segments.len() < MIN_SEGMENTS || segments[0] != "styles" {
            return Ok(InboundRoute::Passthrough(path.to_string()));
        }

        let style_id = segments[1];
        let scheme = segments[2];
        let last = segments[segments.len() - 1];
        let target = segments[3..segments.len() - 1].join("/");

        let id_segment = last.split('.').next().unwrap_or(last);
        let crop_id = CropId::from_segment(id_segment)?;

        let encoded = format!("{}://{}", scheme, target);

        let crop = match crop_id {
            Some(id) => crops.load(id).await?,
            None => None,
        };

        let source_uri = match crop {
            Some(crop) => {
                let crop_source = StreamUri::parse(&crop.uri)?;
                let expected = format!(
                    "{}://{}",
                    crop_source.scheme(),
                    escape_target(crop_source.target())
                );
                if expected != encoded {
                    warn!("Crop {} does not match requested image {}", crop.uri, encoded);
                    return Err(CropError::NotFound(path.to_string()));
                }
                crop.uri
            }
            None => StreamUri::new(scheme, unescape_file_name(&target))
                .map_err(|_| CropError::NotFound(path.to_string()))?
                .to_string(),
        };

        let route = ContextualRoute {
            prefix: prefix.to_string(),
            style_id: style_id.to_string(),
            crop_id,
            scheme: scheme.to_string(),
            source_uri,
        };
        debug!("Routed {} to {}", path, route.route_path());
        Ok(InboundRoute::Contextual(route))
    }
}
