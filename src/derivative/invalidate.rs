//! Derivative invalidation

use super::{contextual_folder, derivative_path, source_folder, DerivativeResolver};
use crate::config::FilesConfig;
use crate::crop::Crop;
use crate::error::CropResult;
use crate::uri::StreamUri;
use tracing::{debug, info};

impl DerivativeResolver {
    /// Delete contextual derivatives of a style
    ///
    /// With a source, only that source's folder goes; otherwise the style's
    /// folder in every registered scheme.
    pub async fn flush_style(&self, style_id: &str, source_uri: Option<&str>) -> CropResult<()> {
        let style = self.styles.get(style_id)?;

        match source_uri {
            Some(uri) => {
                let source = StreamUri::parse(uri)?;
                let folder = source_folder(&style.id, &source)?;
                self.files.delete_recursive(&folder).await?;
                debug!("Flushed {} derivatives of {}", style.id, source);
            }
            None => {
                for scheme in FilesConfig::SCHEMES {
                    let folder = contextual_folder(scheme, &style.id)?;
                    self.files.delete_recursive(&folder).await?;
                }
                info!("Flushed contextual derivatives of style {}", style.id);
            }
        }
        Ok(())
    }

    /// Delete every derivative built from `crop`
    ///
    /// Returns the number of files removed.
    pub async fn delete_derivatives_for_crop(&self, crop: &Crop) -> CropResult<usize> {
        let Some(id) = crop.id else {
            return Ok(0);
        };
        let source = StreamUri::parse(&crop.uri)?;

        let mut deleted = 0;
        for style in self.styles.using_crop_type(&crop.crop_type, &self.crop_types) {
            let path = derivative_path(style, &source, Some(id))?;
            if self.files.delete(&path).await? {
                debug!("Deleted derivative {}", path);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Whether a style consumes any registered crop type
    pub fn style_uses_contextual_crop(&self, style_id: &str) -> CropResult<bool> {
        let style = self.styles.get(style_id)?;
        Ok(!self.style_crop_types(style).is_empty())
    }

    /// Crops whose context starts with `base_context`
    pub async fn crops_for_base_context(&self, base_context: &str) -> CropResult<Vec<Crop>> {
        self.crops.find_by_context_prefix(base_context).await
    }

    /// Delete derivatives of every crop under a base context
    ///
    /// Used when the entity owning those contexts goes away.
    pub async fn invalidate_context(&self, base_context: &str) -> CropResult<usize> {
        let mut deleted = 0;
        for crop in self.crops_for_base_context(base_context).await? {
            deleted += self.delete_derivatives_for_crop(&crop).await?;
        }
        info!("Invalidated {} derivatives under {}", deleted, base_context);
        Ok(deleted)
    }
}
