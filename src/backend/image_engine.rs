//! Style effects applied with the `image` crate

use super::{FileStore, TransformEngine};
use crate::config::EffectConfig;
use crate::crop::Crop;
use crate::error::{CropError, CropResult};
use crate::style::{ImageStyle, CONVERT_EFFECT};
use crate::uri::StreamUri;
use async_trait::async_trait;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, warn};

/// MIME type for a derivative extension
pub fn content_type(extension: Option<&str>) -> &'static str {
    extension
        .and_then(ImageFormat::from_extension)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream")
}

/// Transform engine reading and writing through a [`FileStore`]
pub struct ImageTransformEngine {
    files: Arc<dyn FileStore>,
}

impl ImageTransformEngine {
    pub fn new(files: Arc<dyn FileStore>) -> Self {
        Self { files }
    }
}

#[async_trait]
impl TransformEngine for ImageTransformEngine {
    async fn create_derivative(
        &self,
        style: &ImageStyle,
        source: &StreamUri,
        dest: &StreamUri,
        crop: Option<&Crop>,
    ) -> CropResult<bool> {
        let Some(format) = dest.extension().and_then(ImageFormat::from_extension) else {
            warn!("No encoder for derivative {}", dest);
            return Ok(false);
        };

        let bytes = self.files.read(source).await?;
        let effects = style.effects.clone();
        // Unsaved crops carry no adjustment
        let focus = crop.filter(|c| c.id.is_some()).map(|c| c.position());

        let encoded = tokio::task::spawn_blocking(move || -> CropResult<Vec<u8>> {
            let mut img = image::load_from_memory(&bytes)?;
            for effect in &effects {
                img = apply_effect(img, effect, focus);
            }
            encode(img, format)
        })
        .await
        .map_err(|e| CropError::Internal(format!("transform task failed: {}", e)))??;

        self.files.write(dest, &encoded).await?;
        debug!("Generated {} from {} with style {}", dest, source, style.id);
        Ok(true)
    }
}

fn encode(img: DynamicImage, format: ImageFormat) -> CropResult<Vec<u8>> {
    let img = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()),
        ImageFormat::WebP => DynamicImage::ImageRgba8(img.to_rgba8()),
        _ => img,
    };
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format)?;
    Ok(out.into_inner())
}

/// Apply one effect; unknown effects leave the image unchanged
fn apply_effect(img: DynamicImage, effect: &EffectConfig, focus: Option<(i64, i64)>) -> DynamicImage {
    let data = &effect.data;
    match effect.id.as_str() {
        "image_scale" => scale(img, data.width, data.height, data.upscale),
        "image_scale_and_crop" => match (data.width, data.height) {
            (Some(w), Some(h)) => img.resize_to_fill(w, h, FilterType::Lanczos3),
            _ => img,
        },
        "image_crop" => match (data.width, data.height) {
            (Some(w), Some(h)) => {
                let (iw, ih) = img.dimensions();
                crop_around(&img, w, h, (i64::from(iw / 2), i64::from(ih / 2)))
            }
            _ => img,
        },
        "focal_point_scale_and_crop" => match (data.width, data.height) {
            (Some(w), Some(h)) => focal_scale_and_crop(img, w, h, focus),
            _ => img,
        },
        "focal_point_crop" => match (data.width, data.height) {
            (Some(w), Some(h)) => {
                let (iw, ih) = img.dimensions();
                let centre = focus.unwrap_or((i64::from(iw / 2), i64::from(ih / 2)));
                crop_around(&img, w, h, centre)
            }
            _ => img,
        },
        "image_desaturate" => img.grayscale(),
        CONVERT_EFFECT => img,
        other => {
            debug!("Skipping unsupported effect {}", other);
            img
        }
    }
}

/// Scale preserving aspect ratio to fit the given bounds
fn scale(img: DynamicImage, width: Option<u32>, height: Option<u32>, upscale: bool) -> DynamicImage {
    let (iw, ih) = img.dimensions();
    if iw == 0 || ih == 0 {
        return img;
    }
    let ratio = match (width, height) {
        (Some(w), Some(h)) => f64::min(f64::from(w) / f64::from(iw), f64::from(h) / f64::from(ih)),
        (Some(w), None) => f64::from(w) / f64::from(iw),
        (None, Some(h)) => f64::from(h) / f64::from(ih),
        (None, None) => return img,
    };
    if ratio >= 1.0 && !upscale {
        return img;
    }
    let w = ((f64::from(iw) * ratio).round() as u32).max(1);
    let h = ((f64::from(ih) * ratio).round() as u32).max(1);
    img.resize_exact(w, h, FilterType::Lanczos3)
}

/// Scale to cover `width`×`height`, then crop around the focal point
fn focal_scale_and_crop(
    img: DynamicImage,
    width: u32,
    height: u32,
    focus: Option<(i64, i64)>,
) -> DynamicImage {
    let (iw, ih) = img.dimensions();
    if iw == 0 || ih == 0 {
        return img;
    }
    let ratio = f64::max(
        f64::from(width) / f64::from(iw),
        f64::from(height) / f64::from(ih),
    );
    let sw = ((f64::from(iw) * ratio).round() as u32).max(width);
    let sh = ((f64::from(ih) * ratio).round() as u32).max(height);
    let scaled = img.resize_exact(sw, sh, FilterType::Lanczos3);

    let centre = match focus {
        Some((x, y)) => (
            (x as f64 * ratio).round() as i64,
            (y as f64 * ratio).round() as i64,
        ),
        None => (i64::from(sw / 2), i64::from(sh / 2)),
    };
    crop_around(&scaled, width, height, centre)
}

/// Crop a `width`×`height` window centred on `centre`, kept inside the image
fn crop_around(img: &DynamicImage, width: u32, height: u32, centre: (i64, i64)) -> DynamicImage {
    let (iw, ih) = img.dimensions();
    let w = width.min(iw);
    let h = height.min(ih);
    let max_x = i64::from(iw - w);
    let max_y = i64::from(ih - h);
    let x = (centre.0 - i64::from(w / 2)).clamp(0, max_x) as u32;
    let y = (centre.1 - i64::from(h / 2)).clamp(0, max_y) as u32;
    img.crop_imm(x, y, w, h)
}
