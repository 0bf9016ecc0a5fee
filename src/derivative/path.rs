//! Derivative paths and public URLs
//!
//! Layout: `<scheme>://contextual/styles/<style>/<source scheme>/<escaped target>/<crop id>.<ext>`.
//! The derivative scheme is always the source scheme.

use crate::config::Config;
use crate::crop::CropId;
use crate::error::{CropError, CropResult};
use crate::style::ImageStyle;
use crate::uri::StreamUri;
use url::Url;

/// Root folder of contextual derivatives in every scheme
pub const CONTEXTUAL_FOLDER: &str = "contextual";

/// Front controller used when clean URLs are off
const SCRIPT_NAME: &str = "index.php";

/// `<scheme>://contextual/styles/<style>`
pub fn contextual_folder(scheme: &str, style_id: &str) -> CropResult<StreamUri> {
    StreamUri::new(scheme, format!("{}/styles/{}", CONTEXTUAL_FOLDER, style_id))
}

/// Folder holding every crop variant of one source for one style
pub fn source_folder(style_id: &str, source: &StreamUri) -> CropResult<StreamUri> {
    Ok(contextual_folder(source.scheme(), style_id)?
        .join(source.scheme())
        .join(&source.escaped_target()))
}

/// Derivative location for a source, style and crop
pub fn derivative_path(
    style: &ImageStyle,
    source: &StreamUri,
    crop_id: Option<CropId>,
) -> CropResult<StreamUri> {
    let file_name = match style.derivative_extension(source.extension()) {
        Some(ext) => format!("{}.{}", CropId::segment(crop_id), ext),
        None => CropId::segment(crop_id),
    };
    Ok(source_folder(&style.id, source)?.join(&file_name))
}

/// Query values appended to a derivative URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlQuery {
    /// Access token (`itok`)
    pub token: Option<String>,

    /// Crop hash (`h`)
    pub hash: Option<String>,
}

/// Compose the public URL of a derivative
///
/// `exists` only matters when clean URLs are disabled: a public derivative
/// that has not been generated yet must go through the front controller.
pub fn compose_url(
    config: &Config,
    path: &StreamUri,
    query: &UrlQuery,
    exists: bool,
) -> CropResult<Url> {
    let files = &config.files;
    let prefix = files
        .url_prefix(path.scheme())
        .ok_or_else(|| CropError::UnknownScheme(path.scheme().to_string()))?;

    let clean_urls = config.image.clean_urls.unwrap_or(true);
    let via_script = !clean_urls && path.scheme() == "public" && !exists;

    let mut url = Url::parse(&files.base_url)?;
    {
        let mut segments = url.path_segments_mut().map_err(|_| {
            CropError::User(format!("base URL '{}' cannot carry a path", files.base_url))
        })?;
        segments.pop_if_empty();
        if via_script {
            segments.push(SCRIPT_NAME);
        }
        segments.extend(prefix.split('/').filter(|s| !s.is_empty()));
        segments.extend(path.target().split('/'));
    }

    if query.token.is_some() || query.hash.is_some() {
        let mut pairs = url.query_pairs_mut();
        if let Some(token) = &query.token {
            pairs.append_pair("itok", token);
        }
        if let Some(hash) = &query.hash {
            pairs.append_pair("h", hash);
        }
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::StyleRegistry;

    fn uri(s: &str) -> StreamUri {
        StreamUri::parse(s).unwrap()
    }

    #[test]
    fn path_layout() {
        let styles = StyleRegistry::from_config(&Config::default());
        let thumb = styles.get("thumbnail").unwrap();

        let path = derivative_path(thumb, &uri("public://photos/dog.jpg"), None).unwrap();
        assert_eq!(
            path.to_string(),
            "public://contextual/styles/thumbnail/public/photos/dog__jpg/0.jpg"
        );

        let path = derivative_path(thumb, &uri("private://a.b.jpg"), CropId::new(42)).unwrap();
        assert_eq!(
            path.to_string(),
            "private://contextual/styles/thumbnail/private/a__b__jpg/42.jpg"
        );
    }

    #[test]
    fn path_follows_conversion_and_missing_extension() {
        let styles = StyleRegistry::from_config(&Config::default());

        let webp = derivative_path(
            styles.get("webp_card").unwrap(),
            &uri("public://photos/dog.png"),
            CropId::new(3),
        )
        .unwrap();
        assert_eq!(
            webp.to_string(),
            "public://contextual/styles/webp_card/public/photos/dog__png/3.webp"
        );

        let bare = derivative_path(styles.get("thumbnail").unwrap(), &uri("public://raw/blob"), None)
            .unwrap();
        assert_eq!(bare.file_name(), "0");
    }

    #[test]
    fn url_per_scheme() {
        let config = Config::default();
        let query = UrlQuery {
            token: Some("abcd1234".to_string()),
            hash: None,
        };

        let public = compose_url(&config, &uri("public://contextual/x/0.jpg"), &query, false).unwrap();
        assert_eq!(
            public.as_str(),
            "http://localhost/sites/default/files/contextual/x/0.jpg?itok=abcd1234"
        );

        let private = compose_url(&config, &uri("private://contextual/x/0.jpg"), &UrlQuery::default(), true)
            .unwrap();
        assert_eq!(private.as_str(), "http://localhost/system/files/contextual/x/0.jpg");

        let temporary = compose_url(&config, &uri("temporary://a.jpg"), &UrlQuery::default(), true).unwrap();
        assert_eq!(temporary.as_str(), "http://localhost/system/temporary/a.jpg");
    }

    #[test]
    fn url_keeps_base_path_and_encodes() {
        let mut config = Config::default();
        config.files.base_url = "https://example.com/site/".to_string();

        let url = compose_url(
            &config,
            &uri("public://my photos/dog.jpg"),
            &UrlQuery {
                token: None,
                hash: Some("0f0f0f0f".to_string()),
            },
            true,
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.com/site/sites/default/files/my%20photos/dog.jpg?h=0f0f0f0f"
        );
    }

    #[test]
    fn script_path_without_clean_urls() {
        let mut config = Config::default();
        config.image.clean_urls = Some(false);
        let path = uri("public://contextual/x/0.jpg");

        let missing = compose_url(&config, &path, &UrlQuery::default(), false).unwrap();
        assert_eq!(
            missing.as_str(),
            "http://localhost/index.php/sites/default/files/contextual/x/0.jpg"
        );

        let existing = compose_url(&config, &path, &UrlQuery::default(), true).unwrap();
        assert_eq!(
            existing.as_str(),
            "http://localhost/sites/default/files/contextual/x/0.jpg"
        );
    }

    #[test]
    fn unknown_scheme_has_no_url() {
        assert!(matches!(
            compose_url(&Config::default(), &uri("s3://a.jpg"), &UrlQuery::default(), true),
            Err(CropError::UnknownScheme(_))
        ));
    }
}
