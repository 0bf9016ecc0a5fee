//! Derivative delivery
//!
//! Validates a request, generates the derivative at most once per path
//! across concurrent requests, and returns its bytes.

use super::{derivative_path, DerivativeResolver};
use crate::backend::{content_type, FileAccess, LockGuard};
use crate::crop::{retrieve_contextual_crop, Crop, CropId};
use crate::error::{CropError, CropResult};
use crate::style::ImageStyle;
use crate::uri::StreamUri;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

/// Prefix of generation lock names
const LOCK_PREFIX: &str = "image_style_deliver";

/// Hex characters of the path digest kept in lock names
const LOCK_DIGEST_LEN: usize = 16;

/// Which crop a request wants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CropTarget {
    /// Crop for a usage context, created on demand
    Context(String),

    /// Crop decoded from a derivative path
    Id(CropId),

    /// No crop
    Uncropped,
}

impl From<Option<CropId>> for CropTarget {
    fn from(id: Option<CropId>) -> Self {
        id.map_or(Self::Uncropped, Self::Id)
    }
}

/// A request for a derivative
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverRequest {
    pub source_uri: String,
    pub style_id: String,
    pub target: CropTarget,

    /// `itok` query value
    pub token: Option<String>,
}

/// A delivered derivative
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivativeResponse {
    pub uri: StreamUri,
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub content_length: usize,

    /// Extra headers from access policies
    pub headers: Vec<(String, String)>,

    /// Whether shared caches may store the response
    pub public: bool,
}

/// Lock name guarding generation of one derivative
pub fn lock_name(style_id: &str, path: &StreamUri) -> String {
    let digest = hex::encode(Sha256::digest(path.to_string().as_bytes()));
    format!("{}:{}:{}", LOCK_PREFIX, style_id, &digest[..LOCK_DIGEST_LEN])
}

/// Compare tokens without short-circuiting on the first differing byte
fn tokens_match(given: &str, expected: &str) -> bool {
    if given.len() != expected.len() {
        return false;
    }
    given
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

impl DerivativeResolver {
    /// Serve a derivative, generating it first if needed
    ///
    /// Never waits on a lock: a concurrent generation yields `Busy`.
    pub async fn deliver(&self, request: &DeliverRequest) -> CropResult<DerivativeResponse> {
        let source = StreamUri::parse(&request.source_uri)?;
        let style = self.styles.get(&request.style_id)?;

        let crop = self.resolve_crop(style, &source, &request.target).await?;
        let crop_id = crop.as_ref().and_then(|c| c.id);

        let scheme = source.scheme();
        if !self.config.files.is_valid_scheme(scheme) {
            return Err(CropError::NotFound(format!("scheme '{}' is not registered", scheme)));
        }

        let expected = style.path_token(&source, &self.config.image.private_key);
        let token_valid = request
            .token
            .as_deref()
            .is_some_and(|token| tokens_match(token, &expected));
        if !token_valid && !self.config.image.allow_insecure_derivatives {
            warn!("Rejected {} derivative of {}: invalid token", style.id, source);
            return Err(CropError::NotFound(format!("invalid token for {}", source)));
        }

        let derivative = derivative_path(style, &source, crop_id)?;
        let is_public = if token_valid {
            scheme != "private"
        } else {
            derivative.scheme() == "public"
        };

        let headers = if is_public {
            Vec::new()
        } else {
            self.check_access(&source)?
        };

        let source_file = self.locate_source(&source, &derivative).await?;

        if !self.files.exists(&derivative).await? {
            self.generate(style, &source_file, &derivative, crop.as_ref())
                .await?;
        }

        let bytes = self.files.read(&derivative).await?;
        Ok(DerivativeResponse {
            content_type: content_type(derivative.extension()).to_string(),
            content_length: bytes.len(),
            uri: derivative,
            bytes,
            headers,
            public: is_public,
        })
    }

    async fn resolve_crop(
        &self,
        style: &ImageStyle,
        source: &StreamUri,
        target: &CropTarget,
    ) -> CropResult<Option<Crop>> {
        match target {
            CropTarget::Uncropped => Ok(None),
            CropTarget::Context(context) => {
                let crop_types = self.style_crop_types(style);
                let Some(crop_type) = crop_types.first() else {
                    debug!("Style {} uses no contextual crop", style.id);
                    return Ok(None);
                };
                retrieve_contextual_crop(self.crops.as_ref(), context, crop_type, &source.to_string())
                    .await
                    .map(Some)
            }
            CropTarget::Id(id) => {
                let crop = self
                    .crops
                    .load(*id)
                    .await?
                    .ok_or_else(|| CropError::NotFound(format!("crop {}", id)))?;
                let matches = StreamUri::parse(&crop.uri).is_ok_and(|uri| uri == *source);
                if !matches {
                    return Err(CropError::NotFound(format!(
                        "crop {} does not belong to {}",
                        id, source
                    )));
                }
                Ok(Some(crop))
            }
        }
    }

    /// Ask every policy; one deny or no allow refuses the download
    fn check_access(&self, source: &StreamUri) -> CropResult<Vec<(String, String)>> {
        let mut headers = Vec::new();
        let mut allowed = false;

        for policy in &self.policies {
            match policy.file_download(source) {
                FileAccess::Deny => {
                    return Err(CropError::AccessDenied(source.to_string()));
                }
                FileAccess::Allow(extra) => {
                    allowed = true;
                    headers.extend(extra);
                }
                FileAccess::NoOpinion => {}
            }
        }

        if !allowed {
            return Err(CropError::AccessDenied(source.to_string()));
        }
        Ok(headers)
    }

    /// Find the source file, retrying with one extension stripped
    ///
    /// Derivatives that convert formats are requested as `image.png.jpeg`
    /// by some callers; the file on disk is `image.png`.
    async fn locate_source(
        &self,
        source: &StreamUri,
        derivative: &StreamUri,
    ) -> CropResult<StreamUri> {
        if self.files.exists(source).await? {
            return Ok(source.clone());
        }

        if let Some(stripped) = source.without_extension() {
            let stripped = stripped.with_scheme(derivative.scheme());
            if self.files.exists(&stripped).await? {
                debug!("Using {} as source for {}", stripped, derivative);
                return Ok(stripped);
            }
        }

        warn!(
            "Source image at {} not found while trying to generate derivative image at {}",
            source, derivative
        );
        Err(CropError::NotFound(format!("source image {}", source)))
    }

    /// Check, lock, re-check, transform
    async fn generate(
        &self,
        style: &ImageStyle,
        source: &StreamUri,
        derivative: &StreamUri,
        crop: Option<&Crop>,
    ) -> CropResult<()> {
        let name = lock_name(&style.id, derivative);
        let Some(guard) = LockGuard::try_acquire(&self.locks, &name)? else {
            info!("Derivative {} is being generated elsewhere", derivative);
            return Err(CropError::busy());
        };

        if self.files.exists(derivative).await? {
            return Ok(());
        }

        let result = self
            .engine
            .create_derivative(style, source, derivative, crop)
            .await;
        drop(guard);

        match result {
            Ok(true) => {
                info!("Generated derivative {}", derivative);
                Ok(())
            }
            Ok(false) => {
                warn!("Failed to generate derivative image at {}", derivative);
                Err(CropError::GenerationFailed {
                    derivative: derivative.to_string(),
                })
            }
            Err(e) => {
                warn!("Failed to generate derivative image at {}: {}", derivative, e);
                Err(CropError::GenerationFailed {
                    derivative: derivative.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        AccessPolicy, AllowAll, FileStore, MemoryFileStore, TransformEngine,
    };
    use crate::config::Config;
    use crate::crop::CropStore;
    use crate::derivative::fixtures::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Notify;

    const SOURCE: &str = "public://photos/dog.jpg";
    const CONTEXT: &str = "node:article:5.field_image.0";

    /// Engine that blocks inside the transform until released
    struct GatedEngine {
        files: Arc<MemoryFileStore>,
        calls: AtomicUsize,
        started: Notify,
        proceed: Notify,
        succeed: bool,
    }

    impl GatedEngine {
        fn new(files: Arc<MemoryFileStore>, succeed: bool) -> Arc<Self> {
            Arc::new(Self {
                files,
                calls: AtomicUsize::new(0),
                started: Notify::new(),
                proceed: Notify::new(),
                succeed,
            })
        }
    }

    #[async_trait]
    impl TransformEngine for GatedEngine {
        async fn create_derivative(
            &self,
            _style: &ImageStyle,
            _source: &StreamUri,
            dest: &StreamUri,
            _crop: Option<&Crop>,
        ) -> CropResult<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.notify_one();
            self.proceed.notified().await;
            if !self.succeed {
                return Ok(false);
            }
            self.files.write(dest, b"derived").await?;
            Ok(true)
        }
    }

    struct DenyAll;

    impl AccessPolicy for DenyAll {
        fn file_download(&self, _uri: &StreamUri) -> FileAccess {
            FileAccess::Deny
        }
    }

    fn request(resolver: &DerivativeResolver, source: &str, style: &str, target: CropTarget) -> DeliverRequest {
        DeliverRequest {
            source_uri: source.to_string(),
            style_id: style.to_string(),
            target,
            token: Some(resolver.path_token(style, source).unwrap()),
        }
    }

    fn seed_source(files: &MemoryFileStore, uri: &str) {
        files.insert(&StreamUri::parse(uri).unwrap(), jpeg(800, 600));
    }

    #[tokio::test]
    async fn delivers_uncropped_thumbnail_for_context() {
        let f = fixture();
        seed_source(&f.files, SOURCE);
        let req = request(&f.resolver, SOURCE, "thumbnail", CropTarget::Context(CONTEXT.to_string()));

        let response = f.resolver.deliver(&req).await.unwrap();

        assert_eq!(
            response.uri.to_string(),
            "public://contextual/styles/thumbnail/public/photos/dog__jpg/0.jpg"
        );
        assert_eq!(response.content_type, "image/jpeg");
        assert_eq!(response.content_length, response.bytes.len());
        assert!(response.public);
        let img = image::load_from_memory(&response.bytes).unwrap();
        assert_eq!((img.width(), img.height()), (100, 75));
    }

    #[tokio::test]
    async fn concurrent_requests_generate_once() {
        let mut gate = None;
        let f = fixture_with(Config::default(), Vec::new(), |files| {
            let engine = GatedEngine::new(files, true);
            gate = Some(engine.clone());
            engine as Arc<dyn TransformEngine>
        });
        let gate = gate.unwrap();
        seed_source(&f.files, SOURCE);

        let resolver = Arc::new(f.resolver);
        let req = request(&resolver, SOURCE, "thumbnail", CropTarget::Context(CONTEXT.to_string()));

        let first = {
            let resolver = resolver.clone();
            let req = req.clone();
            tokio::spawn(async move { resolver.deliver(&req).await })
        };
        gate.started.notified().await;

        let second = resolver.deliver(&req).await.unwrap_err();
        assert!(matches!(second, CropError::Busy { retry_after: 3 }));

        gate.proceed.notify_one();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first.bytes, b"derived");

        let third = resolver.deliver(&req).await.unwrap();
        assert_eq!(third.bytes, b"derived");

        assert_eq!(gate.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.locks.acquisitions(), 1);
        assert_eq!(f.locks.releases(), 1);
    }

    #[tokio::test]
    async fn lock_released_when_generation_fails() {
        let f = fixture_with(Config::default(), Vec::new(), |files| {
            let engine = GatedEngine::new(files, false);
            engine.proceed.notify_one();
            engine as Arc<dyn TransformEngine>
        });
        seed_source(&f.files, SOURCE);
        let req = request(&f.resolver, SOURCE, "thumbnail", CropTarget::Uncropped);

        let err = f.resolver.deliver(&req).await.unwrap_err();

        assert!(matches!(err, CropError::GenerationFailed { .. }));
        assert_eq!(f.locks.acquisitions(), 1);
        assert_eq!(f.locks.releases(), 1);
        let path = f
            .resolver
            .compute_derivative_path(SOURCE, "thumbnail", None)
            .unwrap();
        assert!(!f.locks.is_held(&lock_name("thumbnail", &path)));
    }

    #[tokio::test]
    async fn existing_derivative_skips_lock() {
        let f = fixture();
        seed_source(&f.files, SOURCE);
        let path = f
            .resolver
            .compute_derivative_path(SOURCE, "thumbnail", None)
            .unwrap();
        f.files.insert(&path, b"cached".to_vec());

        let req = request(&f.resolver, SOURCE, "thumbnail", CropTarget::Uncropped);
        let response = f.resolver.deliver(&req).await.unwrap();

        assert_eq!(response.bytes, b"cached");
        assert_eq!(f.locks.acquisitions(), 0);
    }

    #[tokio::test]
    async fn contextual_crop_is_created_and_used() {
        let f = fixture();
        seed_source(&f.files, SOURCE);
        f.crops.register_file(SOURCE);

        let req = request(&f.resolver, SOURCE, "focal_card", CropTarget::Context(CONTEXT.to_string()));
        let response = f.resolver.deliver(&req).await.unwrap();

        // Unsaved crop: no id yet
        assert!(response.uri.to_string().ends_with("/dog__jpg/0.jpg"));
        let img = image::load_from_memory(&response.bytes).unwrap();
        assert_eq!((img.width(), img.height()), (400, 250));
    }

    #[tokio::test]
    async fn context_without_file_record_is_not_found() {
        let f = fixture();
        seed_source(&f.files, SOURCE);
        let req = request(&f.resolver, SOURCE, "focal_card", CropTarget::Context(CONTEXT.to_string()));
        assert!(matches!(
            f.resolver.deliver(&req).await,
            Err(CropError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn crop_id_must_belong_to_source() {
        let f = fixture();
        seed_source(&f.files, SOURCE);
        f.crops.register_file("public://photos/cat.jpg");
        let mut crop = retrieve_contextual_crop(f.crops.as_ref(), CONTEXT, "focal_point", "public://photos/cat.jpg")
            .await
            .unwrap();
        crop.set_position(10, 10);
        let id = f.crops.save(&mut crop).await.unwrap();

        let req = request(&f.resolver, SOURCE, "focal_card", CropTarget::Id(id));
        assert!(matches!(f.resolver.deliver(&req).await, Err(CropError::NotFound(_))));

        let missing = request(&f.resolver, SOURCE, "focal_card", CropTarget::Id(CropId::new(77).unwrap()));
        assert!(matches!(f.resolver.deliver(&missing).await, Err(CropError::NotFound(_))));
    }

    #[tokio::test]
    async fn token_is_enforced_unless_insecure() {
        let f = fixture();
        seed_source(&f.files, SOURCE);
        let mut req = request(&f.resolver, SOURCE, "thumbnail", CropTarget::Uncropped);
        req.token = Some("deadbeef".to_string());
        assert!(matches!(f.resolver.deliver(&req).await, Err(CropError::NotFound(_))));

        let mut config = Config::default();
        config.image.allow_insecure_derivatives = true;
        let f = fixture_with(config, Vec::new(), image_engine);
        seed_source(&f.files, SOURCE);
        req.token = None;
        let response = f.resolver.deliver(&req).await.unwrap();
        assert!(response.public);
    }

    #[tokio::test]
    async fn private_derivatives_need_access() {
        let private = "private://scans/id.jpg";

        let f = fixture();
        seed_source(&f.files, private);
        let req = request(&f.resolver, private, "thumbnail", CropTarget::Uncropped);
        assert!(matches!(f.resolver.deliver(&req).await, Err(CropError::AccessDenied(_))));

        let f = fixture_with(Config::default(), vec![Arc::new(AllowAll)], image_engine);
        seed_source(&f.files, private);
        let response = f.resolver.deliver(&req).await.unwrap();
        assert!(!response.public);
        assert_eq!(
            response.headers,
            vec![("Cache-Control".to_string(), "private".to_string())]
        );

        let policies: Vec<Arc<dyn AccessPolicy>> = vec![Arc::new(AllowAll), Arc::new(DenyAll)];
        let f = fixture_with(Config::default(), policies, image_engine);
        seed_source(&f.files, private);
        assert!(matches!(f.resolver.deliver(&req).await, Err(CropError::AccessDenied(_))));
    }

    #[tokio::test]
    async fn source_falls_back_to_stripped_extension() {
        let f = fixture();
        seed_source(&f.files, "public://photos/dog.png");

        let requested = "public://photos/dog.png.jpeg";
        let req = request(&f.resolver, requested, "thumbnail", CropTarget::Uncropped);
        let response = f.resolver.deliver(&req).await.unwrap();

        assert_eq!(
            response.uri.to_string(),
            "public://contextual/styles/thumbnail/public/photos/dog__png__jpeg/0.jpeg"
        );
        assert_eq!(response.content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn missing_source_and_unknown_scheme_are_not_found() {
        let f = fixture();
        let req = request(&f.resolver, SOURCE, "thumbnail", CropTarget::Uncropped);
        assert!(matches!(f.resolver.deliver(&req).await, Err(CropError::NotFound(_))));

        let req = request(&f.resolver, "s3://bucket/dog.jpg", "thumbnail", CropTarget::Uncropped);
        assert!(matches!(f.resolver.deliver(&req).await, Err(CropError::NotFound(_))));
        assert_eq!(f.locks.acquisitions(), 0);
    }

    #[test]
    fn token_comparison() {
        assert!(tokens_match("ab12cd34", "ab12cd34"));
        assert!(!tokens_match("ab12cd35", "ab12cd34"));
        assert!(!tokens_match("ab12cd3", "ab12cd34"));
        assert!(!tokens_match("", "ab12cd34"));
    }

    #[test]
    fn lock_names_are_scoped_per_path() {
        let a = StreamUri::parse("public://contextual/styles/thumbnail/public/a__jpg/0.jpg").unwrap();
        let b = StreamUri::parse("public://contextual/styles/thumbnail/public/a__jpg/1.jpg").unwrap();
        assert!(lock_name("thumbnail", &a).starts_with("image_style_deliver:thumbnail:"));
        assert_ne!(lock_name("thumbnail", &a), lock_name("thumbnail", &b));
        assert_eq!(lock_name("thumbnail", &a), lock_name("thumbnail", &a));
    }
}
