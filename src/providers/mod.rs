//! Provider interfaces (spec.md §4.4, C4): abstract adapters over the actual
//! ML models, which are out of scope (spec.md §1). The core only ever talks
//! to these traits, selected once at config load into a `ProviderSet` and
//! held behind an explicit handle — never looked up dynamically at call time
//! (spec.md §9, "dynamic provider dispatch").
//!
//! Each trait method returns `CoreResult<T>`; implementations classify
//! failures into `ErrorKind::TransientProvider` (retry) or
//! `ErrorKind::PermanentDecode` / `PermanentConfig` (dead-letter) per
//! spec.md §4.4 and §7.

mod stub;

use async_trait::async_trait;

use crate::config::{CaptionProfile, Config, FaceDetectProvider, FaceEmbedProvider, ImageEmbedProvider, TextEmbedProvider};
use crate::domain::BoundingBox;
use crate::error::CoreResult;

/// Provider health, reported to C9 (spec.md §4.4, §4.9).
#[derive(Debug, Clone, PartialEq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ProviderStatus {
    Ready,
    Degraded,
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub status: ProviderStatus,
    pub model_version: String,
    pub device: String,
    pub diagnostics: String,
}

#[derive(Debug, Clone)]
pub struct ImageEmbedResult {
    pub vector: Vec<f32>,
    pub model_name: String,
    pub model_version: String,
    pub device: String,
}

#[derive(Debug, Clone)]
pub struct TextEmbedResult {
    pub vector: Vec<f32>,
    pub model_name: String,
    pub model_version: String,
}

#[derive(Debug, Clone)]
pub struct CaptionOptions {
    pub max_length: usize,
    pub style: crate::domain::CaptionStyle,
}

#[derive(Debug, Clone)]
pub struct CaptionResult {
    pub text: String,
    pub confidence: f32,
    pub model_version: String,
}

#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub confidence: f32,
}

#[derive(Debug, Clone)]
pub struct FaceEmbedResult {
    pub vector: Vec<f32>,
    pub model_version: String,
}

#[async_trait]
pub trait Thumbnailer: Send + Sync {
    async fn thumbnail(&self, image_bytes: &[u8], target_size: u32) -> CoreResult<Vec<u8>>;
    async fn health(&self) -> HealthReport;
}

#[async_trait]
pub trait ImageEmbedder: Send + Sync {
    async fn embed(&self, image_bytes: &[u8]) -> CoreResult<ImageEmbedResult>;
    fn dim(&self) -> u32;
    /// Stable model name, used to key the vector index and to name the
    /// `image_embed` task's idempotency key (spec.md §4.5).
    fn model_name(&self) -> &str;
    async fn health(&self) -> HealthReport;
}

#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> CoreResult<TextEmbedResult>;
    fn dim(&self) -> u32;
    async fn health(&self) -> HealthReport;
}

#[async_trait]
pub trait Captioner: Send + Sync {
    async fn caption(&self, image_bytes: &[u8], options: &CaptionOptions) -> CoreResult<CaptionResult>;
    async fn health(&self) -> HealthReport;
}

#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect(&self, image_bytes: &[u8]) -> CoreResult<Vec<DetectedFace>>;
    async fn health(&self) -> HealthReport;
}

#[async_trait]
pub trait FaceEmbedder: Send + Sync {
    async fn embed(&self, image_bytes: &[u8], bbox: BoundingBox) -> CoreResult<FaceEmbedResult>;
    fn dim(&self) -> u32;
    async fn health(&self) -> HealthReport;
}

/// The concrete providers selected at config load (spec.md §9: selection
/// happens once, held behind a handle; never a runtime registry lookup).
pub struct ProviderSet {
    pub thumbnailer: Box<dyn Thumbnailer>,
    pub image_embedder: Box<dyn ImageEmbedder>,
    pub text_embedder: Box<dyn TextEmbedder>,
    pub captioner: Box<dyn Captioner>,
    pub face_detector: Box<dyn FaceDetector>,
    pub face_embedder: Box<dyn FaceEmbedder>,
}

impl ProviderSet {
    /// Stable model name of the active image embedder, used by ingestion to
    /// stamp the `image_embed` task's idempotency key.
    pub fn image_embedder_model_name(&self) -> String {
        self.image_embedder.model_name().to_string()
    }

    /// Build the provider set named by `config`. Every option in
    /// spec.md §4.10's enumerated provider columns currently resolves to the
    /// deterministic stub implementation — swapping in a real model-backed
    /// provider means implementing these same traits, not changing this
    /// function's shape.
    pub fn from_config(config: &Config) -> Self {
        let (image_model_name, image_model_version, image_dim) = match config.image_embed_provider {
            ImageEmbedProvider::Stub => ("stub", "v0", 32),
            ImageEmbedProvider::ClipB32 => ("clip_b32", "v1", 512),
            ImageEmbedProvider::ClipL14 => ("clip_l14", "v1", 768),
        };
        let image_embedder: Box<dyn ImageEmbedder> =
            Box::new(stub::StubImageEmbedder::new(image_model_name, image_model_version, image_dim));
        // "Same" means text queries share the image embedder's vector space,
        // so it must key the vector index identically (spec.md §4.8: a text
        // query looks up the `Image` modality index under the active image
        // embedder's model name/version).
        let text_embedder: Box<dyn TextEmbedder> = match config.text_embed_provider {
            TextEmbedProvider::Same => {
                Box::new(stub::StubTextEmbedder::new(image_model_name, image_model_version, image_dim))
            }
            TextEmbedProvider::Separate => Box::new(stub::StubTextEmbedder::new("stub-text-separate", "v0", 256)),
        };
        let captioner: Box<dyn Captioner> = Box::new(stub::StubCaptioner::new(match config.caption_profile {
            CaptionProfile::Fast => "fast-v0",
            CaptionProfile::Balanced => "balanced-v0",
            CaptionProfile::Quality => "quality-v0",
            CaptionProfile::Auto => "auto-v0",
        }));
        let face_detector: Box<dyn FaceDetector> = match config.face_detect_provider {
            FaceDetectProvider::Stub => Box::new(stub::StubFaceDetector::new("stub")),
            FaceDetectProvider::Classic => Box::new(stub::StubFaceDetector::new("classic-v0")),
            FaceDetectProvider::Learned => Box::new(stub::StubFaceDetector::new("learned-v0")),
        };
        let face_embedder: Box<dyn FaceEmbedder> = match config.face_embed_provider {
            FaceEmbedProvider::Stub => Box::new(stub::StubFaceEmbedder::new("stub", 128)),
            FaceEmbedProvider::Facenet => Box::new(stub::StubFaceEmbedder::new("facenet-v0", 128)),
            FaceEmbedProvider::Lvface => Box::new(stub::StubFaceEmbedder::new("lvface-v0", 512)),
        };

        Self {
            thumbnailer: Box::new(stub::ImageCrateThumbnailer),
            image_embedder,
            text_embedder,
            captioner,
            face_detector,
            face_embedder,
        }
    }
}
