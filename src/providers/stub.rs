//! Deterministic stand-ins for the real model-backed providers. These exist
//! so the task engine, ingestion pipeline and search surface have something
//! concrete to run and test against without the concrete ML models spec.md §1
//! places out of scope. Thumbnailing is the one operation genuinely
//! reproducible without a model, so it goes through the real `image` crate;
//! every other provider hashes its input into a deterministic vector/text so
//! the same input always yields the same derived artifact.

use async_trait::async_trait;
use image::imageops::FilterType;
use sha2::{Digest, Sha256};

use super::{
    CaptionOptions, CaptionResult, Captioner, DetectedFace, FaceDetector, FaceEmbedResult, FaceEmbedder,
    HealthReport, ImageEmbedResult, ImageEmbedder, ProviderStatus, TextEmbedResult, TextEmbedder, Thumbnailer,
};
use crate::domain::BoundingBox;
use crate::error::{CoreError, CoreResult};
use crate::vector_index::l2_normalize;

pub struct ImageCrateThumbnailer;

#[async_trait]
impl Thumbnailer for ImageCrateThumbnailer {
    async fn thumbnail(&self, image_bytes: &[u8], target_size: u32) -> CoreResult<Vec<u8>> {
        let image_bytes = image_bytes.to_vec();
        tokio::task::spawn_blocking(move || {
            let img = image::load_from_memory(&image_bytes)
                .map_err(|e| CoreError::permanent_decode(format!("image decode failed: {e}")))?;
            let resized = img.resize(target_size, target_size, FilterType::Lanczos3);
            let mut out = Vec::new();
            resized
                .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Jpeg)
                .map_err(|e| CoreError::internal(format!("jpeg encode failed: {e}")))?;
            Ok(out)
        })
        .await
        .map_err(|e| CoreError::internal(format!("thumbnail task panicked: {e}")))?
    }

    async fn health(&self) -> HealthReport {
        HealthReport {
            status: ProviderStatus::Ready,
            model_version: "image-crate".to_string(),
            device: "cpu".to_string(),
            diagnostics: String::new(),
        }
    }
}

/// Hashes `bytes` into a `dim`-length unit vector. Deterministic: the same
/// bytes always produce the same vector, which is enough to drive
/// idempotency and index-consistency tests (spec.md §8) without a real model.
fn deterministic_vector(bytes: &[u8], dim: u32, salt: &str) -> Vec<f32> {
    let mut vector = Vec::with_capacity(dim as usize);
    let mut counter: u32 = 0;
    while vector.len() < dim as usize {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(counter.to_le_bytes());
        hasher.update(bytes);
        let digest = hasher.finalize();
        for chunk in digest.chunks_exact(4) {
            if vector.len() == dim as usize {
                break;
            }
            let as_u32 = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            vector.push((as_u32 as f32 / u32::MAX as f32) * 2.0 - 1.0);
        }
        counter += 1;
    }
    l2_normalize(&mut vector);
    vector
}

pub struct StubImageEmbedder {
    model_name: String,
    model_version: String,
    dim: u32,
}

impl StubImageEmbedder {
    pub fn new(model_name: &str, model_version: &str, dim: u32) -> Self {
        Self {
            model_name: model_name.to_string(),
            model_version: model_version.to_string(),
            dim,
        }
    }
}

#[async_trait]
impl ImageEmbedder for StubImageEmbedder {
    async fn embed(&self, image_bytes: &[u8]) -> CoreResult<ImageEmbedResult> {
        if image::load_from_memory(image_bytes).is_err() {
            return Err(CoreError::permanent_decode("unreadable image bytes"));
        }
        Ok(ImageEmbedResult {
            vector: deterministic_vector(image_bytes, self.dim, &self.model_name),
            model_name: self.model_name.clone(),
            model_version: self.model_version.clone(),
            device: "cpu".to_string(),
        })
    }

    fn dim(&self) -> u32 {
        self.dim
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn health(&self) -> HealthReport {
        HealthReport {
            status: ProviderStatus::Ready,
            model_version: self.model_version.clone(),
            device: "cpu".to_string(),
            diagnostics: String::new(),
        }
    }
}

pub struct StubTextEmbedder {
    model_name: String,
    model_version: String,
    dim: u32,
}

impl StubTextEmbedder {
    pub fn new(model_name: &str, model_version: &str, dim: u32) -> Self {
        Self {
            model_name: model_name.to_string(),
            model_version: model_version.to_string(),
            dim,
        }
    }
}

#[async_trait]
impl TextEmbedder for StubTextEmbedder {
    async fn embed(&self, text: &str) -> CoreResult<TextEmbedResult> {
        if text.trim().is_empty() {
            return Err(CoreError::validation("empty query text"));
        }
        Ok(TextEmbedResult {
            vector: deterministic_vector(text.as_bytes(), self.dim, &self.model_name),
            model_name: self.model_name.clone(),
            model_version: self.model_version.clone(),
        })
    }

    fn dim(&self) -> u32 {
        self.dim
    }

    async fn health(&self) -> HealthReport {
        HealthReport {
            status: ProviderStatus::Ready,
            model_version: self.model_version.clone(),
            device: "cpu".to_string(),
            diagnostics: String::new(),
        }
    }
}

pub struct StubCaptioner {
    model_version: String,
}

impl StubCaptioner {
    pub fn new(model_version: &str) -> Self {
        Self {
            model_version: model_version.to_string(),
        }
    }
}

#[async_trait]
impl Captioner for StubCaptioner {
    async fn caption(&self, image_bytes: &[u8], options: &CaptionOptions) -> CoreResult<CaptionResult> {
        if image::load_from_memory(image_bytes).is_err() {
            return Err(CoreError::permanent_decode("unreadable image bytes"));
        }
        let mut hasher = Sha256::new();
        hasher.update(image_bytes);
        let digest = hasher.finalize();
        let mut text = format!("a photo ({})", hex::encode(&digest[..4]));
        text.truncate(options.max_length.max(8));
        Ok(CaptionResult {
            text,
            confidence: match options.style {
                crate::domain::CaptionStyle::Fast => 0.6,
                crate::domain::CaptionStyle::Balanced => 0.75,
                crate::domain::CaptionStyle::Quality => 0.9,
            },
            model_version: self.model_version.clone(),
        })
    }

    async fn health(&self) -> HealthReport {
        HealthReport {
            status: ProviderStatus::Ready,
            model_version: self.model_version.clone(),
            device: "cpu".to_string(),
            diagnostics: String::new(),
        }
    }
}

pub struct StubFaceDetector {
    model_version: String,
}

impl StubFaceDetector {
    pub fn new(model_version: &str) -> Self {
        Self {
            model_version: model_version.to_string(),
        }
    }
}

#[async_trait]
impl FaceDetector for StubFaceDetector {
    async fn detect(&self, image_bytes: &[u8]) -> CoreResult<Vec<DetectedFace>> {
        let img = image::load_from_memory(image_bytes)
            .map_err(|e| CoreError::permanent_decode(format!("image decode failed: {e}")))?;
        // Deterministic "detection": a centered box sized relative to the
        // image, present whenever the image is large enough to plausibly
        // contain a face. Stands in for a real detector's output shape.
        let (width, height) = (img.width(), img.height());
        if width < 32 || height < 32 {
            return Ok(Vec::new());
        }
        let box_w = width / 3;
        let box_h = height / 3;
        let bbox = BoundingBox {
            x: (width - box_w) / 2,
            y: (height - box_h) / 2,
            w: box_w,
            h: box_h,
        }
        .clamped(width, height);
        Ok(vec![DetectedFace {
            bbox,
            confidence: 0.8,
        }])
    }

    async fn health(&self) -> HealthReport {
        HealthReport {
            status: ProviderStatus::Ready,
            model_version: self.model_version.clone(),
            device: "cpu".to_string(),
            diagnostics: String::new(),
        }
    }
}

pub struct StubFaceEmbedder {
    model_version: String,
    dim: u32,
}

impl StubFaceEmbedder {
    pub fn new(model_version: &str, dim: u32) -> Self {
        Self {
            model_version: model_version.to_string(),
            dim,
        }
    }
}

#[async_trait]
impl FaceEmbedder for StubFaceEmbedder {
    async fn embed(&self, image_bytes: &[u8], bbox: BoundingBox) -> CoreResult<FaceEmbedResult> {
        if image::load_from_memory(image_bytes).is_err() {
            return Err(CoreError::permanent_decode("unreadable image bytes"));
        }
        let mut salt_bytes = image_bytes.to_vec();
        salt_bytes.extend_from_slice(&bbox.x.to_le_bytes());
        salt_bytes.extend_from_slice(&bbox.y.to_le_bytes());
        Ok(FaceEmbedResult {
            vector: deterministic_vector(&salt_bytes, self.dim, "face"),
            model_version: self.model_version.clone(),
        })
    }

    fn dim(&self) -> u32 {
        self.dim
    }

    async fn health(&self) -> HealthReport {
        HealthReport {
            status: ProviderStatus::Ready,
            model_version: self.model_version.clone(),
            device: "cpu".to_string(),
            diagnostics: String::new(),
        }
    }
}
