use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Axis-aligned bounding box in pixel units, clamped to the source image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl BoundingBox {
    /// Clamp this box so it never extends past the image it was detected in.
    pub fn clamped(self, image_width: u32, image_height: u32) -> Self {
        let x = self.x.min(image_width);
        let y = self.y.min(image_height);
        let w = self.w.min(image_width.saturating_sub(x));
        let h = self.h.min(image_height.saturating_sub(y));
        Self { x, y, w, h }
    }
}

/// A detected face within an asset. May or may not yet carry an embedding; every
/// persisted row that lacks one is marked `embedding_pending` (spec.md §3 invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceDetection {
    pub id: Uuid,
    pub asset_id: Uuid,
    /// Ordinal position among this asset's detections, used to name its
    /// derived artifact files (`faces/{asset_id}/{face_index}.json`).
    pub face_index: u32,
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub embedding_ref: Option<String>,
    pub embedding_pending: bool,
    pub person_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
