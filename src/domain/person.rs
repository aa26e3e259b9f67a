use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A cluster of face detections grouped by embedding similarity; may be named.
/// `centroid` is the running, L2-normalized mean of assigned face embeddings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: Uuid,
    pub display_name: Option<String>,
    pub centroid: Vec<f32>,
    pub member_count: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Person {
    /// `||centroid|| == 1` to floating tolerance is a standing invariant (spec.md §8).
    pub fn centroid_norm(&self) -> f32 {
        self.centroid.iter().map(|v| v * v).sum::<f32>().sqrt()
    }
}
