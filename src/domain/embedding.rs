use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What an embedding vector represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Image,
    Text,
    Face,
}

/// A fixed-dimension, L2-normalized vector produced by a named model at a named
/// version. Unique key is `(asset_id, modality, model_name, model_version)` — a model
/// upgrade coexists with the old row until the index is rebuilt and stale rows purged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub id: Uuid,
    pub asset_id: Uuid,
    pub modality: Modality,
    pub model_name: String,
    pub model_version: String,
    pub dim: u32,
    pub device: String,
    /// Path (relative to the derived artifact store root) of the raw vector file.
    pub vector_ref: String,
    pub checksum: [u8; 32],
    pub created_at: DateTime<Utc>,
}
