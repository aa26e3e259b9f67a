use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of an ingested asset. `active <-> missing` transitions happen on
/// rescan; `error` is set when derivation permanently fails to even read the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Active,
    Missing,
    Error,
}

/// A unique ingested media file, identified by content hash. Immutable identity once
/// created; `path` may move on rescan, `status` may flip `active <-> missing`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub path: String,
    pub sha256: [u8; 32],
    pub perceptual_hash: u64,
    pub mime: String,
    pub width: u32,
    pub height: u32,
    pub orientation: u16,
    pub taken_at: Option<DateTime<Utc>>,
    pub camera: Option<String>,
    pub gps: Option<(f64, f64)>,
    pub size_bytes: u64,
    pub imported_at: DateTime<Utc>,
    pub status: AssetStatus,
}

impl Asset {
    pub fn sha256_hex(&self) -> String {
        hex::encode(self.sha256)
    }
}
