use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Requested captioning quality/speed tradeoff; selects a captioner profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CaptionStyle {
    Fast,
    Balanced,
    Quality,
}

/// A caption variant for an asset. At most three non-user variants coexist per asset;
/// a `user_edited` variant is never overwritten by regeneration (spec.md §3, pinning
/// the Open Question in spec.md §9 as an enforced invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Caption {
    pub id: Uuid,
    pub asset_id: Uuid,
    pub text: String,
    pub provider: String,
    pub model_version: String,
    pub user_edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Maximum number of non-user-edited caption variants retained per asset.
pub const MAX_GENERATED_CAPTION_VARIANTS: usize = 3;
