use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{CaptionStyle, Modality};

/// Lifecycle state of a task (spec.md §3).
///
/// Transitions: `pending -> running -> {done, failed}`, `failed -> pending` (retry
/// after backoff), `failed -> dead` (retries exhausted or permanent), `pending|running
/// -> cancelled` (on request).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Done,
    Failed,
    Dead,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Dead | Self::Cancelled)
    }
}

/// A closed set of derivation task types, each with a structured, type-specific
/// payload. Modeled as a tagged variant rather than a dynamic type registry, per the
/// "dynamic provider dispatch" redesign note in spec.md §9: the set of task kinds is
/// fixed and known at compile time, so a single `match` in the dispatcher (see
/// `task_engine::dispatch`) replaces any runtime lookup table.
#[derive(Debug, Clone, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskType {
    Thumbnail {
        asset_id: Uuid,
        sizes: Vec<u32>,
    },
    ImageEmbed {
        asset_id: Uuid,
        model: String,
    },
    Caption {
        asset_id: Uuid,
        profile: CaptionStyle,
    },
    FaceDetect {
        asset_id: Uuid,
    },
    FaceEmbed {
        face_id: Uuid,
    },
    PersonRecluster {
        scope: ReclusterScope,
    },
    IndexRebuild {
        modality: Modality,
        model_name: String,
        model_version: String,
    },
    VideoKeyframes {
        asset_id: Uuid,
        interval_seconds: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReclusterScope {
    Incremental,
    Full,
}

impl TaskType {
    /// Short, stable name used for metrics labels and the `tasks.type` column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Thumbnail { .. } => "thumbnail",
            Self::ImageEmbed { .. } => "image_embed",
            Self::Caption { .. } => "caption",
            Self::FaceDetect { .. } => "face_detect",
            Self::FaceEmbed { .. } => "face_embed",
            Self::PersonRecluster { .. } => "person_recluster",
            Self::IndexRebuild { .. } => "index_rebuild",
            Self::VideoKeyframes { .. } => "video_keyframes",
        }
    }
}

/// A durable unit of work with a type-specific payload and lifecycle (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub payload: TaskType,
    pub state: TaskState,
    pub priority: i32,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub progress_current: Option<u64>,
    pub progress_total: Option<u64>,
    pub cancel_requested: bool,
    pub idempotency_key: Option<String>,
}
