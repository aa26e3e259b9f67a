//! Enumerated provider selection options (spec.md §4.10). Selection happens once at
//! config load and is held behind an explicit handle (`providers::ProviderSet`), never
//! looked up dynamically at call time — see the "dynamic provider dispatch" redesign
//! note in spec.md §9.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ImageEmbedProvider {
    Stub,
    ClipB32,
    ClipL14,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum TextEmbedProvider {
    Same,
    Separate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum CaptionProfile {
    Fast,
    Balanced,
    Quality,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum FaceDetectProvider {
    Stub,
    Classic,
    Learned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum FaceEmbedProvider {
    Stub,
    Facenet,
    Lvface,
}
