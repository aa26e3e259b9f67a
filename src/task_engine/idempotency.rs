//! Idempotency key derivation (spec.md §4.5): `hash(type, asset_id or
//! face_id, model_name, model_version)` so re-enqueuing the same logical work
//! never creates a duplicate task.

use uuid::Uuid;

fn key(parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"\0");
    }
    hasher.finalize().to_hex().to_string()
}

pub fn thumbnail_key(asset_id: Uuid, sizes: &[u32]) -> String {
    let sizes_joined = sizes.iter().map(u32::to_string).collect::<Vec<_>>().join(",");
    key(&["thumbnail", &asset_id.to_string(), &sizes_joined])
}

pub fn image_embed_key(asset_id: Uuid, model: &str) -> String {
    key(&["image_embed", &asset_id.to_string(), model])
}

pub fn caption_key(asset_id: Uuid, profile: &str) -> String {
    key(&["caption", &asset_id.to_string(), profile])
}

pub fn face_detect_key(asset_id: Uuid) -> String {
    key(&["face_detect", &asset_id.to_string()])
}

pub fn face_embed_key(face_id: Uuid) -> String {
    key(&["face_embed", &face_id.to_string()])
}

pub fn index_rebuild_key(modality: &str, model_name: &str, model_version: &str) -> String {
    key(&["index_rebuild", modality, model_name, model_version])
}
