//! Derived artifact store (spec.md §4.2, C2): a content-partitioned filesystem
//! tree for thumbnails, raw embedding vectors, and face crops, rooted at a
//! configured directory. Every write lands at a `.tmp` path first and is
//! renamed into place, so a crash mid-write never leaves a half-written
//! artifact visible to a reader; a reader that finds nothing simply
//! re-derives (spec.md §4.2: "the core must tolerate arbitrary deletion").

use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::Modality;
use crate::error::CoreResult;

pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn thumbnail_path(&self, asset_id: Uuid, size: u32) -> PathBuf {
        let id = asset_id.to_string();
        let prefix = &id[..2.min(id.len())];
        self.root
            .join("thumbnails")
            .join(size.to_string())
            .join(prefix)
            .join(format!("{id}.jpg"))
    }

    pub fn embedding_path(&self, asset_id: Uuid, modality: Modality, model_name: &str) -> PathBuf {
        self.root
            .join("embeddings")
            .join(modality.to_string())
            .join(model_name)
            .join(format!("{asset_id}.f32"))
    }

    pub fn face_json_path(&self, asset_id: Uuid, face_idx: u32) -> PathBuf {
        self.root
            .join("faces")
            .join(asset_id.to_string())
            .join(format!("{face_idx}.json"))
    }

    pub fn face_crop_path(&self, asset_id: Uuid, face_idx: u32) -> PathBuf {
        self.root
            .join("faces")
            .join(asset_id.to_string())
            .join(format!("{face_idx}.crop.jpg"))
    }

    pub fn face_embedding_path(&self, asset_id: Uuid, face_idx: u32) -> PathBuf {
        self.root
            .join("faces")
            .join(asset_id.to_string())
            .join(format!("{face_idx}.f32"))
    }

    /// Write `bytes` to `path` atomically (write to a sibling `.tmp` file, fsync,
    /// rename) and return their SHA-256 checksum for the caller to persist
    /// alongside the artifact reference.
    pub fn write_atomic(&self, path: &Path, bytes: &[u8]) -> CoreResult<[u8; 32]> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension(format!(
            "{}.tmp",
            path.extension().and_then(|e| e.to_str()).unwrap_or("tmp")
        ));
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, path)?;

        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        let mut checksum = [0u8; 32];
        checksum.copy_from_slice(&digest);
        Ok(checksum)
    }

    /// Read an artifact, verifying it against an expected checksum. A mismatch
    /// (or missing file) is a transient condition from the caller's point of
    /// view: the caller should re-derive rather than treat it as fatal.
    pub fn read_verified(&self, path: &Path, expected_checksum: [u8; 32]) -> CoreResult<Vec<u8>> {
        let bytes = std::fs::read(path)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hasher.finalize();
        if digest.as_slice() != expected_checksum {
            return Err(crate::error::CoreError::transient_io(format!(
                "checksum mismatch reading {}",
                path.display()
            )));
        }
        Ok(bytes)
    }

    /// Serialize an `f32` vector to little-endian bytes for the `.f32` vector
    /// files referenced by `Embedding::vector_ref`.
    pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(vector.len() * 4);
        for v in vector {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    pub fn decode_vector(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_then_verified_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let path = store.thumbnail_path(Uuid::new_v4(), 256);
        let checksum = store.write_atomic(&path, b"jpeg-bytes").unwrap();
        let read_back = store.read_verified(&path, checksum).unwrap();
        assert_eq!(read_back, b"jpeg-bytes");
    }

    #[test]
    fn checksum_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let path = store.thumbnail_path(Uuid::new_v4(), 256);
        store.write_atomic(&path, b"jpeg-bytes").unwrap();
        let wrong = [0u8; 32];
        assert!(store.read_verified(&path, wrong).is_err());
    }

    #[test]
    fn vector_encode_decode_round_trips() {
        let v = vec![0.5f32, -1.0, 0.0, 3.25];
        let bytes = ArtifactStore::encode_vector(&v);
        let decoded = ArtifactStore::decode_vector(&bytes);
        assert_eq!(v, decoded);
    }
}
