//! Flat inner-product vector index over L2-normalized image embeddings
//! (spec.md §4.3, C3). An optional ANN backend (HNSW/IVF) is explicitly an
//! implementation detail behind this same interface (spec.md §4.3) — a flat
//! scan is sufficient for a personal library's scale and keeps the core free
//! of a heavyweight ANN dependency.
//!
//! Concurrency follows spec.md §4.3: writes (`add`/`remove`) serialize through
//! an internal mutex; readers take a cheap `Arc` clone of the current
//! snapshot under a read lock, so a long-running query never blocks a
//! concurrent add.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Snapshot {
    model_name: String,
    model_version: String,
    dim: u32,
    entries: Vec<(Uuid, Vec<f32>)>,
}

impl Snapshot {
    fn empty(model_name: String, model_version: String, dim: u32) -> Self {
        Self {
            model_name,
            model_version,
            dim,
            entries: Vec::new(),
        }
    }
}

/// A single (model_name, model_version, dim)-scoped index instance.
pub struct VectorIndex {
    snapshot_path: PathBuf,
    current: RwLock<Arc<Snapshot>>,
    write_lock: Mutex<()>,
}

#[derive(Debug, Clone, Copy)]
pub struct ScoredAsset {
    pub asset_id: Uuid,
    pub score: f32,
}

impl VectorIndex {
    pub fn new(snapshot_path: impl Into<PathBuf>, model_name: &str, model_version: &str, dim: u32) -> Self {
        Self {
            snapshot_path: snapshot_path.into(),
            current: RwLock::new(Arc::new(Snapshot::empty(
                model_name.to_string(),
                model_version.to_string(),
                dim,
            ))),
            write_lock: Mutex::new(()),
        }
    }

    pub async fn size(&self) -> usize {
        self.current.read().await.entries.len()
    }

    pub async fn model_name(&self) -> String {
        self.current.read().await.model_name.clone()
    }

    pub async fn model_version(&self) -> String {
        self.current.read().await.model_version.clone()
    }

    pub async fn dim(&self) -> u32 {
        self.current.read().await.dim
    }

    /// Insert or replace the vector for `asset_id`. `vector` must already be
    /// L2-normalized and match the index's configured dimension.
    pub async fn add(&self, asset_id: Uuid, vector: Vec<f32>) -> CoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let base = self.current.read().await.clone();
        if vector.len() as u32 != base.dim {
            return Err(CoreError::validation(format!(
                "vector dim {} does not match index dim {}",
                vector.len(),
                base.dim
            )));
        }
        let mut entries: Vec<(Uuid, Vec<f32>)> =
            base.entries.iter().filter(|(id, _)| *id != asset_id).cloned().collect();
        entries.push((asset_id, vector));
        let next = Arc::new(Snapshot {
            model_name: base.model_name.clone(),
            model_version: base.model_version.clone(),
            dim: base.dim,
            entries,
        });
        *self.current.write().await = next;
        Ok(())
    }

    pub async fn remove(&self, asset_id: Uuid) -> CoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let base = self.current.read().await.clone();
        let entries: Vec<(Uuid, Vec<f32>)> =
            base.entries.iter().filter(|(id, _)| *id != asset_id).cloned().collect();
        let next = Arc::new(Snapshot {
            model_name: base.model_name.clone(),
            model_version: base.model_version.clone(),
            dim: base.dim,
            entries,
        });
        *self.current.write().await = next;
        Ok(())
    }

    /// Rank every indexed vector against `query` (also expected L2-normalized)
    /// by descending inner product, breaking ties by `asset_id` ascending
    /// (spec.md §4.8 determinism rule applies equally here).
    pub async fn query(&self, query: &[f32], k: usize) -> CoreResult<Vec<ScoredAsset>> {
        let snapshot = self.current.read().await.clone();
        if query.len() as u32 != snapshot.dim {
            return Err(CoreError::validation(format!(
                "query dim {} does not match index dim {}",
                query.len(),
                snapshot.dim
            )));
        }
        let mut scored: Vec<ScoredAsset> = snapshot
            .entries
            .iter()
            .map(|(id, vector)| ScoredAsset {
                asset_id: *id,
                score: inner_product(query, vector),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.asset_id.cmp(&b.asset_id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// Persist the current snapshot to `snapshot_path` atomically.
    pub async fn persist(&self) -> CoreResult<()> {
        let snapshot = self.current.read().await.clone();
        let bytes = rmp_serde::to_vec(&*snapshot)
            .map_err(|e| CoreError::internal(format!("snapshot encode failed: {e}")))?;
        if let Some(parent) = self.snapshot_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = self.snapshot_path.with_extension("tmp");
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.snapshot_path)?;
        Ok(())
    }

    /// Load a persisted snapshot, verifying it matches `(model_name,
    /// model_version, dim)`. On any mismatch or I/O failure, returns `Ok(false)`
    /// and leaves the in-memory index untouched — the caller schedules an
    /// `index_rebuild` task instead (spec.md §4.3).
    pub async fn load(&self, model_name: &str, model_version: &str, dim: u32) -> CoreResult<bool> {
        let bytes = match std::fs::read(&self.snapshot_path) {
            Ok(bytes) => bytes,
            Err(_) => return Ok(false),
        };
        let loaded: Snapshot = match rmp_serde::from_slice(&bytes) {
            Ok(s) => s,
            Err(_) => return Ok(false),
        };
        if loaded.model_name != model_name || loaded.model_version != model_version || loaded.dim != dim {
            return Ok(false);
        }
        *self.current.write().await = Arc::new(loaded);
        Ok(true)
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Swap in a wholly new set of vectors in one atomic step, used by the
    /// `index_rebuild` handler once it has streamed every embedding.
    pub async fn replace_all(&self, entries: Vec<(Uuid, Vec<f32>)>) -> CoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let base = self.current.read().await.clone();
        let next = Arc::new(Snapshot {
            model_name: base.model_name.clone(),
            model_version: base.model_version.clone(),
            dim: base.dim,
            entries,
        });
        *self.current.write().await = next;
        Ok(())
    }
}

fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// L2-normalize a vector in place; a zero vector is left unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Grouping key for the set of independently-maintained index instances
/// (one per modality/model/version triple currently in active use).
pub type IndexKey = (crate::domain::Modality, String, String);

/// Holds every live `VectorIndex`, keyed by `(modality, model_name,
/// model_version)`. New keys are created lazily on first write.
pub struct VectorIndexRegistry {
    root: PathBuf,
    indexes: RwLock<HashMap<IndexKey, Arc<VectorIndex>>>,
}

impl VectorIndexRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            indexes: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_or_create(
        &self,
        modality: crate::domain::Modality,
        model_name: &str,
        model_version: &str,
        dim: u32,
    ) -> Arc<VectorIndex> {
        let key: IndexKey = (modality, model_name.to_string(), model_version.to_string());
        if let Some(existing) = self.indexes.read().await.get(&key) {
            return existing.clone();
        }
        let mut guard = self.indexes.write().await;
        guard
            .entry(key)
            .or_insert_with(|| {
                let path = self
                    .root
                    .join(format!("{modality}-{model_name}-{model_version}.idx"));
                Arc::new(VectorIndex::new(path, model_name, model_version, dim))
            })
            .clone()
    }

    /// Sum of vector counts across every index currently held in memory, for
    /// the `vector_index_size` gauge (spec.md §4.5/C9).
    pub async fn total_size(&self) -> usize {
        let guard = self.indexes.read().await;
        let mut total = 0;
        for index in guard.values() {
            total += index.size().await;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn query_returns_exact_match_first() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::new(dir.path().join("snap.idx"), "clip_b32", "v1", 3);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        index.add(a, vec![1.0, 0.0, 0.0]).await.unwrap();
        index.add(b, vec![0.0, 1.0, 0.0]).await.unwrap();

        let results = index.query(&[1.0, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(results[0].asset_id, a);
        assert!(results[0].score >= 0.999);
    }

    #[tokio::test]
    async fn persist_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.idx");
        let index = VectorIndex::new(&path, "clip_b32", "v1", 2);
        let id = Uuid::new_v4();
        index.add(id, vec![0.6, 0.8]).await.unwrap();
        index.persist().await.unwrap();

        let reloaded = VectorIndex::new(&path, "clip_b32", "v1", 2);
        assert!(reloaded.load("clip_b32", "v1", 2).await.unwrap());
        assert_eq!(reloaded.size().await, 1);
    }

    #[tokio::test]
    async fn load_rejects_model_version_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.idx");
        let index = VectorIndex::new(&path, "clip_b32", "v1", 2);
        index.add(Uuid::new_v4(), vec![1.0, 0.0]).await.unwrap();
        index.persist().await.unwrap();

        let reloaded = VectorIndex::new(&path, "clip_b32", "v2", 2);
        assert!(!reloaded.load("clip_b32", "v2", 2).await.unwrap());
        assert_eq!(reloaded.size().await, 0);
    }

    #[test]
    fn l2_normalize_produces_unit_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }
}
