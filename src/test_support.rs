//! Shared fixtures for in-crate integration tests: an assembled `CoreContext`
//! backed by a throwaway SQLite file and the deterministic stub providers, so
//! `clusterer`, `task_engine`, and `ingestion` tests can exercise real store
//! round-trips without any network or model dependency.

use std::sync::Arc;

use crate::artifact_store::ArtifactStore;
use crate::config::Config;
use crate::context::CoreContext;
use crate::providers::ProviderSet;
use crate::store::MetadataStore;
use crate::vector_index::VectorIndexRegistry;

/// Holds the temp directory alive for the context's lifetime; dropping it
/// cleans up the database file and derived-artifact tree.
pub struct TestContext {
    pub ctx: Arc<CoreContext>,
    _dir: tempfile::TempDir,
}

impl std::ops::Deref for TestContext {
    type Target = CoreContext;
    fn deref(&self) -> &CoreContext {
        &self.ctx
    }
}

pub async fn new_context() -> TestContext {
    new_context_with_roots(Vec::new()).await
}

pub async fn new_context_with_roots(originals_paths: Vec<std::path::PathBuf>) -> TestContext {
    new_context_with(originals_paths, |_| {}).await
}

/// Build a context like [`new_context_with_roots`], then apply `configure` to
/// the assembled `Config` before the store/artifact tree is opened — for
/// tests that need a non-default tuning value (e.g. backpressure threshold).
pub async fn new_context_with(originals_paths: Vec<std::path::PathBuf>, configure: impl FnOnce(&mut Config)) -> TestContext {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = Config::default();
    config.database_path = dir.path().join("metadata.sqlite");
    config.derived_path = dir.path().join("derived");
    config.worker_concurrency = 1;
    config.poll_interval_ms = 10;
    config.backoff_base_ms = 1;
    config.backoff_cap_ms = 4;
    config.originals_paths = originals_paths;
    configure(&mut config);

    let store = Arc::new(MetadataStore::open(&config.database_path).await.expect("open store"));
    let artifacts = Arc::new(ArtifactStore::new(config.derived_path.clone()));
    let vector_indexes = Arc::new(VectorIndexRegistry::new(config.derived_path.join("vector_index")));
    let providers = Arc::new(ProviderSet::from_config(&config));

    let ctx = Arc::new(CoreContext {
        config,
        store,
        artifacts,
        vector_indexes,
        providers,
    });

    TestContext { ctx, _dir: dir }
}

/// Write an L2-normalized face embedding vector to the artifact tree and
/// return the path it was written at, for use as `FaceDetection.embedding_ref`.
pub fn write_face_vector(ctx: &CoreContext, asset_id: uuid::Uuid, face_idx: u32, mut vector: Vec<f32>) -> std::path::PathBuf {
    crate::vector_index::l2_normalize(&mut vector);
    let path = ctx.artifacts.face_embedding_path(asset_id, face_idx);
    let bytes = crate::artifact_store::ArtifactStore::encode_vector(&vector);
    ctx.artifacts.write_atomic(&path, &bytes).expect("write face vector");
    path
}
