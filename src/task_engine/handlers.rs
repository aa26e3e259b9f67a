//! Per-`TaskType` dispatch (spec.md §4.5, C5). One function per task kind;
//! `dispatch` below is the single `match` the "dynamic provider dispatch"
//! redesign note (spec.md §9) calls for in place of a runtime handler
//! registry.

use chrono::Utc;
use uuid::Uuid;

use crate::artifact_store::ArtifactStore;
use crate::clusterer;
use crate::context::CoreContext;
use crate::domain::{
    self, CaptionStyle, Embedding, FaceDetection, Modality, ReclusterScope, Task, TaskType,
};
use crate::error::{CoreError, CoreResult};
use crate::task_engine::idempotency;

/// Run the handler for `task.payload`, checking a cancellation checkpoint
/// before any provider call so a requested cancellation is honored without
/// wasting a full retry cycle (spec.md §4.6).
pub async fn dispatch(ctx: &CoreContext, task: &Task) -> CoreResult<()> {
    if ctx.store.is_cancel_requested(task.id).await? {
        return Err(CoreError::cancelled("cancellation requested before dispatch"));
    }

    match &task.payload {
        TaskType::Thumbnail { asset_id, sizes } => thumbnail(ctx, *asset_id, sizes).await,
        TaskType::ImageEmbed { asset_id, model } => image_embed(ctx, *asset_id, model).await,
        TaskType::Caption { asset_id, profile } => caption(ctx, *asset_id, *profile).await,
        TaskType::FaceDetect { asset_id } => face_detect(ctx, *asset_id).await,
        TaskType::FaceEmbed { face_id } => face_embed(ctx, *face_id).await,
        TaskType::PersonRecluster { scope } => person_recluster(ctx, task.id, *scope).await,
        TaskType::IndexRebuild {
            modality,
            model_name,
            model_version,
        } => index_rebuild(ctx, *modality, model_name, model_version).await,
        TaskType::VideoKeyframes { .. } => Err(CoreError::permanent_config(
            "video keyframe extraction is not supported by this build",
        )),
    }
}

async fn read_asset_bytes(ctx: &CoreContext, asset_id: Uuid) -> CoreResult<(domain::Asset, Vec<u8>)> {
    let asset = ctx
        .store
        .get_asset(asset_id)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("asset {asset_id} not found")))?;
    let bytes = std::fs::read(&asset.path)?;
    Ok((asset, bytes))
}

async fn thumbnail(ctx: &CoreContext, asset_id: Uuid, sizes: &[u32]) -> CoreResult<()> {
    let (_, bytes) = read_asset_bytes(ctx, asset_id).await?;
    for &size in sizes {
        let jpeg = ctx.providers.thumbnailer.thumbnail(&bytes, size).await?;
        let path = ctx.artifacts.thumbnail_path(asset_id, size);
        ctx.artifacts.write_atomic(&path, &jpeg)?;
    }
    Ok(())
}

async fn image_embed(ctx: &CoreContext, asset_id: Uuid, model: &str) -> CoreResult<()> {
    let (_, bytes) = read_asset_bytes(ctx, asset_id).await?;
    let result = ctx.providers.image_embedder.embed(&bytes).await?;
    if result.model_name != model {
        return Err(CoreError::permanent_config(format!(
            "configured image embed model '{model}' does not match active provider '{}'",
            result.model_name
        )));
    }

    let path = ctx.artifacts.embedding_path(asset_id, Modality::Image, &result.model_name);
    let vector_bytes = ArtifactStore::encode_vector(&result.vector);
    let checksum = ctx.artifacts.write_atomic(&path, &vector_bytes)?;

    let embedding = Embedding {
        id: Uuid::new_v4(),
        asset_id,
        modality: Modality::Image,
        model_name: result.model_name.clone(),
        model_version: result.model_version,
        dim: result.vector.len() as u32,
        device: result.device,
        vector_ref: path.display().to_string(),
        checksum,
        created_at: Utc::now(),
    };
    ctx.store.upsert_embedding(&embedding).await?;

    let index = ctx
        .vector_indexes
        .get_or_create(Modality::Image, &embedding.model_name, &embedding.model_version, embedding.dim)
        .await;
    index.add(asset_id, result.vector).await?;
    crate::metrics::record_embedding_generated(&Modality::Image.to_string());
    Ok(())
}

async fn caption(ctx: &CoreContext, asset_id: Uuid, profile: CaptionStyle) -> CoreResult<()> {
    let (_, bytes) = read_asset_bytes(ctx, asset_id).await?;
    let options = crate::providers::CaptionOptions {
        max_length: 200,
        style: profile,
    };
    let result = ctx.providers.captioner.caption(&bytes, &options).await?;

    let now = Utc::now();
    let caption = domain::Caption {
        id: Uuid::new_v4(),
        asset_id,
        text: result.text,
        provider: "core".to_string(),
        model_version: result.model_version,
        user_edited: false,
        created_at: now,
        updated_at: now,
    };
    ctx.store.upsert_caption(&caption).await?;
    ctx.store
        .prune_generated_captions(asset_id, domain::MAX_GENERATED_CAPTION_VARIANTS)
        .await?;
    Ok(())
}

async fn face_detect(ctx: &CoreContext, asset_id: Uuid) -> CoreResult<()> {
    let (_, bytes) = read_asset_bytes(ctx, asset_id).await?;
    let detections = ctx.providers.face_detector.detect(&bytes).await?;

    for (face_index, detected) in detections.into_iter().enumerate() {
        let face = FaceDetection {
            id: Uuid::new_v4(),
            asset_id,
            face_index: face_index as u32,
            bbox: detected.bbox,
            confidence: detected.confidence,
            embedding_ref: None,
            embedding_pending: true,
            person_id: None,
            created_at: Utc::now(),
        };
        ctx.store.upsert_face(&face).await?;

        let follow_on = Task {
            id: Uuid::new_v4(),
            payload: TaskType::FaceEmbed { face_id: face.id },
            state: domain::TaskState::Pending,
            priority: 0,
            retry_count: 0,
            max_retries: ctx.config.max_task_retries,
            last_error: None,
            scheduled_at: Utc::now(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            progress_current: None,
            progress_total: None,
            cancel_requested: false,
            idempotency_key: Some(idempotency::face_embed_key(face.id)),
        };
        ctx.store.enqueue_idempotent(&follow_on).await?;
    }
    Ok(())
}

async fn face_embed(ctx: &CoreContext, face_id: Uuid) -> CoreResult<()> {
    let face = ctx
        .store
        .get_face(face_id)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("face {face_id} not found")))?;
    let (_, bytes) = read_asset_bytes(ctx, face.asset_id).await?;

    let result = ctx.providers.face_embedder.embed(&bytes, face.bbox).await?;

    let path = ctx.artifacts.face_embedding_path(face.asset_id, face.face_index);
    let vector_bytes = ArtifactStore::encode_vector(&result.vector);
    ctx.artifacts.write_atomic(&path, &vector_bytes)?;

    let mut updated = face.clone();
    updated.embedding_ref = Some(path.display().to_string());
    updated.embedding_pending = false;
    ctx.store.upsert_face(&updated).await?;

    clusterer::assign_incremental(ctx, &updated, &result.vector).await?;

    let follow_on = Task {
        id: Uuid::new_v4(),
        payload: TaskType::PersonRecluster {
            scope: ReclusterScope::Incremental,
        },
        state: domain::TaskState::Pending,
        priority: 10,
        retry_count: 0,
        max_retries: ctx.config.max_task_retries,
        last_error: None,
        scheduled_at: Utc::now(),
        created_at: Utc::now(),
        started_at: None,
        finished_at: None,
        progress_current: None,
        progress_total: None,
        cancel_requested: false,
        idempotency_key: None,
    };
    ctx.store.enqueue_task(&follow_on).await?;
    Ok(())
}

/// `incremental` reclustering is a no-op marker task: the actual assignment
/// already happened synchronously in `face_embed`. `full` delegates to the
/// batch re-cluster, reporting progress and honoring cancellation.
async fn person_recluster(ctx: &CoreContext, task_id: Uuid, scope: ReclusterScope) -> CoreResult<()> {
    match scope {
        ReclusterScope::Incremental => Ok(()),
        ReclusterScope::Full => {
            if ctx.store.has_other_running_full_recluster(task_id).await? {
                return Err(CoreError::conflict("a full re-cluster is already running"));
            }
            const PROGRESS_STEP: u64 = 50;
            match clusterer::full_recluster(ctx, task_id, PROGRESS_STEP).await? {
                clusterer::ReclusterOutcome::Completed => Ok(()),
                clusterer::ReclusterOutcome::Cancelled => {
                    Err(CoreError::cancelled("full re-cluster cancelled"))
                }
            }
        }
    }
}

async fn index_rebuild(
    ctx: &CoreContext,
    modality: Modality,
    model_name: &str,
    model_version: &str,
) -> CoreResult<()> {
    let embeddings = ctx
        .store
        .list_embeddings(modality, model_name, model_version)
        .await?;

    let mut entries = Vec::with_capacity(embeddings.len());
    for embedding in &embeddings {
        let bytes = ctx
            .artifacts
            .read_verified(std::path::Path::new(&embedding.vector_ref), embedding.checksum)?;
        entries.push((embedding.asset_id, ArtifactStore::decode_vector(&bytes)));
    }

    let dim = embeddings.first().map(|e| e.dim).unwrap_or(0);
    let index = ctx
        .vector_indexes
        .get_or_create(modality, model_name, model_version, dim)
        .await;
    index.replace_all(entries).await;
    index.persist().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    fn sample_jpeg_bytes(size: u32) -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_fn(size, size, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }));
        let mut out = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Jpeg).unwrap();
        out
    }

    async fn seed_asset(ctx: &CoreContext, dir: &std::path::Path) -> domain::Asset {
        let path = dir.join("photo.jpg");
        std::fs::write(&path, sample_jpeg_bytes(64)).unwrap();
        let asset = domain::Asset {
            id: Uuid::new_v4(),
            path: path.display().to_string(),
            sha256: [1u8; 32],
            perceptual_hash: 0,
            mime: "image/jpeg".to_string(),
            width: 64,
            height: 64,
            orientation: 1,
            taken_at: None,
            camera: None,
            gps: None,
            size_bytes: 100,
            imported_at: Utc::now(),
            status: domain::AssetStatus::Active,
        };
        ctx.store.upsert_asset(&asset).await.unwrap();
        asset
    }

    #[tokio::test]
    async fn thumbnail_writes_a_jpeg_artifact_per_size() {
        let tc = test_support::new_context().await;
        let tmp = tempfile::tempdir().unwrap();
        let asset = seed_asset(&tc, tmp.path()).await;

        thumbnail(&tc, asset.id, &[32, 64]).await.unwrap();

        for size in [32u32, 64] {
            let path = tc.artifacts.thumbnail_path(asset.id, size);
            assert!(path.exists(), "thumbnail for size {size} should exist");
        }
    }

    #[tokio::test]
    async fn image_embed_rejects_a_model_mismatch() {
        let tc = test_support::new_context().await;
        let tmp = tempfile::tempdir().unwrap();
        let asset = seed_asset(&tc, tmp.path()).await;

        let err = image_embed(&tc, asset.id, "not-the-active-model").await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::PermanentConfig);
    }

    #[tokio::test]
    async fn image_embed_persists_embedding_and_indexes_it() {
        let tc = test_support::new_context().await;
        let tmp = tempfile::tempdir().unwrap();
        let asset = seed_asset(&tc, tmp.path()).await;
        let model = tc.providers.image_embedder_model_name();

        image_embed(&tc, asset.id, &model).await.unwrap();

        let embeddings = tc.store.list_embeddings_for_asset_modality(asset.id, Modality::Image).await.unwrap();
        assert_eq!(embeddings.len(), 1);
        assert_eq!(embeddings[0].model_name, model);
    }

    #[tokio::test]
    async fn caption_writes_a_row_and_prunes_older_variants() {
        let tc = test_support::new_context().await;
        let tmp = tempfile::tempdir().unwrap();
        let asset = seed_asset(&tc, tmp.path()).await;

        for _ in 0..(domain::MAX_GENERATED_CAPTION_VARIANTS + 2) {
            caption(&tc, asset.id, CaptionStyle::Balanced).await.unwrap();
        }

        let captions = tc.store.list_captions_for_asset(asset.id).await.unwrap();
        assert!(captions.len() <= domain::MAX_GENERATED_CAPTION_VARIANTS);
    }

    #[tokio::test]
    async fn face_detect_enqueues_a_face_embed_follow_on() {
        let tc = test_support::new_context().await;
        let tmp = tempfile::tempdir().unwrap();
        let asset = seed_asset(&tc, tmp.path()).await;

        face_detect(&tc, asset.id).await.unwrap();

        let faces = tc.store.list_faces_for_asset(asset.id).await.unwrap();
        assert_eq!(faces.len(), 1);
        assert!(faces[0].embedding_pending);

        let pending = tc.store.list_tasks(Some(domain::TaskState::Pending), 10).await.unwrap();
        assert!(pending.iter().any(|t| matches!(t.payload, TaskType::FaceEmbed { face_id } if face_id == faces[0].id)));
    }

    #[tokio::test]
    async fn face_embed_assigns_a_person_and_enqueues_incremental_recluster() {
        let tc = test_support::new_context().await;
        let tmp = tempfile::tempdir().unwrap();
        let asset = seed_asset(&tc, tmp.path()).await;
        face_detect(&tc, asset.id).await.unwrap();
        let face = tc.store.list_faces_for_asset(asset.id).await.unwrap().into_iter().next().unwrap();

        face_embed(&tc, face.id).await.unwrap();

        let updated = tc.store.get_face(face.id).await.unwrap().unwrap();
        assert!(!updated.embedding_pending);
        assert!(updated.person_id.is_some());

        let pending = tc.store.list_tasks(Some(domain::TaskState::Pending), 10).await.unwrap();
        assert!(pending
            .iter()
            .any(|t| matches!(&t.payload, TaskType::PersonRecluster { scope } if *scope == ReclusterScope::Incremental)));
    }

    #[tokio::test]
    async fn incremental_recluster_is_a_no_op() {
        let tc = test_support::new_context().await;
        person_recluster(&tc, Uuid::new_v4(), ReclusterScope::Incremental).await.unwrap();
    }

    #[tokio::test]
    async fn full_recluster_rejects_starting_while_another_is_already_running() {
        let tc = test_support::new_context().await;
        let now = Utc::now();
        let already_running = Task {
            id: Uuid::new_v4(),
            payload: TaskType::PersonRecluster { scope: ReclusterScope::Full },
            state: domain::TaskState::Running,
            priority: 0,
            retry_count: 0,
            max_retries: 1,
            last_error: None,
            scheduled_at: now,
            created_at: now,
            started_at: Some(now),
            finished_at: None,
            progress_current: None,
            progress_total: None,
            cancel_requested: false,
            idempotency_key: None,
        };
        tc.store.enqueue_task(&already_running).await.unwrap();

        let err = person_recluster(&tc, Uuid::new_v4(), ReclusterScope::Full).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn video_keyframes_is_permanently_unsupported() {
        let tc = test_support::new_context().await;
        let task = Task {
            id: Uuid::new_v4(),
            payload: TaskType::VideoKeyframes { asset_id: Uuid::new_v4(), interval_seconds: 1.0 },
            state: domain::TaskState::Pending,
            priority: 0,
            retry_count: 0,
            max_retries: 1,
            last_error: None,
            scheduled_at: Utc::now(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            progress_current: None,
            progress_total: None,
            cancel_requested: false,
            idempotency_key: None,
        };
        let err = dispatch(&tc, &task).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::PermanentConfig);
    }
}
