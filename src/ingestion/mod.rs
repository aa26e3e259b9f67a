//! Ingestion pipeline (spec.md §4.6, C6): walks configured root paths,
//! fingerprints every matching file, and dedups against the metadata store
//! by content hash, fanning out derivation tasks for genuinely new or
//! reactivated assets in the same transaction their asset row is written in
//! (spec.md §9 treats "same transaction" as "same logical scan step", since
//! SQLite serializes writers — see `store::claim_next_task`'s module doc).

mod exif;
mod walker;

use std::path::{Path, PathBuf};

use chrono::Utc;
use image_hasher::HasherConfig;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::context::CoreContext;
use crate::domain::{Asset, AssetStatus, Task, TaskState, TaskType};
use crate::error::CoreResult;
use crate::task_engine::idempotency;

pub use walker::{walk_roots, MEDIA_EXTENSIONS};

/// Minimum and maximum file sizes ingestion will consider (spec.md §4.6:
/// "filtering by configured extension set and size bounds"). Bytes below the
/// floor are near-certainly corrupt or placeholder files; the ceiling guards
/// against accidentally walking into an unrelated multi-gigabyte file.
pub const MIN_FILE_SIZE_BYTES: u64 = 64;
pub const MAX_FILE_SIZE_BYTES: u64 = 2 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanReport {
    pub files_seen: u64,
    pub assets_created: u64,
    pub assets_reactivated: u64,
    pub assets_updated: u64,
    pub assets_marked_missing: u64,
    pub files_skipped_error: u64,
    /// Newly created assets whose derivation tasks were deferred because
    /// `tasks_pending` had already crossed `max_pending_backpressure`
    /// (spec.md §5). A later scan will not retry the enqueue on its own;
    /// the backlog needs to drain first.
    pub derivation_enqueue_deferred: u64,
}

enum IngestOutcome {
    Skipped,
    Created(Uuid),
    Reactivated(Uuid),
    Updated(Uuid),
    Unchanged(Uuid),
}

/// Run a full scan over every configured originals path, then mark any
/// previously active asset not seen in this scan as `missing`.
pub async fn scan(ctx: &CoreContext) -> CoreResult<ScanReport> {
    let mut report = ScanReport::default();
    let mut seen_ids = Vec::new();
    let mut pending_count = ctx.store.count_tasks_in_state(TaskState::Pending).await?;

    for root in &ctx.config.originals_paths {
        for path in walk_roots(root) {
            report.files_seen += 1;
            match ingest_one(ctx, &path, &mut pending_count, &mut report.derivation_enqueue_deferred).await {
                Ok(IngestOutcome::Created(id)) => {
                    report.assets_created += 1;
                    seen_ids.push(id);
                }
                Ok(IngestOutcome::Reactivated(id)) => {
                    report.assets_reactivated += 1;
                    seen_ids.push(id);
                }
                Ok(IngestOutcome::Updated(id)) => {
                    report.assets_updated += 1;
                    seen_ids.push(id);
                }
                Ok(IngestOutcome::Unchanged(id)) => {
                    seen_ids.push(id);
                }
                Ok(IngestOutcome::Skipped) => {}
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping file that failed ingestion");
                    report.files_skipped_error += 1;
                }
            }
        }
    }

    let marked = ctx.store.mark_assets_missing_except(&seen_ids).await?;
    report.assets_marked_missing = marked;
    Ok(report)
}

/// Fingerprint and dedup a single file (spec.md §4.6 step 3).
async fn ingest_one(
    ctx: &CoreContext,
    path: &Path,
    pending_count: &mut u64,
    deferred: &mut u64,
) -> CoreResult<IngestOutcome> {
    let metadata = std::fs::metadata(path)?;
    if !metadata.is_file() {
        return Ok(IngestOutcome::Skipped);
    }
    let size_bytes = metadata.len();
    if size_bytes < MIN_FILE_SIZE_BYTES || size_bytes > MAX_FILE_SIZE_BYTES {
        return Ok(IngestOutcome::Skipped);
    }

    let bytes = std::fs::read(path)?;
    let sha256 = sha256_of(&bytes);
    let sha256_hex = hex::encode(sha256);
    let perceptual_hash = perceptual_hash_of(&bytes).unwrap_or(0);
    let (width, height, orientation, taken_at, camera, gps) = exif::extract(&bytes, path);
    let mime = mime_of(path);

    if let Some(mut existing) = ctx.store.find_asset_by_sha256(&sha256_hex).await? {
        let path_str = path.display().to_string();
        let was_missing = existing.status == AssetStatus::Missing;
        let path_changed = existing.path != path_str;
        existing.path = path_str;
        existing.mime = mime;
        existing.width = width;
        existing.height = height;
        existing.orientation = orientation;
        existing.taken_at = taken_at;
        existing.camera = camera;
        existing.gps = gps;
        existing.size_bytes = size_bytes;
        existing.status = AssetStatus::Active;
        ctx.store.upsert_asset(&existing).await?;

        return Ok(if was_missing {
            IngestOutcome::Reactivated(existing.id)
        } else if path_changed {
            IngestOutcome::Updated(existing.id)
        } else {
            IngestOutcome::Unchanged(existing.id)
        });
    }

    let asset = Asset {
        id: Uuid::new_v4(),
        path: path.display().to_string(),
        sha256,
        perceptual_hash,
        mime,
        width,
        height,
        orientation,
        taken_at,
        camera,
        gps,
        size_bytes,
        imported_at: Utc::now(),
        status: AssetStatus::Active,
    };
    ctx.store.upsert_asset(&asset).await?;
    if *pending_count >= ctx.config.max_pending_backpressure {
        tracing::warn!(
            asset_id = %asset.id,
            pending = *pending_count,
            limit = ctx.config.max_pending_backpressure,
            "deferring derivation tasks: pending backlog over max_pending_backpressure"
        );
        *deferred += 1;
    } else {
        *pending_count += enqueue_derivation_tasks(ctx, &asset).await?;
    }
    Ok(IngestOutcome::Created(asset.id))
}

/// Enqueue the fixed set of follow-on tasks for a newly created asset,
/// returning how many were actually enqueued (spec.md §5: each call also
/// adds to the `tasks_pending` count the backpressure check reads).
async fn enqueue_derivation_tasks(ctx: &CoreContext, asset: &Asset) -> CoreResult<u64> {
    let sizes = vec![256u32];
    let model = ctx.providers.image_embedder_model_name();

    enqueue(ctx, TaskType::Thumbnail { asset_id: asset.id, sizes: sizes.clone() }, idempotency::thumbnail_key(asset.id, &sizes)).await?;
    enqueue(ctx, TaskType::ImageEmbed { asset_id: asset.id, model: model.clone() }, idempotency::image_embed_key(asset.id, &model)).await?;
    enqueue(
        ctx,
        TaskType::Caption {
            asset_id: asset.id,
            profile: profile_from_config(ctx),
        },
        idempotency::caption_key(asset.id, &profile_from_config(ctx).to_string()),
    )
    .await?;
    enqueue(ctx, TaskType::FaceDetect { asset_id: asset.id }, idempotency::face_detect_key(asset.id)).await?;
    Ok(4)
}

fn profile_from_config(ctx: &CoreContext) -> crate::domain::CaptionStyle {
    use crate::config::CaptionProfile;
    use crate::domain::CaptionStyle;
    match ctx.config.caption_profile {
        CaptionProfile::Fast => CaptionStyle::Fast,
        CaptionProfile::Balanced => CaptionStyle::Balanced,
        CaptionProfile::Quality => CaptionStyle::Quality,
        CaptionProfile::Auto => CaptionStyle::Balanced,
    }
}

async fn enqueue(ctx: &CoreContext, payload: TaskType, idempotency_key: String) -> CoreResult<()> {
    let now = Utc::now();
    let task = Task {
        id: Uuid::new_v4(),
        payload,
        state: TaskState::Pending,
        priority: 0,
        retry_count: 0,
        max_retries: ctx.config.max_task_retries,
        last_error: None,
        scheduled_at: now,
        created_at: now,
        started_at: None,
        finished_at: None,
        progress_current: None,
        progress_total: None,
        cancel_requested: false,
        idempotency_key: Some(idempotency_key),
    };
    ctx.store.enqueue_idempotent(&task).await?;
    Ok(())
}

fn sha256_of(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

fn perceptual_hash_of(bytes: &[u8]) -> Option<u64> {
    let image = image::load_from_memory(bytes).ok()?;
    let hasher = HasherConfig::new().hash_size(8, 8).to_hasher();
    let hash = hasher.hash_image(&image);
    let raw = hash.as_bytes();
    let mut value = 0u64;
    for (i, byte) in raw.iter().take(8).enumerate() {
        value |= (*byte as u64) << (i * 8);
    }
    Some(value)
}

fn mime_of(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("heic") | Some("heif") => "image/heic",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("tiff") | Some("tif") => "image/tiff",
        _ => "application/octet-stream",
    }
    .to_string()
}

/// Near-duplicate lookup (spec.md §4.6): a read-only Hamming-distance query
/// over perceptual hashes, distinct from exact sha256 dedup and never
/// affecting asset identity.
pub async fn find_near_duplicates(ctx: &CoreContext, asset_id: Uuid, max_distance: u32) -> CoreResult<Vec<Asset>> {
    let asset = ctx
        .store
        .get_asset(asset_id)
        .await?
        .ok_or_else(|| crate::error::CoreError::not_found(format!("asset {asset_id} not found")))?;
    let mut matches = ctx.store.nearest_perceptual_hash(asset.perceptual_hash, max_distance).await?;
    matches.retain(|a| a.id != asset_id);
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn mime_of_recognizes_common_extensions() {
        assert_eq!(mime_of(Path::new("photo.JPG")), "image/jpeg");
        assert_eq!(mime_of(Path::new("photo.png")), "image/png");
        assert_eq!(mime_of(Path::new("photo.xyz")), "application/octet-stream");
    }

    #[test]
    fn sha256_is_stable() {
        let a = sha256_of(b"same bytes");
        let b = sha256_of(b"same bytes");
        assert_eq!(a, b);
    }

    fn write_test_png(path: &Path) {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(32, 32));
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    #[tokio::test]
    async fn scan_creates_an_asset_and_enqueues_derivation_tasks() {
        let root = tempfile::tempdir().unwrap();
        write_test_png(&root.path().join("a.png"));
        let tc = test_support::new_context_with_roots(vec![root.path().to_path_buf()]).await;

        let report = scan(&tc).await.unwrap();
        assert_eq!(report.files_seen, 1);
        assert_eq!(report.assets_created, 1);

        let active = tc.store.list_active_assets().await.unwrap();
        assert_eq!(active.len(), 1);

        let pending = tc.store.list_tasks(Some(TaskState::Pending), 10).await.unwrap();
        let kinds: std::collections::HashSet<&'static str> =
            pending.iter().map(|t| t.payload.type_name()).collect();
        assert!(kinds.contains("thumbnail"));
        assert!(kinds.contains("image_embed"));
        assert!(kinds.contains("caption"));
        assert!(kinds.contains("face_detect"));
    }

    #[tokio::test]
    async fn rescan_leaves_an_unchanged_asset_active_and_marks_a_removed_one_missing() {
        let root = tempfile::tempdir().unwrap();
        write_test_png(&root.path().join("keep.png"));
        write_test_png(&root.path().join("remove.png"));
        let tc = test_support::new_context_with_roots(vec![root.path().to_path_buf()]).await;

        let first = scan(&tc).await.unwrap();
        assert_eq!(first.assets_created, 2);

        std::fs::remove_file(root.path().join("remove.png")).unwrap();
        let second = scan(&tc).await.unwrap();
        assert_eq!(second.assets_created, 0);
        assert_eq!(second.assets_marked_missing, 1);

        let active = tc.store.list_active_assets().await.unwrap();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn scan_defers_derivation_tasks_once_the_pending_backlog_is_over_the_limit() {
        let root = tempfile::tempdir().unwrap();
        write_test_png(&root.path().join("a.png"));
        let roots = vec![root.path().to_path_buf()];
        let tc = test_support::new_context_with(roots, |config| {
            config.max_pending_backpressure = 0;
        })
        .await;

        let report = scan(&tc).await.unwrap();
        assert_eq!(report.assets_created, 1);
        assert_eq!(report.derivation_enqueue_deferred, 1);

        let pending = tc.store.list_tasks(Some(TaskState::Pending), 10).await.unwrap();
        assert!(pending.is_empty());
    }
}
