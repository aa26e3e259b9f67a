//! The task engine worker pool (spec.md §4.5, C5): `worker_concurrency`
//! workers independently claim, dispatch, and settle tasks in a poll loop,
//! backing off with jitter on transient failure and dead-lettering on
//! exhausted retries or permanent errors. Grounded on the `watch`-channel
//! status/shutdown idiom used by the job executor this module generalizes
//! from a single named job type to the closed `TaskType` dispatch table.

pub mod backoff;
mod handlers;
pub mod idempotency;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::context::CoreContext;
use crate::domain::TaskState;
use crate::error::ErrorKind;

/// A running pool of task workers. Dropping or calling `shutdown` signals
/// every worker to finish its current task and stop claiming new ones.
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `ctx.config.worker_concurrency` workers.
    pub fn spawn(ctx: Arc<CoreContext>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::with_capacity(ctx.config.worker_concurrency);
        for worker_index in 0..ctx.config.worker_concurrency {
            let ctx = ctx.clone();
            let mut shutdown_rx = shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(worker_index, ctx, &mut shutdown_rx).await;
            }));
        }
        Self { shutdown_tx, handles }
    }

    /// Signal every worker to stop claiming new tasks, then wait for
    /// in-flight tasks to settle (spec.md §4.6: graceful shutdown never
    /// abandons a task mid-write; it finishes or the process is killed).
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            if let Err(err) = handle.await {
                error!(?err, "task worker panicked");
            }
        }
    }
}

async fn worker_loop(worker_index: usize, ctx: Arc<CoreContext>, shutdown_rx: &mut watch::Receiver<bool>) {
    debug!(worker_index, "task worker started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match ctx.store.claim_next_task().await {
            Ok(Some(task)) => {
                run_one(&ctx, task).await;
            }
            Ok(None) => {
                let poll = Duration::from_millis(ctx.config.poll_interval_ms);
                tokio::select! {
                    _ = tokio::time::sleep(poll) => {}
                    _ = shutdown_rx.changed() => {}
                }
            }
            Err(err) => {
                warn!(?err, worker_index, "failed to claim next task");
                tokio::time::sleep(Duration::from_millis(ctx.config.poll_interval_ms)).await;
            }
        }
    }
    debug!(worker_index, "task worker stopped");
}

async fn run_one(ctx: &Arc<CoreContext>, task: crate::domain::Task) {
    let type_name = task.payload.type_name();
    let started = Instant::now();

    let result = handlers::dispatch(ctx, &task).await;
    let elapsed = started.elapsed().as_secs_f64();
    crate::metrics::record_task_duration(type_name, elapsed);

    match result {
        Ok(()) => {
            if let Err(err) = ctx.store.complete_task(task.id).await {
                error!(?err, task_id = %task.id, "failed to mark task complete");
            }
            crate::metrics::record_task_processed(type_name, "success");
            info!(task_id = %task.id, type_name, elapsed, "task completed");
        }
        Err(err) if err.kind == ErrorKind::Cancelled => {
            if let Err(store_err) = ctx.store.cancel_task(task.id).await {
                error!(?store_err, task_id = %task.id, "failed to mark task cancelled");
            }
            crate::metrics::record_task_processed(type_name, "cancelled");
            info!(task_id = %task.id, type_name, "task cancelled");
        }
        Err(err) => settle_failure(ctx, &task, type_name, err).await,
    }
}

async fn settle_failure(ctx: &Arc<CoreContext>, task: &crate::domain::Task, type_name: &str, err: crate::error::CoreError) {
    let message = err.to_string();
    let next_retry_count = task.retry_count + 1;

    if err.is_retryable() && task.retry_count < task.max_retries.max(1) {
        let delay_ms = backoff::compute_delay_ms(ctx.config.backoff_base_ms, ctx.config.backoff_cap_ms, task.retry_count);
        let scheduled_at = chrono::Utc::now() + chrono::Duration::milliseconds(delay_ms as i64);
        if let Err(store_err) = ctx
            .store
            .retry_task(task.id, next_retry_count, scheduled_at, &message)
            .await
        {
            error!(?store_err, task_id = %task.id, "failed to reschedule task for retry");
        }
        crate::metrics::record_task_retried(type_name);
        warn!(task_id = %task.id, type_name, %message, delay_ms, "task failed, will retry");
    } else {
        if let Err(store_err) = ctx.store.dead_letter_task(task.id, &message).await {
            error!(?store_err, task_id = %task.id, "failed to dead-letter task");
        }
        crate::metrics::record_task_dead(type_name);
        error!(task_id = %task.id, type_name, %message, "task dead-lettered");
    }
}

/// Reclaim any task left `running` past a startup grace period, returning it
/// to `pending` so a crashed previous process never strands work (spec.md
/// §4.6: the engine must detect and recover from an unclean shutdown).
pub async fn reclaim_orphaned_tasks(ctx: &CoreContext, max_age: chrono::Duration) -> crate::error::CoreResult<usize> {
    let stale = ctx.store.find_stale_running(max_age).await?;
    let mut reclaimed = 0;
    for task in stale {
        if task.state == TaskState::Running {
            ctx.store.reclaim_timed_out(task.id).await?;
            reclaimed += 1;
        }
    }
    if reclaimed > 0 {
        info!(reclaimed, "reclaimed orphaned tasks from an unclean shutdown");
    }
    Ok(reclaimed)
}

/// Enqueue a task by idempotency key, returning the id of the task that now
/// owns that key (either the newly created one or an existing match).
pub async fn enqueue_idempotent(ctx: &CoreContext, task: crate::domain::Task) -> crate::error::CoreResult<Uuid> {
    ctx.store.enqueue_idempotent(&task).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Task, TaskType};
    use crate::test_support;

    fn unsupported_task() -> Task {
        let now = chrono::Utc::now();
        Task {
            id: Uuid::new_v4(),
            payload: TaskType::VideoKeyframes { asset_id: Uuid::new_v4(), interval_seconds: 1.0 },
            state: TaskState::Pending,
            priority: 0,
            retry_count: 0,
            max_retries: 3,
            last_error: None,
            scheduled_at: now,
            created_at: now,
            started_at: None,
            finished_at: None,
            progress_current: None,
            progress_total: None,
            cancel_requested: false,
            idempotency_key: None,
        }
    }

    #[tokio::test]
    async fn a_permanent_failure_is_dead_lettered_without_retry() {
        let tc = test_support::new_context().await;
        let task = unsupported_task();
        tc.store.enqueue_task(&task).await.unwrap();
        let claimed = tc.store.claim_next_task().await.unwrap().unwrap();

        run_one(&tc.ctx, claimed).await;

        let stored = tc.store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Dead);
        assert_eq!(stored.retry_count, 0);
    }

    #[tokio::test]
    async fn a_retryable_failure_reschedules_with_backoff() {
        let tc = test_support::new_context().await;
        let now = chrono::Utc::now();
        // FaceEmbed on a nonexistent face yields NotFound, which is not
        // retryable either — use a missing asset file instead, which
        // surfaces as TransientIo (std::io::Error::NotFound) through
        // `read_asset_bytes`, classified retryable by `From<std::io::Error>`... but
        // NotFound io errors map to ErrorKind::NotFound, which is NOT
        // retryable. Exercise the retry path directly against `settle_failure`
        // instead, independent of which handler produced the error.
        let task = Task {
            id: Uuid::new_v4(),
            payload: TaskType::Thumbnail { asset_id: Uuid::new_v4(), sizes: vec![32] },
            state: TaskState::Running,
            priority: 0,
            retry_count: 0,
            max_retries: 3,
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
        tc.store.enqueue_task(&task).await.unwrap();

        let err = crate::error::CoreError::transient_io("disk hiccup");
        settle_failure(&tc.ctx, &task, "thumbnail", err).await;

        let stored = tc.store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Pending);
        assert_eq!(stored.retry_count, 1);
        assert!(stored.scheduled_at > now);
    }

    #[tokio::test]
    async fn a_retryable_failure_is_dead_lettered_once_retries_are_exhausted() {
        let tc = test_support::new_context().await;
        let now = chrono::Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            payload: TaskType::Thumbnail { asset_id: Uuid::new_v4(), sizes: vec![32] },
            state: TaskState::Running,
            priority: 0,
            retry_count: 3,
            max_retries: 3,
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
        tc.store.enqueue_task(&task).await.unwrap();

        let err = crate::error::CoreError::transient_io("disk hiccup again");
        settle_failure(&tc.ctx, &task, "thumbnail", err).await;

        let stored = tc.store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Dead);
    }

    #[tokio::test]
    async fn reclaim_orphaned_tasks_returns_stale_running_tasks_to_pending() {
        let tc = test_support::new_context().await;
        let mut task = unsupported_task();
        task.state = TaskState::Running;
        task.started_at = Some(chrono::Utc::now() - chrono::Duration::hours(2));
        tc.store.enqueue_task(&task).await.unwrap();

        let reclaimed = reclaim_orphaned_tasks(&tc, chrono::Duration::minutes(1)).await.unwrap();
        assert_eq!(reclaimed, 1);

        let stored = tc.store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Pending);
    }

    #[tokio::test]
    async fn worker_pool_drains_a_real_task_to_completion() {
        let tc = test_support::new_context().await;
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.jpg");
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(16, 16));
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Jpeg).unwrap();
        std::fs::write(&path, &bytes).unwrap();

        let asset = crate::domain::Asset {
            id: Uuid::new_v4(),
            path: path.display().to_string(),
            sha256: [2u8; 32],
            perceptual_hash: 0,
            mime: "image/jpeg".to_string(),
            width: 16,
            height: 16,
            orientation: 1,
            taken_at: None,
            camera: None,
            gps: None,
            size_bytes: bytes.len() as u64,
            imported_at: chrono::Utc::now(),
            status: crate::domain::AssetStatus::Active,
        };
        tc.store.upsert_asset(&asset).await.unwrap();

        let now = chrono::Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            payload: TaskType::Thumbnail { asset_id: asset.id, sizes: vec![8] },
            state: TaskState::Pending,
            priority: 0,
            retry_count: 0,
            max_retries: 3,
            last_error: None,
            scheduled_at: now,
            created_at: now,
            started_at: None,
            finished_at: None,
            progress_current: None,
            progress_total: None,
            cancel_requested: false,
            idempotency_key: None,
        };
        tc.store.enqueue_task(&task).await.unwrap();

        let pool = WorkerPool::spawn(tc.ctx.clone());
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            let stored = tc.store.get_task(task.id).await.unwrap().unwrap();
            if stored.state == TaskState::Done || std::time::Instant::now() > deadline {
                assert_eq!(stored.state, TaskState::Done);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        pool.shutdown().await;

        assert!(tc.artifacts.thumbnail_path(asset.id, 8).exists());
    }
}
