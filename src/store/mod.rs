//! The metadata store: the relational record of every asset, task, embedding,
//! caption, face detection and person (spec.md §4.1, C1).
//!
//! Tasks are claimed through a transactional compare-and-swap rather than a
//! `SELECT ... FOR UPDATE SKIP LOCKED` (SQLite has neither row locks nor that
//! clause): a candidate is picked by an ordered `SELECT`, then a raw `UPDATE ...
//! WHERE id = ? AND state = 'pending'` either claims it or loses to a
//! concurrent claimant, which SQLite's single-writer transaction serialization
//! makes safe without an external lock (spec.md §9, "database-as-queue race").

pub mod entities;
pub mod migration;

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database as SeaDatabase,
    DatabaseConnection, EntityTrait, ModelTrait, Order, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Statement, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use tracing::info;
use uuid::Uuid;

use crate::domain::{self, TaskState};
use crate::error::{CoreError, CoreResult};

/// Wraps the SeaORM connection and exposes the store's read/write surface.
pub struct MetadataStore {
    conn: DatabaseConnection,
}

impl MetadataStore {
    /// Open (creating if absent) the SQLite database at `path` and apply the
    /// write-throughput PRAGMAs.
    pub async fn open(path: &Path) -> CoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", path.display());
        let mut opt = ConnectOptions::new(db_url);
        opt.max_connections(10)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(8))
            .idle_timeout(Duration::from_secs(30))
            .sqlx_logging(false);

        let conn = SeaDatabase::connect(opt).await.map_err(CoreError::from)?;
        Self::apply_pragmas(&conn).await;
        migration::Migrator::up(&conn, None)
            .await
            .map_err(CoreError::from)?;

        info!(path = %path.display(), "metadata store opened");
        Ok(Self { conn })
    }

    async fn apply_pragmas(conn: &DatabaseConnection) {
        for pragma in [
            "PRAGMA journal_mode=WAL",
            "PRAGMA synchronous=NORMAL",
            "PRAGMA temp_store=MEMORY",
            "PRAGMA cache_size=-20000",
            "PRAGMA mmap_size=67108864",
            "PRAGMA foreign_keys=ON",
        ] {
            let _ = conn
                .execute(Statement::from_string(
                    sea_orm::DatabaseBackend::Sqlite,
                    pragma,
                ))
                .await;
        }
    }

    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    // ---- assets --------------------------------------------------------

    pub async fn upsert_asset(&self, asset: &domain::Asset) -> CoreResult<()> {
        let am = entities::asset::active_model_from(asset);
        entities::asset::Entity::insert(am)
            .on_conflict(
                sea_orm::sea_query::OnConflict::column(entities::asset::Column::Id)
                    .update_columns([
                        entities::asset::Column::Path,
                        entities::asset::Column::Mime,
                        entities::asset::Column::Width,
                        entities::asset::Column::Height,
                        entities::asset::Column::Orientation,
                        entities::asset::Column::TakenAt,
                        entities::asset::Column::Camera,
                        entities::asset::Column::GpsLat,
                        entities::asset::Column::GpsLon,
                        entities::asset::Column::SizeBytes,
                        entities::asset::Column::Status,
                    ])
                    .to_owned(),
            )
            .exec(&self.conn)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    pub async fn find_asset_by_sha256(&self, sha256_hex: &str) -> CoreResult<Option<domain::Asset>> {
        let row = entities::asset::Entity::find()
            .filter(entities::asset::Column::Sha256.eq(sha256_hex))
            .one(&self.conn)
            .await
            .map_err(CoreError::from)?;
        Ok(row.map(entities::asset::Model::into_domain))
    }

    pub async fn get_asset(&self, id: Uuid) -> CoreResult<Option<domain::Asset>> {
        let row = entities::asset::Entity::find_by_id(id.to_string())
            .one(&self.conn)
            .await
            .map_err(CoreError::from)?;
        Ok(row.map(entities::asset::Model::into_domain))
    }

    pub async fn mark_assets_missing_except(&self, seen_ids: &[Uuid]) -> CoreResult<u64> {
        let seen: Vec<String> = seen_ids.iter().map(Uuid::to_string).collect();
        let active = entities::asset::Entity::find()
            .filter(entities::asset::Column::Status.eq(domain::AssetStatus::Active.to_string()))
            .all(&self.conn)
            .await
            .map_err(CoreError::from)?;
        let mut marked = 0u64;
        for row in active {
            if seen.contains(&row.id) {
                continue;
            }
            let mut am: entities::asset::ActiveModel = row.into();
            am.status = sea_orm::ActiveValue::Set(domain::AssetStatus::Missing.to_string());
            am.update(&self.conn).await.map_err(CoreError::from)?;
            marked += 1;
        }
        Ok(marked)
    }

    pub async fn nearest_perceptual_hash(
        &self,
        target: u64,
        max_distance: u32,
    ) -> CoreResult<Vec<domain::Asset>> {
        let rows = entities::asset::Entity::find()
            .all(&self.conn)
            .await
            .map_err(CoreError::from)?;
        Ok(rows
            .into_iter()
            .filter(|r| (r.perceptual_hash as u64 ^ target).count_ones() <= max_distance)
            .map(entities::asset::Model::into_domain)
            .collect())
    }

    // ---- tasks -----------------------------------------------------------

    pub async fn enqueue_task(&self, task: &domain::Task) -> CoreResult<()> {
        let am = entities::task::active_model_from(task)
            .map_err(|e| CoreError::internal(format!("task payload encode failed: {e}")))?;
        match entities::task::Entity::insert(am).exec(&self.conn).await {
            Ok(_) => Ok(()),
            Err(err) => Err(CoreError::from(err)),
        }
    }

    /// Atomically claim the oldest-priority pending task whose `scheduled_at`
    /// has elapsed. Returns `None` if nothing is claimable right now.
    pub async fn claim_next_task(&self) -> CoreResult<Option<domain::Task>> {
        let txn = self.conn.begin().await.map_err(CoreError::from)?;
        let now = Utc::now();

        let candidate = entities::task::Entity::find()
            .filter(entities::task::Column::State.eq(entities::task::state_to_string(TaskState::Pending)))
            .filter(entities::task::Column::ScheduledAt.lte(now))
            .order_by(entities::task::Column::Priority, Order::Asc)
            .order_by(entities::task::Column::ScheduledAt, Order::Asc)
            .order_by(entities::task::Column::Id, Order::Asc)
            .limit(1)
            .one(&txn)
            .await
            .map_err(CoreError::from)?;

        let Some(candidate) = candidate else {
            txn.commit().await.map_err(CoreError::from)?;
            return Ok(None);
        };

        let update = txn
            .execute(Statement::from_sql_and_values(
                sea_orm::DatabaseBackend::Sqlite,
                "UPDATE tasks SET state = ?, started_at = ? WHERE id = ? AND state = ?",
                [
                    entities::task::state_to_string(TaskState::Running).into(),
                    now.into(),
                    candidate.id.clone().into(),
                    entities::task::state_to_string(TaskState::Pending).into(),
                ],
            ))
            .await
            .map_err(CoreError::from)?;

        if update.rows_affected() != 1 {
            // Lost the race to another claimant; caller should retry the poll loop.
            txn.commit().await.map_err(CoreError::from)?;
            return Ok(None);
        }

        let mut claimed = candidate;
        claimed.state = entities::task::state_to_string(TaskState::Running);
        claimed.started_at = Some(now);
        txn.commit().await.map_err(CoreError::from)?;

        claimed
            .into_domain()
            .map(Some)
            .map_err(|e| CoreError::internal(format!("task payload decode failed: {e}")))
    }

    pub async fn get_task(&self, id: Uuid) -> CoreResult<Option<domain::Task>> {
        let row = entities::task::Entity::find_by_id(id.to_string())
            .one(&self.conn)
            .await
            .map_err(CoreError::from)?;
        row.map(|r| r.into_domain().map_err(|e| CoreError::internal(e.to_string())))
            .transpose()
    }

    pub async fn save_task(&self, task: &domain::Task) -> CoreResult<()> {
        let am = entities::task::active_model_from(task)
            .map_err(|e| CoreError::internal(format!("task payload encode failed: {e}")))?;
        am.update(&self.conn).await.map_err(CoreError::from)?;
        Ok(())
    }

    /// Cheap poll used by long-running handlers at their cooperative
    /// checkpoints (spec.md §4.5 step 5, §5 cancellation).
    pub async fn is_cancel_requested(&self, id: Uuid) -> CoreResult<bool> {
        let row = entities::task::Entity::find_by_id(id.to_string())
            .one(&self.conn)
            .await
            .map_err(CoreError::from)?;
        Ok(row.map(|r| r.cancel_requested).unwrap_or(true))
    }

    pub async fn request_cancel(&self, id: Uuid) -> CoreResult<()> {
        self.conn
            .execute(Statement::from_sql_and_values(
                sea_orm::DatabaseBackend::Sqlite,
                "UPDATE tasks SET cancel_requested = 1 WHERE id = ?",
                [id.to_string().into()],
            ))
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    pub async fn complete_task(&self, id: Uuid) -> CoreResult<()> {
        self.conn
            .execute(Statement::from_sql_and_values(
                sea_orm::DatabaseBackend::Sqlite,
                "UPDATE tasks SET state = ?, finished_at = ? WHERE id = ?",
                [
                    entities::task::state_to_string(TaskState::Done).into(),
                    Utc::now().into(),
                    id.to_string().into(),
                ],
            ))
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    /// `pending` retry with backoff (spec.md §4.5 step 4).
    pub async fn retry_task(&self, id: Uuid, retry_count: u32, scheduled_at: chrono::DateTime<Utc>, last_error: &str) -> CoreResult<()> {
        self.conn
            .execute(Statement::from_sql_and_values(
                sea_orm::DatabaseBackend::Sqlite,
                "UPDATE tasks SET state = ?, retry_count = ?, scheduled_at = ?, started_at = NULL, last_error = ? WHERE id = ?",
                [
                    entities::task::state_to_string(TaskState::Pending).into(),
                    (retry_count as i32).into(),
                    scheduled_at.into(),
                    last_error.into(),
                    id.to_string().into(),
                ],
            ))
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    pub async fn dead_letter_task(&self, id: Uuid, last_error: &str) -> CoreResult<()> {
        self.conn
            .execute(Statement::from_sql_and_values(
                sea_orm::DatabaseBackend::Sqlite,
                "UPDATE tasks SET state = ?, finished_at = ?, last_error = ? WHERE id = ?",
                [
                    entities::task::state_to_string(TaskState::Dead).into(),
                    Utc::now().into(),
                    last_error.into(),
                    id.to_string().into(),
                ],
            ))
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    pub async fn cancel_task(&self, id: Uuid) -> CoreResult<()> {
        self.conn
            .execute(Statement::from_sql_and_values(
                sea_orm::DatabaseBackend::Sqlite,
                "UPDATE tasks SET state = ?, finished_at = ? WHERE id = ?",
                [
                    entities::task::state_to_string(TaskState::Cancelled).into(),
                    Utc::now().into(),
                    id.to_string().into(),
                ],
            ))
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    /// `cancel(task_id)` admin op (spec.md §4.5): if the task is still
    /// `pending`, cancel immediately; otherwise just flag it for the running
    /// worker's next checkpoint.
    pub async fn request_cancel_or_cancel_now(&self, id: Uuid) -> CoreResult<()> {
        let task = self.get_task(id).await?;
        match task.map(|t| t.state) {
            Some(TaskState::Pending) => self.cancel_task(id).await,
            Some(_) => self.request_cancel(id).await,
            None => Err(CoreError::not_found(format!("task {id} not found"))),
        }
    }

    /// `requeue(task_id)` admin op: only valid from `dead` (spec.md §4.5).
    pub async fn requeue_dead_task(&self, id: Uuid) -> CoreResult<()> {
        let task = self
            .get_task(id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("task {id} not found")))?;
        if task.state != TaskState::Dead {
            return Err(CoreError::conflict(format!(
                "task {id} is not dead (state={})",
                task.state
            )));
        }
        self.conn
            .execute(Statement::from_sql_and_values(
                sea_orm::DatabaseBackend::Sqlite,
                "UPDATE tasks SET state = ?, retry_count = 0, last_error = NULL, scheduled_at = ? WHERE id = ?",
                [
                    entities::task::state_to_string(TaskState::Pending).into(),
                    Utc::now().into(),
                    id.to_string().into(),
                ],
            ))
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    /// Clear `started_at` and return a timed-out `running` task to `pending`
    /// (spec.md §4.5: graceful shutdown past the timeout).
    pub async fn reclaim_timed_out(&self, id: Uuid) -> CoreResult<()> {
        self.conn
            .execute(Statement::from_sql_and_values(
                sea_orm::DatabaseBackend::Sqlite,
                "UPDATE tasks SET state = ?, started_at = NULL WHERE id = ? AND state = ?",
                [
                    entities::task::state_to_string(TaskState::Pending).into(),
                    id.to_string().into(),
                    entities::task::state_to_string(TaskState::Running).into(),
                ],
            ))
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    pub async fn update_progress(&self, id: Uuid, current: u64, total: u64) -> CoreResult<()> {
        self.conn
            .execute(Statement::from_sql_and_values(
                sea_orm::DatabaseBackend::Sqlite,
                "UPDATE tasks SET progress_current = ?, progress_total = ? WHERE id = ?",
                [(current as i64).into(), (total as i64).into(), id.to_string().into()],
            ))
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    /// `idempotency_key` lookup: an existing non-terminal-conflicting task
    /// with this key means the caller should reuse its id rather than insert
    /// a duplicate (spec.md §3).
    pub async fn find_by_idempotency_key(&self, key: &str) -> CoreResult<Option<domain::Task>> {
        let row = entities::task::Entity::find()
            .filter(entities::task::Column::IdempotencyKey.eq(key))
            .one(&self.conn)
            .await
            .map_err(CoreError::from)?;
        row.map(|r| r.into_domain().map_err(|e| CoreError::internal(e.to_string())))
            .transpose()
    }

    /// Insert a task unless its idempotency key already exists and is not in
    /// a terminal-but-redoable state; returns the id that now owns the work.
    pub async fn enqueue_idempotent(&self, task: &domain::Task) -> CoreResult<Uuid> {
        if let Some(key) = &task.idempotency_key {
            if let Some(existing) = self.find_by_idempotency_key(key).await? {
                if !matches!(existing.state, TaskState::Done | TaskState::Cancelled) {
                    return Ok(existing.id);
                }
            }
        }
        self.enqueue_task(task).await?;
        Ok(task.id)
    }

    pub async fn list_tasks(&self, state: Option<TaskState>, limit: u64) -> CoreResult<Vec<domain::Task>> {
        let mut query = entities::task::Entity::find().order_by(entities::task::Column::CreatedAt, Order::Desc);
        if let Some(state) = state {
            query = query.filter(entities::task::Column::State.eq(entities::task::state_to_string(state)));
        }
        let rows = query.limit(limit).all(&self.conn).await.map_err(CoreError::from)?;
        rows.into_iter()
            .map(|r| r.into_domain().map_err(|e| CoreError::internal(e.to_string())))
            .collect()
    }

    /// Tasks stuck `running` past `max_age`, for the worker pool's sweep on startup.
    pub async fn find_stale_running(&self, max_age: chrono::Duration) -> CoreResult<Vec<domain::Task>> {
        let cutoff = Utc::now() - max_age;
        let rows = entities::task::Entity::find()
            .filter(entities::task::Column::State.eq(entities::task::state_to_string(TaskState::Running)))
            .filter(entities::task::Column::StartedAt.lte(cutoff))
            .all(&self.conn)
            .await
            .map_err(CoreError::from)?;
        rows.into_iter()
            .map(|r| r.into_domain().map_err(|e| CoreError::internal(e.to_string())))
            .collect()
    }

    /// Whether a `person_recluster{Full}` task other than `excluding` is
    /// currently `running` (spec.md §4.7: only one re-cluster runs at a
    /// time). `type_name` alone can't distinguish scope since both
    /// `Incremental` and `Full` share it, so this decodes the payload of
    /// every running `person_recluster` row.
    pub async fn has_other_running_full_recluster(&self, excluding: Uuid) -> CoreResult<bool> {
        let rows = entities::task::Entity::find()
            .filter(entities::task::Column::State.eq(entities::task::state_to_string(TaskState::Running)))
            .filter(entities::task::Column::TypeName.eq("person_recluster"))
            .all(&self.conn)
            .await
            .map_err(CoreError::from)?;
        for row in rows {
            let task = row.into_domain().map_err(|e| CoreError::internal(e.to_string()))?;
            if task.id == excluding {
                continue;
            }
            if matches!(task.payload, domain::TaskType::PersonRecluster { scope: domain::ReclusterScope::Full }) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub async fn count_tasks_in_state(&self, state: TaskState) -> CoreResult<u64> {
        let count = entities::task::Entity::find()
            .filter(entities::task::Column::State.eq(entities::task::state_to_string(state)))
            .count(&self.conn)
            .await
            .map_err(CoreError::from)?;
        Ok(count)
    }

    pub async fn count_active_persons(&self) -> CoreResult<u64> {
        entities::person::Entity::find()
            .filter(entities::person::Column::Active.eq(true))
            .count(&self.conn)
            .await
            .map_err(CoreError::from)
    }

    // ---- embeddings --------------------------------------------------------

    pub async fn upsert_embedding(&self, embedding: &domain::Embedding) -> CoreResult<()> {
        let am = entities::embedding::active_model_from(embedding);
        entities::embedding::Entity::insert(am)
            .on_conflict(
                sea_orm::sea_query::OnConflict::columns([
                    entities::embedding::Column::AssetId,
                    entities::embedding::Column::Modality,
                    entities::embedding::Column::ModelName,
                    entities::embedding::Column::ModelVersion,
                ])
                .update_columns([
                    entities::embedding::Column::Device,
                    entities::embedding::Column::VectorRef,
                    entities::embedding::Column::Checksum,
                    entities::embedding::Column::CreatedAt,
                ])
                .to_owned(),
            )
            .exec(&self.conn)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    pub async fn list_embeddings(
        &self,
        modality: domain::Modality,
        model_name: &str,
        model_version: &str,
    ) -> CoreResult<Vec<domain::Embedding>> {
        let rows = entities::embedding::Entity::find()
            .filter(entities::embedding::Column::Modality.eq(modality.to_string()))
            .filter(entities::embedding::Column::ModelName.eq(model_name))
            .filter(entities::embedding::Column::ModelVersion.eq(model_version))
            .all(&self.conn)
            .await
            .map_err(CoreError::from)?;
        Ok(rows.into_iter().map(entities::embedding::Model::into_domain).collect())
    }

    /// Every embedding stored for `asset_id` in a given modality, regardless
    /// of model — used by similar-to-asset search, which only needs
    /// whichever image embedding currently exists.
    pub async fn list_embeddings_for_asset_modality(
        &self,
        asset_id: Uuid,
        modality: domain::Modality,
    ) -> CoreResult<Vec<domain::Embedding>> {
        let rows = entities::embedding::Entity::find()
            .filter(entities::embedding::Column::AssetId.eq(asset_id.to_string()))
            .filter(entities::embedding::Column::Modality.eq(modality.to_string()))
            .all(&self.conn)
            .await
            .map_err(CoreError::from)?;
        Ok(rows.into_iter().map(entities::embedding::Model::into_domain).collect())
    }

    // ---- captions ----------------------------------------------------------

    pub async fn upsert_caption(&self, caption: &domain::Caption) -> CoreResult<()> {
        let am = entities::caption::active_model_from(caption);
        am.save(&self.conn).await.map_err(CoreError::from)?;
        Ok(())
    }

    pub async fn list_captions_for_asset(&self, asset_id: Uuid) -> CoreResult<Vec<domain::Caption>> {
        let rows = entities::caption::Entity::find()
            .filter(entities::caption::Column::AssetId.eq(asset_id.to_string()))
            .order_by(entities::caption::Column::CreatedAt, Order::Desc)
            .all(&self.conn)
            .await
            .map_err(CoreError::from)?;
        Ok(rows.into_iter().map(entities::caption::Model::into_domain).collect())
    }

    /// Delete the oldest non-user-edited captions past the retained-variant cap.
    pub async fn prune_generated_captions(&self, asset_id: Uuid, keep: usize) -> CoreResult<u64> {
        let rows = entities::caption::Entity::find()
            .filter(entities::caption::Column::AssetId.eq(asset_id.to_string()))
            .filter(entities::caption::Column::UserEdited.eq(false))
            .order_by(entities::caption::Column::CreatedAt, Order::Desc)
            .all(&self.conn)
            .await
            .map_err(CoreError::from)?;
        let mut pruned = 0u64;
        for row in rows.into_iter().skip(keep) {
            row.delete(&self.conn).await.map_err(CoreError::from)?;
            pruned += 1;
        }
        Ok(pruned)
    }

    // ---- faces & persons -----------------------------------------------------

    pub async fn upsert_face(&self, face: &domain::FaceDetection) -> CoreResult<()> {
        let am = entities::face_detection::active_model_from(face);
        am.save(&self.conn).await.map_err(CoreError::from)?;
        Ok(())
    }

    pub async fn get_face(&self, id: Uuid) -> CoreResult<Option<domain::FaceDetection>> {
        let row = entities::face_detection::Entity::find_by_id(id.to_string())
            .one(&self.conn)
            .await
            .map_err(CoreError::from)?;
        Ok(row.map(entities::face_detection::Model::into_domain))
    }

    pub async fn list_faces_for_asset(&self, asset_id: Uuid) -> CoreResult<Vec<domain::FaceDetection>> {
        let rows = entities::face_detection::Entity::find()
            .filter(entities::face_detection::Column::AssetId.eq(asset_id.to_string()))
            .all(&self.conn)
            .await
            .map_err(CoreError::from)?;
        Ok(rows
            .into_iter()
            .map(entities::face_detection::Model::into_domain)
            .collect())
    }

    pub async fn list_faces_for_person(&self, person_id: Uuid) -> CoreResult<Vec<domain::FaceDetection>> {
        let rows = entities::face_detection::Entity::find()
            .filter(entities::face_detection::Column::PersonId.eq(person_id.to_string()))
            .all(&self.conn)
            .await
            .map_err(CoreError::from)?;
        Ok(rows
            .into_iter()
            .map(entities::face_detection::Model::into_domain)
            .collect())
    }

    pub async fn list_all_faces(&self) -> CoreResult<Vec<domain::FaceDetection>> {
        let rows = entities::face_detection::Entity::find()
            .all(&self.conn)
            .await
            .map_err(CoreError::from)?;
        Ok(rows
            .into_iter()
            .map(entities::face_detection::Model::into_domain)
            .collect())
    }

    pub async fn clear_all_person_assignments(&self) -> CoreResult<()> {
        self.conn
            .execute(Statement::from_string(
                sea_orm::DatabaseBackend::Sqlite,
                "UPDATE face_detections SET person_id = NULL",
            ))
            .await
            .map_err(CoreError::from)?;
        entities::person::Entity::delete_many()
            .exec(&self.conn)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    pub async fn assign_face_to_person(&self, face_id: Uuid, person_id: Uuid) -> CoreResult<()> {
        self.conn
            .execute(Statement::from_sql_and_values(
                sea_orm::DatabaseBackend::Sqlite,
                "UPDATE face_detections SET person_id = ? WHERE id = ?",
                [person_id.to_string().into(), face_id.to_string().into()],
            ))
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    pub async fn list_faces_pending_embedding(&self, limit: u64) -> CoreResult<Vec<domain::FaceDetection>> {
        let rows = entities::face_detection::Entity::find()
            .filter(entities::face_detection::Column::EmbeddingPending.eq(true))
            .limit(limit)
            .all(&self.conn)
            .await
            .map_err(CoreError::from)?;
        Ok(rows
            .into_iter()
            .map(entities::face_detection::Model::into_domain)
            .collect())
    }

    pub async fn upsert_person(&self, person: &domain::Person) -> CoreResult<()> {
        let am = entities::person::active_model_from(person)
            .map_err(|e| CoreError::internal(format!("centroid encode failed: {e}")))?;
        am.save(&self.conn).await.map_err(CoreError::from)?;
        Ok(())
    }

    pub async fn get_person(&self, id: Uuid) -> CoreResult<Option<domain::Person>> {
        let row = entities::person::Entity::find_by_id(id.to_string())
            .one(&self.conn)
            .await
            .map_err(CoreError::from)?;
        row.map(|r| r.into_domain().map_err(|e| CoreError::internal(e.to_string())))
            .transpose()
    }

    pub async fn list_active_persons(&self) -> CoreResult<Vec<domain::Person>> {
        let rows = entities::person::Entity::find()
            .filter(entities::person::Column::Active.eq(true))
            .all(&self.conn)
            .await
            .map_err(CoreError::from)?;
        rows.into_iter()
            .map(|r| r.into_domain().map_err(|e| CoreError::internal(e.to_string())))
            .collect()
    }

    /// Reassign every face of `source` to `target`, deactivate `source`, return
    /// the number of faces moved. Used by the person-merge admin operation.
    pub async fn merge_persons(&self, target: Uuid, source: Uuid) -> CoreResult<u64> {
        let txn = self.conn.begin().await.map_err(CoreError::from)?;
        let moved = txn
            .execute(Statement::from_sql_and_values(
                sea_orm::DatabaseBackend::Sqlite,
                "UPDATE face_detections SET person_id = ? WHERE person_id = ?",
                [target.to_string().into(), source.to_string().into()],
            ))
            .await
            .map_err(CoreError::from)?
            .rows_affected();
        txn.execute(Statement::from_sql_and_values(
            sea_orm::DatabaseBackend::Sqlite,
            "UPDATE persons SET active = 0, updated_at = ? WHERE id = ?",
            [Utc::now().into(), source.to_string().into()],
        ))
        .await
        .map_err(CoreError::from)?;
        txn.commit().await.map_err(CoreError::from)?;
        Ok(moved)
    }

    /// Derived `AssetPerson` view: which persons appear in which assets, with a
    /// face count per pair. Expressed as a raw aggregate query (spec.md's
    /// `AssetPerson` is a view, not a stored entity — SeaORM's typed builder
    /// does not comfortably express `GROUP BY` aggregates).
    pub async fn asset_persons_for_asset(&self, asset_id: Uuid) -> CoreResult<Vec<AssetPersonRow>> {
        let rows = self
            .conn
            .query_all(Statement::from_sql_and_values(
                sea_orm::DatabaseBackend::Sqlite,
                "SELECT person_id, COUNT(*) as face_count FROM face_detections \
                 WHERE asset_id = ? AND person_id IS NOT NULL GROUP BY person_id",
                [asset_id.to_string().into()],
            ))
            .await
            .map_err(CoreError::from)?;

        rows.into_iter()
            .map(|row| {
                let person_id: String = row.try_get("", "person_id").map_err(CoreError::from)?;
                let face_count: i64 = row.try_get("", "face_count").map_err(CoreError::from)?;
                Ok(AssetPersonRow {
                    person_id: person_id.parse().unwrap_or_default(),
                    face_count: face_count as u64,
                })
            })
            .collect()
    }

    pub async fn assets_for_person(&self, person_id: Uuid) -> CoreResult<Vec<Uuid>> {
        let rows = self
            .conn
            .query_all(Statement::from_sql_and_values(
                sea_orm::DatabaseBackend::Sqlite,
                "SELECT DISTINCT asset_id FROM face_detections WHERE person_id = ?",
                [person_id.to_string().into()],
            ))
            .await
            .map_err(CoreError::from)?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.try_get::<String>("", "asset_id").ok())
            .filter_map(|s| s.parse().ok())
            .collect())
    }

    /// Fetch multiple assets by id, silently dropping ids that no longer
    /// exist (an asset can be deleted underneath a stale index entry).
    pub async fn get_assets_by_ids(&self, ids: &[Uuid]) -> CoreResult<Vec<domain::Asset>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let id_strings: Vec<String> = ids.iter().map(Uuid::to_string).collect();
        let rows = entities::asset::Entity::find()
            .filter(entities::asset::Column::Id.is_in(id_strings))
            .all(&self.conn)
            .await
            .map_err(CoreError::from)?;
        Ok(rows.into_iter().map(entities::asset::Model::into_domain).collect())
    }

    /// All active assets, for name-based and person-scoped listing which
    /// page and sort in memory at personal-library scale.
    pub async fn list_active_assets(&self) -> CoreResult<Vec<domain::Asset>> {
        let rows = entities::asset::Entity::find()
            .filter(entities::asset::Column::Status.eq(domain::AssetStatus::Active.to_string()))
            .all(&self.conn)
            .await
            .map_err(CoreError::from)?;
        Ok(rows.into_iter().map(entities::asset::Model::into_domain).collect())
    }
}

/// One row of the derived `AssetPerson` view (spec.md §3).
#[derive(Debug, Clone, Copy)]
pub struct AssetPersonRow {
    pub person_id: Uuid,
    pub face_count: u64,
}
