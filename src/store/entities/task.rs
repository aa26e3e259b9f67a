use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::{self, TaskState};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tasks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub type_name: String,
    /// MessagePack-encoded `domain::TaskType`, matching the teacher's job-state encoding.
    pub payload: Vec<u8>,
    pub state: String,
    pub priority: i32,
    pub retry_count: i32,
    pub max_retries: i32,
    pub last_error: Option<String>,
    pub scheduled_at: DateTimeUtc,
    pub created_at: DateTimeUtc,
    pub started_at: Option<DateTimeUtc>,
    pub finished_at: Option<DateTimeUtc>,
    pub progress_current: Option<i64>,
    pub progress_total: Option<i64>,
    pub cancel_requested: bool,
    #[sea_orm(unique)]
    pub idempotency_key: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

pub fn state_to_string(state: TaskState) -> String {
    state.to_string()
}

pub fn state_from_str(s: &str) -> TaskState {
    s.parse().unwrap_or(TaskState::Pending)
}

impl Model {
    pub fn into_domain(self) -> Result<domain::Task, rmp_serde::decode::Error> {
        let payload: domain::TaskType = rmp_serde::from_slice(&self.payload)?;
        Ok(domain::Task {
            id: self.id.parse().unwrap_or_default(),
            payload,
            state: state_from_str(&self.state),
            priority: self.priority,
            retry_count: self.retry_count as u32,
            max_retries: self.max_retries as u32,
            last_error: self.last_error,
            scheduled_at: self.scheduled_at,
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            progress_current: self.progress_current.map(|v| v as u64),
            progress_total: self.progress_total.map(|v| v as u64),
            cancel_requested: self.cancel_requested,
            idempotency_key: self.idempotency_key,
        })
    }
}

pub fn active_model_from(task: &domain::Task) -> Result<ActiveModel, rmp_serde::encode::Error> {
    use sea_orm::ActiveValue::Set;
    let payload = rmp_serde::to_vec(&task.payload)?;
    Ok(ActiveModel {
        id: Set(task.id.to_string()),
        type_name: Set(task.payload.type_name().to_string()),
        payload: Set(payload),
        state: Set(state_to_string(task.state)),
        priority: Set(task.priority),
        retry_count: Set(task.retry_count as i32),
        max_retries: Set(task.max_retries as i32),
        last_error: Set(task.last_error.clone()),
        scheduled_at: Set(task.scheduled_at),
        created_at: Set(task.created_at),
        started_at: Set(task.started_at),
        finished_at: Set(task.finished_at),
        progress_current: Set(task.progress_current.map(|v| v as i64)),
        progress_total: Set(task.progress_total.map(|v| v as i64)),
        cancel_requested: Set(task.cancel_requested),
        idempotency_key: Set(task.idempotency_key.clone()),
    })
}
