//! Metrics & health (spec.md §4.9, C9).
//!
//! Counters/gauges/histograms are emitted through the `metrics` crate facade
//! and exposed in Prometheus text format via `metrics-exporter-prometheus`,
//! mirroring the instrumentation approach used elsewhere in this codebase's
//! tunnel service.

use std::sync::Arc;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::TaskState;
use crate::error::CoreResult;
use crate::providers::ProviderStatus;
use crate::store::MetadataStore;
use crate::vector_index::VectorIndexRegistry;

/// Installs the global recorder and hands back a handle that can render the
/// current state as Prometheus text exposition for `GET /metrics`.
pub fn install_recorder() -> CoreResult<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| crate::error::CoreError::internal(format!("failed to install metrics recorder: {e}")))
}

pub fn record_task_processed(task_type: &str, result: &str) {
    metrics::counter!("tasks_processed_total", "type" => task_type.to_string(), "result" => result.to_string())
        .increment(1);
}

pub fn record_task_retried(task_type: &str) {
    metrics::counter!("tasks_retried_total", "type" => task_type.to_string()).increment(1);
}

pub fn record_task_dead(task_type: &str) {
    metrics::counter!("tasks_dead_total", "type" => task_type.to_string()).increment(1);
}

pub fn record_embedding_generated(modality: &str) {
    metrics::counter!("embeddings_generated_total", "modality" => modality.to_string()).increment(1);
}

pub fn record_task_duration(task_type: &str, seconds: f64) {
    metrics::histogram!("task_duration_seconds", "type" => task_type.to_string()).record(seconds);
}

pub fn set_gauge(name: &'static str, value: f64) {
    metrics::gauge!(name).set(value);
}

/// Refresh the gauges that reflect live store/index state; called
/// periodically by the worker pool and once before rendering `/metrics`.
pub async fn refresh_gauges(store: &MetadataStore, index_registry: &VectorIndexRegistry) -> CoreResult<()> {
    let pending = store.count_tasks_in_state(TaskState::Pending).await?;
    let running = store.count_tasks_in_state(TaskState::Running).await?;
    let persons = store.count_active_persons().await?;
    let vector_index_size = index_registry.total_size().await;
    set_gauge("tasks_pending", pending as f64);
    set_gauge("tasks_running", running as f64);
    set_gauge("persons_total", persons as f64);
    set_gauge("vector_index_size", vector_index_size as f64);
    Ok(())
}

/// Overall readiness (spec.md §4.9): store reachable, vector index loaded,
/// every configured provider at least `degraded`, queue backlog and worker
/// liveness.
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub store_reachable: bool,
    pub vector_index_loaded: bool,
    pub providers: Vec<(String, ProviderStatus)>,
    pub tasks_pending: u64,
    pub tasks_running: u64,
    pub workers_alive: usize,
    pub ready: bool,
}

pub async fn health_check(
    store: &MetadataStore,
    vector_index_loaded: bool,
    providers: &crate::providers::ProviderSet,
    workers_alive: usize,
) -> HealthStatus {
    let store_reachable = store.count_tasks_in_state(TaskState::Pending).await.is_ok();
    let tasks_pending = store
        .count_tasks_in_state(TaskState::Pending)
        .await
        .unwrap_or(0);
    let tasks_running = store
        .count_tasks_in_state(TaskState::Running)
        .await
        .unwrap_or(0);

    let reports = vec![
        ("thumbnailer".to_string(), providers.thumbnailer.health().await),
        ("image_embedder".to_string(), providers.image_embedder.health().await),
        ("text_embedder".to_string(), providers.text_embedder.health().await),
        ("captioner".to_string(), providers.captioner.health().await),
        ("face_detector".to_string(), providers.face_detector.health().await),
        ("face_embedder".to_string(), providers.face_embedder.health().await),
    ];
    let provider_statuses: Vec<(String, ProviderStatus)> =
        reports.into_iter().map(|(name, r)| (name, r.status)).collect();

    let all_providers_ok = provider_statuses
        .iter()
        .all(|(_, status)| *status != ProviderStatus::Unavailable);
    let ready = store_reachable && vector_index_loaded && all_providers_ok;

    HealthStatus {
        store_reachable,
        vector_index_loaded,
        providers: provider_statuses,
        tasks_pending,
        tasks_running,
        workers_alive,
        ready,
    }
}

pub type SharedMetricsHandle = Arc<PrometheusHandle>;
