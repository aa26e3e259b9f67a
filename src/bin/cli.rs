//! `photo-core` CLI: the only outer surface this crate ships (spec.md §1
//! explicitly puts an HTTP/admin API out of scope). Every subcommand is a
//! thin driver over the library crate's public API.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use comfy_table::Table;
use uuid::Uuid;

use sd_photo_core::domain::{Modality, Task, TaskState, TaskType};
use sd_photo_core::{clusterer, ingestion, search, task_engine, Config, CoreContext};

#[derive(Parser)]
#[command(name = "photo-core", about = "Local-first photo/video intelligence engine core", version)]
struct Cli {
    /// Optional `.env`-style file layered under the process environment.
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan configured roots and run workers until the queue drains.
    Ingest {
        /// Extra root to scan in addition to `ORIGINALS_PATHS`.
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Run the worker pool without an initial scan, to process any backlog.
    Warmup,
    /// Vector index maintenance.
    Index {
        #[command(subcommand)]
        command: IndexCommand,
    },
    /// Task queue administration.
    Tasks {
        #[command(subcommand)]
        command: TasksCommand,
    },
    /// Person administration.
    Persons {
        #[command(subcommand)]
        command: PersonsCommand,
    },
    /// Run a search query against the index.
    Search {
        query: String,
        #[arg(long, default_value_t = 0)]
        page: u64,
        #[arg(long, default_value_t = 20)]
        page_size: u64,
    },
}

#[derive(Subcommand)]
enum IndexCommand {
    /// Rebuild a vector index from the embeddings stored for `modality`.
    Rebuild {
        #[arg(value_enum)]
        modality: ModalityArg,
        #[arg(long)]
        model_name: String,
        #[arg(long)]
        model_version: String,
    },
}

#[derive(Clone, clap::ValueEnum)]
enum ModalityArg {
    Image,
    Text,
    Face,
}

impl From<ModalityArg> for Modality {
    fn from(value: ModalityArg) -> Self {
        match value {
            ModalityArg::Image => Modality::Image,
            ModalityArg::Text => Modality::Text,
            ModalityArg::Face => Modality::Face,
        }
    }
}

#[derive(Subcommand)]
enum TasksCommand {
    /// List recent tasks, optionally filtered by state.
    List {
        #[arg(long)]
        state: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: u64,
    },
    /// Requeue a dead task.
    Requeue {
        #[arg(long)]
        id: Uuid,
    },
}

#[derive(Subcommand)]
enum PersonsCommand {
    /// Rename a person.
    Rename {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        name: String,
    },
    /// Merge one or more source persons into a target.
    Merge {
        #[arg(long)]
        target: Uuid,
        #[arg(long, num_args = 1..)]
        source: Vec<Uuid>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.env_file.as_deref())?;

    if let Command::Ingest { root: Some(root) } = &cli.command {
        config.originals_paths.push(root.clone());
    }

    let ctx = CoreContext::assemble(config).await?;
    run(ctx, cli.command).await
}

async fn run(ctx: Arc<CoreContext>, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Ingest { .. } => {
            let report = ingestion::scan(&ctx).await?;
            println!(
                "scan complete: {} files seen, {} created, {} reactivated, {} updated, {} marked missing, {} skipped, {} deferred (backpressure)",
                report.files_seen,
                report.assets_created,
                report.assets_reactivated,
                report.assets_updated,
                report.assets_marked_missing,
                report.files_skipped_error,
                report.derivation_enqueue_deferred,
            );
            run_workers_until_idle(&ctx).await
        }
        Command::Warmup => run_workers_until_idle(&ctx).await,
        Command::Index {
            command: IndexCommand::Rebuild { modality, model_name, model_version },
        } => {
            let task = Task {
                id: Uuid::new_v4(),
                payload: TaskType::IndexRebuild {
                    modality: modality.into(),
                    model_name,
                    model_version,
                },
                state: TaskState::Pending,
                priority: -10,
                retry_count: 0,
                max_retries: ctx.config.max_task_retries,
                last_error: None,
                scheduled_at: chrono::Utc::now(),
                created_at: chrono::Utc::now(),
                started_at: None,
                finished_at: None,
                progress_current: None,
                progress_total: None,
                cancel_requested: false,
                idempotency_key: None,
            };
            ctx.store.enqueue_task(&task).await?;
            println!("enqueued index rebuild task {}", task.id);
            Ok(())
        }
        Command::Tasks { command: TasksCommand::List { state, limit } } => {
            let parsed_state = state
                .as_deref()
                .map(|s| s.parse::<TaskState>())
                .transpose()
                .map_err(|_| anyhow::anyhow!("unrecognized task state"))?;
            let tasks = ctx.store.list_tasks(parsed_state, limit).await?;
            let mut table = Table::new();
            table.set_header(vec!["id", "type", "state", "retries", "scheduled_at"]);
            for task in tasks {
                table.add_row(vec![
                    task.id.to_string(),
                    task.payload.type_name().to_string(),
                    task.state.to_string(),
                    format!("{}/{}", task.retry_count, task.max_retries),
                    task.scheduled_at.to_rfc3339(),
                ]);
            }
            println!("{table}");
            Ok(())
        }
        Command::Tasks { command: TasksCommand::Requeue { id } } => {
            ctx.store.requeue_dead_task(id).await?;
            println!("requeued task {id}");
            Ok(())
        }
        Command::Persons { command: PersonsCommand::Rename { id, name } } => {
            clusterer::rename_person(&ctx, id, name).await?;
            println!("renamed person {id}");
            Ok(())
        }
        Command::Persons { command: PersonsCommand::Merge { target, source } } => {
            let merged = clusterer::merge_persons(&ctx, target, &source).await?;
            println!("merged into person {} ({} members)", merged.id, merged.member_count);
            Ok(())
        }
        Command::Search { query, page, page_size } => {
            let pagination = search::Pagination { page, page_size };
            let filters = search::AssetFilters::default();
            let results = search::text_query(&ctx, &query, &filters, pagination).await?;
            let mut table = Table::new();
            table.set_header(vec!["asset_id", "score"]);
            for result in &results.items {
                table.add_row(vec![result.asset_id.to_string(), format!("{:.4}", result.score)]);
            }
            println!("{table}");
            println!("page {} of {} total matches", results.page, results.total);
            Ok(())
        }
    }
}

/// Spawn the worker pool, wait for the queue to drain once, then shut down.
/// A long-running daemon would instead hold the pool open for the process
/// lifetime; this CLI is a batch driver (spec.md §1: no daemon/service
/// surface is in scope here).
async fn run_workers_until_idle(ctx: &Arc<CoreContext>) -> anyhow::Result<()> {
    let reclaimed = task_engine::reclaim_orphaned_tasks(ctx, chrono::Duration::minutes(30)).await?;
    if reclaimed > 0 {
        println!("reclaimed {reclaimed} orphaned tasks from a prior unclean shutdown");
    }

    let pool = task_engine::WorkerPool::spawn(ctx.clone());
    loop {
        tokio::time::sleep(std::time::Duration::from_millis(ctx.config.poll_interval_ms)).await;
        let pending = ctx.store.count_tasks_in_state(TaskState::Pending).await?;
        let running = ctx.store.count_tasks_in_state(TaskState::Running).await?;
        if pending == 0 && running == 0 {
            break;
        }
    }
    pool.shutdown().await;
    Ok(())
}
