//! Typed configuration (spec.md §4.10, C10).
//!
//! Grounded on `AppConfig::load_from`'s layering idiom in the teacher repo, adapted
//! from a single JSON file to an environment-first model: this crate is a headless
//! core consumed by a CLI and (out of scope) an HTTP layer, both of which configure it
//! through the process environment, optionally pre-loaded from a `.env`-style file.

mod env_file;
mod providers;

pub use providers::{
    CaptionProfile, FaceDetectProvider, FaceEmbedProvider, ImageEmbedProvider, TextEmbedProvider,
};

use crate::error::CoreError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

/// All runtime behavior is driven by this struct; every field corresponds to one row
/// in spec.md §4.10's option table.
#[derive(Debug, Clone)]
pub struct Config {
    pub worker_concurrency: usize,
    pub poll_interval_ms: u64,
    pub max_task_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub originals_paths: Vec<PathBuf>,
    pub derived_path: PathBuf,
    pub image_embed_provider: ImageEmbedProvider,
    pub text_embed_provider: TextEmbedProvider,
    pub caption_profile: CaptionProfile,
    pub face_detect_provider: FaceDetectProvider,
    pub face_embed_provider: FaceEmbedProvider,
    pub video_enabled: bool,
    pub t_assign: f32,
    pub t_margin: f32,
    pub t_cluster: f32,
    pub alpha: f32,
    pub beta: f32,
    pub gamma: f32,
    pub tau: f32,
    pub vector_index_autoload: bool,
    pub max_pending_backpressure: u64,
    pub database_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("photo-core");
        Self {
            worker_concurrency: 4,
            poll_interval_ms: 500,
            max_task_retries: 5,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 300_000,
            originals_paths: Vec::new(),
            derived_path: data_dir.join("derived"),
            image_embed_provider: ImageEmbedProvider::Stub,
            text_embed_provider: TextEmbedProvider::Same,
            caption_profile: CaptionProfile::Auto,
            face_detect_provider: FaceDetectProvider::Stub,
            face_embed_provider: FaceEmbedProvider::Stub,
            video_enabled: false,
            t_assign: 0.9,
            t_margin: 0.05,
            t_cluster: 0.85,
            alpha: 0.7,
            beta: 0.2,
            gamma: 0.1,
            tau: 60.0 * 60.0 * 24.0 * 30.0,
            vector_index_autoload: true,
            max_pending_backpressure: 10_000,
            database_path: data_dir.join("metadata.sqlite"),
        }
    }
}

/// The set of environment variable names this crate recognizes. Unknown keys carrying
/// the crate's own prefix are rejected at load time (spec.md §4.10: "Unknown keys are
/// rejected").
const RECOGNIZED_KEYS: &[&str] = &[
    "WORKER_CONCURRENCY",
    "POLL_INTERVAL_MS",
    "MAX_TASK_RETRIES",
    "BACKOFF_BASE_MS",
    "BACKOFF_CAP_MS",
    "ORIGINALS_PATHS",
    "DERIVED_PATH",
    "IMAGE_EMBED_PROVIDER",
    "TEXT_EMBED_PROVIDER",
    "CAPTION_PROFILE",
    "FACE_DETECT_PROVIDER",
    "FACE_EMBED_PROVIDER",
    "VIDEO_ENABLED",
    "T_ASSIGN",
    "T_MARGIN",
    "T_CLUSTER",
    "ALPHA",
    "BETA",
    "GAMMA",
    "TAU",
    "VECTOR_INDEX_AUTOLOAD",
    "MAX_PENDING_BACKPRESSURE",
    "DATABASE_PATH",
];

const ENV_PREFIX: &str = "PHOTOCORE_";

impl Config {
    /// Load configuration by layering, in increasing precedence: compiled-in defaults,
    /// an optional `.env`-style file at `env_file_path`, then the process environment.
    pub fn load(env_file_path: Option<&std::path::Path>) -> Result<Self, CoreError> {
        let mut layered: HashMap<String, String> = HashMap::new();
        if let Some(path) = env_file_path {
            if let Ok(contents) = std::fs::read_to_string(path) {
                layered.extend(env_file::parse(&contents));
            }
        }
        for (key, value) in std::env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        for key in layered.keys() {
            if !RECOGNIZED_KEYS.contains(&key.as_str()) {
                return Err(CoreError::validation(format!(
                    "unrecognized configuration key: {key}"
                )));
            }
        }

        let mut config = Self::default();
        macro_rules! parse_into {
            ($field:expr, $key:expr, $parse:expr) => {
                if let Some(raw) = layered.get($key) {
                    $field = $parse(raw)?;
                }
            };
        }

        parse_into!(config.worker_concurrency, "WORKER_CONCURRENCY", parse_usize);
        parse_into!(config.poll_interval_ms, "POLL_INTERVAL_MS", parse_u64);
        parse_into!(config.max_task_retries, "MAX_TASK_RETRIES", parse_u32);
        parse_into!(config.backoff_base_ms, "BACKOFF_BASE_MS", parse_u64);
        parse_into!(config.backoff_cap_ms, "BACKOFF_CAP_MS", parse_u64);
        if let Some(raw) = layered.get("ORIGINALS_PATHS") {
            config.originals_paths = raw.split(',').map(PathBuf::from).collect();
        }
        if let Some(raw) = layered.get("DERIVED_PATH") {
            config.derived_path = PathBuf::from(raw);
        }
        if let Some(raw) = layered.get("DATABASE_PATH") {
            config.database_path = PathBuf::from(raw);
        }
        parse_into!(config.image_embed_provider, "IMAGE_EMBED_PROVIDER", parse_enum);
        parse_into!(config.text_embed_provider, "TEXT_EMBED_PROVIDER", parse_enum);
        parse_into!(config.caption_profile, "CAPTION_PROFILE", parse_enum);
        parse_into!(config.face_detect_provider, "FACE_DETECT_PROVIDER", parse_enum);
        parse_into!(config.face_embed_provider, "FACE_EMBED_PROVIDER", parse_enum);
        parse_into!(config.video_enabled, "VIDEO_ENABLED", parse_bool);
        parse_into!(config.t_assign, "T_ASSIGN", parse_f32);
        parse_into!(config.t_margin, "T_MARGIN", parse_f32);
        parse_into!(config.t_cluster, "T_CLUSTER", parse_f32);
        parse_into!(config.alpha, "ALPHA", parse_f32);
        parse_into!(config.beta, "BETA", parse_f32);
        parse_into!(config.gamma, "GAMMA", parse_f32);
        parse_into!(config.tau, "TAU", parse_f32);
        parse_into!(config.vector_index_autoload, "VECTOR_INDEX_AUTOLOAD", parse_bool);
        parse_into!(
            config.max_pending_backpressure,
            "MAX_PENDING_BACKPRESSURE",
            parse_u64
        );

        Ok(config)
    }
}

fn parse_usize(raw: &str) -> Result<usize, CoreError> {
    raw.parse()
        .map_err(|_| CoreError::validation(format!("expected a positive integer, got '{raw}'")))
}

fn parse_u64(raw: &str) -> Result<u64, CoreError> {
    raw.parse()
        .map_err(|_| CoreError::validation(format!("expected an integer, got '{raw}'")))
}

fn parse_u32(raw: &str) -> Result<u32, CoreError> {
    raw.parse()
        .map_err(|_| CoreError::validation(format!("expected an integer, got '{raw}'")))
}

fn parse_f32(raw: &str) -> Result<f32, CoreError> {
    raw.parse()
        .map_err(|_| CoreError::validation(format!("expected a number, got '{raw}'")))
}

fn parse_bool(raw: &str) -> Result<bool, CoreError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CoreError::validation(format!("expected a boolean, got '{raw}'"))),
    }
}

fn parse_enum<T: FromStr>(raw: &str) -> Result<T, CoreError> {
    T::from_str(raw).map_err(|_| CoreError::validation(format!("unrecognized option '{raw}'")))
}
