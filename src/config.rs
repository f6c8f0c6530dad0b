//! Typed configuration, assembled once at startup from environment
//! variables (§6 table). Every field has the documented default; only
//! `source_bucket`, `target_bucket`, and `queue_url` are required.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MirrorError, Result};

/// Scaling policy consumed by the Dispatcher (C6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchPolicy {
    pub max_workers: u32,
    pub target_backlog_per_task: u32,
    pub burst_start_limit: u32,
    pub dispatch_period: Duration,
    pub launch_retries: u32,
    /// `(preemptible, on_demand)` launch weighting, default 4:1.
    pub preemptible_weight: (u32, u32),
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            max_workers: 64,
            target_backlog_per_task: 3,
            burst_start_limit: 20,
            dispatch_period: Duration::from_secs(60),
            launch_retries: 3,
            preemptible_weight: (4, 1),
        }
    }
}

/// Visibility-lease policy consumed by the visibility keeper (C4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisibilityPolicy {
    pub visibility_timeout: Duration,
    pub extend_interval: Duration,
}

impl Default for VisibilityPolicy {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(1800),
            extend_interval: Duration::from_secs(300),
        }
    }
}

/// Polling and shutdown policy consumed by the worker loop (C5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPolicy {
    pub empty_polls_before_exit: u32,
    pub wait_time_seconds: u32,
    pub batch: u32,
    pub drain_deadline: Duration,
}

impl Default for WorkerPolicy {
    fn default() -> Self {
        Self {
            empty_polls_before_exit: 3,
            wait_time_seconds: 20,
            batch: 1,
            drain_deadline: Duration::from_secs(25),
        }
    }
}

/// Copy-shaping policy consumed by the copy engine (C2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyPolicy {
    pub copy_parallelism: usize,
    pub part_size: u64,
    pub single_copy_ceiling: u64,
}

impl Default for CopyPolicy {
    fn default() -> Self {
        Self {
            copy_parallelism: 256,
            part_size: 64 * 1024 * 1024,
            single_copy_ceiling: 5 * 1024 * 1024 * 1024,
        }
    }
}

/// Retry budgets shared by the copy and delete engines (C2/C3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub part_retries: u32,
    pub delete_retries: u32,
    pub initial_backoff: Duration,
    pub backoff_jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            part_retries: 3,
            delete_retries: 3,
            initial_backoff: Duration::from_millis(200),
            backoff_jitter: 0.2,
        }
    }
}

/// Root configuration surface (C7). Cheap to clone and share (`Arc<Config>`)
/// across a worker's foreground task, its visibility keeper, and its
/// part-copy pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source_bucket: String,
    pub target_bucket: String,
    pub queue_url: String,
    #[serde(default)]
    pub prefix_filter: String,
    #[serde(default)]
    pub dispatch: DispatchPolicy,
    #[serde(default)]
    pub visibility: VisibilityPolicy,
    #[serde(default)]
    pub worker: WorkerPolicy,
    #[serde(default)]
    pub copy: CopyPolicy,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Config {
    /// Assembles configuration from the process environment. Returns
    /// [`MirrorError::InvalidConfig`] (mapped to exit code `2` by `main`)
    /// if a required variable is missing.
    pub fn from_env() -> Result<Self> {
        let source_bucket = require_env("SOURCE_BUCKET")?;
        let target_bucket = require_env("TARGET_BUCKET")?;
        let queue_url = require_env("QUEUE_URL")?;
        let prefix_filter = std::env::var("PREFIX_FILTER").unwrap_or_default();

        let mut dispatch = DispatchPolicy::default();
        if let Some(v) = env_u32("MAX_WORKERS") {
            dispatch.max_workers = v;
        }
        if let Some(v) = env_u32("TARGET_BACKLOG_PER_TASK") {
            dispatch.target_backlog_per_task = v;
        }
        if let Some(v) = env_u32("BURST_START_LIMIT") {
            dispatch.burst_start_limit = v;
        }
        if let Some(v) = env_u64("DISPATCH_PERIOD") {
            dispatch.dispatch_period = Duration::from_secs(v);
        }

        let mut visibility = VisibilityPolicy::default();
        if let Some(v) = env_u64("VISIBILITY_TIMEOUT") {
            visibility.visibility_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_u64("EXTEND_INTERVAL") {
            visibility.extend_interval = Duration::from_secs(v);
        }

        let mut worker = WorkerPolicy::default();
        if let Some(v) = env_u32("EMPTY_POLLS_BEFORE_EXIT") {
            worker.empty_polls_before_exit = v;
        }
        if let Some(v) = env_u32("WAIT_TIME_SECONDS") {
            worker.wait_time_seconds = v;
        }
        if let Some(v) = env_u64("DRAIN_DEADLINE") {
            worker.drain_deadline = Duration::from_secs(v);
        }

        let mut copy = CopyPolicy::default();
        if let Some(v) = env_u64("COPY_PARALLELISM") {
            copy.copy_parallelism = v as usize;
        }
        if let Some(v) = env_u64("PART_SIZE") {
            copy.part_size = v;
        }
        if let Some(v) = env_u64("SINGLE_COPY_CEILING") {
            copy.single_copy_ceiling = v;
        }

        let mut retry = RetryPolicy::default();
        if let Some(v) = env_u32("PART_RETRIES") {
            retry.part_retries = v;
        }
        if let Some(v) = env_u32("DELETE_RETRIES") {
            retry.delete_retries = v;
        }

        Ok(Self {
            source_bucket,
            target_bucket,
            queue_url,
            prefix_filter,
            dispatch,
            visibility,
            worker,
            copy,
            retry,
        })
    }
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| MirrorError::InvalidConfig(format!("missing required env var {name}")))
}

fn env_u32(name: &str) -> Option<u32> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
